// thin wrapper around openpnp_capture
use std::ffi::{c_void, CStr};
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;
use openpnp_capture_sys as openpnp_sys;
use openpnp_sys::{CapContext, CapFormatInfo, CapPropertyID, CapStream};
use serde::{Deserialize, Serialize};

use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::Frame;

/// Anything that can hand out frames. Owned by exactly one worker at a time.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Frame, CameraError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraProperty {
    Exposure,
    Gain,
    Brightness,
    Contrast,
    Saturation,
    Sharpness,
    Hue,
    Gamma,
    WhiteBalance,
    BacklightCompensation,
}

impl CameraProperty {
    pub const ALL: [CameraProperty; 10] = [
        CameraProperty::Exposure,
        CameraProperty::Gain,
        CameraProperty::Brightness,
        CameraProperty::Contrast,
        CameraProperty::Saturation,
        CameraProperty::Sharpness,
        CameraProperty::Hue,
        CameraProperty::Gamma,
        CameraProperty::WhiteBalance,
        CameraProperty::BacklightCompensation,
    ];

    fn id(self) -> CapPropertyID {
        match self {
            CameraProperty::Exposure => openpnp_sys::CAPPROPID_EXPOSURE,
            CameraProperty::Gain => openpnp_sys::CAPPROPID_GAIN,
            CameraProperty::Brightness => openpnp_sys::CAPPROPID_BRIGHTNESS,
            CameraProperty::Contrast => openpnp_sys::CAPPROPID_CONTRAST,
            CameraProperty::Saturation => openpnp_sys::CAPPROPID_SATURATION,
            CameraProperty::Sharpness => openpnp_sys::CAPPROPID_SHARPNESS,
            CameraProperty::Hue => openpnp_sys::CAPPROPID_HUE,
            CameraProperty::Gamma => openpnp_sys::CAPPROPID_GAMMA,
            CameraProperty::WhiteBalance => openpnp_sys::CAPPROPID_WHITEBALANCE,
            CameraProperty::BacklightCompensation => openpnp_sys::CAPPROPID_BACKLIGHTCOMP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRange {
    pub value: i32,
    pub default: i32,
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub fourcc: u32,
}

impl FormatInfo {
    pub fn fourcc_str(&self) -> String {
        self.fourcc
            .to_le_bytes()
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub formats: Vec<FormatInfo>,
}

/// Picks the format nearest to the requested resolution, then frame rate.
pub fn closest_format(formats: &[FormatInfo], width: u32, height: u32, fps: u32) -> Option<FormatInfo> {
    formats.iter().copied().min_by_key(|f| {
        (
            f.width.abs_diff(width) + f.height.abs_diff(height),
            f.fps.abs_diff(fps),
        )
    })
}

struct CaptureContext(CapContext);

impl CaptureContext {
    fn new() -> Self {
        CaptureContext(unsafe { openpnp_sys::Cap_createContext() })
    }

    fn device_count(&self) -> u32 {
        unsafe { openpnp_sys::Cap_getDeviceCount(self.0) }
    }

    fn device_name(&self, index: u32) -> String {
        let ptr = unsafe { openpnp_sys::Cap_getDeviceName(self.0, index) };
        if ptr.is_null() {
            return format!("camera {index}");
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn formats(&self, index: u32) -> Vec<FormatInfo> {
        let count = unsafe { openpnp_sys::Cap_getNumFormats(self.0, index) }.max(0) as u32;
        (0..count)
            .filter_map(|id| {
                let mut info: CapFormatInfo = unsafe { std::mem::zeroed() };
                let res = unsafe { openpnp_sys::Cap_getFormatInfo(self.0, index, id, &mut info) };
                (res == openpnp_sys::CAPRESULT_OK).then(|| FormatInfo {
                    id,
                    width: info.width,
                    height: info.height,
                    fps: info.fps,
                    fourcc: info.fourcc,
                })
            })
            .collect()
    }
}

impl Drop for CaptureContext {
    fn drop(&mut self) {
        unsafe { openpnp_sys::Cap_releaseContext(self.0) };
    }
}

pub fn list_devices() -> Vec<DeviceInfo> {
    let context = CaptureContext::new();
    (0..context.device_count())
        .map(|index| DeviceInfo {
            index,
            name: context.device_name(index),
            formats: context.formats(index),
        })
        .collect()
}

/// A webcam stream delivering RGB24 frames.
pub struct OpenpnpCamera {
    stream: CapStream,
    name: String,
    format: FormatInfo,
    timeout: Duration,
    buffer: Vec<u8>,
    context: CaptureContext,
}

// The context handle is only ever touched by the single thread that owns the camera.
unsafe impl Send for OpenpnpCamera {}

impl OpenpnpCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let context = CaptureContext::new();
        let device = config.device_index;
        if device >= context.device_count() {
            return Err(CameraError::DeviceNotFound(device));
        }

        let name = context.device_name(device);
        let format = closest_format(&context.formats(device), config.width, config.height, config.fps)
            .ok_or(CameraError::NoFormat { device })?;

        let stream = unsafe { openpnp_sys::Cap_openStream(context.0, device, format.id) };
        if stream < 0 {
            return Err(CameraError::OpenFailed { device });
        }

        log::info!(
            "opened {} at {}x{} {} fps ({})",
            name,
            format.width,
            format.height,
            format.fps,
            format.fourcc_str()
        );

        let camera = OpenpnpCamera {
            stream,
            name,
            format,
            timeout: Duration::from_millis(config.frame_timeout_ms),
            buffer: vec![0u8; (format.width * format.height * 3) as usize],
            context,
        };
        camera.apply_settings(config);
        Ok(camera)
    }

    pub fn format(&self) -> FormatInfo {
        self.format
    }

    fn apply_settings(&self, config: &CameraConfig) {
        if let Some(auto) = config.auto_exposure {
            self.set_auto_property(CameraProperty::Exposure, auto);
        }
        if let Some(auto) = config.auto_white_balance {
            self.set_auto_property(CameraProperty::WhiteBalance, auto);
        }

        for (&property, &value) in &config.properties {
            // a manual exposure would fight the automatic one
            if property == CameraProperty::Exposure && config.auto_exposure == Some(true) {
                continue;
            }
            self.set_property(property, value);
        }
    }

    pub fn property_range(&self, property: CameraProperty) -> Option<PropertyRange> {
        let (mut min, mut max, mut default) = (0, 0, 0);
        let res = unsafe {
            openpnp_sys::Cap_getPropertyLimits(
                self.context.0,
                self.stream,
                property.id(),
                &mut min,
                &mut max,
                &mut default,
            )
        };
        if res != openpnp_sys::CAPRESULT_OK {
            return None;
        }

        let mut value = 0;
        let res = unsafe {
            openpnp_sys::Cap_getProperty(self.context.0, self.stream, property.id(), &mut value)
        };
        Some(PropertyRange {
            value: if res == openpnp_sys::CAPRESULT_OK { value } else { default },
            default,
            min,
            max,
        })
    }

    pub fn auto_property(&self, property: CameraProperty) -> Option<bool> {
        let mut value = 0;
        let res = unsafe {
            openpnp_sys::Cap_getAutoProperty(self.context.0, self.stream, property.id(), &mut value)
        };
        (res == openpnp_sys::CAPRESULT_OK).then_some(value == 1)
    }

    pub fn set_property(&self, property: CameraProperty, value: i32) {
        let res = unsafe {
            openpnp_sys::Cap_setProperty(self.context.0, self.stream, property.id(), value)
        };
        if res != openpnp_sys::CAPRESULT_OK {
            log::warn!("{}: could not set {:?} to {} (result {})", self.name, property, value, res);
        }
    }

    pub fn set_auto_property(&self, property: CameraProperty, enabled: bool) {
        let res = unsafe {
            openpnp_sys::Cap_setAutoProperty(
                self.context.0,
                self.stream,
                property.id(),
                enabled as u32,
            )
        };
        if res != openpnp_sys::CAPRESULT_OK {
            log::warn!("{}: could not set automatic {:?} (result {})", self.name, property, res);
        }
    }

    fn wait_for_frame(&self) -> Result<(), CameraError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if unsafe { openpnp_sys::Cap_isOpenStream(self.context.0, self.stream) } == 0 {
                return Err(CameraError::Disconnected);
            }
            if unsafe { openpnp_sys::Cap_hasNewFrame(self.context.0, self.stream) } != 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CameraError::Timeout(self.timeout.as_millis() as u64));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl FrameSource for OpenpnpCamera {
    fn read(&mut self) -> Result<Frame, CameraError> {
        self.wait_for_frame()?;

        let res = unsafe {
            openpnp_sys::Cap_captureFrame(
                self.context.0,
                self.stream,
                self.buffer.as_mut_ptr() as *mut c_void,
                self.buffer.len() as u32,
            )
        };
        if res != openpnp_sys::CAPRESULT_OK {
            return Err(CameraError::CaptureFailed(res));
        }

        let (width, height) = (self.format.width, self.format.height);
        let image = RgbImage::from_raw(width, height, self.buffer.clone())
            .ok_or(CameraError::BadBuffer { width, height })?;
        Ok(Frame::now(image))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for OpenpnpCamera {
    fn drop(&mut self) {
        unsafe { openpnp_sys::Cap_closeStream(self.context.0, self.stream) };
        log::info!("released {}", self.name);
    }
}
