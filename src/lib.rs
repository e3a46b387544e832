pub mod app;
pub mod args;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod face;
pub mod face_detection;
pub mod frame;
pub mod handoff;
pub mod overlay;
pub mod recorder;
pub mod webcam;
pub mod worker;
