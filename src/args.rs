use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live attention classification from a webcam", long_about = None)]
pub struct Args {
    /// Configuration file (JSON); missing files fall back to defaults
    #[arg(long, default_value = "attention.json")]
    pub config: PathBuf,

    /// Camera index, overrides the configuration
    #[arg(short, long)]
    pub camera: Option<u32>,

    /// SCRFD ONNX model, overrides the configuration
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Directory for recorded sessions
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Never try the CUDA execution provider
    #[arg(long, default_value_t = false)]
    pub cpu_only: bool,
}
