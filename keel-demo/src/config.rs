use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Brings up the Keel platform, plays a tone and pumps events")]
pub struct Args {
    /// JSON settings file; missing fields take their defaults.
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Frames to run before quitting (0 = until closed or Ctrl-C).
    #[arg(short, long, default_value_t = 300)]
    pub frames: u64,

    /// Test tone frequency in Hz.
    #[arg(short, long, default_value_t = 440.0)]
    pub tone: f32,

    /// Test tone amplitude, 0.0 to 1.0.
    #[arg(long, default_value_t = 0.25)]
    pub volume: f32,

    #[arg(long)]
    pub no_audio: bool,

    #[arg(long)]
    pub no_window: bool,

    /// Feed synthetic resize and key events from a background thread.
    #[arg(long)]
    pub simulate_input: bool,

    /// Overrides the audio sample rate from the settings file.
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Pin the main thread to this core.
    #[arg(long)]
    pub pin_core: Option<usize>,
}
