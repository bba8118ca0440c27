//! Record/playback session lifecycle

mod controller;
mod state;

pub use controller::SessionController;
pub use state::{recording_file_path, Session};

/// Directory under the recording root that holds recording artifacts
pub const RECORDINGS_DIR: &str = "recordings";
