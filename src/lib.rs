pub mod app;
pub mod audio;
pub mod audio_io;
pub mod config;
pub mod error;
pub mod loop_markers;
pub mod poller;
pub mod session;
pub mod wave;

pub use app::AbWaveApp;
pub use config::PlayerConfig;
pub use error::LoadError;
pub use session::{PlayerState, Session, SessionEvent, TickOutcome};
