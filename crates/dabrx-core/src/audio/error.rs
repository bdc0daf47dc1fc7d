//! Audio output error types.

use thiserror::Error;

pub type AudioResult<T> = Result<T, AudioError>;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output devices available")]
    NoDevices,

    #[error("no default audio output device")]
    NoDefaultDevice,

    #[error("audio output device not found: {0}")]
    DeviceNotFound(String),

    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("failed to start audio stream: {0}")]
    StreamPlay(String),
}
