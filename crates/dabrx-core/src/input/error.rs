//! Input-side error types.

use thiserror::Error;

pub type InputResult<T> = Result<T, InputError>;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to open input device: {0}")]
    DeviceOpen(String),

    #[error("failed to tune to {frequency_khz} kHz: {reason}")]
    TuneFailed { frequency_khz: u32, reason: String },

    #[error("failed to start sample stream: {0}")]
    StartFailed(String),

    #[error("raw dump file error: {0}")]
    DumpFile(#[from] std::io::Error),
}
