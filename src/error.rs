use thiserror::Error;

/// Engine construction failed. Terminal for that engine instance; the
/// coordinator never retries on its own.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("engine construction failed: {message}")]
pub struct InitError {
    pub message: String,
}

impl InitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One simulation tick failed. The loop logs it, keeps the last published
/// frame, and moves on to the next tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("engine step failed: {0}")]
    Step(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
