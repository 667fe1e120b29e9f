use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("failed to parse GPX document: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("track file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrackResult<T> = Result<T, TrackError>;
