use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid config: stages.{key} has {actual} entries, expected T = {expected}")]
    StageLength {
        key: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid shape: {0} coordinates is not an interleaved x,y row")]
    InvalidShape(usize),

    #[error("Unsupported SCALE: {0}")]
    UnsupportedScale(i64),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
