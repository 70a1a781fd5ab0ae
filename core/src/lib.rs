pub mod params;
pub mod rng;

pub use params::*;
pub use rng::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Boundary violation: {0}")]
    BoundaryViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
