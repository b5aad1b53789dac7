//! Centralized error type for the oscmidi umbrella crate.
//!
//! Wraps the subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Mapping(#[from] oscmidi_mapping::Error),

    #[error("transport: {0}")]
    Transport(#[from] oscmidi_rt::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
