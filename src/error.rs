//! Error type shared by the fetch, render and export paths.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure talking to the classification service or geocoder
    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// A response body could not be decoded
    #[error("could not decode {what}: {message}")]
    Decode { what: &'static str, message: String },

    /// Geocoding search matched nothing
    #[error("no results for \"{0}\"")]
    NoResults(String),

    #[error("tile {z}/{x}/{y} is outside the tile grid")]
    InvalidTile { z: u8, x: u32, y: u32 },

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("snapshot export failed: {0}")]
    Export(String),

    #[error("point data has not been loaded")]
    NotLoaded,
}

impl From<lopdf::Error> for Error {
    fn from(e: lopdf::Error) -> Self {
        Error::Export(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Export(e.to_string())
    }
}
