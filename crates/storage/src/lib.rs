//! Storage Layer
//!
//! Artifact stores addressed by storage path strings, plus codecs for the
//! pipeline's tables (XLSX or CSV in, parquet out) and postcard model artifacts.

mod codec;
mod path;
mod store;

pub use codec::{
    decode_parquet, encode_parquet, read_artifact, read_table, write_artifact, write_parquet,
};
pub use path::{extension, object_key, path_join};
pub use store::{AbfsLocation, ArtifactStore, AzureCredentials, OpendalStore};

use equipment_data::DataError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Artifact not found: {0}")]
    NotFound(String),
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error(transparent)]
    Data(#[from] DataError),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}
