use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Why a relay operation failed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The messaging client could not deliver the media.
    #[error("media download failed: {0}")]
    Download(#[from] courier_channels::Error),

    /// The payload is not valid base64.
    #[error("media payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Writing the staged file failed.
    #[error("failed to stage attachment at {}: {source}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening a file for upload failed.
    #[error("failed to read {} for upload: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request never produced a response (connect, timeout, body stream).
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The webhook answered with a non-2xx status.
    #[error("webhook rejected upload with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Removing the staged file failed.
    #[error("failed to remove staged file {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error("invalid webhook client configuration: {0}")]
    Config(String),
}
