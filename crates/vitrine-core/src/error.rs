//! Error taxonomy shared by the session, the broker and decoders

use thiserror::Error;

/// Failure reported by an [`AssetDecoder`](crate::broker::AssetDecoder)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("malformed asset: {0}")]
    Malformed(String),
    #[error("unsupported asset: {0}")]
    Unsupported(String),
    #[error("referenced resource not available: {0}")]
    MissingResource(String),
    #[error("failed to fetch {locator}: {reason}")]
    Fetch { locator: String, reason: String },
}

/// Errors surfaced by [`ViewerSession`](crate::session::ViewerSession) operations
///
/// None of these leave the session partially mutated: parameter checks run
/// before any state changes, and a failed decode keeps the previous asset.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewerError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("animation clip not found: {0}")]
    ClipNotFound(String),
    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("a load is already in flight")]
    LoadInFlight,
    #[error("load ticket {0} is not the in-flight load")]
    StaleLoad(u64),
    #[error("animation controller is bound to a different asset")]
    ForeignAsset,
}

impl ViewerError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors from option parsing and the option dispatch table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("option {name} expects {expected}, got {value:?}")]
    BadValue {
        name: String,
        expected: &'static str,
        value: String,
    },
    #[error(transparent)]
    Rejected(#[from] ViewerError),
}

/// Benign result of a presentation or animation operation
///
/// `NoAssetLoaded` means the request was persisted (where applicable) but had
/// nothing to act on yet; callers treat it as a no-op, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    NoAssetLoaded,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Outcome::Applied)
    }
}
