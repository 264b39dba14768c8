//! Vitrine glTF - glTF 2.0 decoding for the viewer session
//!
//! Implements [`vitrine_core::AssetDecoder`] for `.gltf` and `.glb` documents.
//! Every reference a document makes is resolved through the session's
//! [`vitrine_core::ResolveScope`], so sibling files dropped with the primary
//! are read from memory while URLs and paths outside the bundle are fetched.

pub mod decoder;
pub mod fetch;
pub mod uri;

pub use decoder::GltfDecoder;
pub use fetch::{ExternalFetcher, FetchError};
