//! Vitrine Core - Viewer session, camera framing and asset lifecycle
//!
//! This crate holds everything between "a bundle of named files" and "a frame
//! to draw", without any GPU code:
//! - Viewer session owning the current asset, camera, controls and light
//! - Redraw coalescing on the display-refresh cadence
//! - Temporary-handle brokering for in-memory multi-file bundles
//! - Bounding-box camera framing
//! - Clip playback for animated assets
//! - Typed presentation options and their string dispatch table

pub mod animation;
pub mod asset;
pub mod broker;
pub mod camera;
pub mod error;
pub mod framer;
pub mod options;
pub mod render;
pub mod scene;
pub mod scheduler;
pub mod session;

pub use animation::AnimationController;
pub use asset::{
    AnimationClip, Asset, AssetId, BinaryBlob, BlobMap, Bundle, Channel, DecodedAsset, Keyframes,
    Track,
};
pub use broker::{
    AssetDecoder, HandleStats, Locator, ObjectUrlRegistry, ResolveScope, ResourceUrlBroker,
};
pub use camera::{CameraConfig, OrbitControls, PerspectiveCamera, Viewport};
pub use error::{ConfigError, DecodeError, Outcome, ViewerError};
pub use framer::{frame, CameraPlacement, Framing, FramingParams};
pub use options::{apply_assignment, apply_option, OptionEntry, Presentation, ViewerOptions, OPTION_TABLE};
pub use render::{Frame, Renderer};
pub use scene::{
    AmbientLight, Background, BoundingBox, BoundingBoxOverlay, Color, Material, Mesh, Primitive,
    SceneNode, Transform,
};
pub use scheduler::{FrameClock, FrameScheduler};
pub use session::{
    LoadId, LoadReport, LoadResult, PendingLoad, PostDrawHandle, SessionState, Unloaded,
    ViewerSession,
};
