//! glTF 2.0 decoding into the renderer-agnostic scene model

use crate::fetch::{ExternalFetcher, FetchError};
use crate::uri;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use glam::{Quat, Vec3};
use gltf::animation::util::ReadOutputs;
use gltf::animation::Interpolation;
use gltf::Gltf;
use std::sync::Arc;
use tracing::{debug, info};
use vitrine_core::{
    AnimationClip, AssetDecoder, BinaryBlob, BoundingBox, Channel, DecodeError, DecodedAsset,
    Keyframes, Locator, Material, Mesh, Primitive, ResolveScope, SceneNode, Track, Transform,
};

/// Deeper hierarchies are treated as cyclic
const MAX_NODE_DEPTH: usize = 512;

/// Decodes `.gltf` (JSON) and `.glb` (binary) documents
#[derive(Debug, Clone)]
pub struct GltfDecoder {
    fetcher: ExternalFetcher,
}

impl GltfDecoder {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_fetcher(ExternalFetcher::new()?))
    }

    pub fn with_fetcher(fetcher: ExternalFetcher) -> Self {
        Self { fetcher }
    }

    /// Read one reference through the scope: bundle members from memory,
    /// everything else through the fetcher
    async fn read(&self, scope: &ResolveScope, reference: &str) -> Result<BinaryBlob, DecodeError> {
        match scope.resolve(reference) {
            locator @ Locator::Temporary(_) => scope
                .open(&locator)
                .ok_or_else(|| DecodeError::MissingResource(reference.to_string())),
            Locator::External(target) => {
                let bytes = self
                    .fetcher
                    .fetch(&target)
                    .await
                    .map_err(|e| DecodeError::Fetch {
                        locator: target.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(Arc::from(bytes.into_boxed_slice()))
            }
        }
    }

    async fn load_buffers(
        &self,
        document: &Gltf,
        base: &str,
        scope: &ResolveScope,
    ) -> Result<Vec<BinaryBlob>, DecodeError> {
        let mut buffers = Vec::with_capacity(document.buffers().len());
        for buffer in document.buffers() {
            let data: BinaryBlob = match buffer.source() {
                gltf::buffer::Source::Bin => document
                    .blob
                    .as_deref()
                    .map(Arc::<[u8]>::from)
                    .ok_or_else(|| DecodeError::Malformed("missing binary chunk".into()))?,
                gltf::buffer::Source::Uri(u) if uri::is_data_uri(u) => decode_data_uri(u)?,
                gltf::buffer::Source::Uri(u) => self.read(scope, &uri::resolve(base, u)).await?,
            };
            if data.len() < buffer.length() {
                return Err(DecodeError::Malformed(format!(
                    "buffer {} holds {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                )));
            }
            buffers.push(data);
        }
        Ok(buffers)
    }
}

impl AssetDecoder for GltfDecoder {
    async fn decode(
        &self,
        primary: &str,
        scope: &ResolveScope,
    ) -> Result<DecodedAsset, DecodeError> {
        let bytes = self.read(scope, primary).await?;
        sniff(&bytes)?;
        let document = Gltf::from_slice(&bytes).map_err(parse_error)?;
        let base = uri::base_of(primary);

        let buffers = self.load_buffers(&document, base, scope).await?;
        let images = touch_images(&document, base, scope);
        let root = build_scene(&document, &buffers)?;
        let animations = build_clips(&document, &buffers)?;

        info!(
            primary = %primary,
            nodes = root.node_count() - 1,
            buffers = buffers.len(),
            images,
            clips = animations.len(),
            "Decoded glTF"
        );
        Ok(DecodedAsset { root, animations })
    }
}

/// Reject documents that are neither glTF JSON nor GLB before parsing
fn sniff(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.starts_with(b"glTF") {
        return Ok(());
    }
    let first = bytes
        .iter()
        .copied()
        .find(|b| !(b.is_ascii_whitespace() || matches!(b, 0xEF | 0xBB | 0xBF)));
    match first {
        Some(b'{') => Ok(()),
        _ => Err(DecodeError::Unsupported(
            "not a glTF document (expected JSON or GLB)".into(),
        )),
    }
}

fn parse_error(err: gltf::Error) -> DecodeError {
    match err {
        gltf::Error::Validation(errors) => {
            let unsupported: Vec<String> = errors
                .iter()
                .filter(|(_, e)| matches!(e, gltf::json::validation::Error::Unsupported))
                .map(|(path, _)| path.to_string())
                .collect();
            if unsupported.is_empty() {
                let detail: Vec<String> = errors
                    .iter()
                    .map(|(path, e)| format!("{path}: {e}"))
                    .collect();
                DecodeError::Malformed(detail.join("; "))
            } else {
                DecodeError::Unsupported(unsupported.join(", "))
            }
        }
        other => DecodeError::Malformed(other.to_string()),
    }
}

fn decode_data_uri(data_uri: &str) -> Result<BinaryBlob, DecodeError> {
    let (header, payload) = data_uri
        .split_once(',')
        .ok_or_else(|| DecodeError::Malformed("data URI without payload".into()))?;
    if !header.ends_with(";base64") {
        return Err(DecodeError::Unsupported(format!("data URI encoding in {header}")));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| DecodeError::Malformed(format!("invalid base64 buffer: {e}")))?;
    Ok(Arc::from(bytes.into_boxed_slice()))
}

/// Resolve image references so bundle textures are accounted for; pixels are
/// left to the renderer
fn touch_images(document: &Gltf, base: &str, scope: &ResolveScope) -> usize {
    let mut resolved = 0;
    for image in document.images() {
        if let gltf::image::Source::Uri { uri: u, .. } = image.source() {
            if uri::is_data_uri(u) {
                continue;
            }
            let locator = scope.resolve(&uri::resolve(base, u));
            debug!(image = image.index(), locator = %locator, "Resolved image reference");
            resolved += 1;
        }
    }
    resolved
}

fn build_scene(document: &Gltf, buffers: &[BinaryBlob]) -> Result<SceneNode, DecodeError> {
    let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) else {
        return Ok(SceneNode::root(Vec::new()));
    };
    let children = scene
        .nodes()
        .map(|node| build_node(&node, buffers, 0))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SceneNode::root(children))
}

fn build_node(
    node: &gltf::Node<'_>,
    buffers: &[BinaryBlob],
    depth: usize,
) -> Result<SceneNode, DecodeError> {
    if depth > MAX_NODE_DEPTH {
        return Err(DecodeError::Malformed(format!(
            "node {} nested deeper than {MAX_NODE_DEPTH} levels",
            node.index()
        )));
    }
    let (translation, rotation, scale) = node.transform().decomposed();
    let mut out = SceneNode::new(node.index() as u32).with_transform(Transform {
        translation: Vec3::from(translation),
        rotation: Quat::from_array(rotation),
        scale: Vec3::from(scale),
    });
    out.name = node.name().map(str::to_string);
    out.mesh = node.mesh().map(|mesh| build_mesh(&mesh, buffers));
    for child in node.children() {
        out.children.push(build_node(&child, buffers, depth + 1)?);
    }
    Ok(out)
}

fn build_mesh(mesh: &gltf::Mesh<'_>, buffers: &[BinaryBlob]) -> Mesh {
    let primitives = mesh
        .primitives()
        .map(|prim| {
            let material = prim.material();
            Primitive {
                bounds: position_bounds(&prim, buffers),
                material: Material {
                    name: material.name().map(str::to_string),
                    index: material.index(),
                    wireframe: false,
                },
            }
        })
        .collect();
    Mesh {
        name: mesh.name().map(str::to_string),
        primitives,
    }
}

/// Bounds from the POSITION accessor's declared min/max, or from the
/// vertices themselves when those are absent
fn position_bounds(prim: &gltf::Primitive<'_>, buffers: &[BinaryBlob]) -> BoundingBox {
    if let Some(accessor) = prim.get(&gltf::Semantic::Positions) {
        let corner = |value: Option<gltf::json::Value>| {
            value
                .and_then(|v| serde_json::from_value::<[f32; 3]>(v).ok())
                .map(Vec3::from)
        };
        if let (Some(min), Some(max)) = (corner(accessor.min()), corner(accessor.max())) {
            return BoundingBox::new(min, max);
        }
    }
    let reader = prim.reader(|b| buffers.get(b.index()).map(|d| &d[..]));
    let mut bounds = BoundingBox::EMPTY;
    if let Some(positions) = reader.read_positions() {
        for p in positions {
            bounds.expand_to(Vec3::from(p));
        }
    }
    bounds
}

fn build_clips(document: &Gltf, buffers: &[BinaryBlob]) -> Result<Vec<AnimationClip>, DecodeError> {
    document
        .animations()
        .map(|anim| {
            let name = anim
                .name()
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("animation_{}", anim.index()));
            let mut tracks = Vec::new();
            for channel in anim.channels() {
                if let Some(track) = build_track(&channel, buffers)
                    .map_err(|e| DecodeError::Malformed(format!("animation {name}: {e}")))?
                {
                    tracks.push(track);
                }
            }
            Ok(AnimationClip::new(name, tracks))
        })
        .collect()
}

/// Keyframe times must be finite and strictly increasing
fn check_key_times(times: &[f32]) -> Result<(), String> {
    if let Some(bad) = times.iter().find(|t| !t.is_finite()) {
        return Err(format!("non-finite keyframe time {bad}"));
    }
    if let Some(pair) = times.windows(2).find(|w| w[1] <= w[0]) {
        return Err(format!("keyframe times not increasing ({} then {})", pair[0], pair[1]));
    }
    Ok(())
}

fn build_track(
    channel: &gltf::animation::Channel<'_>,
    buffers: &[BinaryBlob],
) -> Result<Option<Track>, String> {
    let reader = channel.reader(|b| buffers.get(b.index()).map(|d| &d[..]));
    let Some(inputs) = reader.read_inputs() else {
        return Ok(None);
    };
    let times: Vec<f32> = inputs.collect();
    check_key_times(&times)?;
    // cubic spline outputs are (in-tangent, value, out-tangent) triples
    let cubic = matches!(channel.sampler().interpolation(), Interpolation::CubicSpline);
    let target = channel.target().node().index() as u32;

    let Some(outputs) = reader.read_outputs() else {
        return Ok(None);
    };
    let channel = match outputs {
        ReadOutputs::Translations(it) => {
            Channel::Translation(Keyframes::new(times, keyed(it.map(Vec3::from), cubic)))
        }
        ReadOutputs::Rotations(it) => Channel::Rotation(Keyframes::new(
            times,
            keyed(it.into_f32().map(|q| Quat::from_array(q).normalize()), cubic),
        )),
        ReadOutputs::Scales(it) => {
            Channel::Scale(Keyframes::new(times, keyed(it.map(Vec3::from), cubic)))
        }
        ReadOutputs::MorphTargetWeights(_) => return Ok(None),
    };
    Ok(Some(Track { target, channel }))
}

fn keyed<T>(values: impl Iterator<Item = T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.skip(1).step_by(3).collect()
    } else {
        values.collect()
    }
}
