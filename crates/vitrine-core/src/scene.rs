//! Renderer-agnostic scene graph: nodes, meshes, materials, bounds, lights

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node id reserved for the synthetic root that groups a scene's top-level nodes
pub const ROOT_NODE_ID: u32 = u32::MAX;

/// Axis-aligned bounding box in world or local space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// A box containing nothing; any union with it yields the other operand
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Euclidean length of the size vector
    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expand_to(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing all eight corners after transformation by `matrix`
    pub fn transformed(&self, matrix: &Mat4) -> BoundingBox {
        if self.is_empty() {
            return *self;
        }
        let mut out = BoundingBox::EMPTY;
        for corner in self.corners() {
            out.expand_to(matrix.transform_point3(corner));
        }
        out
    }
}

/// Local translation / rotation / scale of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Surface description; only the properties the viewer toggles are modeled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: Option<String>,
    /// Index of the source material in the decoded document
    pub index: Option<usize>,
    pub wireframe: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    /// Bounds of the primitive's vertices in node-local space
    pub bounds: BoundingBox,
    pub material: Material,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

/// A node in an asset's transform hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    /// Unique within one asset; animation tracks address nodes by this id
    pub id: u32,
    pub name: Option<String>,
    pub transform: Transform,
    pub mesh: Option<Mesh>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: None,
            transform: Transform::default(),
            mesh: None,
            children: Vec::new(),
        }
    }

    /// Synthetic root grouping top-level nodes
    pub fn root(children: Vec<SceneNode>) -> Self {
        Self {
            name: Some("Scene".to_string()),
            children,
            ..Self::new(ROOT_NODE_ID)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// World-space bounds of every primitive below (and including) this node
    ///
    /// World matrices are accumulated from this node down, so the result is
    /// independent of any cached state.
    pub fn world_bounds(&self) -> BoundingBox {
        let mut out = BoundingBox::EMPTY;
        self.accumulate_bounds(&Mat4::IDENTITY, &mut out);
        out
    }

    fn accumulate_bounds(&self, parent: &Mat4, out: &mut BoundingBox) {
        let world = *parent * self.transform.matrix();
        if let Some(mesh) = &self.mesh {
            for primitive in &mesh.primitives {
                *out = out.union(&primitive.bounds.transformed(&world));
            }
        }
        for child in &self.children {
            child.accumulate_bounds(&world, out);
        }
    }

    /// Child-index path from this node to the node with `id`
    pub fn find_path(&self, id: u32) -> Option<Vec<usize>> {
        if self.id == id {
            return Some(Vec::new());
        }
        for (i, child) in self.children.iter().enumerate() {
            if let Some(mut path) = child.find_path(id) {
                path.insert(0, i);
                return Some(path);
            }
        }
        None
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&SceneNode> {
        let mut node = self;
        for &i in path {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut SceneNode> {
        let mut node = self;
        for &i in path {
            node = node.children.get_mut(i)?;
        }
        Some(node)
    }

    pub fn find(&self, id: u32) -> Option<&SceneNode> {
        self.find_path(id).and_then(|path| self.node_at(&path))
    }

    /// Depth-first visit of this node and all descendants
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a SceneNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    pub fn for_each_material(&self, f: &mut impl FnMut(&Material)) {
        self.walk(&mut |node| {
            if let Some(mesh) = &node.mesh {
                mesh.primitives.iter().for_each(|p| f(&p.material));
            }
        });
    }

    pub fn for_each_material_mut(&mut self, f: &mut impl FnMut(&mut Material)) {
        if let Some(mesh) = &mut self.mesh {
            mesh.primitives.iter_mut().for_each(|p| f(&mut p.material));
        }
        for child in &mut self.children {
            child.for_each_material_mut(f);
        }
    }
}

/// 8-bit sRGB color, serialized as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const GREEN: Color = Color::rgb(0x00, 0xff, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb`, `rgb`, `#rrggbb`, `rrggbb` or `0xrrggbb`
    pub fn parse(s: &str) -> Option<Color> {
        let s = s.trim();
        let hex = s
            .strip_prefix('#')
            .or_else(|| s.strip_prefix("0x"))
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let value = u32::from_str_radix(&expanded, 16).ok()?;
        Some(Color::rgb((value >> 16) as u8, (value >> 8) as u8, value as u8))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Clear color of the viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Background {
    pub color: Color,
    pub opacity: f32,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
        }
    }
}

/// Debug overlay drawing the current asset's world bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxOverlay {
    pub color: Color,
    pub bounds: BoundingBox,
}
