//! Normalized scene model
//!
//! Scene providers (the per-format import glue) produce this representation;
//! the export pipeline consumes it. The model is provider-agnostic: once a
//! scene lands here, the exporter never calls back into the parser that
//! produced it.

use glam::{Mat4, Quat, Vec2, Vec3};

/// A fully parsed scene: one rooted node tree plus scene-wide resources.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub root: Node,
    pub animations: Vec<AnimationStack>,
    /// Textures embedded in the source file, referenced from materials by
    /// index. Pixel data passes through undecoded.
    pub embedded_textures: Vec<EmbeddedTexture>,
}

impl Scene {
    pub fn has_animations(&self) -> bool {
        !self.animations.is_empty()
    }

    /// True when any mesh in the tree carries skin bindings.
    pub fn is_skinned(&self) -> bool {
        self.root.subtree_has_skin()
    }
}

/// One entry in the scene hierarchy.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Name as given by the source file; may be empty.
    pub name: String,
    /// Local transform relative to the parent, column-major.
    pub transform: Mat4,
    pub meshes: Vec<Mesh>,
    pub children: Vec<Node>,
}

impl Node {
    fn subtree_has_skin(&self) -> bool {
        self.meshes.iter().any(|mesh| mesh.skin.is_some())
            || self.children.iter().any(Node::subtree_has_skin)
    }
}

/// Primitive shape of a mesh's index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum PrimitiveKind {
    Point = 0x1,
    Line = 0x2,
    #[default]
    Triangle = 0x4,
    /// Not supported by the container; meshes carrying polygons are
    /// reported and their primitive-dependent fields skipped.
    Polygon = 0x8,
}

/// One mesh: positions are mandatory, every other attribute optional.
/// Attribute vectors, when present, run parallel to `positions`.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub colors: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec3>>,
    pub bitangents: Option<Vec<Vec3>>,
    pub indices: Vec<u32>,
    pub primitive: PrimitiveKind,
    pub material: Material,
    pub skin: Option<Skin>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn has_normals(&self) -> bool {
        self.normals.as_ref().is_some_and(|n| !n.is_empty())
    }

    pub fn has_uvs(&self) -> bool {
        self.uvs.as_ref().is_some_and(|u| !u.is_empty())
    }

    pub fn has_colors(&self) -> bool {
        self.colors.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// True when both tangents and bitangents are available.
    pub fn has_tangent_basis(&self) -> bool {
        self.tangents.as_ref().is_some_and(|t| !t.is_empty())
            && self.bitangents.as_ref().is_some_and(|b| !b.is_empty())
    }
}

/// Material fields as far as the container carries them. `None` fields fall
/// back to fixed constants at encode time.
#[derive(Debug, Clone, Default)]
pub struct Material {
    pub ambient: Option<Vec3>,
    pub diffuse: Option<Vec3>,
    pub specular: Option<Vec3>,
    pub shininess: Option<f32>,
    pub opacity: Option<f32>,
    pub two_sided: bool,
    pub diffuse_texture: TextureRef,
    pub height_texture: TextureRef,
}

/// Where a texture slot gets its data from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TextureRef {
    /// No texture; the encoder falls back to a constant color where the
    /// slot supports one.
    #[default]
    None,
    /// External image file. Folder components are stripped at encode time.
    File(String),
    /// Index into [`Scene::embedded_textures`].
    Embedded(usize),
}

/// Per-vertex bone bindings, grouped by bone the way modeling packages
/// deliver them: each cluster names one bone and lists the vertices it
/// influences.
#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub clusters: Vec<SkinCluster>,
}

#[derive(Debug, Clone)]
pub struct SkinCluster {
    pub bone: String,
    /// Bind-pose inverse matrix for this bone.
    pub inverse_bind: Mat4,
    /// (vertex index, weight) pairs.
    pub weights: Vec<(u32, f32)>,
}

/// A texture embedded in the source file.
#[derive(Debug, Clone)]
pub enum EmbeddedTexture {
    /// Undecoded image file bytes (PNG, JPEG, ...).
    Compressed { bytes: Vec<u8> },
    /// Raw RGBA8 texels, `width * height * 4` bytes.
    Rgba {
        width: u32,
        height: u32,
        texels: Vec<u8>,
    },
}

/// One named animation with per-node keyframe tracks.
#[derive(Debug, Clone, Default)]
pub struct AnimationStack {
    pub name: String,
    pub ticks_per_second: f64,
    pub duration: f64,
    pub channels: Vec<NodeChannel>,
    pub mesh_channels: Vec<MeshChannel>,
}

/// Raw keyframe tracks targeting one node. Keys are stored exactly as the
/// provider sampled them; the exporter never interpolates.
#[derive(Debug, Clone, Default)]
pub struct NodeChannel {
    pub node: String,
    pub pre_state: Extrapolation,
    pub post_state: Extrapolation,
    pub position_keys: Vec<VectorKey>,
    pub rotation_keys: Vec<QuatKey>,
    pub scale_keys: Vec<VectorKey>,
}

/// Behavior outside the keyed time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Extrapolation {
    /// Take the value from the node's rest transform.
    #[default]
    Default = 0,
    /// Hold the nearest key without interpolation.
    Constant = 1,
    /// Extrapolate linearly from the nearest two keys.
    Linear = 2,
    /// Repeat the animation.
    Repeat = 3,
}

#[derive(Debug, Clone, Copy)]
pub struct VectorKey {
    pub time: f64,
    pub value: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct QuatKey {
    pub time: f64,
    pub value: Quat,
}

/// Keyframe track switching a node between meshes over time.
#[derive(Debug, Clone, Default)]
pub struct MeshChannel {
    pub name: String,
    pub keys: Vec<MeshKey>,
}

#[derive(Debug, Clone, Copy)]
pub struct MeshKey {
    pub time: f64,
    pub value: u32,
}
