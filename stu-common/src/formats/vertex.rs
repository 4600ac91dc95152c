//! Vertex record layouts
//!
//! Every vertex in the container conforms to exactly one of five fixed-size
//! record shapes, chosen once per mesh from the attributes the mesh actually
//! carries. The loader switches its GPU vertex declaration on the layout
//! tag stored in the owning `Model:` chunk.
//!
//! # Record shapes
//! ```text
//! Simple   (12 bytes): position f32x3
//! Points   (24 bytes): position f32x3, color f32x3
//! Textured (20 bytes): position f32x3, texcoord f32x2
//! Normals  (44 bytes): position f32x3, normal f32x4, texcoord f32x4
//! Bones    (60 bytes): position f32x3, normal f32x4, texcoord f32x4, weights f32x4
//! ```
//!
//! The fourth components double as carriers: `texcoord.z` holds the packed
//! tangent, and in the Bones layout `texcoord.w`/`normal.w` hold the two
//! packed bone-index pairs.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use thiserror::Error;

use crate::bounds::BoundingBox;
use crate::scene::Mesh;

/// Layout tag as stored in the `Model:` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VertexLayout {
    Simple = 0,
    Points = 1,
    Textured = 2,
    Normals = 3,
    Bones = 4,
}

impl VertexLayout {
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Size of one encoded record.
    pub const fn stride(self) -> usize {
        match self {
            VertexLayout::Simple => 12,
            VertexLayout::Points => 24,
            VertexLayout::Textured => 20,
            VertexLayout::Normals => 44,
            VertexLayout::Bones => 60,
        }
    }
}

/// Picks the record shape for one mesh.
///
/// A skinned (or animated) scene forces the Bones layout on every mesh
/// regardless of which attributes are present; otherwise the most capable
/// layout whose prerequisite attributes exist wins.
pub fn select_layout(mesh: &Mesh, skinned_scene: bool) -> VertexLayout {
    if skinned_scene {
        return VertexLayout::Bones;
    }
    if mesh.has_normals() {
        if mesh.has_uvs() {
            VertexLayout::Normals
        } else if mesh.has_colors() {
            VertexLayout::Points
        } else {
            VertexLayout::Simple
        }
    } else if mesh.has_uvs() {
        VertexLayout::Textured
    } else if mesh.has_colors() {
        VertexLayout::Points
    } else {
        VertexLayout::Simple
    }
}

#[derive(Debug, Error)]
pub enum VertexError {
    #[error("vertex buffer allocation failed ({vertices} records of {stride} bytes)")]
    Allocation { vertices: usize, stride: usize },
}

/// The four highest-weight bone influences for one vertex, in descending
/// weight order, as read back from the weight accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VertexInfluences {
    pub ids: [u32; 4],
    pub weights: [f32; 4],
}

impl VertexInfluences {
    /// Full rigid binding to bone 0. Used both when a mesh has no skin at
    /// all and when a vertex received no contributions; the two cases are
    /// indistinguishable in the output.
    pub const fn rigid() -> Self {
        Self {
            ids: [0; 4],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Packs a tangent axis into one float. Each component is quantized to an
/// unsigned byte (truncating toward zero), the three bytes are combined in
/// a base-256 fraction, and the result takes the sign of the basis
/// handedness `dot(cross(normal, tangent), bitangent)`.
pub fn pack_tangent(normal: Vec3, tangent: Vec3, bitangent: Vec3) -> f32 {
    let tx = ((tangent.x * 0.5 + 0.5) * 255.0) as i32 as f32;
    let ty = ((tangent.y * 0.5 + 0.5) * 255.0) as i32 as f32;
    let tz = ((tangent.z * 0.5 + 0.5) * 255.0) as i32 as f32;
    let handedness = if normal.cross(tangent).dot(bitangent) < 0.0 {
        -1.0
    } else {
        1.0
    };
    (tx + ty / 256.0 + tz / 65536.0) * handedness
}

/// Packs a pair of bone indices as `id0 + id1/256`. Base-256 packing keeps
/// pairs unambiguous well past the 100-bone table cap.
pub fn pack_bone_ids(id0: u32, id1: u32) -> f32 {
    id0 as f32 + id1 as f32 / 256.0
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct SimpleVertex {
    position: [f32; 3],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct PointsVertex {
    position: [f32; 3],
    color: [f32; 3],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct TexturedVertex {
    position: [f32; 3],
    texcoord: [f32; 2],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct NormalsVertex {
    position: [f32; 3],
    normal: [f32; 4],
    texcoord: [f32; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct BonesVertex {
    position: [f32; 3],
    normal: [f32; 4],
    texcoord: [f32; 4],
    weights: [f32; 4],
}

/// Encode every vertex of `mesh` into fixed-size records of `layout`,
/// accumulating the mesh bounds on the way.
///
/// The output buffer is reserved up front; if the reservation fails the
/// mesh's vertex data cannot be exported and the caller is expected to skip
/// the vertex and bounding-box chunks for this mesh only.
pub fn encode_vertices(
    mesh: &Mesh,
    layout: VertexLayout,
    flip_uv: bool,
    influences: Option<&[VertexInfluences]>,
    bounds: &mut BoundingBox,
) -> Result<Vec<u8>, VertexError> {
    let mut data = Vec::new();
    data.try_reserve_exact(mesh.vertex_count() * layout.stride())
        .map_err(|_| VertexError::Allocation {
            vertices: mesh.vertex_count(),
            stride: layout.stride(),
        })?;

    match layout {
        VertexLayout::Simple => encode_simple(mesh, bounds, &mut data),
        VertexLayout::Points => encode_points(mesh, bounds, &mut data),
        VertexLayout::Textured => encode_textured(mesh, flip_uv, bounds, &mut data),
        VertexLayout::Normals => encode_normals(mesh, flip_uv, bounds, &mut data),
        VertexLayout::Bones => encode_bones(mesh, flip_uv, influences, bounds, &mut data),
    }
    Ok(data)
}

fn vertex_uv(mesh: &Mesh, index: usize, flip_uv: bool) -> Vec2 {
    let uv = mesh
        .uvs
        .as_ref()
        .and_then(|uvs| uvs.get(index))
        .copied()
        .unwrap_or(Vec2::ZERO);
    if flip_uv {
        Vec2::new(uv.x, 1.0 - uv.y)
    } else {
        uv
    }
}

fn vertex_normal(mesh: &Mesh, index: usize) -> Vec3 {
    mesh.normals
        .as_ref()
        .and_then(|normals| normals.get(index))
        .copied()
        .unwrap_or(Vec3::ZERO)
}

fn vertex_color(mesh: &Mesh, index: usize) -> Vec3 {
    mesh.colors
        .as_ref()
        .and_then(|colors| colors.get(index))
        .copied()
        .unwrap_or(Vec3::ONE)
}

fn packed_tangent_at(mesh: &Mesh, index: usize, normal: Vec3) -> f32 {
    if !mesh.has_tangent_basis() {
        return 0.0;
    }
    let tangent = mesh
        .tangents
        .as_ref()
        .and_then(|tangents| tangents.get(index))
        .copied()
        .unwrap_or(Vec3::ZERO);
    let bitangent = mesh
        .bitangents
        .as_ref()
        .and_then(|bitangents| bitangents.get(index))
        .copied()
        .unwrap_or(Vec3::ZERO);
    pack_tangent(normal, tangent, bitangent)
}

fn encode_simple(mesh: &Mesh, bounds: &mut BoundingBox, data: &mut Vec<u8>) {
    for &position in &mesh.positions {
        bounds.update(position);
        let vertex = SimpleVertex {
            position: position.to_array(),
        };
        data.extend_from_slice(bytemuck::bytes_of(&vertex));
    }
}

fn encode_points(mesh: &Mesh, bounds: &mut BoundingBox, data: &mut Vec<u8>) {
    for (index, &position) in mesh.positions.iter().enumerate() {
        bounds.update(position);
        let vertex = PointsVertex {
            position: position.to_array(),
            color: vertex_color(mesh, index).to_array(),
        };
        data.extend_from_slice(bytemuck::bytes_of(&vertex));
    }
}

fn encode_textured(mesh: &Mesh, flip_uv: bool, bounds: &mut BoundingBox, data: &mut Vec<u8>) {
    for (index, &position) in mesh.positions.iter().enumerate() {
        bounds.update(position);
        let uv = vertex_uv(mesh, index, flip_uv);
        let vertex = TexturedVertex {
            position: position.to_array(),
            texcoord: uv.to_array(),
        };
        data.extend_from_slice(bytemuck::bytes_of(&vertex));
    }
}

fn encode_normals(mesh: &Mesh, flip_uv: bool, bounds: &mut BoundingBox, data: &mut Vec<u8>) {
    for (index, &position) in mesh.positions.iter().enumerate() {
        bounds.update(position);
        let normal = vertex_normal(mesh, index);
        let (uv, tangent) = if mesh.has_uvs() {
            let uv = vertex_uv(mesh, index, flip_uv);
            (uv, packed_tangent_at(mesh, index, normal))
        } else {
            (Vec2::ZERO, 0.0)
        };
        let vertex = NormalsVertex {
            position: position.to_array(),
            normal: [normal.x, normal.y, normal.z, 0.0],
            texcoord: [uv.x, uv.y, tangent, 0.0],
        };
        data.extend_from_slice(bytemuck::bytes_of(&vertex));
    }
}

fn encode_bones(
    mesh: &Mesh,
    flip_uv: bool,
    influences: Option<&[VertexInfluences]>,
    bounds: &mut BoundingBox,
    data: &mut Vec<u8>,
) {
    for (index, &position) in mesh.positions.iter().enumerate() {
        bounds.update(position);
        let normal = vertex_normal(mesh, index);
        let (uv, tangent) = if mesh.has_uvs() {
            let uv = vertex_uv(mesh, index, flip_uv);
            (uv, packed_tangent_at(mesh, index, normal))
        } else {
            (Vec2::ZERO, 0.0)
        };
        let bindings = influences
            .and_then(|all| all.get(index))
            .copied()
            .unwrap_or(VertexInfluences::rigid());
        let vertex = BonesVertex {
            position: position.to_array(),
            normal: [
                normal.x,
                normal.y,
                normal.z,
                pack_bone_ids(bindings.ids[2], bindings.ids[3]),
            ],
            texcoord: [
                uv.x,
                uv.y,
                tangent,
                pack_bone_ids(bindings.ids[0], bindings.ids[1]),
            ],
            weights: bindings.weights,
        };
        data.extend_from_slice(bytemuck::bytes_of(&vertex));
    }
}
