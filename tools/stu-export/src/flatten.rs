//! Scene flattener
//!
//! Depth-first walk of the scene model producing the container's chunk
//! stream. Chunk order is part of the on-disk contract: per node, the
//! node's `Vx:`/`Vx:NBB` pairs are written while its record is assembled,
//! then the node's `Model:` chunk, then its children (pre-order). A scene's
//! `Animations` and `Textures` chunks precede the tree; the `Bones` chunk
//! follows it.

use stu_common::bounds::BoundingBox;
use stu_common::formats::container::{put_mat4, put_u32, write_text, ChunkSink, ContainerError};
use stu_common::formats::vertex::{encode_vertices, select_layout, VertexInfluences};
use stu_common::scene::{EmbeddedTexture, Mesh, Node, PrimitiveKind, Scene};

use crate::animation::encode_animations;
use crate::bones::{BoneAccumulator, BoneTable};
use crate::material::{embedded_texture_name, encode_material, encode_texture_slot, TextureSlot};

const TEXTURE_STORAGE_RAW: u32 = 0;
const TEXTURE_STORAGE_COMPRESSED: u32 = 1;

/// Caller-facing knobs for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Flip every UV's Y coordinate (`1 - v`) across the whole export.
    pub flip_uv: bool,
    /// Prefix baked into synthesized display names, identifying the
    /// importer that produced the scene.
    pub importer_tag: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            flip_uv: true,
            importer_tag: "scene".into(),
        }
    }
}

/// Walks `scene` and writes its chunk stream through `sink`.
///
/// All working state (name counters, chunk counters, the bone table) lives
/// in a session created here and dropped on return, so concurrent exports
/// of independent scenes never share anything.
pub fn export_scene<S: ChunkSink>(
    scene: &Scene,
    sink: &mut S,
    options: &ExportOptions,
) -> Result<(), ContainerError> {
    let mut session = ExportSession {
        sink,
        options,
        bones: BoneTable::new(),
        node_names: 0,
        mesh_names: 0,
        model_chunks: 0,
        vertex_chunks: 0,
        animated: scene.has_animations(),
        skinned: scene.is_skinned(),
    };

    if session.animated {
        let data = encode_animations(&scene.animations);
        session.sink.write_chunk("Animations", &data)?;
    }
    if !scene.embedded_textures.is_empty() {
        let data = encode_embedded_textures(&scene.embedded_textures);
        session.sink.write_chunk("Textures", &data)?;
    }

    session.export_node(&scene.root)?;

    if !session.bones.is_empty() {
        let data = session.bones.encode_chunk();
        session.sink.write_chunk("Bones", &data)?;
    }
    Ok(())
}

struct ExportSession<'a, S: ChunkSink> {
    sink: &'a mut S,
    options: &'a ExportOptions,
    bones: BoneTable,
    node_names: u32,
    mesh_names: u32,
    model_chunks: u32,
    vertex_chunks: u32,
    animated: bool,
    skinned: bool,
}

impl<S: ChunkSink> ExportSession<'_, S> {
    fn node_display_name(&mut self, given: &str) -> String {
        let id = self.node_names;
        self.node_names += 1;
        let given = if given.is_empty() { "UNKNOWN" } else { given };
        format!("{}.({given}-{id})", self.options.importer_tag)
    }

    fn mesh_display_name(&mut self, node_display: &str, given: &str, slot: usize) -> String {
        let id = self.mesh_names;
        self.mesh_names += 1;
        let given = if given.is_empty() { "UNKNOWN" } else { given };
        format!("{node_display}.mesh({given}-{id}).id({slot})")
    }

    fn export_node(&mut self, node: &Node) -> Result<(), ContainerError> {
        let display_name = self.node_display_name(&node.name);
        tracing::debug!(node = %display_name, meshes = node.meshes.len(), "flattening node");

        let mut data = Vec::new();
        put_u32(&mut data, node.children.len() as u32);
        write_text(&mut data, &display_name);
        write_text(&mut data, &node.name);
        put_mat4(&mut data, &node.transform);
        put_u32(&mut data, node.meshes.len() as u32);

        for (slot, mesh) in node.meshes.iter().enumerate() {
            self.export_mesh(&mut data, &display_name, slot, mesh)?;
        }

        let chunk_name = format!("Model:{}", self.model_chunks);
        self.model_chunks += 1;
        self.sink.write_chunk(&chunk_name, &data)?;

        for child in &node.children {
            self.export_node(child)?;
        }
        Ok(())
    }

    fn export_mesh(
        &mut self,
        data: &mut Vec<u8>,
        node_display: &str,
        slot: usize,
        mesh: &Mesh,
    ) -> Result<(), ContainerError> {
        let display_name = self.mesh_display_name(node_display, &mesh.name, slot);
        write_text(data, &display_name);
        write_text(data, &mesh.name);

        // interning happens here so bone indices follow the walk order even
        // when a mesh's vertex chunk ends up skipped
        let influences = self.resolve_skin(mesh);

        put_u32(data, u32::from(self.animated));
        put_u32(data, mesh.vertex_count() as u32);

        if mesh.vertex_count() > 0 {
            let layout = select_layout(mesh, self.skinned || self.animated);
            put_u32(data, layout.tag());

            let chunk_name = format!("Vx:{}", self.vertex_chunks);
            self.vertex_chunks += 1;

            let mut bounds = BoundingBox::new();
            match encode_vertices(
                mesh,
                layout,
                self.options.flip_uv,
                influences.as_deref(),
                &mut bounds,
            ) {
                Ok(vertices) => {
                    self.sink.write_chunk(&chunk_name, &vertices)?;
                    self.sink
                        .write_chunk(&format!("{chunk_name}BB"), &bounds.to_bytes())?;
                }
                Err(err) => {
                    tracing::error!(mesh = %display_name, %err, "skipping vertex data for mesh");
                }
            }
        }

        // point primitives carry no index buffer
        let mut indices: Vec<u16> = Vec::new();
        if mesh.primitive != PrimitiveKind::Point {
            indices.reserve(mesh.indices.len());
            for &index in &mesh.indices {
                if index > u32::from(u16::MAX) {
                    tracing::error!(
                        mesh = %display_name,
                        index,
                        "index exceeds the 16-bit limit; the mesh should have been pre-split"
                    );
                }
                indices.push(index as u16);
            }
        }
        put_u32(data, indices.len() as u32);
        for index in &indices {
            data.extend_from_slice(&index.to_le_bytes());
        }

        match mesh.primitive {
            PrimitiveKind::Point | PrimitiveKind::Line | PrimitiveKind::Triangle => {
                put_u32(data, mesh.primitive as u32);
            }
            PrimitiveKind::Polygon => {
                tracing::error!(
                    mesh = %display_name,
                    "polygon primitives are not supported; skipping primitive and material fields"
                );
                return Ok(());
            }
        }

        put_u32(data, u32::from(mesh.material.two_sided));
        encode_material(data, &mesh.material);
        encode_texture_slot(data, &mesh.material, TextureSlot::Diffuse);
        encode_texture_slot(data, &mesh.material, TextureSlot::Height);
        Ok(())
    }

    /// Feeds the mesh's skin clusters through the bone table and weight
    /// accumulators, returning the resolved top-4 influences per vertex.
    fn resolve_skin(&mut self, mesh: &Mesh) -> Option<Vec<VertexInfluences>> {
        let skin = mesh.skin.as_ref()?;
        let mut accumulators = vec![BoneAccumulator::default(); mesh.vertex_count()];
        for cluster in &skin.clusters {
            let bone = self.bones.intern(&cluster.bone, cluster.inverse_bind);
            for &(vertex, weight) in &cluster.weights {
                match accumulators.get_mut(vertex as usize) {
                    Some(accumulator) => accumulator.add(bone, weight),
                    None => tracing::warn!(
                        bone = %cluster.bone,
                        vertex,
                        "skin weight references a vertex outside the mesh"
                    ),
                }
            }
        }
        Some(accumulators.iter().map(BoneAccumulator::resolve).collect())
    }
}

fn encode_embedded_textures(textures: &[EmbeddedTexture]) -> Vec<u8> {
    let mut data = Vec::new();
    put_u32(&mut data, textures.len() as u32);
    for (index, texture) in textures.iter().enumerate() {
        match texture {
            EmbeddedTexture::Compressed { bytes } => {
                put_u32(&mut data, TEXTURE_STORAGE_COMPRESSED);
                write_text(&mut data, &embedded_texture_name(index));
                put_u32(&mut data, bytes.len() as u32);
                data.extend_from_slice(bytes);
            }
            EmbeddedTexture::Rgba {
                width,
                height,
                texels,
            } => {
                put_u32(&mut data, TEXTURE_STORAGE_RAW);
                write_text(&mut data, &embedded_texture_name(index));
                put_u32(&mut data, *width);
                put_u32(&mut data, *height);
                data.extend_from_slice(texels);
            }
        }
    }
    data
}
