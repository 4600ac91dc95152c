//! glTF/GLB scene provider
//!
//! Adapts `gltf` crate output into the scene model: node tree, mesh
//! primitives, PBR base color as the diffuse material, skins as per-bone
//! clusters, and animation samplers as raw key lists.

use std::path::Path;

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec2, Vec3};
use hashbrown::HashMap;

use stu_common::scene::{
    AnimationStack, EmbeddedTexture, Material, Mesh, Node, NodeChannel, PrimitiveKind, QuatKey,
    Scene, Skin, SkinCluster, TextureRef, VectorKey,
};

pub fn import_gltf(input: &Path) -> Result<Scene> {
    let (document, buffers, images) =
        gltf::import(input).with_context(|| format!("Failed to load glTF: {:?}", input))?;

    let (embedded_textures, embedded_by_image) = collect_embedded_textures(&document, &images);

    let source_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .context("glTF file contains no scene")?;

    let mut root = Node {
        name: source_scene.name().unwrap_or_default().to_string(),
        transform: Mat4::IDENTITY,
        ..Node::default()
    };
    for child in source_scene.nodes() {
        root.children
            .push(build_node(&child, &buffers, &embedded_by_image));
    }

    let animations = document
        .animations()
        .map(|animation| build_animation(&animation, &buffers))
        .collect();

    Ok(Scene {
        root,
        animations,
        embedded_textures,
    })
}

/// Images backed by buffer views become embedded textures; the map links
/// glTF image indices to embedded-texture indices for material references.
fn collect_embedded_textures(
    document: &gltf::Document,
    images: &[gltf::image::Data],
) -> (Vec<EmbeddedTexture>, HashMap<usize, usize>) {
    use gltf::image::Format;

    let mut textures = Vec::new();
    let mut by_image = HashMap::new();

    for image in document.images() {
        if !matches!(image.source(), gltf::image::Source::View { .. }) {
            continue;
        }
        let data = &images[image.index()];
        let texels = match data.format {
            Format::R8G8B8A8 => data.pixels.clone(),
            Format::R8G8B8 => {
                // expand to RGBA with opaque alpha
                let mut texels = Vec::with_capacity(data.pixels.len() / 3 * 4);
                for rgb in data.pixels.chunks_exact(3) {
                    texels.extend_from_slice(rgb);
                    texels.push(0xFF);
                }
                texels
            }
            other => {
                tracing::warn!(
                    image = image.index(),
                    format = ?other,
                    "unsupported embedded texture format, dropping texture"
                );
                continue;
            }
        };
        by_image.insert(image.index(), textures.len());
        textures.push(EmbeddedTexture::Rgba {
            width: data.width,
            height: data.height,
            texels,
        });
    }
    (textures, by_image)
}

fn build_node(
    source: &gltf::Node,
    buffers: &[gltf::buffer::Data],
    embedded_by_image: &HashMap<usize, usize>,
) -> Node {
    let mut node = Node {
        name: source.name().unwrap_or_default().to_string(),
        transform: Mat4::from_cols_array_2d(&source.transform().matrix()),
        ..Node::default()
    };

    if let Some(mesh) = source.mesh() {
        let skin = source.skin();
        for primitive in mesh.primitives() {
            node.meshes.push(build_mesh(
                mesh.name().unwrap_or_default(),
                &primitive,
                skin.as_ref(),
                buffers,
                embedded_by_image,
            ));
        }
    }

    for child in source.children() {
        node.children
            .push(build_node(&child, buffers, embedded_by_image));
    }
    node
}

fn build_mesh(
    name: &str,
    primitive: &gltf::Primitive,
    skin: Option<&gltf::Skin>,
    buffers: &[gltf::buffer::Data],
    embedded_by_image: &HashMap<usize, usize>,
) -> Mesh {
    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .map(|iter| iter.map(Vec3::from).collect())
        .unwrap_or_default();

    let normals: Option<Vec<Vec3>> = reader
        .read_normals()
        .map(|iter| iter.map(Vec3::from).collect());

    let uvs: Option<Vec<Vec2>> = reader
        .read_tex_coords(0)
        .map(|iter| iter.into_f32().map(Vec2::from).collect());

    let colors: Option<Vec<Vec3>> = reader
        .read_colors(0)
        .map(|iter| iter.into_rgb_f32().map(Vec3::from).collect());

    // glTF tangents are vec4 with the handedness sign in w; split into the
    // tangent/bitangent pair the scene model carries
    let (tangents, bitangents) = match (reader.read_tangents(), &normals) {
        (Some(iter), Some(normals)) => {
            let mut tangents = Vec::new();
            let mut bitangents = Vec::new();
            for (index, raw) in iter.enumerate() {
                let tangent = Vec3::new(raw[0], raw[1], raw[2]);
                let normal = normals.get(index).copied().unwrap_or(Vec3::Z);
                tangents.push(tangent);
                bitangents.push(normal.cross(tangent) * raw[3]);
            }
            (Some(tangents), Some(bitangents))
        }
        _ => (None, None),
    };

    let indices: Vec<u32> = reader
        .read_indices()
        .map(|iter| iter.into_u32().collect())
        .unwrap_or_default();

    let primitive_kind = match primitive.mode() {
        gltf::mesh::Mode::Points => PrimitiveKind::Point,
        gltf::mesh::Mode::Lines => PrimitiveKind::Line,
        gltf::mesh::Mode::Triangles => PrimitiveKind::Triangle,
        other => {
            tracing::warn!(mode = ?other, "unsupported primitive mode, treating as triangles");
            PrimitiveKind::Triangle
        }
    };

    let joints: Option<Vec<[u16; 4]>> = reader
        .read_joints(0)
        .map(|iter| iter.into_u16().collect());
    let joint_weights: Option<Vec<[f32; 4]>> = reader
        .read_weights(0)
        .map(|iter| iter.into_f32().collect());
    let skin = match (skin, joints, joint_weights) {
        (Some(skin), Some(joints), Some(weights)) => {
            build_skin(skin, &joints, &weights, buffers, positions.len())
        }
        _ => None,
    };

    Mesh {
        name: name.to_string(),
        positions,
        normals,
        uvs,
        colors,
        tangents,
        bitangents,
        indices,
        primitive: primitive_kind,
        material: build_material(&primitive.material(), embedded_by_image),
        skin,
    }
}

fn build_skin(
    skin: &gltf::Skin,
    joints: &[[u16; 4]],
    weights: &[[f32; 4]],
    buffers: &[gltf::buffer::Data],
    vertex_count: usize,
) -> Option<Skin> {
    if joints.len() != vertex_count || weights.len() != vertex_count {
        tracing::warn!(
            joints = joints.len(),
            weights = weights.len(),
            vertex_count,
            "partial skinning data, ignoring skin"
        );
        return None;
    }

    let joint_nodes: Vec<gltf::Node> = skin.joints().collect();
    let inverse_binds: Vec<Mat4> = skin
        .reader(|buffer| Some(&buffers[buffer.index()]))
        .read_inverse_bind_matrices()
        .map(|iter| iter.map(|m| Mat4::from_cols_array_2d(&m)).collect())
        .unwrap_or_else(|| vec![Mat4::IDENTITY; joint_nodes.len()]);

    let mut clusters: Vec<SkinCluster> = joint_nodes
        .iter()
        .enumerate()
        .map(|(index, joint)| SkinCluster {
            bone: joint
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("joint_{}", joint.index())),
            inverse_bind: inverse_binds.get(index).copied().unwrap_or(Mat4::IDENTITY),
            weights: Vec::new(),
        })
        .collect();

    for (vertex, (joint_set, weight_set)) in joints.iter().zip(weights).enumerate() {
        for (&joint, &weight) in joint_set.iter().zip(weight_set) {
            if weight > 0.0 {
                if let Some(cluster) = clusters.get_mut(joint as usize) {
                    cluster.weights.push((vertex as u32, weight));
                }
            }
        }
    }
    clusters.retain(|cluster| !cluster.weights.is_empty());

    Some(Skin { clusters })
}

fn build_material(
    material: &gltf::Material,
    embedded_by_image: &HashMap<usize, usize>,
) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let base_color = pbr.base_color_factor();

    let diffuse_texture = pbr
        .base_color_texture()
        .map(|info| texture_reference(&info.texture(), embedded_by_image))
        .unwrap_or_default();
    let height_texture = material
        .normal_texture()
        .map(|normal| texture_reference(&normal.texture(), embedded_by_image))
        .unwrap_or_default();

    Material {
        diffuse: Some(Vec3::new(base_color[0], base_color[1], base_color[2])),
        opacity: Some(base_color[3]),
        two_sided: material.double_sided(),
        diffuse_texture,
        height_texture,
        ..Material::default()
    }
}

fn texture_reference(
    texture: &gltf::Texture,
    embedded_by_image: &HashMap<usize, usize>,
) -> TextureRef {
    let image = texture.source();
    match image.source() {
        gltf::image::Source::Uri { uri, .. } => TextureRef::File(uri.to_string()),
        gltf::image::Source::View { .. } => embedded_by_image
            .get(&image.index())
            .map(|&index| TextureRef::Embedded(index))
            .unwrap_or_default(),
    }
}

fn build_animation(
    animation: &gltf::Animation,
    buffers: &[gltf::buffer::Data],
) -> AnimationStack {
    let mut channel_order: Vec<String> = Vec::new();
    let mut channels: HashMap<String, NodeChannel> = HashMap::new();
    let mut duration = 0.0f64;

    for channel in animation.channels() {
        let target = channel.target();
        let node_name = target
            .node()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", target.node().index()));

        let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let times: Vec<f64> = inputs.map(f64::from).collect();
        if let Some(&last) = times.last() {
            duration = duration.max(last);
        }

        let entry = channels.entry(node_name.clone()).or_insert_with(|| {
            channel_order.push(node_name.clone());
            NodeChannel {
                node: node_name,
                ..NodeChannel::default()
            }
        });

        match reader.read_outputs() {
            Some(gltf::animation::util::ReadOutputs::Translations(values)) => {
                entry.position_keys = times
                    .iter()
                    .zip(values)
                    .map(|(&time, value)| VectorKey {
                        time,
                        value: Vec3::from(value),
                    })
                    .collect();
            }
            Some(gltf::animation::util::ReadOutputs::Rotations(values)) => {
                entry.rotation_keys = times
                    .iter()
                    .zip(values.into_f32())
                    .map(|(&time, value)| QuatKey {
                        time,
                        value: Quat::from_xyzw(value[0], value[1], value[2], value[3]),
                    })
                    .collect();
            }
            Some(gltf::animation::util::ReadOutputs::Scales(values)) => {
                entry.scale_keys = times
                    .iter()
                    .zip(values)
                    .map(|(&time, value)| VectorKey {
                        time,
                        value: Vec3::from(value),
                    })
                    .collect();
            }
            _ => {} // morph target weights are not part of the container
        }
    }

    AnimationStack {
        name: animation.name().unwrap_or_default().to_string(),
        // glTF keys are in seconds
        ticks_per_second: 1.0,
        duration,
        channels: channel_order
            .into_iter()
            .filter_map(|name| channels.remove(&name))
            .collect(),
        mesh_channels: Vec::new(),
    }
}
