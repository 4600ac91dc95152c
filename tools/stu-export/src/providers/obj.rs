//! Minimal OBJ scene provider
//!
//! Triangle meshes only: positions, UVs, normals, fan triangulation.
//! Produces a single-node scene; materials fall back to the encoder's
//! constants.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::{Vec2, Vec3};

use stu_common::scene::{Mesh, Node, Scene};

pub fn import_obj(input: &Path) -> Result<Scene> {
    let file = File::open(input).with_context(|| format!("Failed to open OBJ: {:?}", input))?;
    let reader = BufReader::new(file);

    let mut positions: Vec<Vec3> = Vec::new();
    let mut tex_coords: Vec<Vec2> = Vec::new();
    let mut normals_raw: Vec<Vec3> = Vec::new();

    // final vertex data, expanded from face references
    let mut final_positions: Vec<Vec3> = Vec::new();
    let mut final_uvs: Vec<Vec2> = Vec::new();
    let mut final_normals: Vec<Vec3> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["v", x, y, z, ..] => {
                positions.push(Vec3::new(
                    x.parse().unwrap_or(0.0),
                    y.parse().unwrap_or(0.0),
                    z.parse().unwrap_or(0.0),
                ));
            }
            ["vt", u, v, ..] => {
                tex_coords.push(Vec2::new(u.parse().unwrap_or(0.0), v.parse().unwrap_or(0.0)));
            }
            ["vn", x, y, z, ..] => {
                normals_raw.push(Vec3::new(
                    x.parse().unwrap_or(0.0),
                    y.parse().unwrap_or(0.0),
                    z.parse().unwrap_or(0.0),
                ));
            }
            ["f", rest @ ..] if rest.len() >= 3 => {
                let face_verts: Vec<(usize, Option<usize>, Option<usize>)> =
                    rest.iter().filter_map(|v| parse_obj_vertex(v)).collect();
                if face_verts.len() < 3 {
                    continue;
                }

                // fan triangulation for convex polygons
                for i in 1..face_verts.len() - 1 {
                    for &corner in &[0, i, i + 1] {
                        let (vi, vti, vni) = face_verts[corner];

                        indices.push(final_positions.len() as u32);
                        final_positions.push(positions.get(vi).copied().unwrap_or(Vec3::ZERO));
                        if let Some(ti) = vti {
                            final_uvs.push(tex_coords.get(ti).copied().unwrap_or(Vec2::ZERO));
                        }
                        if let Some(ni) = vni {
                            final_normals.push(normals_raw.get(ni).copied().unwrap_or(Vec3::Y));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if final_positions.is_empty() {
        bail!("No vertices found in OBJ file");
    }

    let has_uvs = final_uvs.len() == final_positions.len();
    let has_normals = final_normals.len() == final_positions.len();

    let name = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string();

    let mesh = Mesh {
        name: name.clone(),
        positions: final_positions,
        uvs: has_uvs.then_some(final_uvs),
        normals: has_normals.then_some(final_normals),
        indices,
        ..Mesh::default()
    };

    Ok(Scene {
        root: Node {
            name,
            meshes: vec![mesh],
            ..Node::default()
        },
        ..Scene::default()
    })
}

/// Parse an OBJ vertex reference: "v", "v/vt", "v/vt/vn", or "v//vn".
/// OBJ indices are 1-based.
fn parse_obj_vertex(s: &str) -> Option<(usize, Option<usize>, Option<usize>)> {
    let parts: Vec<&str> = s.split('/').collect();

    let vi = parts.first()?.parse::<usize>().ok()?.checked_sub(1)?;

    let vti = parts
        .get(1)
        .filter(|part| !part.is_empty())
        .and_then(|part| part.parse::<usize>().ok())
        .and_then(|index| index.checked_sub(1));

    let vni = parts
        .get(2)
        .filter(|part| !part.is_empty())
        .and_then(|part| part.parse::<usize>().ok())
        .and_then(|index| index.checked_sub(1));

    Some((vi, vti, vni))
}
