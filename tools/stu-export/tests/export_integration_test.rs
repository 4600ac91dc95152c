//! Integration tests for stu-export
//!
//! Builds scenes in memory, exports them through both writer modes, and
//! re-reads the resulting containers chunk by chunk.

use std::io::Write;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec2, Vec3};
use tempfile::tempdir;

use stu_common::formats::container::{
    ChunkAppender, ContainerBuilder, StuChunkHeader, StuFileHeader,
};
use stu_common::scene::{Mesh, Node, Scene, Skin, SkinCluster};
use stu_export::flatten::{export_scene, ExportOptions};

/// Walk a container byte-for-byte into (name, payload) pairs, validating
/// the file header and the recorded payload size on the way.
fn read_chunks(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    let header = StuFileHeader::from_bytes(data).expect("bad file header");
    assert_eq!(
        header.payload_size as usize,
        data.len() - StuFileHeader::SIZE,
        "payload size field must match the file"
    );

    let mut chunks = Vec::new();
    let mut offset = StuFileHeader::SIZE;
    while offset < data.len() {
        let chunk = StuChunkHeader::from_bytes(&data[offset..]).expect("bad chunk header");
        offset += StuChunkHeader::SIZE;
        let payload = data[offset..offset + chunk.data_size as usize].to_vec();
        offset += chunk.data_size as usize;
        chunks.push((chunk.name_str().to_string(), payload));
    }
    chunks
}

/// Sequential reader over a chunk payload.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn u32(&mut self) -> u32 {
        let value =
            u32::from_le_bytes(self.data[self.offset..self.offset + 4].try_into().unwrap());
        self.offset += 4;
        value
    }

    fn f32(&mut self) -> f32 {
        let value =
            f32::from_le_bytes(self.data[self.offset..self.offset + 4].try_into().unwrap());
        self.offset += 4;
        value
    }

    fn text(&mut self) -> String {
        let end = self.data[self.offset..]
            .iter()
            .position(|&b| b == 0)
            .expect("unterminated string");
        let text = String::from_utf8_lossy(&self.data[self.offset..self.offset + end]).to_string();
        self.offset += end + 1;
        text
    }

    fn skip(&mut self, bytes: usize) {
        self.offset += bytes;
    }
}

fn export_to_file(scene: &Scene, path: &Path) {
    let mut appender = ChunkAppender::new(path);
    export_scene(scene, &mut appender, &ExportOptions::default()).expect("export failed");
}

/// Scenario: single node, single position-only mesh. Exactly one
/// Model/Vx/VxBB triple, no animation, texture, or bone chunks.
#[test]
fn test_position_only_scene() {
    let scene = Scene {
        root: Node {
            name: "root".into(),
            meshes: vec![Mesh {
                name: "blob".into(),
                positions: vec![
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(2.0, 1.0, -1.0),
                    Vec3::new(-1.0, 3.0, 0.0),
                ],
                indices: vec![0, 1, 2],
                ..Mesh::default()
            }],
            ..Node::default()
        },
        ..Scene::default()
    };

    let dir = tempdir().unwrap();
    let path = dir.path().join("scene.stu");
    export_to_file(&scene, &path);

    let chunks = read_chunks(&std::fs::read(&path).unwrap());
    let names: Vec<&str> = chunks.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["Vx:0", "Vx:0BB", "Model:0"]);

    // Simple layout: three 12-byte records
    assert_eq!(chunks[0].1.len(), 36);

    // bounding box min/max per the accumulator contract
    let mut bbox = Cursor::new(&chunks[1].1);
    assert_eq!(
        [bbox.f32(), bbox.f32(), bbox.f32()],
        [-1.0, 0.0, -1.0]
    );
    assert_eq!([bbox.f32(), bbox.f32(), bbox.f32()], [2.0, 3.0, 0.0]);

    // model record: layout tag Simple, triangle primitive, default material
    let mut model = Cursor::new(&chunks[2].1);
    assert_eq!(model.u32(), 0); // children
    assert_eq!(model.text(), "scene.(root-0)");
    assert_eq!(model.text(), "root");
    model.skip(64); // transform
    assert_eq!(model.u32(), 1); // mesh count
    assert_eq!(model.text(), "scene.(root-0).mesh(blob-0).id(0)");
    assert_eq!(model.text(), "blob");
    assert_eq!(model.u32(), 0); // has-animation flag
    assert_eq!(model.u32(), 3); // vertex count
    assert_eq!(model.u32(), 0); // Simple layout tag
    assert_eq!(model.u32(), 3); // index count
    model.skip(3 * 2);
    assert_eq!(model.u32(), 0x4); // triangle primitive
    assert_eq!(model.u32(), 0); // two-sided
    assert_eq!(model.f32(), 0.25); // ambient default
}

/// Scenario: two nodes where only the child carries a mesh with
/// normals+UVs. Two Model chunks, one Vx pair, Normals layout.
#[test]
fn test_two_node_scene_with_normals_mesh() {
    let scene = Scene {
        root: Node {
            name: "a".into(),
            children: vec![Node {
                name: "b".into(),
                meshes: vec![Mesh {
                    name: "quad".into(),
                    positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                    normals: Some(vec![Vec3::Z; 3]),
                    uvs: Some(vec![Vec2::ZERO, Vec2::X, Vec2::Y]),
                    indices: vec![0, 1, 2],
                    ..Mesh::default()
                }],
                ..Node::default()
            }],
            ..Node::default()
        },
        ..Scene::default()
    };

    let dir = tempdir().unwrap();
    let path = dir.path().join("scene.stu");
    export_to_file(&scene, &path);

    let chunks = read_chunks(&std::fs::read(&path).unwrap());
    let names: Vec<&str> = chunks.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["Model:0", "Vx:0", "Vx:0BB", "Model:1"]);

    // parent encodes zero meshes
    let mut parent = Cursor::new(&chunks[0].1);
    assert_eq!(parent.u32(), 1); // one child
    parent.text();
    parent.text();
    parent.skip(64);
    assert_eq!(parent.u32(), 0);
    assert_eq!(parent.offset, chunks[0].1.len());

    // child selected the Normals layout: 44-byte records
    assert_eq!(chunks[1].1.len(), 3 * 44);
    let mut child = Cursor::new(&chunks[3].1);
    child.u32();
    child.text();
    child.text();
    child.skip(64);
    assert_eq!(child.u32(), 1);
    child.text();
    child.text();
    child.u32(); // has-animation
    assert_eq!(child.u32(), 3); // vertices
    assert_eq!(child.u32(), 3); // Normals layout tag
}

/// Scenario: skinned mesh where vertex 5 is pulled by two bones. The
/// encoded record ranks the heavier bone first; untouched vertices fall
/// back to rigid binding.
#[test]
fn test_skinned_vertex_weight_ranking() {
    let positions = vec![Vec3::ZERO; 8];
    let scene = Scene {
        root: Node {
            name: "figure".into(),
            meshes: vec![Mesh {
                name: "body".into(),
                positions,
                indices: vec![0, 1, 2],
                skin: Some(Skin {
                    clusters: vec![
                        SkinCluster {
                            bone: "knee".into(),
                            inverse_bind: Mat4::IDENTITY,
                            weights: vec![(5, 0.1)],
                        },
                        SkinCluster {
                            bone: "hip".into(),
                            inverse_bind: Mat4::IDENTITY,
                            weights: vec![(5, 0.6)],
                        },
                    ],
                }),
                ..Mesh::default()
            }],
            ..Node::default()
        },
        ..Scene::default()
    };

    let dir = tempdir().unwrap();
    let path = dir.path().join("scene.stu");
    export_to_file(&scene, &path);

    let chunks = read_chunks(&std::fs::read(&path).unwrap());
    let names: Vec<&str> = chunks.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["Vx:0", "Vx:0BB", "Model:0", "Bones"]);

    let vertices = &chunks[0].1;
    assert_eq!(vertices.len(), 8 * 60);

    // vertex 5: weights descending, packed ids carry hip (index 1) then
    // knee (index 0)
    let record = &vertices[5 * 60..6 * 60];
    let mut cursor = Cursor::new(record);
    cursor.skip(12); // position
    cursor.skip(12); // normal.xyz
    let packed_b = cursor.f32(); // normal.w = ids 2/3
    cursor.skip(12); // texcoord.xyz
    let packed_a = cursor.f32(); // texcoord.w = ids 0/1
    let weights = [cursor.f32(), cursor.f32(), cursor.f32(), cursor.f32()];

    assert_eq!(weights, [0.6, 0.1, 0.0, 0.0]);
    assert!((packed_a - (1.0 + 0.0 / 256.0)).abs() < 1e-6);
    assert_eq!(packed_b, 0.0);

    // vertex 0 received no contributions: rigid binding to bone 0
    let mut rigid = Cursor::new(&vertices[0..60]);
    rigid.skip(44);
    assert_eq!(
        [rigid.f32(), rigid.f32(), rigid.f32(), rigid.f32()],
        [1.0, 0.0, 0.0, 0.0]
    );

    // the Bones chunk maps both names
    let mut bones = Cursor::new(&chunks[3].1);
    assert_eq!(bones.u32(), 2);
}

/// Both writer modes must produce bit-identical containers.
#[test]
fn test_bulk_and_append_modes_agree() {
    let scene = Scene {
        root: Node {
            name: "root".into(),
            meshes: vec![Mesh {
                name: "tri".into(),
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                uvs: Some(vec![Vec2::ZERO, Vec2::X, Vec2::Y]),
                indices: vec![0, 1, 2],
                ..Mesh::default()
            }],
            ..Node::default()
        },
        ..Scene::default()
    };

    let dir = tempdir().unwrap();
    let append_path = dir.path().join("append.stu");
    let bulk_path = dir.path().join("bulk.stu");

    export_to_file(&scene, &append_path);

    let mut builder = ContainerBuilder::new();
    export_scene(&scene, &mut builder, &ExportOptions::default()).unwrap();
    builder.flush(&bulk_path).unwrap();

    assert_eq!(
        std::fs::read(&append_path).unwrap(),
        std::fs::read(&bulk_path).unwrap()
    );
}

/// Re-running the same export must be bit-for-bit reproducible.
#[test]
fn test_export_is_deterministic() {
    let scene = Scene {
        root: Node {
            name: "root".into(),
            meshes: vec![Mesh {
                name: "tri".into(),
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                indices: vec![0, 1, 2],
                ..Mesh::default()
            }],
            ..Node::default()
        },
        ..Scene::default()
    };

    let dir = tempdir().unwrap();
    let first = dir.path().join("first.stu");
    let second = dir.path().join("second.stu");
    export_to_file(&scene, &first);
    export_to_file(&scene, &second);

    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

fn generate_triangle_obj(path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "v 0.0 0.0 0.0")?;
    writeln!(file, "v 1.0 0.0 0.0")?;
    writeln!(file, "v 0.0 1.0 0.0")?;
    writeln!(file, "f 1 2 3")?;
    Ok(())
}

fn run_stu_export(args: &[&str]) {
    let status = std::process::Command::new(env!("CARGO_BIN_EXE_stu-export"))
        .args(args)
        .status()
        .expect("Failed to run stu-export");
    assert!(status.success(), "stu-export failed");
}

#[test]
fn test_cli_converts_obj() {
    let dir = tempdir().unwrap();
    let obj_path = dir.path().join("triangle.obj");
    generate_triangle_obj(&obj_path).expect("Failed to generate OBJ");

    run_stu_export(&[obj_path.to_str().unwrap()]);

    let output: PathBuf = dir.path().join("triangle.obj.stu");
    assert!(output.exists(), "default output path gets .stu appended");

    let data = std::fs::read(&output).unwrap();
    assert_eq!(&data[0..3], b"STU");
    assert_eq!(&data[3..6], b"0.1");

    let chunks = read_chunks(&data);
    let names: Vec<&str> = chunks.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["Vx:0", "Vx:0BB", "Model:0"]);
}

#[test]
fn test_cli_bulk_mode_matches_append_mode() {
    let dir = tempdir().unwrap();
    let obj_path = dir.path().join("triangle.obj");
    generate_triangle_obj(&obj_path).expect("Failed to generate OBJ");

    let append_out = dir.path().join("append.stu");
    let bulk_out = dir.path().join("bulk.stu");
    run_stu_export(&[
        obj_path.to_str().unwrap(),
        "-o",
        append_out.to_str().unwrap(),
    ]);
    run_stu_export(&[
        obj_path.to_str().unwrap(),
        "--bulk",
        "-o",
        bulk_out.to_str().unwrap(),
    ]);

    assert_eq!(
        std::fs::read(&append_out).unwrap(),
        std::fs::read(&bulk_out).unwrap()
    );
}
