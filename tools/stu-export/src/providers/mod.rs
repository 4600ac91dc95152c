//! Scene providers
//!
//! Import glue that adapts third-party parser output into the normalized
//! scene model. Providers own all format knowledge; once a scene lands in
//! the model, the export core never calls back into them.

pub mod gltf;
pub mod obj;

use std::path::Path;

use anyhow::{bail, Result};
use stu_common::scene::Scene;

/// Routes `input` to a provider by extension and returns the parsed scene
/// together with the importer tag baked into display names.
///
/// `force_minimal` bypasses routing and insists on the minimal OBJ
/// importer.
pub fn load_scene(input: &Path, force_minimal: bool) -> Result<(Scene, &'static str)> {
    let extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if force_minimal {
        if extension != "obj" {
            bail!(
                "the minimal importer only reads .obj files (got {:?})",
                input
            );
        }
        return Ok((obj::import_obj(input)?, "obj"));
    }

    match extension.as_str() {
        "gltf" | "glb" => Ok((gltf::import_gltf(input)?, "gltf")),
        "obj" => Ok((obj::import_obj(input)?, "obj")),
        _ => bail!(
            "unsupported input format: {:?} (use .gltf, .glb, or .obj)",
            input
        ),
    }
}
