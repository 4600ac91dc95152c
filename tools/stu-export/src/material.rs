//! Material and texture descriptor encoding
//!
//! Encodes the material block of a `Model:` chunk and its two texture
//! descriptors (diffuse, height). Source materials routinely omit fields;
//! the fallback constants below are part of the output contract and must
//! not drift.

use glam::Vec3;

use stu_common::formats::container::{put_f32, put_u32, put_vec3, write_text};
use stu_common::scene::{Material, TextureRef};

pub const DEFAULT_AMBIENT: Vec3 = Vec3::splat(0.25);
pub const DEFAULT_DIFFUSE: Vec3 = Vec3::splat(0.5);
pub const DEFAULT_SPECULAR: Vec3 = Vec3::splat(1.0);
pub const DEFAULT_SHININESS: f32 = 16.0;
pub const DEFAULT_OPACITY: f32 = 1.0;

/// Alpha written with a `COLOR_DIFFUSE` descriptor when the material has no
/// opacity of its own.
const COLOR_DIFFUSE_FALLBACK_ALPHA: f32 = 0.05;

/// Texture descriptor tags. The wire values leave room for the slots the
/// loader defines but this pipeline never fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureTag {
    Diffuse = 0,
    ColorDiffuse = 1,
    Height = 8,
    Unknown = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    Diffuse,
    Height,
}

/// Ambient/diffuse/specular colors, shininess, opacity.
pub fn encode_material(data: &mut Vec<u8>, material: &Material) {
    put_vec3(data, material.ambient.unwrap_or(DEFAULT_AMBIENT));
    put_vec3(data, material.diffuse.unwrap_or(DEFAULT_DIFFUSE));
    put_vec3(data, material.specular.unwrap_or(DEFAULT_SPECULAR));
    put_f32(data, material.shininess.unwrap_or(DEFAULT_SHININESS));
    put_f32(data, material.opacity.unwrap_or(DEFAULT_OPACITY));
}

/// One texture descriptor: a file/embedded reference, a constant-color
/// fallback (diffuse slot only), or `Unknown` with no data following.
pub fn encode_texture_slot(data: &mut Vec<u8>, material: &Material, slot: TextureSlot) {
    let reference = match slot {
        TextureSlot::Diffuse => &material.diffuse_texture,
        TextureSlot::Height => &material.height_texture,
    };
    let tag = match slot {
        TextureSlot::Diffuse => TextureTag::Diffuse,
        TextureSlot::Height => TextureTag::Height,
    };

    match reference {
        TextureRef::File(path) => {
            put_u32(data, tag as u32);
            let file = strip_path_folders(path);
            // only the diffuse slot gets the extension workaround
            if slot == TextureSlot::Diffuse {
                write_text(data, &rewrite_unsupported_extension(file));
            } else {
                write_text(data, file);
            }
        }
        TextureRef::Embedded(index) => {
            put_u32(data, tag as u32);
            write_text(data, &embedded_texture_name(*index));
        }
        TextureRef::None => {
            if slot == TextureSlot::Diffuse && material.diffuse.is_some() {
                put_u32(data, TextureTag::ColorDiffuse as u32);
                put_f32(
                    data,
                    material.opacity.unwrap_or(COLOR_DIFFUSE_FALLBACK_ALPHA),
                );
            } else {
                put_u32(data, TextureTag::Unknown as u32);
            }
        }
    }
}

/// Strips folder components from a texture path. Source files often carry
/// absolute paths from the authoring machine, which are not portable; the
/// loader resolves bare file names against the container's own directory.
pub fn strip_path_folders(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Rewrites extensions the runtime cannot decode (`.tif`, `.psd`) to
/// `.png`; the pipeline expects a converted copy to ship alongside the
/// container.
pub fn rewrite_unsupported_extension(name: &str) -> String {
    let lower = name.to_lowercase();
    for unsupported in [".tif", ".psd"] {
        if let Some(pos) = lower.find(unsupported) {
            let mut rewritten = String::with_capacity(name.len());
            rewritten.push_str(&name[..pos]);
            rewritten.push_str(".png");
            rewritten.push_str(&name[pos + unsupported.len()..]);
            return rewritten;
        }
    }
    name.to_owned()
}

/// Display name synthesized for embedded textures, matching the names the
/// `Textures` chunk records.
pub(crate) fn embedded_texture_name(index: usize) -> String {
    format!("InternalTexture({index})")
}
