//! Axis-aligned bounding box accumulation
//!
//! Tracks component-wise min/max while a mesh's vertices stream through the
//! encoder. Emitted as a 6-float chunk right after the vertex chunk it
//! belongs to.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Starts inverted (min = +inf, max = -inf) so the first update sets
    /// both bounds.
    pub fn new() -> Self {
        Self {
            min: Vec3::INFINITY,
            max: Vec3::NEG_INFINITY,
        }
    }

    pub fn update(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// False until at least one point has been accumulated.
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// min.xyz then max.xyz, little-endian f32.
    pub fn to_bytes(&self) -> [u8; 24] {
        let mut bytes = [0u8; 24];
        let components = [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ];
        for (slot, value) in components.iter().enumerate() {
            bytes[slot * 4..slot * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}
