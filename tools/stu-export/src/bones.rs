//! Bone table and per-vertex weight accumulation
//!
//! Both structures live for exactly one export run: the table assigns dense
//! indices to bone names in first-seen order during the scene walk, and one
//! accumulator per output vertex ranks the weight contributions arriving
//! from any number of skin clusters.

use glam::Mat4;
use hashbrown::HashMap;

use stu_common::formats::container::{hash_name, put_mat4, put_u32};
use stu_common::formats::vertex::VertexInfluences;

/// Bone cap the runtime reserves uniform space for. Indices past the cap
/// are reported but still emitted; reader behavior for them is undefined.
pub const MAX_BONES: u32 = 100;

/// Ranked influences kept per vertex. Only the top four are ever read back,
/// but a little headroom lets late high-weight contributions displace early
/// low ones.
const ACCUMULATOR_CAPACITY: usize = 8;

/// Run-scoped registry mapping bone-name hashes to dense indices.
/// Indices are stable within one export and meaningless across runs.
#[derive(Default)]
pub struct BoneTable {
    indices: HashMap<u32, u32>,
    offsets: Vec<Mat4>,
}

impl BoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the dense index for `name`, assigning the next sequential
    /// index (and recording the bind-pose inverse) on first sight.
    pub fn intern(&mut self, name: &str, inverse_bind: Mat4) -> u32 {
        let hash = hash_name(name);
        if let Some(&index) = self.indices.get(&hash) {
            return index;
        }
        let index = self.offsets.len() as u32;
        if index >= MAX_BONES {
            tracing::warn!(
                bone = name,
                count = index + 1,
                "scene exceeds the {MAX_BONES}-bone cap; packed indices past the cap are undefined for the reader"
            );
        }
        self.indices.insert(hash, index);
        self.offsets.push(inverse_bind);
        index
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Payload of the `Bones` chunk: the hash-to-index mapping (ordered by
    /// ascending hash) followed by one 128-byte record per bone, the
    /// bind-pose inverse plus an identity matrix the reader overwrites with
    /// the final transformation at runtime.
    pub fn encode_chunk(&self) -> Vec<u8> {
        let mut data = Vec::new();
        put_u32(&mut data, self.indices.len() as u32);

        let mut entries: Vec<(u32, u32)> = self
            .indices
            .iter()
            .map(|(&hash, &index)| (hash, index))
            .collect();
        entries.sort_unstable_by_key(|&(hash, _)| hash);
        for (hash, index) in entries {
            put_u32(&mut data, hash);
            put_u32(&mut data, index);
        }

        put_u32(&mut data, self.offsets.len() as u32);
        for offset in &self.offsets {
            put_mat4(&mut data, offset);
            put_mat4(&mut data, &Mat4::IDENTITY);
        }
        data
    }
}

/// Fixed-capacity ranked list of (bone index, weight) contributions for one
/// output vertex. Insertion keeps weights in descending order (ties keep
/// insertion order); once full, the lowest-ranked entry falls off the tail.
#[derive(Debug, Clone)]
pub struct BoneAccumulator {
    entries: [(u32, f32); ACCUMULATOR_CAPACITY],
    len: usize,
}

impl Default for BoneAccumulator {
    fn default() -> Self {
        Self {
            entries: [(0, 0.0); ACCUMULATOR_CAPACITY],
            len: 0,
        }
    }
}

impl BoneAccumulator {
    pub fn add(&mut self, bone: u32, weight: f32) {
        let pos = self.entries[..self.len]
            .iter()
            .position(|&(_, ranked)| weight > ranked)
            .unwrap_or(self.len);
        if pos >= ACCUMULATOR_CAPACITY {
            return;
        }
        let end = (self.len + 1).min(ACCUMULATOR_CAPACITY);
        self.entries.copy_within(pos..end - 1, pos + 1);
        self.entries[pos] = (bone, weight);
        self.len = end;
    }

    /// Reads back the top four influences. A vertex nothing contributed to
    /// resolves to full rigid binding on bone 0, never "no binding".
    pub fn resolve(&self) -> VertexInfluences {
        if self.len == 0 {
            return VertexInfluences::rigid();
        }
        let mut influences = VertexInfluences::default();
        for (slot, &(bone, weight)) in self.entries[..self.len.min(4)].iter().enumerate() {
            influences.ids[slot] = bone;
            influences.weights[slot] = weight;
        }
        influences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_assigns_sequential_indices() {
        let mut table = BoneTable::new();
        assert_eq!(table.intern("hip", Mat4::IDENTITY), 0);
        assert_eq!(table.intern("knee", Mat4::IDENTITY), 1);
        assert_eq!(table.intern("hip", Mat4::IDENTITY), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_overflowing_the_cap_keeps_earlier_indices_stable() {
        let mut table = BoneTable::new();
        for i in 0..=MAX_BONES {
            table.intern(&format!("bone{i}"), Mat4::IDENTITY);
        }
        assert_eq!(table.len() as u32, MAX_BONES + 1);
        // the 101st bone got index 100 without disturbing the rest
        assert_eq!(table.intern("bone100", Mat4::IDENTITY), 100);
        assert_eq!(table.intern("bone0", Mat4::IDENTITY), 0);
        assert_eq!(table.intern("bone99", Mat4::IDENTITY), 99);
    }

    #[test]
    fn test_encode_chunk_layout() {
        let mut table = BoneTable::new();
        table.intern("hip", Mat4::IDENTITY);
        table.intern("knee", Mat4::from_translation(glam::Vec3::X));
        let data = table.encode_chunk();

        // count + 2 mappings + count + 2 * (2 matrices)
        assert_eq!(data.len(), 4 + 2 * 8 + 4 + 2 * 128);
        assert_eq!(u32::from_le_bytes(data[0..4].try_into().unwrap()), 2);

        // mapping entries are ordered by ascending hash
        let first_hash = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let second_hash = u32::from_le_bytes(data[12..16].try_into().unwrap());
        assert!(first_hash < second_hash);
    }

    #[test]
    fn test_accumulator_keeps_weights_descending() {
        let mut accumulator = BoneAccumulator::default();
        accumulator.add(1, 0.1);
        accumulator.add(2, 0.6);
        accumulator.add(3, 0.3);

        let influences = accumulator.resolve();
        assert_eq!(influences.ids, [2, 3, 1, 0]);
        assert_eq!(influences.weights, [0.6, 0.3, 0.1, 0.0]);
    }

    #[test]
    fn test_accumulator_ties_keep_insertion_order() {
        let mut accumulator = BoneAccumulator::default();
        accumulator.add(1, 0.5);
        accumulator.add(2, 0.5);

        let influences = accumulator.resolve();
        assert_eq!(influences.ids, [1, 2, 0, 0]);
    }

    #[test]
    fn test_accumulator_evicts_tail_when_full() {
        let mut accumulator = BoneAccumulator::default();
        for bone in 0..ACCUMULATOR_CAPACITY as u32 {
            accumulator.add(bone, 0.1);
        }
        // a heavier late arrival displaces the lightest entry
        accumulator.add(99, 0.9);

        let influences = accumulator.resolve();
        assert_eq!(influences.ids[0], 99);
        assert_eq!(influences.weights[0], 0.9);
    }

    #[test]
    fn test_contributions_past_four_are_dropped_at_read_time() {
        let mut accumulator = BoneAccumulator::default();
        for bone in 0..6u32 {
            accumulator.add(bone, 1.0 - bone as f32 * 0.1);
        }
        let influences = accumulator.resolve();
        assert_eq!(influences.ids, [0, 1, 2, 3]);
        for window in influences.weights.windows(2) {
            assert!(window[0] >= window[1]);
        }
    }

    #[test]
    fn test_empty_accumulator_resolves_to_rigid_binding() {
        let accumulator = BoneAccumulator::default();
        let influences = accumulator.resolve();
        assert_eq!(influences.ids, [0, 0, 0, 0]);
        assert_eq!(influences.weights, [1.0, 0.0, 0.0, 0.0]);
    }
}
