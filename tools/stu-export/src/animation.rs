//! Animation-channel compaction and encoding
//!
//! Providers hand over raw keyframe tracks exactly as sampled; this module
//! throws away what carries no information (duplicate timestamps, channels
//! that never leave the rest pose) and serializes the rest into the single
//! `Animations` chunk.

use stu_common::formats::container::{put_f32, put_f64, put_u32, put_vec3, write_text};
use stu_common::scene::{AnimationStack, NodeChannel};

/// Keys closer together than this are considered the same instant.
const TIME_EPSILON: f64 = 1e-5;

fn dedup_keys<K: Copy>(keys: &[K], time: impl Fn(&K) -> f64) -> Vec<K> {
    let mut kept: Vec<K> = Vec::with_capacity(keys.len());
    for key in keys {
        let duplicate = kept
            .iter()
            .any(|existing| (time(existing) - time(key)).abs() <= TIME_EPSILON);
        if !duplicate {
            kept.push(*key);
        }
    }
    kept
}

/// Coalesces duplicate-timestamp keys (first occurrence wins) and drops the
/// channel entirely when none of the three curves holds more than a single
/// key - such a channel is just the node's rest pose restated.
pub fn compact_channel(channel: &NodeChannel) -> Option<NodeChannel> {
    let position_keys = dedup_keys(&channel.position_keys, |key| key.time);
    let rotation_keys = dedup_keys(&channel.rotation_keys, |key| key.time);
    let scale_keys = dedup_keys(&channel.scale_keys, |key| key.time);

    if position_keys.len() <= 1 && rotation_keys.len() <= 1 && scale_keys.len() <= 1 {
        return None;
    }
    Some(NodeChannel {
        node: channel.node.clone(),
        pre_state: channel.pre_state,
        post_state: channel.post_state,
        position_keys,
        rotation_keys,
        scale_keys,
    })
}

/// Payload of the `Animations` chunk.
pub fn encode_animations(stacks: &[AnimationStack]) -> Vec<u8> {
    let mut data = Vec::new();
    put_u32(&mut data, stacks.len() as u32);

    for stack in stacks {
        write_text(&mut data, &stack.name);
        put_f64(&mut data, stack.ticks_per_second);
        put_f64(&mut data, stack.duration);

        let channels: Vec<NodeChannel> =
            stack.channels.iter().filter_map(compact_channel).collect();
        put_u32(&mut data, channels.len() as u32);

        for channel in &channels {
            write_text(&mut data, &channel.node);
            put_u32(&mut data, channel.position_keys.len() as u32);
            put_u32(&mut data, channel.rotation_keys.len() as u32);
            put_u32(&mut data, channel.scale_keys.len() as u32);
            put_u32(&mut data, channel.post_state as u32);
            put_u32(&mut data, channel.pre_state as u32);

            for key in &channel.position_keys {
                put_f64(&mut data, key.time);
                put_vec3(&mut data, key.value);
            }
            for key in &channel.rotation_keys {
                put_f64(&mut data, key.time);
                put_f32(&mut data, key.value.x);
                put_f32(&mut data, key.value.y);
                put_f32(&mut data, key.value.z);
                put_f32(&mut data, key.value.w);
            }
            for key in &channel.scale_keys {
                put_f64(&mut data, key.time);
                put_vec3(&mut data, key.value);
            }
        }

        put_u32(&mut data, stack.mesh_channels.len() as u32);
        for channel in &stack.mesh_channels {
            write_text(&mut data, &channel.name);
            put_u32(&mut data, channel.keys.len() as u32);
            for key in &channel.keys {
                put_f64(&mut data, key.time);
                put_u32(&mut data, key.value);
            }
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use stu_common::scene::{QuatKey, VectorKey};

    fn vector_key(time: f64, value: f32) -> VectorKey {
        VectorKey {
            time,
            value: Vec3::splat(value),
        }
    }

    #[test]
    fn test_rest_pose_channel_is_dropped() {
        let channel = NodeChannel {
            node: "pelvis".into(),
            position_keys: vec![vector_key(0.0, 1.0)],
            rotation_keys: vec![QuatKey {
                time: 0.0,
                value: Quat::IDENTITY,
            }],
            scale_keys: vec![vector_key(0.0, 1.0)],
            ..NodeChannel::default()
        };
        assert!(compact_channel(&channel).is_none());
    }

    #[test]
    fn test_channel_with_motion_survives() {
        let channel = NodeChannel {
            node: "pelvis".into(),
            position_keys: vec![vector_key(0.0, 0.0), vector_key(1.0, 2.0)],
            ..NodeChannel::default()
        };
        let compacted = compact_channel(&channel).unwrap();
        assert_eq!(compacted.position_keys.len(), 2);
        assert!(compacted.rotation_keys.is_empty());
    }

    #[test]
    fn test_duplicate_timestamps_keep_first_occurrence() {
        let channel = NodeChannel {
            node: "pelvis".into(),
            position_keys: vec![
                vector_key(0.0, 1.0),
                vector_key(0.000001, 9.0), // within epsilon of the first
                vector_key(1.0, 2.0),
            ],
            ..NodeChannel::default()
        };
        let compacted = compact_channel(&channel).unwrap();
        assert_eq!(compacted.position_keys.len(), 2);
        assert_eq!(compacted.position_keys[0].value, Vec3::splat(1.0));
        assert_eq!(compacted.position_keys[1].time, 1.0);
    }

    #[test]
    fn test_encoded_stack_layout() {
        let stack = AnimationStack {
            name: "walk".into(),
            ticks_per_second: 24.0,
            duration: 48.0,
            channels: vec![NodeChannel {
                node: "pelvis".into(),
                position_keys: vec![vector_key(0.0, 0.0), vector_key(1.0, 1.0)],
                ..NodeChannel::default()
            }],
            ..AnimationStack::default()
        };
        let data = encode_animations(&[stack]);

        let mut offset = 0;
        let read_u32 = |data: &[u8], offset: &mut usize| {
            let value = u32::from_le_bytes(data[*offset..*offset + 4].try_into().unwrap());
            *offset += 4;
            value
        };

        assert_eq!(read_u32(&data, &mut offset), 1); // stack count
        assert_eq!(&data[offset..offset + 5], b"walk\0");
        offset += 5;
        let tps = f64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        assert_eq!(tps, 24.0);
        offset += 16; // tps + duration
        assert_eq!(read_u32(&data, &mut offset), 1); // channel count
        assert_eq!(&data[offset..offset + 7], b"pelvis\0");
        offset += 7;
        assert_eq!(read_u32(&data, &mut offset), 2); // position keys
        assert_eq!(read_u32(&data, &mut offset), 0); // rotation keys
        assert_eq!(read_u32(&data, &mut offset), 0); // scale keys
        offset += 8; // post + pre state
        offset += 2 * 20; // two position keys (f64 + 3 f32)
        assert_eq!(read_u32(&data, &mut offset), 0); // mesh channel count
        assert_eq!(offset, data.len());
    }
}
