//! Property-Based Tests for the Cache Engine
//!
//! # Test Properties
//!
//! 1. **Capacity**: L1 never exceeds its byte or item budget
//! 2. **LRU Order**: the entry evicted is always the least recently used
//! 3. **Key Determinism**: logically equal requests derive one key
//! 4. **Wire Roundtrip**: encode → decode returns the original bytes

#![cfg(test)]

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use proptest::prelude::*;
use serde_json::{Map, Value};

use super::compression::{CompressionManager, COMPRESSED_MARKER};
use super::key::derive_key_from_value;
use super::l1::L1Cache;
use super::model::ContentType;

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Set(u8, usize),
}

/// Operations over a small key space so that keys collide and get reused.
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12).prop_map(Op::Get),
        (0u8..12, 0usize..200).prop_map(|(k, len)| Op::Set(k, len)),
    ]
}

fn key_name(k: u8) -> String {
    format!("k{:02}", k)
}

fn content_type_strategy() -> impl Strategy<Value = ContentType> {
    prop::sample::select(ContentType::ALL.to_vec())
}

/// Request members as (name, value) pairs with unique names.
fn members_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..10).prop_map(|m| m.into_iter().collect())
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..4096),
        // Highly compressible
        (any::<u8>(), 0usize..8192).prop_map(|(b, n)| vec![b; n]),
        // Starts with the wire marker
        prop::collection::vec(any::<u8>(), 0..512).prop_map(|tail| {
            let mut v = COMPRESSED_MARKER.to_vec();
            v.extend(tail);
            v
        }),
    ]
}

// =============================================================================
// Reference Model
// =============================================================================

/// Straightforward LRU model: front is least recently used.
struct LruModel {
    order: VecDeque<(String, u64)>,
    bytes: u64,
    max_items: usize,
    max_bytes: u64,
}

impl LruModel {
    fn new(max_items: usize, max_bytes: u64) -> Self {
        Self {
            order: VecDeque::new(),
            bytes: 0,
            max_items,
            max_bytes,
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|(k, _)| k == key)
    }

    fn get(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(i) => {
                if let Some(entry) = self.order.remove(i) {
                    self.order.push_back(entry);
                }
                true
            }
            None => false,
        }
    }

    fn set(&mut self, key: &str, size: u64) -> bool {
        if size > self.max_bytes {
            return false;
        }
        if let Some(i) = self.position(key) {
            if let Some((_, old)) = self.order.remove(i) {
                self.bytes -= old;
            }
        }
        while self.bytes + size > self.max_bytes {
            match self.order.pop_front() {
                Some((_, evicted)) => self.bytes -= evicted,
                None => break,
            }
        }
        while self.order.len() >= self.max_items {
            match self.order.pop_front() {
                Some((_, evicted)) => self.bytes -= evicted,
                None => break,
            }
        }
        self.order.push_back((key.to_string(), size));
        self.bytes += size;
        true
    }

    fn keys(&self) -> Vec<String> {
        self.order.iter().map(|(k, _)| k.clone()).collect()
    }
}

// =============================================================================
// Capacity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: after every set, bytes and items are within budget.
    #[test]
    fn prop_l1_capacity_invariant(
        max_items in 1usize..8,
        max_bytes in 64u64..1024,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let cache = L1Cache::new(max_items, max_bytes, Duration::from_secs(300));

        for op in ops {
            if let Op::Set(k, len) = op {
                cache.set(&key_name(k), Bytes::from(vec![7u8; len]), ContentType::AiResponse, Duration::ZERO);
                prop_assert!(cache.size_bytes() <= max_bytes);
                prop_assert!(cache.len() <= max_items);
            }
        }
    }

    /// Property: accounted bytes always equal the sum of live entry sizes.
    #[test]
    fn prop_l1_byte_accounting(
        ops in prop::collection::vec(op_strategy(), 1..100),
    ) {
        let cache = L1Cache::new(5, 600, Duration::from_secs(300));

        for op in ops {
            match op {
                Op::Get(k) => { cache.get(&key_name(k)); }
                Op::Set(k, len) => {
                    cache.set(&key_name(k), Bytes::from(vec![1u8; len]), ContentType::AiResponse, Duration::ZERO);
                }
            }
            let live: u64 = cache
                .lru_order()
                .iter()
                .filter_map(|k| cache.peek_entry(k))
                .map(|e| e.size_bytes())
                .sum();
            prop_assert_eq!(live, cache.size_bytes());
        }
    }
}

// =============================================================================
// LRU Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: L1 agrees with a reference LRU on contents and recency order.
    #[test]
    fn prop_l1_matches_lru_model(
        max_items in 1usize..6,
        max_bytes in 32u64..800,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let cache = L1Cache::new(max_items, max_bytes, Duration::from_secs(300));
        let mut model = LruModel::new(max_items, max_bytes);

        for op in ops {
            match op {
                Op::Get(k) => {
                    let key = key_name(k);
                    prop_assert_eq!(cache.get(&key).is_some(), model.get(&key));
                }
                Op::Set(k, len) => {
                    let key = key_name(k);
                    let size = (key.len() + len) as u64;
                    let stored = cache.set(&key, Bytes::from(vec![0u8; len]), ContentType::UserSession, Duration::ZERO);
                    prop_assert_eq!(stored, model.set(&key, size));
                }
            }
            prop_assert_eq!(cache.lru_order(), model.keys());
        }
    }
}

// =============================================================================
// Key Derivation Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: member insertion order never changes the key.
    #[test]
    fn prop_key_independent_of_member_order(
        content_type in content_type_strategy(),
        members in members_strategy(),
    ) {
        let forward: Map<String, Value> = members.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect();
        let reversed: Map<String, Value> = members.iter().rev().map(|(k, v)| (k.clone(), Value::from(*v))).collect();

        let a = derive_key_from_value(content_type, &Value::Object(forward));
        let b = derive_key_from_value(content_type, &Value::Object(reversed.clone()));
        let c = derive_key_from_value(content_type, &Value::Object(reversed));
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&b, &c);
        prop_assert!(a.starts_with(content_type.as_str()));
    }

    /// Property: the same request under different content types never collides.
    #[test]
    fn prop_key_scoped_by_content_type(members in members_strategy()) {
        let request = Value::Object(members.into_iter().map(|(k, v)| (k, Value::from(v))).collect());
        let mut keys: Vec<String> = ContentType::ALL
            .iter()
            .map(|ct| derive_key_from_value(*ct, &request))
            .collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), ContentType::ALL.len());
    }
}

// =============================================================================
// Wire Roundtrip Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: decode(encode(v)) == v for any threshold and payload.
    #[test]
    fn prop_wire_roundtrip(
        enabled in any::<bool>(),
        threshold in 0usize..2048,
        value in payload_strategy(),
    ) {
        let manager = CompressionManager::new(enabled, threshold);
        let (wire, compressed) = manager.encode(&value);

        prop_assert_eq!(compressed, wire.starts_with(COMPRESSED_MARKER));
        if compressed && !value.starts_with(COMPRESSED_MARKER) {
            prop_assert!(wire.len() <= value.len() + COMPRESSED_MARKER.len());
        }
        let decoded = manager.decode(&wire);
        prop_assert_eq!(decoded.as_ref(), value.as_slice());
    }
}
