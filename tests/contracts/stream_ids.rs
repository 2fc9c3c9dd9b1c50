//! FNV-1a 流哈希是纯函数，保留 id 的反查永远命中规范名称。

use logrelay_core::prelude::*;

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[test]
fn stream_id_matches_independent_fnv1a_reference() {
    for name in ["", "*", "_GOLLUM_", "_TRACE_", "_DROPPED_", "A", "errors", "a-very-long-stream-name-indeed"] {
        assert_eq!(StreamId::from_name(name).as_u64(), fnv1a(name.as_bytes()), "mismatch for {name:?}");
    }
}

#[test]
fn reserved_constants_match_their_canonical_names() {
    assert_eq!(StreamId::INVALID, StreamId::from_name(""));
    assert_eq!(StreamId::WILDCARD, StreamId::from_name("*"));
    assert_eq!(StreamId::LOG_INTERNAL, StreamId::from_name("_GOLLUM_"));
    assert_eq!(StreamId::TRACE_INTERNAL, StreamId::from_name("_TRACE_"));
}

#[test]
fn name_reverse_lookup_round_trips_through_the_registry() {
    let registry = StreamRegistry::new();
    for name in ["A", "B", "checkout-events", "errors"] {
        let id = registry.get_stream_id(name);
        assert_eq!(registry.get_stream_name(id).as_deref(), Some(name));
    }
}

#[test]
fn reserved_ids_reverse_to_canonical_names_even_without_prior_registration() {
    let registry = StreamRegistry::new();
    assert_eq!(registry.get_stream_name(StreamId::INVALID).as_deref(), Some(""));
    assert_eq!(registry.get_stream_name(StreamId::WILDCARD).as_deref(), Some("*"));
    assert_eq!(registry.get_stream_name(StreamId::LOG_INTERNAL).as_deref(), Some("_GOLLUM_"));
    assert_eq!(registry.get_stream_name(StreamId::TRACE_INTERNAL).as_deref(), Some("_TRACE_"));
}

proptest::proptest! {
    #[test]
    fn hashing_never_panics_and_is_deterministic(s in ".*") {
        let a = StreamId::from_name(&s);
        let b = StreamId::from_name(&s);
        proptest::prop_assert_eq!(a, b);
    }
}
