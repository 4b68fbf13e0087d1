use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

fn validate_lookups(reader: &dyn TableReader, m: &BTreeMap<u64, Vec<u8>>, probes: &[u64]) {
    for (key, value) in m {
        let offset = reader.value_offset(*key).unwrap();
        let offset = offset.unwrap_or_else(|| panic!("key {key} must be present"));
        assert!(offset >= HEADER_SIZE, "value offset overlaps the header");
        assert_eq!(reader.value_at(offset).unwrap(), value.as_slice());
        assert!(reader.exists(*key).unwrap());
    }
    for probe in probes {
        let got = reader.get(*probe).unwrap();
        let expected = m.get(probe).map(Vec::as_slice);
        assert_eq!(got, expected, "probe {probe}");
    }
}

fn key_strategy() -> impl Strategy<Value = u64> + Clone {
    // Mix small, dense keys with keys spread over the whole 64-bit range.
    prop_oneof![
        3 => 0u64..4_096,
        2 => 0u64..(1 << 24),
        1 => any::<u64>(),
    ]
}

fn table_strategy() -> impl Strategy<Value = (ValueSize, BTreeMap<u64, Vec<u8>>)> {
    any::<ValueSize>().prop_flat_map(|value_size| {
        let value = prop::collection::vec(any::<u8>(), value_size.size());
        (
            Just(value_size),
            prop::collection::btree_map(key_strategy(), value, 0..=1_500),
        )
    })
}

fn split(m: &BTreeMap<u64, Vec<u8>>) -> (Vec<u64>, Vec<&[u8]>) {
    (
        m.keys().copied().collect(),
        m.values().map(Vec::as_slice).collect(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_chain_roundtrip(
        (value_size, m) in table_strategy(),
        filling_ratio in 1usize..=40,
        min_hash_table_size in 2usize..=16,
        probes in prop::collection::vec(key_strategy(), 0..=200),
    ) {
        let config = ChainConfig { filling_ratio, min_hash_table_size };
        let writer = ChainWriter::with_config(value_size, config).unwrap();
        let (keys, values) = split(&m);
        let buf = writer.dump(&keys, &values).unwrap();
        prop_assert_eq!(buf.is_empty(), m.is_empty());

        let reader = ChainReader::new(&buf).unwrap();
        if !m.is_empty() {
            prop_assert_eq!(reader.value_size(), value_size);
        }
        validate_lookups(&reader, &m, &probes);
        prop_assert_eq!(writer.dump(&keys, &values).unwrap(), buf);
    }

    #[test]
    fn prop_trie_roundtrip(
        (value_size, m) in table_strategy(),
        bitmask_size in any::<BitmaskSize>(),
        probes in prop::collection::vec(key_strategy(), 0..=200),
    ) {
        let writer = TrieWriter::with_config(value_size, TrieConfig { bitmask_size });
        let (keys, values) = split(&m);
        let buf = writer.dump(&keys, &values).unwrap();
        prop_assert_eq!(buf.is_empty(), m.is_empty());

        let reader = TrieReader::new(&buf).unwrap();
        if !m.is_empty() {
            prop_assert_eq!(reader.value_size(), value_size);
            prop_assert_eq!(reader.bitmask_size(), bitmask_size);
        }
        validate_lookups(&reader, &m, &probes);
        prop_assert_eq!(writer.dump(&keys, &values).unwrap(), buf);
    }

    #[test]
    fn prop_encodings_agree(
        m in prop::collection::btree_map(key_strategy(), any::<u32>(), 1..=800),
        probes in prop::collection::vec(key_strategy(), 0..=300),
    ) {
        let keys: Vec<u64> = m.keys().copied().collect();
        let values: Vec<u32> = m.values().copied().collect();
        let chain = Encoding::Chain.writer(ValueSize::Int).dump_u32(&keys, &values).unwrap();
        let trie = Encoding::Trie.writer(ValueSize::Int).dump_u32(&keys, &values).unwrap();
        let chain = Encoding::Chain.reader(&chain).unwrap();
        let trie = Encoding::Trie.reader(&trie).unwrap();

        for key in keys.iter().chain(&probes) {
            let expected = m.get(key).copied().unwrap_or(u32::MAX);
            prop_assert_eq!(chain.get_u32_or(*key, u32::MAX).unwrap(), expected);
            prop_assert_eq!(trie.get_u32_or(*key, u32::MAX).unwrap(), expected);
        }
    }
}

#[test]
fn exhaustive_small_key_sets() {
    // Every subset of 0..10 through both encodings.
    for mask in 0u32..(1 << 10) {
        let keys: Vec<u64> = (0..10u64).filter(|k| mask & (1 << k) != 0).collect();
        let values: Vec<u8> = keys.iter().map(|k| *k as u8 + 100).collect();
        for encoding in Encoding::ALL {
            let buf = encoding.writer(ValueSize::Byte).dump_u8(&keys, &values).unwrap();
            let r = encoding.reader(&buf).unwrap();
            for k in 0..12u64 {
                let expected = if mask & (1 << k) != 0 { k as u8 + 100 } else { 0 };
                assert_eq!(r.get_u8_or(k, 0).unwrap(), expected, "{encoding:?} mask {mask:#b}");
            }
        }
    }
}
