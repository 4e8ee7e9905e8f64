use super::*;

use proptest::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use crate::encoding::{decode_varint, encode_varint, varint_size, MAX_VARINT_LEN};

type Model = BTreeMap<(Vec<u8>, Reverse<i64>), (u8, Vec<u8>)>;

fn validate_list(list: &SkipList) {
    let nodes: Vec<NodeHandle<'_>> = list.iter().map(|n| n.unwrap()).collect();
    assert_eq!(nodes.len(), list.len(), "level 0 must hold every record");

    for pair in nodes.windows(2) {
        let (a, b) = (pair[0].header().unwrap(), pair[1].header().unwrap());
        assert_eq!(
            compare_records(a.key, a.sequence_number, b.key, b.sequence_number),
            Ordering::Less,
            "level 0 must be strictly ordered"
        );
    }

    let top = list.current_level();
    assert!(top <= list.max_level());
    for node in &nodes {
        let levels = node.level_count().unwrap();
        assert!(
            (1..=top + 1).contains(&levels),
            "node height {levels} outside 1..={}",
            top + 1
        );
    }

    // Every upper level is the sub-sequence of nodes tall enough for it.
    for level in 1..=top {
        let tall: Vec<&NodeHandle<'_>> = nodes
            .iter()
            .filter(|n| n.level_count().unwrap() > level)
            .collect();
        for (i, node) in tall.iter().enumerate() {
            let next = node.next(level).unwrap().map(|n| n.offset());
            let expected = tall.get(i + 1).map(|n| n.offset());
            assert_eq!(next, expected, "broken link at level {level}");
        }
    }
}

fn model_floor(model: &Model, key: &[u8], sn: i64) -> Option<(Vec<u8>, i64, u8, Vec<u8>)> {
    model
        .range((key.to_vec(), Reverse(sn))..)
        .next()
        .map(|((k, Reverse(s)), (tag, v))| (k.clone(), *s, *tag, v.clone()))
}

fn list_floor(list: &SkipList, key: &[u8], sn: i64) -> Option<(Vec<u8>, i64, u8, Vec<u8>)> {
    list.get(&Header::put(key, sn)).unwrap().map(|n| {
        let h = n.header().unwrap();
        (
            h.key.to_vec(),
            h.sequence_number,
            h.mutation_type.0,
            n.value().unwrap().to_vec(),
        )
    })
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Vec<u8>, i64, u8, Vec<u8>),
    Get(Vec<u8>, i64),
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A tiny alphabet so keys collide, share prefixes and repeat versions.
    prop::collection::vec(prop_oneof![Just(0u8), Just(1), Just(0x7F), Just(0xFF)], 0..=4)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let sn = -4i64..8;
    let op = prop_oneof![
        60 => (key.clone(), sn.clone(), any::<u8>(), prop::collection::vec(any::<u8>(), 0..=24))
            .prop_map(|(k, s, t, v)| Op::Insert(k, s, t, v)),
        40 => (key, sn).prop_map(|(k, s)| Op::Get(k, s)),
    ];
    prop::collection::vec(op, 0..=400)
}

fn small_list(seed: u64) -> SkipList {
    SkipList::new(Config {
        arena_capacity: 1 << 20,
        max_level: 4,
        promotion_probability: 0.5,
        seed: Some(seed),
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy(), seed in any::<u64>()) {
        let list = small_list(seed);
        let mut model = Model::new();

        for op in ops {
            match op {
                Op::Insert(key, sn, tag, value) => {
                    let inserted = list
                        .insert(&Header::new(&key, sn, MutationType(tag)), &Footer::new(&value))
                        .unwrap();
                    let fresh = !model.contains_key(&(key.clone(), Reverse(sn)));
                    if fresh {
                        model.insert((key, Reverse(sn)), (tag, value));
                    }
                    prop_assert_eq!(inserted, fresh);
                }
                Op::Get(key, sn) => {
                    prop_assert_eq!(list_floor(&list, &key, sn), model_floor(&model, &key, sn));
                }
            }
            prop_assert_eq!(list.len(), model.len());
        }

        validate_list(&list);
        let got: Vec<(Vec<u8>, i64)> = list
            .iter()
            .map(|n| {
                let h = n.unwrap().header().unwrap();
                (h.key.to_vec(), h.sequence_number)
            })
            .collect();
        let expected: Vec<(Vec<u8>, i64)> =
            model.keys().map(|(k, Reverse(s))| (k.clone(), *s)).collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_varint_roundtrip(value in any::<u32>()) {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_varint(value, &mut buf);
        prop_assert_eq!(len, varint_size(value));
        prop_assert_eq!(decode_varint(&buf[..len]), Ok((value, len)));
        // A truncated encoding never decodes.
        prop_assert!(decode_varint(&buf[..len - 1]).is_err());
    }

    #[test]
    fn prop_arena_varint_roundtrip(values in prop::collection::vec(any::<u32>(), 1..64)) {
        let arena = Arena::new(values.len() * MAX_VARINT_LEN).unwrap();
        let start = arena.allocate(values.len() * MAX_VARINT_LEN).unwrap();
        let mut cursor = start;
        for &v in &values {
            cursor += unsafe { arena.write_varint(cursor, v) }.unwrap();
        }
        let mut cursor = start;
        for &v in &values {
            let (decoded, len) = arena.read_varint(cursor).unwrap();
            prop_assert_eq!(decoded, v);
            cursor += len;
        }
    }
}

/// Step `order` to the next lexicographic arrangement; `false` once the last
/// (descending) one has been reached.
fn next_permutation(order: &mut [usize]) -> bool {
    let Some(pivot) = order.windows(2).rposition(|w| w[0] < w[1]) else {
        return false;
    };
    let swap = order.iter().rposition(|&x| x > order[pivot]).unwrap();
    order.swap(pivot, swap);
    order[pivot + 1..].reverse();
    true
}

#[test]
fn exhaustive_insert_order_small_set() {
    let records: [(&[u8], i64); 6] = [
        (b"apple", 3),
        (b"apple", 1),
        (b"apple", 2),
        (b"banana", 5),
        (b"banana", 2),
        (b"cherry", 1),
    ];
    let expected: Vec<(Vec<u8>, i64)> = vec![
        (b"apple".to_vec(), 3),
        (b"apple".to_vec(), 2),
        (b"apple".to_vec(), 1),
        (b"banana".to_vec(), 5),
        (b"banana".to_vec(), 2),
        (b"cherry".to_vec(), 1),
    ];

    let mut order: Vec<usize> = (0..records.len()).collect();
    let mut seed = 0;
    loop {
        seed += 1;
        let list = small_list(seed);
        for &i in &order {
            let (key, sn) = records[i];
            assert!(list.insert(&Header::put(key, sn), &Footer::new(key)).unwrap());
        }

        validate_list(&list);
        let mut got = Vec::new();
        list.for_each(|n| got.push((n.key().unwrap().to_vec(), n.sequence_number().unwrap())))
            .unwrap();
        assert_eq!(got, expected);

        // Floor lookups do not depend on insertion order.
        assert_eq!(list_floor(&list, b"apple", 25).map(|r| r.1), Some(3));
        assert_eq!(list_floor(&list, b"banana", 4).map(|r| r.1), Some(2));
        assert_eq!(
            list_floor(&list, b"banana", 1).map(|r| r.0),
            Some(b"cherry".to_vec())
        );
        assert_eq!(list_floor(&list, b"cherry", 0), None);

        if !next_permutation(&mut order) {
            break;
        }
    }
    assert_eq!(seed, 720);
}
