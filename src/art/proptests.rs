//! Model-based property tests: the tree must behave exactly like a
//! `BTreeMap<Vec<u8>, BTreeSet<u64>>` under arbitrary operation sequences,
//! and every intermediate tree must satisfy the structural invariants.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use super::node::Node;
use super::{Art, NodeKind};
use crate::key::ArtKey;
use crate::{IndexConfig, RowId};

/// Walk the whole tree checking the structural invariants: bounded prefixes,
/// counts within shape capacity, children in strictly ascending byte order,
/// sorted non-empty row-id sets, leaf keys extending their path, and no
/// single-child branch that should have collapsed.
fn validate_tree(art: &Art) {
    let Some(root) = art.root.as_deref() else {
        assert_eq!(art.len(), 0, "empty tree must report zero entries");
        return;
    };
    let mut entries = 0usize;
    let mut path = Vec::new();
    validate_node(root, &mut path, art.max_prefix, &mut entries);
    assert_eq!(entries, art.len(), "reachable entries must match len");
}

fn validate_node(node: &Node, path: &mut Vec<u8>, max_prefix: usize, entries: &mut usize) {
    match node {
        Node::Leaf(leaf) => {
            assert!(
                !leaf.row_ids.is_empty(),
                "reachable leaf must hold at least one row id"
            );
            assert!(
                leaf.row_ids.windows(2).all(|w| w[0] < w[1]),
                "row-id set must be sorted and deduplicated"
            );
            assert!(
                leaf.key.starts_with(path),
                "leaf key must extend its path"
            );
            *entries += leaf.row_ids.len();
        }
        _ => {
            assert!(
                node.prefix().len() <= max_prefix,
                "stored prefix must fit the configured bound"
            );
            let count = node.child_count();
            let capacity = match node.kind() {
                NodeKind::Node4 => 4,
                NodeKind::Node16 => 16,
                NodeKind::Node48 => 48,
                NodeKind::Node256 => 256,
                NodeKind::Leaf => unreachable!(),
            };
            assert!(count >= 1, "branch must have at least one child");
            assert!(count <= capacity, "count must fit the shape");

            if count == 1 {
                // A single-child branch is only legal as a long-prefix chain
                // link; a lone leaf child always merges into its parent slot.
                let (_, child) = node.next_child_at_or_after(0).unwrap();
                assert!(
                    !matches!(child, Node::Leaf(_)),
                    "single-child branch over a leaf must have collapsed"
                );
            }

            path.extend_from_slice(node.prefix());
            let mut from = 0u16;
            let mut seen = 0usize;
            while let Some((byte, child)) = node.next_child_at_or_after(from) {
                path.push(byte);
                validate_node(child, path, max_prefix, entries);
                path.pop();
                seen += 1;
                from = byte as u16 + 1;
            }
            assert_eq!(seen, count, "ordered iteration must visit every child");
            path.truncate(path.len() - node.prefix().len());
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Vec<u8>, u64),
    Erase(Vec<u8>, u64),
    Search(Vec<u8>),
    Scan(Vec<u8>, Vec<u8>, bool, bool),
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(any::<u8>(), 0..=24)
}

/// Few distinct row ids so duplicate-key and duplicate-pair paths get hit.
fn row_id_strategy() -> impl Strategy<Value = u64> + Clone {
    0u64..8
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let row = row_id_strategy();
    let op = prop_oneof![
        45 => (key.clone(), row.clone()).prop_map(|(k, r)| Op::Insert(k, r)),
        30 => (key.clone(), row).prop_map(|(k, r)| Op::Erase(k, r)),
        15 => key.clone().prop_map(Op::Search),
        10 => (key.clone(), key.clone(), any::<bool>(), any::<bool>())
            .prop_map(|(lo, hi, li, hi_inc)| Op::Scan(lo, hi, li, hi_inc)),
    ];
    prop::collection::vec(op, 0..=400)
}

fn model_scan(
    model: &BTreeMap<Vec<u8>, BTreeSet<u64>>,
    low: &[u8],
    high: &[u8],
    low_inclusive: bool,
    high_inclusive: bool,
) -> Vec<u64> {
    model
        .iter()
        .filter(|(k, _)| {
            let above = if low_inclusive {
                k.as_slice() >= low
            } else {
                k.as_slice() > low
            };
            let below = if high_inclusive {
                k.as_slice() <= high
            } else {
                k.as_slice() < high
            };
            above && below
        })
        .flat_map(|(_, rows)| rows.iter().copied())
        .collect()
}

fn run_model_equivalence(config: IndexConfig, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut art = Art::with_config(config);
    let mut model: BTreeMap<Vec<u8>, BTreeSet<u64>> = BTreeMap::new();
    let mut expected_len = 0usize;

    for op in ops {
        match op {
            Op::Insert(k, r) => {
                let added = art
                    .insert(&ArtKey::encode(k.as_slice()), RowId(r))
                    .expect("non-unique insert cannot conflict");
                let added_model = model.entry(k).or_default().insert(r);
                prop_assert_eq!(added, added_model);
                if added {
                    expected_len += 1;
                }
            }
            Op::Erase(k, r) => {
                let found = art.erase(&ArtKey::encode(k.as_slice()), RowId(r));
                let found_model = match model.get_mut(&k) {
                    Some(rows) => {
                        let removed = rows.remove(&r);
                        if rows.is_empty() {
                            model.remove(&k);
                        }
                        removed
                    }
                    None => false,
                };
                prop_assert_eq!(found, found_model);
                if found {
                    expected_len -= 1;
                }
            }
            Op::Search(k) => {
                let got: Vec<u64> = art
                    .search(&ArtKey::encode(k.as_slice()))
                    .iter()
                    .map(|r| r.0)
                    .collect();
                let want: Vec<u64> = model
                    .get(&k)
                    .map(|rows| rows.iter().copied().collect())
                    .unwrap_or_default();
                prop_assert_eq!(got, want);
            }
            Op::Scan(lo, hi, li, hi_inc) => {
                let got: Vec<u64> = art
                    .scan(
                        &ArtKey::encode(lo.as_slice()),
                        &ArtKey::encode(hi.as_slice()),
                        li,
                        hi_inc,
                    )
                    .map(|r| r.0)
                    .collect();
                let want = model_scan(&model, &lo, &hi, li, hi_inc);
                prop_assert_eq!(got, want);
            }
        }
        prop_assert_eq!(art.len(), expected_len);
    }

    validate_tree(&art);

    // Final full-order check: a scan over everything matches the model.
    let all_low = ArtKey::encode(&b""[..]);
    let all_high = ArtKey::encode(vec![0xFFu8; 32].as_slice());
    let got: Vec<u64> = art.scan(&all_low, &all_high, true, true).map(|r| r.0).collect();
    let want: Vec<u64> = model
        .values()
        .flat_map(|rows| rows.iter().copied())
        .collect();
    prop_assert_eq!(got, want);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_model_equivalence(ops in ops_strategy()) {
        run_model_equivalence(IndexConfig::default(), ops)?;
    }

    /// A tiny prefix bound forces long-prefix chains on nearly every split.
    #[test]
    fn prop_model_equivalence_tiny_prefix(ops in ops_strategy()) {
        run_model_equivalence(
            IndexConfig { max_prefix: 2, ..IndexConfig::default() },
            ops,
        )?;
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn scenario_keys() -> Vec<Vec<u8>> {
    vec![
        b"a".to_vec(),
        b"b".to_vec(),
        b"aa".to_vec(),
        b"ab".to_vec(),
        b"ba".to_vec(),
        b"shared-prefix-longer-than-inline".to_vec(),
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = scenario_keys();

    for_each_permutation(&keys, |perm| {
        let mut art = Art::new();
        for (i, k) in perm.iter().enumerate() {
            art.insert(&ArtKey::encode(k.as_slice()), RowId(i as u64))
                .unwrap();
        }
        validate_tree(&art);
        for (i, k) in perm.iter().enumerate() {
            assert_eq!(
                art.search(&ArtKey::encode(k.as_slice())),
                &[RowId(i as u64)]
            );
        }
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = scenario_keys();

    for_each_permutation(&keys, |perm| {
        let mut art = Art::new();
        for (i, k) in keys.iter().enumerate() {
            art.insert(&ArtKey::encode(k.as_slice()), RowId(i as u64))
                .unwrap();
        }

        for (removed, k) in perm.iter().enumerate() {
            let i = keys.iter().position(|orig| orig == k).unwrap();
            assert!(art.erase(&ArtKey::encode(k.as_slice()), RowId(i as u64)));
            validate_tree(&art);
            assert_eq!(art.len(), keys.len() - removed - 1);
        }
        assert!(art.is_empty());
        assert!(art.root_kind().is_none());
    });
}
