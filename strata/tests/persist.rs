mod common;

use common::{account_path, nibbles, shape, short_path, value, Test};
use hex_literal::hex;
use std::sync::Arc;
use strata::{
    Backend, Error, ForkGroup, HashKey, HashLabel, IdGen, LeafTie, NibblePath, Options, Payload,
    SavedState, Vertex, VertexId, View, ViewId,
};

const ROOT_KEY: HashKey = HashKey(hex!(
    "c0ffee00000000000000000000000000000000000000000000000000000000aa"
));

fn accounts(range: std::ops::Range<u64>) -> Vec<(NibblePath, Payload)> {
    range.map(|id| (account_path(id), value(id))).collect()
}

#[test]
fn empty_persist_is_a_no_op() {
    let mut t = Test::new();
    let centre = t.centre();
    let before = t.backend.dump();
    t.persist(centre).unwrap();
    assert_eq!(t.backend.dump(), before);
    assert_eq!(t.backend.commits(), 0);

    t.build(centre, VertexId::ACCOUNTS, &accounts(0..8));
    t.persist(centre).unwrap();
    let after = t.backend.dump();
    assert_eq!(t.backend.commits(), 1);

    t.persist(centre).unwrap();
    assert_eq!(t.backend.dump(), after);
    assert_eq!(t.backend.commits(), 1);
}

#[test]
fn persisted_trie_is_readable_from_backend() {
    let mut t = Test::new();
    let centre = t.centre();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..16));
    let expected = shape(t.view(centre), VertexId::ACCOUNTS);
    t.persist(centre).unwrap();

    assert!(t.view(centre).balancer().is_none());
    let dump = t.backend.dump();
    assert_eq!(
        dump.saved_state,
        Some(SavedState {
            serial: 1,
            state_root: None,
        })
    );

    // a new group over the same backend sees the same trie.
    let backend: Arc<dyn Backend> = t.backend.clone();
    let group = ForkGroup::new(Some(backend), Options::new()).unwrap();
    let view = group.view(group.centre()).unwrap();
    assert_eq!(shape(view, VertexId::ACCOUNTS), expected);
    assert_eq!(view.layers().final_state().id_gen(), &dump.id_gen);
}

#[test]
fn serial_and_state_root_advance() {
    let mut t = Test::new();
    let centre = t.centre();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..2));
    t.persist(centre).unwrap();

    let root = HashLabel::new(VertexId::ACCOUNTS, ROOT_KEY);
    t.view_mut(centre)
        .put_label(VertexId::ACCOUNTS, Some(root))
        .unwrap();
    t.persist(centre).unwrap();
    assert_eq!(
        t.backend.dump().saved_state,
        Some(SavedState {
            serial: 2,
            state_root: Some(ROOT_KEY),
        })
    );

    // untouched root label is picked up from the backend.
    t.build(centre, VertexId(100), &[(nibbles(&[1]), value(1))]);
    t.persist(centre).unwrap();
    assert_eq!(
        t.backend.dump().saved_state,
        Some(SavedState {
            serial: 3,
            state_root: Some(ROOT_KEY),
        })
    );
}

#[test]
fn missing_backend() {
    let mut group = ForkGroup::new(None, Options::new()).unwrap();
    let centre = group.centre();
    assert!(matches!(
        group.persist(centre, None, false),
        Err(Error::BackendMissing)
    ));
}

#[test]
fn open_transaction_blocks_persist() {
    let mut t = Test::new();
    let centre = t.centre();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..2));
    t.view_mut(centre).begin();
    assert!(matches!(t.persist(centre), Err(Error::TxPending(1))));
    assert_eq!(t.backend.commits(), 0);

    t.view_mut(centre).commit().unwrap();
    t.persist(centre).unwrap();
    assert_eq!(t.backend.commits(), 1);
}

#[test]
fn only_centre_writes() {
    let mut t = Test::new();
    let centre = t.centre();
    let fork = t.fork(centre);
    t.build(fork, VertexId::ACCOUNTS, &accounts(0..4));

    let before = t.backend.dump();
    assert!(matches!(
        t.group.persist(fork, None, false),
        Err(Error::BackendReadOnly(id)) if id == fork
    ));
    assert_eq!(t.backend.dump(), before);
    assert!(t.group.is_centre(centre));
}

#[test]
fn recentre_persist_restores_centre() {
    let mut t = Test::new();
    let centre = t.centre();
    let fork = t.fork(centre);
    t.build(fork, VertexId::ACCOUNTS, &accounts(0..4));
    let expected = shape(t.view(fork), VertexId::ACCOUNTS);

    t.group.persist(fork, None, true).unwrap();
    assert!(t.group.is_centre(centre));
    assert_eq!(t.backend.commits(), 1);

    // the fork reads its trie from the backend now, the old centre still sees nothing.
    assert!(t.view(fork).balancer().is_none());
    assert_eq!(shape(t.view(fork), VertexId::ACCOUNTS), expected);
    assert_eq!(shape(t.view(centre), VertexId::ACCOUNTS), None);
}

#[test]
fn failed_commit_changes_nothing() {
    let mut t = Test::new();
    let centre = t.centre();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..4));
    t.persist(centre).unwrap();

    let fork = t.fork(centre);
    t.delete(fork, VertexId::ACCOUNTS, &account_path(0)).unwrap();
    let fork_shape = shape(t.view(fork), VertexId::ACCOUNTS);
    let centre_shape = shape(t.view(centre), VertexId::ACCOUNTS);
    let before = t.backend.dump();

    t.backend.fail_next_commit();
    assert!(matches!(
        t.group.persist(fork, None, true),
        Err(Error::Backend(_))
    ));
    assert_eq!(t.backend.dump(), before);
    assert!(t.group.is_centre(centre));
    assert_eq!(shape(t.view(fork), VertexId::ACCOUNTS), fork_shape);
    assert_eq!(shape(t.view(centre), VertexId::ACCOUNTS), centre_shape);

    // the stowed changes are still there to retry.
    t.group.persist(fork, None, true).unwrap();
    assert_ne!(t.backend.dump(), before);
    assert_eq!(shape(t.view(fork), VertexId::ACCOUNTS), fork_shape);
    assert_eq!(shape(t.view(centre), VertexId::ACCOUNTS), centre_shape);
}

fn label_of(vid: VertexId) -> HashLabel {
    let hash = blake3::hash(&vid.0.to_le_bytes());
    HashLabel::new(VertexId::ACCOUNTS, HashKey(*hash.as_bytes()))
}

/// Label every vertex on the way to each of `paths`.
fn label_paths(view: &mut View, paths: &[NibblePath]) {
    for path in paths {
        let hike = view.hike(VertexId::ACCOUNTS, path).unwrap();
        for leg in hike.legs {
            view.put_label(leg.vid, Some(label_of(leg.vid))).unwrap();
        }
    }
}

/// Everything a view reports about `vids` and `ties`: labels, label index and leaf lookups.
fn observe(
    t: &Test,
    id: ViewId,
    vids: &[VertexId],
    ties: &[LeafTie],
) -> Vec<(Option<HashLabel>, usize, Option<VertexId>)> {
    let view = t.view(id);
    let mut seen = vids
        .iter()
        .map(|vid| {
            (
                view.get_label(*vid).unwrap(),
                view.vids_by_label(&label_of(*vid)).len(),
                None,
            )
        })
        .collect::<Vec<_>>();
    seen.extend(
        ties.iter()
            .map(|tie| (None, 0, t.group.leaf_vid(id, tie).unwrap())),
    );
    seen
}

#[test]
fn siblings_are_isolated_from_persist() {
    let mut t = Test::new();
    let centre = t.centre();
    let paths = (0..16).map(account_path).collect::<Vec<_>>();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..16));
    label_paths(t.view_mut(centre), &paths);
    t.persist(centre).unwrap();

    let idle = t.fork(centre);
    let busy = t.fork(centre);
    t.build(busy, VertexId(200), &[(nibbles(&[3]), value(3))]);
    t.view_mut(busy).stow().unwrap();

    for id in 0..8 {
        t.delete(centre, VertexId::ACCOUNTS, &account_path(id))
            .unwrap();
    }
    let top = t.view(centre).layers().top().delta();
    let mut touched = top
        .vertices()
        .keys()
        .chain(top.labels().keys())
        .copied()
        .collect::<Vec<_>>();
    touched.sort();
    touched.dedup();
    let ties = paths
        .iter()
        .map(|path| LeafTie {
            root: VertexId::ACCOUNTS,
            path: path.clone(),
        })
        .collect::<Vec<_>>();

    let idle_before = shape(t.view(idle), VertexId::ACCOUNTS);
    let busy_before = shape(t.view(busy), VertexId::ACCOUNTS);
    let busy_storage = shape(t.view(busy), VertexId(200));
    let centre_before = shape(t.view(centre), VertexId::ACCOUNTS);
    assert_ne!(idle_before, centre_before);
    let idle_seen = observe(&t, idle, &touched, &ties);
    let busy_seen = observe(&t, busy, &touched, &ties);
    assert!(idle_seen.iter().rev().take(16).all(|(_, _, vid)| vid.is_some()));

    t.persist(centre).unwrap();

    assert_eq!(shape(t.view(idle), VertexId::ACCOUNTS), idle_before);
    assert_eq!(shape(t.view(busy), VertexId::ACCOUNTS), busy_before);
    assert_eq!(shape(t.view(busy), VertexId(200)), busy_storage);
    assert_eq!(shape(t.view(centre), VertexId::ACCOUNTS), centre_before);
    assert_eq!(observe(&t, idle, &touched, &ties), idle_seen);
    assert_eq!(observe(&t, busy, &touched, &ties), busy_seen);
    for id in [idle, busy] {
        t.view(id)
            .hike(VertexId::ACCOUNTS, &account_path(0))
            .unwrap();
    }
    for tie in &ties[..8] {
        assert_eq!(t.group.leaf_vid(centre, tie).unwrap(), None);
    }
    for tie in &ties[8..] {
        let vid = t.group.leaf_vid(centre, tie).unwrap().unwrap();
        assert_eq!(t.view(centre).hike(VertexId::ACCOUNTS, &tie.path).unwrap().last().unwrap().vid, vid);
    }
}

#[test]
fn cached_leaves_stay_hidden_from_siblings() {
    let mut t = Test::new();
    let centre = t.centre();
    let sibling = t.fork(centre);
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..4));
    let tie = LeafTie {
        root: VertexId::ACCOUNTS,
        path: account_path(0),
    };
    assert_eq!(t.group.leaf_vid(sibling, &tie).unwrap(), None);

    t.persist(centre).unwrap();

    assert!(t.group.leaf_cache().contains_key(&tie));
    assert!(t.group.leaf_vid(centre, &tie).unwrap().is_some());
    assert_eq!(t.group.leaf_vid(sibling, &tie).unwrap(), None);
    assert_eq!(shape(t.view(sibling), VertexId::ACCOUNTS), None);
}

#[test]
fn recycled_id_survives_dropped_subtree() {
    let mut t = Test::new();
    let centre = t.centre();
    let root = VertexId(50);
    t.build(
        centre,
        root,
        &[
            (nibbles(&[0]), value(0)),
            (nibbles(&[1]), value(1)),
            (nibbles(&[2]), value(2)),
        ],
    );
    t.persist(centre).unwrap();

    // free the first leaf and hand its ID to an unrelated trie.
    let freed = t
        .view(centre)
        .hike(root, &nibbles(&[0]))
        .unwrap()
        .last()
        .unwrap()
        .vid;
    t.delete(centre, root, &nibbles(&[0])).unwrap();
    let recycled = t.view_mut(centre).new_vid();
    assert_eq!(recycled, freed);
    t.build(centre, recycled, &[(nibbles(&[7]), value(7))]);
    let expected = t.read(centre, recycled);
    assert!(expected.is_some());

    t.view_mut(centre).delete_subtree(root).unwrap();
    t.persist(centre).unwrap();

    assert_eq!(t.read(centre, recycled), expected);
    let dump = t.backend.dump();
    assert_eq!(dump.vertices.get(&recycled), expected.as_ref());
    assert_eq!(dump.vertices.len(), 1);
    assert!(!dump.id_gen.free().contains(&recycled));
    assert_ne!(t.view_mut(centre).new_vid(), recycled);
}

#[test]
fn dropped_subtree_leaves_are_forgotten() {
    let mut t = Test::new();
    let centre = t.centre();
    let root = VertexId(50);
    t.build(
        centre,
        root,
        &[(short_path(1), value(1)), (short_path(2), value(2))],
    );
    t.persist(centre).unwrap();
    let tie = LeafTie {
        root,
        path: short_path(1),
    };
    assert!(t.group.leaf_vid(centre, &tie).unwrap().is_some());

    t.view_mut(centre).delete_subtree(root).unwrap();
    assert_eq!(t.group.leaf_vid(centre, &tie).unwrap(), None);

    t.persist(centre).unwrap();
    assert!(t.backend.dump().vertices.is_empty());
    assert!(!t.group.leaf_cache().contains_key(&tie));
    assert_eq!(t.group.leaf_vid(centre, &tie).unwrap(), None);
    assert_eq!(t.group.leaf_cache().len(), (0, 0));
}

#[test]
fn persist_prunes_leaf_table() {
    let mut t = Test::new();
    let centre = t.centre();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..8));
    assert_eq!(t.view(centre).layers().final_state().leaves().len(), 8);
    t.persist(centre).unwrap();
    assert!(t.view(centre).layers().final_state().leaves().is_empty());

    let tie = |id| LeafTie {
        root: VertexId::ACCOUNTS,
        path: account_path(id),
    };
    for id in 0..8 {
        assert!(t.group.leaf_vid(centre, &tie(id)).unwrap().is_some());
    }

    t.delete(centre, VertexId::ACCOUNTS, &account_path(0)).unwrap();
    assert_eq!(
        t.view(centre).leaf_vid(&tie(0)),
        Some(VertexId::VOID)
    );
    t.persist(centre).unwrap();
    assert!(t.view(centre).layers().final_state().leaves().is_empty());
    assert_eq!(t.group.leaf_vid(centre, &tie(0)).unwrap(), None);
    for id in 1..8 {
        let vid = t.group.leaf_vid(centre, &tie(id)).unwrap().unwrap();
        let hike = t.view(centre).hike(VertexId::ACCOUNTS, &account_path(id)).unwrap();
        assert_eq!(hike.last().unwrap().vid, vid);
    }
}

#[test]
fn dropped_subtree_is_removed() {
    let mut t = Test::new();
    let centre = t.centre();
    let root = t.view_mut(centre).new_vid();
    let entries = [
        (short_path(0x0001), value(1)),
        (short_path(0x0002), value(2)),
        (short_path(0x1000), value(3)),
    ];
    t.build(centre, root, &entries);
    t.persist(centre).unwrap();
    let stored = t.backend.dump().vertices.len();
    assert_eq!(stored, 6);

    let sibling = t.fork(centre);
    let expected = shape(t.view(sibling), root);

    t.view_mut(centre).delete_subtree(root).unwrap();
    t.persist(centre).unwrap();

    let dump = t.backend.dump();
    assert!(dump.vertices.is_empty());
    // every ID of the subtree went back to the allocator.
    assert_eq!(dump.id_gen, IdGen::default());
    assert_eq!(t.view_mut(centre).new_vid(), root);

    assert_eq!(shape(t.view(centre), root), None);
    assert_eq!(shape(t.view(sibling), root), expected);
}

#[test]
fn recreated_subtree_root_survives() {
    let mut t = Test::new();
    let centre = t.centre();
    let root = VertexId(50);
    t.build(
        centre,
        root,
        &[(short_path(0x0001), value(1)), (short_path(0x0002), value(2))],
    );
    t.persist(centre).unwrap();

    t.view_mut(centre).delete_subtree(root).unwrap();
    t.build(centre, root, &[(short_path(0x0003), value(3))]);
    let expected = shape(t.view(centre), root);
    t.persist(centre).unwrap();

    let dump = t.backend.dump();
    assert_eq!(dump.vertices.len(), 1);
    assert!(dump.vertices.contains_key(&root));
    assert_eq!(shape(t.view(centre), root), expected);
}

#[test]
fn persisted_leaves_enter_cache() {
    let mut options = Options::new();
    options.account_cache_size(2);
    let mut t = Test::with_options(options);
    let centre = t.centre();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..4));
    t.build(
        centre,
        VertexId(90),
        &[(short_path(1), value(1)), (short_path(2), value(2))],
    );
    assert_eq!(t.group.leaf_cache().len(), (0, 0));

    t.persist(centre).unwrap();
    assert_eq!(t.group.leaf_cache().len(), (2, 2));

    let tie = LeafTie {
        root: VertexId(90),
        path: short_path(1),
    };
    let cached = t.group.leaf_cache().get(&tie).unwrap();
    assert_eq!(cached.payload, value(1));
    assert_eq!(
        t.read(centre, cached.vid),
        Some(Vertex::Leaf {
            prefix: nibbles(&[]),
            payload: value(1),
        })
    );
}

#[test]
fn allocator_state_is_persisted() {
    let mut t = Test::new();
    let centre = t.centre();
    t.build(centre, VertexId::ACCOUNTS, &accounts(0..4));
    t.group.persist(centre, Some(VertexId(1000)), false).unwrap();
    assert_eq!(t.backend.dump().id_gen.next(), VertexId(1000));
    assert_eq!(
        t.view(centre).layers().final_state().id_gen().next(),
        VertexId(1000)
    );
    assert_eq!(t.view_mut(centre).new_vid(), VertexId(1000));

    // a lower bound never lowers the high-water mark.
    t.build(centre, VertexId(300), &[(nibbles(&[1]), value(1))]);
    t.group.persist(centre, Some(VertexId(10)), false).unwrap();
    assert_eq!(t.backend.dump().id_gen.next(), VertexId(1001));
}
