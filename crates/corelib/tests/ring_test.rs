//! Tests for ring topology and ring state.
//!
//! # Test Strategy
//!
//! 1. **Basic functionality**: single node, two nodes, three nodes
//! 2. **Properties**: cycle closure and predecessor/successor symmetry
//! 3. **Membership churn**: joins, leaves, missing local node

use corelib::node::NodeId;
use corelib::ring::{recompute_ring, Direction, RingState};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Instant;

fn n(i: u64) -> NodeId {
    NodeId::from_index(i)
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[test]
fn test_single_node_is_its_own_neighbour() {
    let view = recompute_ring(&[n(1)], &n(1)).unwrap();
    assert_eq!(view.predecessor, n(1));
    assert_eq!(view.successor, n(1));
    assert!(view.is_solo());
}

#[test]
fn test_two_node_symmetry() {
    let active = [n(1), n(2)];
    let one = recompute_ring(&active, &n(1)).unwrap();
    let two = recompute_ring(&active, &n(2)).unwrap();

    assert_eq!(one.successor, n(2));
    assert_eq!(one.predecessor, n(2));
    assert_eq!(two.successor, n(1));
    assert_eq!(two.predecessor, n(1));
}

#[test]
fn test_join_order_does_not_matter() {
    let a = recompute_ring(&[n(3), n(1), n(2)], &n(1)).unwrap();
    let b = recompute_ring(&[n(1), n(2), n(3)], &n(1)).unwrap();
    assert_eq!(a, b);
}

// ============================================================================
// Membership Churn
// ============================================================================

#[test]
fn test_join_then_leave_restores_view() {
    let now = Instant::now();
    let mut state = RingState::new(n(1), now);
    state.add_member(n(1));
    state.add_member(n(3));
    let before = state.recompute(now).unwrap().current;

    state.add_member(n(2));
    let joined = state.recompute(now).unwrap();
    assert_eq!(joined.current.successor, n(2));
    assert!(joined.successor_changed());

    state.remove_member(&n(2));
    let left = state.recompute(now).unwrap();
    assert_eq!(left.current, before);
}

#[test]
fn test_crash_of_middle_node_links_outer_nodes() {
    let now = Instant::now();
    let mut first = RingState::new(n(1), now);
    let mut third = RingState::new(n(3), now);
    for state in [&mut first, &mut third] {
        for i in 1..=3 {
            state.add_member(n(i));
        }
        state.recompute(now).unwrap();
        state.remove_member(&n(2));
        state.recompute(now).unwrap();
    }

    assert_eq!(first.successor(), Some(&n(3)));
    assert_eq!(first.predecessor(), Some(&n(3)));
    assert_eq!(third.successor(), Some(&n(1)));
    assert_eq!(third.predecessor(), Some(&n(1)));
}

#[test]
fn test_not_yet_announced_has_no_view() {
    let now = Instant::now();
    let mut state = RingState::new(n(5), now);
    state.add_member(n(1));
    assert!(state.recompute(now).is_err());
    assert!(state.view().is_none());
    assert_eq!(state.record_miss(Direction::Successor), None);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_successor_walk_closes_cycle(indices in prop::collection::btree_set(0u64..500, 1..24)) {
        let active: Vec<NodeId> = indices.iter().copied().map(NodeId::from_index).collect();
        let k = active.len();

        for start in &active {
            let mut current = start.clone();
            let mut seen = BTreeSet::new();
            for _ in 0..k {
                seen.insert(current.clone());
                current = recompute_ring(&active, &current).unwrap().successor;
            }
            prop_assert_eq!(&current, start);
            prop_assert_eq!(seen.len(), k);
        }
    }

    #[test]
    fn prop_predecessor_inverts_successor(indices in prop::collection::btree_set(0u64..500, 1..24)) {
        let active: Vec<NodeId> = indices.iter().copied().map(NodeId::from_index).collect();
        for node in &active {
            let view = recompute_ring(&active, node).unwrap();
            let back = recompute_ring(&active, &view.successor).unwrap();
            prop_assert_eq!(&back.predecessor, node);
        }
    }
}
