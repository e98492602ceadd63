mod common;

use nalgebra::Point3;
use raybvh::scenes::random::Random;
use raybvh::{BuildKind, Bvh, BvhError, TriangleSoup};
use std::collections::HashSet;

fn leaves(bvh: &Bvh) -> Vec<u32> {
    let mut out = Vec::new();
    let mut stack = vec![0u32];
    while let Some(idx) = stack.pop() {
        let node = &bvh.nodes()[idx as usize];
        if node.is_leaf() {
            out.push(idx);
        } else {
            stack.push(node.left_first);
            stack.push(node.left_first + 1);
        }
    }
    out
}

fn leaf_prims(bvh: &Bvh, leaf: u32) -> &[u32] {
    let node = &bvh.nodes()[leaf as usize];
    let first = node.left_first as usize;
    &bvh.tri_indices()[first..first + node.tri_count as usize]
}

fn assert_well_formed(bvh: &Bvh) {
    let nodes = bvh.nodes();
    let mut stack = vec![0u32];
    while let Some(idx) = stack.pop() {
        let node = &nodes[idx as usize];
        if node.is_leaf() {
            for &prim in leaf_prims(bvh, idx) {
                let frag = bvh.fragments()[prim as usize].bounds();
                assert!(node.bounds.contains(&frag, 1e-5), "leaf {} does not hold prim {}", idx, prim);
            }
            continue;
        }
        // children sit after their parent, in the pair just past node 1
        assert!(node.left_first >= 2 && node.left_first > idx);
        assert!(node.left_first + 1 < bvh.used_nodes());
        for child in [node.left_first, node.left_first + 1] {
            assert!(node.bounds.contains(&nodes[child as usize].bounds, 1e-5));
            stack.push(child);
        }
    }
}

#[test]
fn every_primitive_is_referenced_once() {
    let verts = Random::triangles(1000, 21);
    for quick in [false, true] {
        let mut bvh = Bvh::new();
        if quick {
            bvh.build_quick(&verts).unwrap();
        } else {
            bvh.build(&verts).unwrap();
        }
        let mut seen: Vec<u32> = leaves(&bvh).into_iter().flat_map(|l| leaf_prims(&bvh, l).to_vec()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..1000).collect::<Vec<u32>>());
        assert_eq!(bvh.prim_count(0), 1000);
        assert_well_formed(&bvh);
    }
}

#[test]
fn spatial_build_covers_every_primitive() {
    let verts = Random::triangles(1000, 22);
    let mut bvh = Bvh::new();
    bvh.build_spatial(&verts).unwrap();
    assert_eq!(bvh.kind(), BuildKind::Spatial);
    assert!(!bvh.is_refittable());
    let seen: HashSet<u32> = leaves(&bvh).into_iter().flat_map(|l| leaf_prims(&bvh, l).to_vec()).collect();
    assert_eq!(seen.len(), 1000);
    assert!(seen.iter().all(|&p| p < 1000));
    // duplicates come out of the reserved slack
    assert!(bvh.prim_count(0) >= 1000);
    assert!(bvh.prim_count(0) <= 1000 + 250);
}

#[test]
fn builds_are_deterministic() {
    let verts = Random::triangles(700, 24);
    let mut a = Bvh::new();
    let mut b = Bvh::new();
    a.build(&verts).unwrap();
    b.build(&verts).unwrap();
    assert_eq!(a.used_nodes(), b.used_nodes());
    assert_eq!(a.nodes(), b.nodes());
    assert_eq!(a.tri_indices(), b.tri_indices());
}

#[test]
fn rebuilding_reuses_the_same_tree() {
    let verts = Random::triangles(300, 25);
    let mut bvh = Bvh::new();
    bvh.build_spatial(&Random::triangles(500, 26)).unwrap();
    bvh.build(&verts).unwrap();
    assert_eq!(bvh.kind(), BuildKind::Sah);
    assert!(bvh.is_refittable());
    assert_eq!(bvh.tri_count(), 300);
    assert_eq!(bvh.prim_count(0), 300);
    assert_well_formed(&bvh);
}

#[test]
fn malformed_input_is_rejected() {
    let mut bvh = Bvh::new();
    assert!(matches!(bvh.build(&[]), Err(BvhError::EmptyInput)));
    assert!(matches!(bvh.build_quick(&[]), Err(BvhError::EmptyInput)));
    assert!(matches!(bvh.build_spatial(&[]), Err(BvhError::EmptyInput)));
    assert!(matches!(bvh.build_over_boxes(&[]), Err(BvhError::EmptyInput)));
    let two = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
    assert!(matches!(bvh.build(&two), Err(BvhError::MalformedVertices { len: 2 })));
    assert!(!bvh.is_built());
}

#[test]
fn single_triangle_is_a_leaf_root() {
    let tri = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
    let mut bvh = Bvh::new();
    bvh.build(&tri).unwrap();
    let root = bvh.root().unwrap();
    assert!(root.is_leaf());
    assert_eq!(root.tri_count, 1);
    assert_eq!(bvh.node_count(), 1);
}

#[test]
fn optimize_lowers_cost_and_keeps_hits() {
    let verts = Random::triangles(1500, 26);
    let soup = TriangleSoup::new(&verts);
    let rays = common::rays(1500, 27);
    for quick in [false, true] {
        let mut bvh = Bvh::new();
        if quick {
            bvh.build_quick(&verts).unwrap();
        } else {
            bvh.build(&verts).unwrap();
        }
        let before = bvh.sah_cost();
        let mut expected: Vec<u32> = leaves(&bvh).into_iter().flat_map(|l| leaf_prims(&bvh, l).to_vec()).collect();
        bvh.optimize(2000).unwrap();
        assert!(bvh.sah_cost() <= before * (1.0 + 1e-5), "{} -> {}", before, bvh.sah_cost());
        if quick {
            assert!(bvh.sah_cost() < before);
        }
        assert_well_formed(&bvh);
        let mut seen: Vec<u32> = leaves(&bvh).into_iter().flat_map(|l| leaf_prims(&bvh, l).to_vec()).collect();
        expected.sort_unstable();
        seen.sort_unstable();
        assert_eq!(seen, expected);
        assert_eq!(common::mismatches(&soup, &bvh, &rays, 1e-4), 0);
    }
}

#[test]
fn optimize_after_merging_needs_compaction() {
    let mut bvh = Bvh::new();
    bvh.build(&Random::triangles(600, 28)).unwrap();
    if bvh.merge_leaves(8) > 0 {
        assert!(matches!(bvh.optimize(100), Err(BvhError::HasHoles)));
        bvh.compact().unwrap();
    }
    bvh.optimize(100).unwrap();
    bvh.refit().unwrap();
    assert_well_formed(&bvh);
}
