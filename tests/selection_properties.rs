//! Property tests for the selection algebra: splitting preserves length and
//! covers the parent's element ids without overlap.

use std::collections::BTreeSet;

use proptest::prelude::*;

use mesh_repart::prelude::*;

fn tri_mesh(n: usize) -> Node {
    let mut mesh = Node::new();
    let nverts = n + 2;
    let x: Vec<f64> = (0..nverts).map(|i| i as f64).collect();
    let y: Vec<f64> = (0..nverts).map(|i| (i % 2) as f64).collect();
    let cs = mesh.entry_path("coordsets/coords");
    cs.entry("type").set("explicit");
    cs.entry_path("values/x").set(x);
    cs.entry_path("values/y").set(y);
    let topo = mesh.entry_path("topologies/mesh");
    topo.entry("type").set("unstructured");
    topo.entry("coordset").set("coords");
    topo.entry_path("elements/shape").set("tri");
    let mut conn = Vec::with_capacity(3 * n);
    for e in 0..n as u64 {
        conn.extend_from_slice(&[0, e + 1, e + 2]);
    }
    topo.entry_path("elements/connectivity").set(conn);
    mesh
}

fn grid_mesh(nx: usize, ny: usize) -> Node {
    let mut mesh = Node::new();
    let cs = mesh.entry_path("coordsets/coords");
    cs.entry("type").set("uniform");
    cs.entry_path("dims/i").set((nx + 1) as i64);
    cs.entry_path("dims/j").set((ny + 1) as i64);
    let topo = mesh.entry_path("topologies/mesh");
    topo.entry("type").set("uniform");
    topo.entry("coordset").set("coords");
    mesh
}

/// Split `sel` all the way down and check the invariants at every level.
fn check_recursive(sel: &dyn Selection, mesh: &Node, nelem: usize, depth: usize) {
    let parent_len = sel.length(mesh);
    let parent_ids: Vec<usize> = sel.element_ids_for_topo(mesh, (0, nelem - 1));
    assert_eq!(parent_ids.len(), parent_len);
    if parent_len <= 1 || depth == 0 {
        return;
    }

    let subs = sel.partition(mesh).unwrap();
    assert!(subs.len() >= 2);
    let sub_len_sum: usize = subs.iter().map(|s| s.length(mesh)).sum();
    assert_eq!(sub_len_sum, parent_len, "length is split-invariant");

    let mut union = BTreeSet::new();
    for sub in &subs {
        assert!(sub.length(mesh) < parent_len, "children strictly shrink");
        for id in sub.element_ids_for_topo(mesh, (0, nelem - 1)) {
            assert!(union.insert(id), "element {id} appears in two children");
        }
    }
    let expect: BTreeSet<usize> = parent_ids.into_iter().collect();
    assert_eq!(union, expect, "children cover the parent exactly");

    for sub in &subs {
        check_recursive(sub.as_ref(), mesh, nelem, depth - 1);
    }
}

proptest! {
    #[test]
    fn explicit_split_invariants(ids in proptest::collection::btree_set(0u64..60, 2..40)) {
        let mesh = tri_mesh(60);
        let mut sel = create_selection("explicit").unwrap();
        let mut opts = Node::new();
        opts.entry("elements").set(ids.iter().map(|&v| v as i64).collect::<Vec<_>>());
        sel.init(&opts).unwrap();
        check_recursive(sel.as_ref(), &mesh, 60, 8);
    }

    #[test]
    fn ranges_split_invariants(cuts in proptest::collection::btree_set(0u64..80, 2..16)) {
        // build disjoint inclusive ranges from sorted breakpoints
        let points: Vec<u64> = cuts.into_iter().collect();
        let mut flat = Vec::new();
        for pair in points.chunks_exact(2) {
            flat.push(pair[0] as i64);
            flat.push(pair[1] as i64);
        }
        prop_assume!(!flat.is_empty());
        let mesh = tri_mesh(80);
        let mut sel = create_selection("ranges").unwrap();
        let mut opts = Node::new();
        opts.entry("ranges").set(flat);
        sel.init(&opts).unwrap();
        check_recursive(sel.as_ref(), &mesh, 80, 8);
    }

    #[test]
    fn logical_split_invariants(nx in 1usize..12, ny in 1usize..12) {
        prop_assume!(nx * ny > 1);
        let mesh = grid_mesh(nx, ny);
        let sel = create_selection_all_elements(&mesh).unwrap();
        check_recursive(sel.as_ref(), &mesh, nx * ny, 10);
    }
}

#[test]
fn field_split_covers_without_overlap() {
    let mut mesh = tri_mesh(20);
    let values: Vec<i64> = (0..20).map(|e| e % 4).collect();
    let f = mesh.entry_path("fields/part");
    f.entry("association").set("element");
    f.entry("topology").set("mesh");
    f.entry("values").set(values);

    let mut sel = create_selection("field").unwrap();
    let mut opts = Node::new();
    opts.entry("field").set("part");
    sel.init(&opts).unwrap();

    let subs = sel.partition(&mesh).unwrap();
    assert_eq!(subs.len(), 4);
    let total: usize = subs.iter().map(|s| s.length(&mesh)).sum();
    assert_eq!(total, sel.length(&mesh));
    let mut union = BTreeSet::new();
    for sub in &subs {
        for id in sub.element_ids_for_topo(&mesh, (0, 19)) {
            assert!(union.insert(id));
        }
    }
    assert_eq!(union.len(), 20);
}
