//! Blueprint-style mesh queries over [`Node`](crate::tree::Node) trees.
//!
//! Conventions: `coordsets/<name>/type ∈ {uniform, rectilinear, explicit}`,
//! `topologies/<name>/type ∈ {uniform, rectilinear, structured, unstructured}`,
//! `fields/<name>/{association, topology, values}`, `state/{cycle, time,
//! domain_id}`. Logical vertex numbering is row-major with `i` fastest.

pub mod coordset;
pub mod topology;

pub use topology::TopoKind;

use crate::tree::Node;

/// Normalize an input tree to its list of domains.
///
/// A node with a `coordsets` child is a single domain; otherwise every child
/// carrying one is a domain, in child order.
pub fn domains(mesh: &Node) -> Vec<&Node> {
    if mesh.has_child("coordsets") {
        return vec![mesh];
    }
    mesh.children()
        .filter(|(_, c)| c.has_child("coordsets"))
        .map(|(_, c)| c)
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::uniform_mesh_2d;

    #[test]
    fn single_domain_normalization() {
        let m = uniform_mesh_2d(2, 2);
        assert_eq!(domains(&m).len(), 1);
    }

    #[test]
    fn multi_domain_normalization_keeps_order() {
        let mut multi = Node::new();
        multi.set_child("domain_000000", uniform_mesh_2d(2, 2));
        multi.set_child("domain_000001", uniform_mesh_2d(3, 3));
        let doms = domains(&multi);
        assert_eq!(doms.len(), 2);
        assert_eq!(doms[0].fetch_i64("coordsets/coords/dims/i"), Some(3));
        assert_eq!(doms[1].fetch_i64("coordsets/coords/dims/i"), Some(4));
    }
}
