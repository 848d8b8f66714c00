//! Explicit element-id list selection.

use std::fmt;

use crate::error::RepartError;
use crate::tree::Node;

use super::{Selection, SelectionCore};

/// Selects elements by an explicit id list; applicable to any topology.
#[derive(Debug, Default)]
pub struct ExplicitSelection {
    core: SelectionCore,
    elements: Vec<u64>,
}

impl ExplicitSelection {
    /// A selection over the given ids, inheriting `core`.
    pub(crate) fn from_ids(core: SelectionCore, elements: Vec<u64>) -> Self {
        ExplicitSelection { core, elements }
    }

    pub fn elements(&self) -> &[u64] {
        &self.elements
    }
}

impl Selection for ExplicitSelection {
    fn core(&self) -> &SelectionCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut SelectionCore {
        &mut self.core
    }
    fn kind_name(&self) -> &'static str {
        "explicit"
    }

    fn init(&mut self, options: &Node) -> Result<(), RepartError> {
        self.core.init_common(options)?;
        let vals = options
            .fetch_value("elements")
            .and_then(|v| v.to_i64_vec())
            .ok_or_else(|| {
                RepartError::Options("explicit selection requires an `elements` integer array".into())
            })?;
        if vals.iter().any(|&v| v < 0) {
            return Err(RepartError::Options(
                "explicit selection element ids must be non-negative".into(),
            ));
        }
        self.elements = vals.into_iter().map(|v| v as u64).collect();
        Ok(())
    }

    fn applicable(&self, mesh: &Node) -> bool {
        self.selected_topology(mesh).is_ok()
    }

    fn length(&self, _mesh: &Node) -> usize {
        self.elements.len()
    }

    /// Splits the id list at its midpoint; the lower half gets the extra
    /// element when the count is odd.
    fn partition(&self, _mesh: &Node) -> Result<Vec<Box<dyn Selection>>, RepartError> {
        let n = self.elements.len();
        if n < 2 {
            return Err(RepartError::Invariant(
                "explicit selection with fewer than two elements cannot be split".into(),
            ));
        }
        let cut = n - n / 2;
        Ok(vec![
            Box::new(ExplicitSelection::from_ids(
                self.core.child(),
                self.elements[..cut].to_vec(),
            )),
            Box::new(ExplicitSelection::from_ids(
                self.core.child(),
                self.elements[cut..].to_vec(),
            )),
        ])
    }

    fn element_ids_for_topo(&self, _mesh: &Node, erange: (usize, usize)) -> Vec<usize> {
        self.elements
            .iter()
            .map(|&e| e as usize)
            .filter(|&e| e >= erange.0 && e <= erange.1)
            .collect()
    }

    fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(
            out,
            "{{type: explicit, domain: {}, topology: \"{}\", elements: {}}}",
            self.core.domain,
            self.core.topology,
            self.elements.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::tri_fan_mesh;

    fn sel_with(ids: &[i64]) -> ExplicitSelection {
        let mut sel = ExplicitSelection::default();
        let mut opts = Node::new();
        opts.entry("elements").set(ids.to_vec());
        sel.init(&opts).unwrap();
        sel
    }

    #[test]
    fn split_at_midpoint_lower_half_larger() {
        let mesh = tri_fan_mesh(7);
        let sel = sel_with(&[0, 2, 4, 6, 1, 3, 5]);
        let subs = sel.partition(&mesh).unwrap();
        assert_eq!(subs[0].length(&mesh), 4);
        assert_eq!(subs[1].length(&mesh), 3);
        let total: usize = subs.iter().map(|s| s.length(&mesh)).sum();
        assert_eq!(total, sel.length(&mesh));
    }

    #[test]
    fn enumeration_respects_range() {
        let mesh = tri_fan_mesh(7);
        let sel = sel_with(&[0, 2, 4, 6]);
        assert_eq!(sel.element_ids_for_topo(&mesh, (0, 6)), vec![0, 2, 4, 6]);
        assert_eq!(sel.element_ids_for_topo(&mesh, (2, 5)), vec![2, 4]);
    }

    #[test]
    fn whole_only_when_every_element_listed() {
        let mesh = tri_fan_mesh(4);
        assert!(sel_with(&[0, 1, 2, 3]).determine_is_whole(&mesh));
        assert!(!sel_with(&[0, 1, 2]).determine_is_whole(&mesh));
    }

    #[test]
    fn init_rejects_negative_ids() {
        let mut sel = ExplicitSelection::default();
        let mut opts = Node::new();
        opts.entry("elements").set(vec![3i64, -1]);
        assert!(sel.init(&opts).is_err());
    }
}
