//! Field-driven selection: a named element field stamps the destination
//! domain of every element.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::RepartError;
use crate::mesh::topology;
use crate::tree::Node;

use super::{ExplicitSelection, Selection, SelectionCore};

/// Selects a whole topology whose per-element destinations come from the
/// integer values of a named field.
#[derive(Debug, Default)]
pub struct FieldSelection {
    core: SelectionCore,
    field: String,
}

impl FieldSelection {
    pub fn field_name(&self) -> &str {
        &self.field
    }

    fn field_node<'m>(&self, mesh: &'m Node) -> Option<&'m Node> {
        mesh.fetch(&format!("fields/{}", self.field))
    }
}

impl Selection for FieldSelection {
    fn core(&self) -> &SelectionCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut SelectionCore {
        &mut self.core
    }
    fn kind_name(&self) -> &'static str {
        "field"
    }

    fn init(&mut self, options: &Node) -> Result<(), RepartError> {
        self.core.init_common(options)?;
        self.field = options
            .fetch_str("field")
            .ok_or_else(|| RepartError::Options("field selection requires a `field` name".into()))?
            .to_string();
        Ok(())
    }

    fn applicable(&self, mesh: &Node) -> bool {
        let Ok((topo_name, _)) = self.selected_topology(mesh) else {
            return false;
        };
        let Some(field) = self.field_node(mesh) else {
            return false;
        };
        field.fetch_str("association") == Some("element")
            && field.fetch_str("topology").map_or(true, |t| t == topo_name)
    }

    fn length(&self, mesh: &Node) -> usize {
        let Ok((_, topo)) = self.selected_topology(mesh) else {
            return 0;
        };
        topology::num_elements(mesh, topo).unwrap_or(0)
    }

    /// One sub-selection per distinct field value, ascending; each carries
    /// `destination_domain` set to that value. Data-driven: the target
    /// count has no influence here.
    fn partition(&self, mesh: &Node) -> Result<Vec<Box<dyn Selection>>, RepartError> {
        let field = self.field_node(mesh).ok_or_else(|| {
            RepartError::Options(format!("selection field `{}` does not exist", self.field))
        })?;
        let values = field
            .fetch_value("values")
            .and_then(|v| v.to_i64_vec())
            .ok_or_else(|| {
                RepartError::Options(format!(
                    "selection field `{}` has no integer values",
                    self.field
                ))
            })?;
        let mut by_value: BTreeMap<i64, Vec<u64>> = BTreeMap::new();
        for (e, &v) in values.iter().enumerate() {
            by_value.entry(v).or_default().push(e as u64);
        }
        let mut subs: Vec<Box<dyn Selection>> = Vec::with_capacity(by_value.len());
        for (value, ids) in by_value {
            let mut core = self.core.child();
            core.destination_domain = value as i32;
            subs.push(Box::new(ExplicitSelection::from_ids(core, ids)));
        }
        Ok(subs)
    }

    fn element_ids_for_topo(&self, mesh: &Node, erange: (usize, usize)) -> Vec<usize> {
        let n = self.length(mesh);
        (erange.0..=erange.1.min(n.saturating_sub(1))).collect()
    }

    fn determine_is_whole(&self, _mesh: &Node) -> bool {
        // covers every element of its topology by construction
        true
    }

    fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(
            out,
            "{{type: field, domain: {}, topology: \"{}\", field: \"{}\"}}",
            self.core.domain, self.core.topology, self.field
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::{tri_fan_mesh, with_element_field};

    fn fan_with_part() -> Node {
        let mut mesh = tri_fan_mesh(12);
        with_element_field(&mut mesh, "part", vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2]);
        mesh
    }

    fn part_selection() -> FieldSelection {
        let mut sel = FieldSelection::default();
        let mut opts = Node::new();
        opts.entry("field").set("part");
        sel.init(&opts).unwrap();
        sel
    }

    #[test]
    fn applicable_requires_existing_element_field() {
        let mesh = fan_with_part();
        assert!(part_selection().applicable(&mesh));
        let mut other = FieldSelection::default();
        let mut opts = Node::new();
        opts.entry("field").set("missing");
        other.init(&opts).unwrap();
        assert!(!other.applicable(&mesh));
    }

    #[test]
    fn partition_stamps_destination_per_distinct_value() {
        let mesh = fan_with_part();
        let sel = part_selection();
        let subs = sel.partition(&mesh).unwrap();
        assert_eq!(subs.len(), 3);
        for (i, sub) in subs.iter().enumerate() {
            assert_eq!(sub.core().destination_domain, i as i32);
            assert_eq!(sub.length(&mesh), 4);
        }
        // union of sub ids covers the parent exactly
        let mut ids: Vec<usize> = subs
            .iter()
            .flat_map(|s| s.element_ids_for_topo(&mesh, (0, 11)))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn length_is_topology_length() {
        let mesh = fan_with_part();
        let sel = part_selection();
        assert_eq!(sel.length(&mesh), 12);
        assert!(sel.determine_is_whole(&mesh));
    }
}
