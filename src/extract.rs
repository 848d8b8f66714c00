//! Chunk extraction: materialize the subset of a mesh chosen by a selection
//! as a new mesh with an explicit coordset, an unstructured topology, sliced
//! fields, and optional original-id mapping fields.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::error::RepartError;
use crate::mesh::{coordset, topology};
use crate::selection::Selection;
use crate::tree::Node;

/// Name of the element-associated mapping field emitted when
/// `preserve_mapping` is set.
pub const ORIGINAL_ELEMENT_IDS: &str = "original_element_ids";
/// Name of the vertex-associated mapping field.
pub const ORIGINAL_VERTEX_IDS: &str = "original_vertex_ids";

/// Extract the cells chosen by `sel` from `mesh` into a fresh mesh tree.
///
/// `selected_fields` filters which fields are carried; empty means all.
/// The source mesh is never modified.
pub fn extract(
    sel: &dyn Selection,
    mesh: &Node,
    selected_fields: &[String],
) -> Result<Node, RepartError> {
    let (topo_name, topo) = sel.selected_topology(mesh)?;
    let (cs_name, cs) = topology::coordset_for(mesh, topo)?;

    let nelem = topology::num_elements(mesh, topo)?;
    if nelem == 0 {
        return Err(RepartError::Invariant(format!(
            "topology `{topo_name}` has no elements"
        )));
    }
    let element_ids = sel.element_ids_for_topo(mesh, (0, nelem - 1));
    if element_ids.is_empty() {
        return Err(RepartError::Invariant(
            "selection chose no elements".into(),
        ));
    }

    let (shape, conn, sizes, offsets) = topology::unstructured_form(mesh, topo)?;

    // Ordered vertex set referenced by the selected elements, ascending.
    let mut vertex_set = BTreeSet::new();
    for &e in &element_ids {
        if e >= sizes.len() {
            return Err(RepartError::ElementOutOfRange {
                id: e,
                len: sizes.len(),
            });
        }
        for &v in &conn[offsets[e]..offsets[e] + sizes[e]] {
            vertex_set.insert(v as usize);
        }
    }
    let vertex_ids: Vec<usize> = vertex_set.into_iter().collect();
    let mut vertex_index: HashMap<usize, u64> = HashMap::with_capacity(vertex_ids.len());
    for (new, &old) in vertex_ids.iter().enumerate() {
        vertex_index.insert(old, new as u64);
    }

    let mut out = Node::new();
    out.entry("coordsets")
        .set_child(cs_name, coordset::gather_explicit(cs, &vertex_ids)?);

    let out_topo = out.entry("topologies").entry(topo_name);
    out_topo.entry("type").set("unstructured");
    out_topo.entry("coordset").set(cs_name.to_string());
    out_topo.entry_path("elements/shape").set(shape);
    let mut new_conn = Vec::new();
    let mut new_sizes = Vec::with_capacity(element_ids.len());
    let mut new_offsets = Vec::with_capacity(element_ids.len());
    for &e in &element_ids {
        new_offsets.push(new_conn.len() as i64);
        new_sizes.push(sizes[e] as i64);
        for &v in &conn[offsets[e]..offsets[e] + sizes[e]] {
            new_conn.push(vertex_index[&(v as usize)]);
        }
    }
    out_topo.entry_path("elements/connectivity").set(new_conn);
    out_topo.entry_path("elements/sizes").set(new_sizes);
    out_topo.entry_path("elements/offsets").set(new_offsets);

    copy_fields(
        mesh,
        topo_name,
        &element_ids,
        &vertex_ids,
        selected_fields,
        &mut out,
    )?;

    if sel.core().preserve_mapping {
        let f = out.entry("fields").entry(ORIGINAL_ELEMENT_IDS);
        f.entry("association").set("element");
        f.entry("topology").set(topo_name.to_string());
        f.entry("values")
            .set(element_ids.iter().map(|&e| e as u64).collect::<Vec<_>>());
        let f = out.entry("fields").entry(ORIGINAL_VERTEX_IDS);
        f.entry("association").set("vertex");
        f.entry("topology").set(topo_name.to_string());
        f.entry("values")
            .set(vertex_ids.iter().map(|&v| v as u64).collect::<Vec<_>>());
    }

    if let Some(cycle) = mesh.fetch("state/cycle") {
        out.entry_path("state/cycle").set(cycle.value().clone());
    }
    if let Some(time) = mesh.fetch("state/time") {
        out.entry_path("state/time").set(time.value().clone());
    }
    out.entry_path("state/domain_id")
        .set(sel.core().destination_domain as i64);

    Ok(out)
}

fn copy_fields(
    mesh: &Node,
    topo_name: &str,
    element_ids: &[usize],
    vertex_ids: &[usize],
    selected_fields: &[String],
    out: &mut Node,
) -> Result<(), RepartError> {
    let Some(fields) = mesh.child("fields") else {
        return Ok(());
    };
    for (name, field) in fields.children() {
        if field.fetch_str("topology").map_or(false, |t| t != topo_name) {
            continue;
        }
        if !selected_fields.is_empty() && !selected_fields.iter().any(|f| f == name) {
            continue;
        }
        let assoc = field.fetch_str("association").ok_or_else(|| {
            RepartError::MalformedMesh(format!("field `{name}` has no association"))
        })?;
        let values = field
            .fetch_value("values")
            .ok_or_else(|| RepartError::MalformedMesh(format!("field `{name}` has no values")))?;
        let sliced = match assoc {
            "element" => values.gather(element_ids),
            "vertex" => values.gather(vertex_ids),
            other => {
                return Err(RepartError::MalformedMesh(format!(
                    "field `{name}` has unknown association `{other}`"
                )))
            }
        };
        let out_field = out.entry("fields").entry(name);
        out_field.entry("association").set(assoc.to_string());
        out_field.entry("topology").set(topo_name.to_string());
        out_field.entry("values").set(sliced);
    }
    Ok(())
}
