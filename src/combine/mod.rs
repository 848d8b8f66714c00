//! Mesh combining: merge the chunks destined for one output domain into a
//! single mesh, preferring the coarsest logically-structured kind when the
//! inputs tile a common grid and falling back to unstructured otherwise.

use crate::error::RepartError;
use crate::mesh::{coordset, topology};
use crate::tree::{DType, Node, Value};

/// A set of axis-aligned inputs that exactly tile a global grid.
struct GluedGrid {
    topo_name: String,
    cs_name: String,
    /// Global vertex coordinates per active axis.
    axes: Vec<Vec<f64>>,
    /// Per input, vertex-index offset of its box in the global grid.
    placements: Vec<[usize; 3]>,
}

impl GluedGrid {
    fn vertex_dims(&self) -> [usize; 3] {
        let mut d = [1usize; 3];
        for (a, axis) in self.axes.iter().enumerate() {
            d[a] = axis.len();
        }
        d
    }

    fn cell_dims(&self) -> [usize; 3] {
        let v = self.vertex_dims();
        [v[0].max(2) - 1, v[1].max(2) - 1, v[2].max(2) - 1]
    }
}

/// Recommend the topology kind a combined output should use:
/// `"uniform"`, `"rectilinear"`, or `"unstructured"`.
pub fn recommended_topology(inputs: &[&Node]) -> &'static str {
    match try_glue(inputs) {
        Some(grid) => {
            if grid.axes.iter().all(|axis| evenly_spaced(axis)) {
                "uniform"
            } else {
                "rectilinear"
            }
        }
        None => "unstructured",
    }
}

/// Merge `inputs` into a single mesh written into `output`, stamped with
/// `domain` as its domain id.
pub fn combine(domain: i32, inputs: &[&Node], output: &mut Node) -> Result<(), RepartError> {
    if inputs.is_empty() {
        return Err(RepartError::Combine("no inputs to combine".into()));
    }
    match try_glue(inputs) {
        Some(grid) => combine_as_structured(domain, inputs, &grid, output),
        None => combine_as_unstructured(domain, inputs, output),
    }?;
    copy_state(domain, inputs, output);
    Ok(())
}

fn copy_state(domain: i32, inputs: &[&Node], output: &mut Node) {
    for input in inputs {
        if let Some(cycle) = input.fetch("state/cycle") {
            output.entry_path("state/cycle").set(cycle.value().clone());
            break;
        }
    }
    for input in inputs {
        if let Some(time) = input.fetch("state/time") {
            output.entry_path("state/time").set(time.value().clone());
            break;
        }
    }
    output.entry_path("state/domain_id").set(domain as i64);
}

fn evenly_spaced(axis: &[f64]) -> bool {
    if axis.len() < 2 {
        return true;
    }
    let d0 = axis[1] - axis[0];
    axis.windows(2)
        .all(|w| ((w[1] - w[0]) - d0).abs() <= 1e-12 * d0.abs().max(1.0))
}

/// Attempt to tile the inputs onto one global grid. Succeeds only when every
/// input carries a single axis-aligned (uniform or rectilinear) topology of
/// a common name, each input's axis coordinates form a contiguous run of the
/// global axis (exact equality), and the input boxes cover every global cell
/// exactly once.
fn try_glue(inputs: &[&Node]) -> Option<GluedGrid> {
    let mut topo_name = None;
    let mut cs_name = None;
    let mut input_axes = Vec::with_capacity(inputs.len());
    for input in inputs {
        let topos = input.child("topologies")?;
        if topos.num_children() != 1 {
            return None;
        }
        let (name, topo) = topos.child_at(0)?;
        match topo_name {
            None => topo_name = Some(name.to_string()),
            Some(ref t) if t == name => {}
            _ => return None,
        }
        let kind = topology::kind(topo).ok()?;
        if !matches!(kind, topology::TopoKind::Uniform | topology::TopoKind::Rectilinear) {
            return None;
        }
        let (csn, cs) = topology::coordset_for(input, topo).ok()?;
        match cs_name {
            None => cs_name = Some(csn.to_string()),
            Some(ref c) if c == csn => {}
            _ => return None,
        }
        input_axes.push(coordset::axis_coords(cs).ok()?);
    }

    let naxes = input_axes.first()?.len();
    if input_axes.iter().any(|a| a.len() != naxes) {
        return None;
    }

    // Global axis = sorted union of all input coordinates, exact equality.
    let mut axes: Vec<Vec<f64>> = Vec::with_capacity(naxes);
    for a in 0..naxes {
        let mut merged: Vec<f64> = input_axes.iter().flat_map(|ia| ia[a].iter().copied()).collect();
        merged.sort_by(f64::total_cmp);
        merged.dedup();
        axes.push(merged);
    }

    // Each input must occupy a contiguous sub-range on every axis.
    let mut placements = Vec::with_capacity(inputs.len());
    for ia in &input_axes {
        let mut off = [0usize; 3];
        for a in 0..naxes {
            let pos = axes[a].iter().position(|&g| g == ia[a][0])?;
            if pos + ia[a].len() > axes[a].len() {
                return None;
            }
            if axes[a][pos..pos + ia[a].len()] != ia[a][..] {
                return None;
            }
            off[a] = pos;
        }
        placements.push(off);
    }

    let grid = GluedGrid {
        topo_name: topo_name?,
        cs_name: cs_name?,
        axes,
        placements,
    };

    // Exact tiling: every global cell covered once.
    let gcd = grid.cell_dims();
    let mut covered = vec![false; gcd[0] * gcd[1] * gcd[2]];
    for (p, ia) in input_axes.iter().enumerate() {
        let lcd = local_cell_dims(ia);
        let off = grid.placements[p];
        for k in 0..lcd[2] {
            for j in 0..lcd[1] {
                for i in 0..lcd[0] {
                    let g = (off[2] + k) * gcd[0] * gcd[1] + (off[1] + j) * gcd[0] + (off[0] + i);
                    if covered[g] {
                        return None;
                    }
                    covered[g] = true;
                }
            }
        }
    }
    if covered.iter().all(|&c| c) {
        Some(grid)
    } else {
        None
    }
}

fn local_cell_dims(axes: &[Vec<f64>]) -> [usize; 3] {
    let mut d = [1usize; 3];
    for (a, axis) in axes.iter().enumerate() {
        d[a] = axis.len().max(2) - 1;
    }
    d
}

fn local_vertex_dims(axes: &[Vec<f64>]) -> [usize; 3] {
    let mut d = [1usize; 3];
    for (a, axis) in axes.iter().enumerate() {
        d[a] = axis.len();
    }
    d
}

fn combine_as_structured(
    _domain: i32,
    inputs: &[&Node],
    grid: &GluedGrid,
    output: &mut Node,
) -> Result<(), RepartError> {
    let uniform = grid.axes.iter().all(|axis| evenly_spaced(axis));
    let cs = output.entry("coordsets").entry(&grid.cs_name);
    if uniform {
        cs.entry("type").set("uniform");
        for (a, axis) in grid.axes.iter().enumerate() {
            cs.entry_path(&format!("dims/{}", ["i", "j", "k"][a]))
                .set(axis.len() as i64);
            cs.entry_path(&format!("origin/{}", coordset::AXIS_NAMES[a]))
                .set(axis[0]);
            let spacing = if axis.len() > 1 { axis[1] - axis[0] } else { 1.0 };
            cs.entry_path(&format!("spacing/{}", ["dx", "dy", "dz"][a]))
                .set(spacing);
        }
    } else {
        cs.entry("type").set("rectilinear");
        for (a, axis) in grid.axes.iter().enumerate() {
            cs.entry_path(&format!("values/{}", coordset::AXIS_NAMES[a]))
                .set(axis.clone());
        }
    }

    let topo = output.entry("topologies").entry(&grid.topo_name);
    topo.entry("type")
        .set(if uniform { "uniform" } else { "rectilinear" });
    topo.entry("coordset").set(grid.cs_name.clone());

    // Scatter fields into the glued box by logical placement.
    let gvd = grid.vertex_dims();
    let gcd = grid.cell_dims();
    let input_axes: Vec<Vec<Vec<f64>>> = inputs
        .iter()
        .map(|input| {
            let (_, topo) = topology::resolve(input, &grid.topo_name)?;
            let (_, cs) = topology::coordset_for(input, topo)?;
            coordset::axis_coords(cs)
        })
        .collect::<Result<_, _>>()?;

    for field_name in field_names_for(inputs, &grid.topo_name) {
        let (assoc, dtype) = first_field_meta(inputs, &field_name)?;
        let total = match assoc.as_str() {
            "element" => gcd[0] * gcd[1] * gcd[2],
            _ => gvd[0] * gvd[1] * gvd[2],
        };
        let mut out_vals = Value::zeros(dtype, total);
        for (p, input) in inputs.iter().enumerate() {
            let Some(values) = input.fetch_value(&format!("fields/{field_name}/values")) else {
                continue;
            };
            let off = grid.placements[p];
            let (ldims, gdims) = match assoc.as_str() {
                "element" => (local_cell_dims(&input_axes[p]), gcd),
                _ => (local_vertex_dims(&input_axes[p]), gvd),
            };
            scatter_block(values, ldims, off, gdims, &mut out_vals)?;
        }
        let f = output.entry("fields").entry(&field_name);
        f.entry("association").set(assoc);
        f.entry("topology").set(grid.topo_name.clone());
        f.entry("values").set(out_vals);
    }
    Ok(())
}

/// Copy a row-major `ldims` block into position `off` of a row-major
/// `gdims` destination, preserving dtype.
fn scatter_block(
    src: &Value,
    ldims: [usize; 3],
    off: [usize; 3],
    gdims: [usize; 3],
    dst: &mut Value,
) -> Result<(), RepartError> {
    if src.dtype() != dst.dtype() {
        return Err(RepartError::Combine(format!(
            "field dtype mismatch: {:?} vs {:?}",
            src.dtype(),
            dst.dtype()
        )));
    }
    if src.len() != ldims[0] * ldims[1] * ldims[2] {
        return Err(RepartError::Combine(format!(
            "field length {} does not match block {:?}",
            src.len(),
            ldims
        )));
    }
    let mut l = 0usize;
    for k in 0..ldims[2] {
        for j in 0..ldims[1] {
            for i in 0..ldims[0] {
                let g = (off[2] + k) * gdims[0] * gdims[1] + (off[1] + j) * gdims[0] + (off[0] + i);
                copy_value_at(src, l, dst, g);
                l += 1;
            }
        }
    }
    Ok(())
}

fn copy_value_at(src: &Value, si: usize, dst: &mut Value, di: usize) {
    match (src, dst) {
        (Value::Int32(s), Value::Int32(d)) => d[di] = s[si],
        (Value::Int64(s), Value::Int64(d)) => d[di] = s[si],
        (Value::UInt64(s), Value::UInt64(d)) => d[di] = s[si],
        (Value::Float64(s), Value::Float64(d)) => d[di] = s[si],
        _ => {}
    }
}

/// Field names across inputs in first-appearance order.
fn field_names_for(inputs: &[&Node], topo_name: &str) -> Vec<String> {
    let mut names = Vec::new();
    for input in inputs {
        let Some(fields) = input.child("fields") else {
            continue;
        };
        for (name, field) in fields.children() {
            if field.fetch_str("topology").map_or(false, |t| t != topo_name) {
                continue;
            }
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn first_field_meta(inputs: &[&Node], name: &str) -> Result<(String, DType), RepartError> {
    for input in inputs {
        if let Some(field) = input.fetch(&format!("fields/{name}")) {
            let assoc = field
                .fetch_str("association")
                .ok_or_else(|| RepartError::MalformedMesh(format!("field `{name}` has no association")))?
                .to_string();
            let dtype = field
                .fetch_value("values")
                .ok_or_else(|| RepartError::MalformedMesh(format!("field `{name}` has no values")))?
                .dtype();
            return Ok((assoc, dtype));
        }
    }
    Err(RepartError::Combine(format!("field `{name}` not found")))
}

/// One input's topology flattened to explicit form for concatenation.
struct UnstructuredPiece {
    shape: String,
    conn: Vec<u64>,
    sizes: Vec<usize>,
    /// Explicit coordinate columns, keyed by axis name, in axis order.
    coords: Vec<(String, Value)>,
    nverts: usize,
    nelems: usize,
}

fn flatten_input(input: &Node, topo_name: &str) -> Result<UnstructuredPiece, RepartError> {
    let (_, topo) = topology::resolve(input, topo_name)?;
    let (_, cs) = topology::coordset_for(input, topo)?;
    let (shape, conn, sizes, _) = topology::unstructured_form(input, topo)?;
    let nverts = coordset::num_vertices(cs)?;
    let explicit = coordset::gather_explicit(cs, &(0..nverts).collect::<Vec<_>>())?;
    let coords = explicit
        .fetch("values")
        .ok_or_else(|| RepartError::MalformedMesh("coordset has no values".into()))?
        .children()
        .map(|(axis, v)| (axis.to_string(), v.value().clone()))
        .collect();
    let nelems = sizes.len();
    Ok(UnstructuredPiece {
        shape,
        conn,
        sizes,
        coords,
        nverts,
        nelems,
    })
}

fn combine_as_unstructured(
    _domain: i32,
    inputs: &[&Node],
    output: &mut Node,
) -> Result<(), RepartError> {
    // Distinct topology names, first-appearance order.
    let mut topo_names = Vec::new();
    for input in inputs {
        let topos = input
            .child("topologies")
            .ok_or_else(|| RepartError::Combine("input has no topologies".into()))?;
        for (name, _) in topos.children() {
            if !topo_names.iter().any(|n| n == name) {
                topo_names.push(name.to_string());
            }
        }
    }

    for topo_name in &topo_names {
        let with_topo: Vec<usize> = (0..inputs.len())
            .filter(|&p| inputs[p].has_path(&format!("topologies/{topo_name}")))
            .collect();
        let pieces: Vec<UnstructuredPiece> = with_topo
            .iter()
            .map(|&p| flatten_input(inputs[p], topo_name))
            .collect::<Result<_, _>>()?;

        let cs_name = {
            let (_, topo) = topology::resolve(inputs[with_topo[0]], topo_name)?;
            topo.fetch_str("coordset").unwrap_or("coords").to_string()
        };
        let shape = pieces[0].shape.clone();
        if pieces.iter().any(|p| p.shape != shape) {
            return Err(RepartError::Combine(format!(
                "mixed element shapes under topology `{topo_name}`"
            )));
        }

        // Coordinates: concatenate per axis; vertices are not merged.
        let axes: Vec<String> = pieces[0].coords.iter().map(|(a, _)| a.clone()).collect();
        let cs = output.entry("coordsets").entry(&cs_name);
        cs.entry("type").set("explicit");
        for axis in &axes {
            let parts: Vec<&Value> = pieces
                .iter()
                .map(|p| {
                    p.coords
                        .iter()
                        .find(|(a, _)| a == axis)
                        .map(|(_, v)| v)
                        .ok_or_else(|| {
                            RepartError::Combine(format!("input missing axis `{axis}`"))
                        })
                })
                .collect::<Result<_, _>>()?;
            cs.entry("values")
                .set_child(axis, Node::leaf(Value::concat(&parts)?));
        }

        // Topology: shift connectivity by accumulated vertex offsets.
        let mut conn = Vec::new();
        let mut sizes = Vec::new();
        let mut offsets = Vec::new();
        let mut vertex_offset = 0u64;
        for piece in &pieces {
            let mut elem_offset = conn.len();
            for &size in &piece.sizes {
                offsets.push(elem_offset as i64);
                sizes.push(size as i64);
                elem_offset += size;
            }
            conn.extend(piece.conn.iter().map(|&v| v + vertex_offset));
            vertex_offset += piece.nverts as u64;
        }
        let topo = output.entry("topologies").entry(topo_name);
        topo.entry("type").set("unstructured");
        topo.entry("coordset").set(cs_name.clone());
        topo.entry_path("elements/shape").set(shape);
        topo.entry_path("elements/connectivity").set(conn);
        topo.entry_path("elements/sizes").set(sizes);
        topo.entry_path("elements/offsets").set(offsets);

        // Fields: concatenate in input order; inputs missing a field
        // contribute zeros of the field's dtype.
        let topo_inputs: Vec<&Node> = with_topo.iter().map(|&p| inputs[p]).collect();
        for field_name in field_names_for(&topo_inputs, topo_name) {
            let (assoc, dtype) = first_field_meta(&topo_inputs, &field_name)?;
            let mut parts_owned: Vec<Value> = Vec::with_capacity(pieces.len());
            for (p, input) in topo_inputs.iter().enumerate() {
                match input.fetch_value(&format!("fields/{field_name}/values")) {
                    Some(v) => parts_owned.push(v.clone()),
                    None => {
                        let n = match assoc.as_str() {
                            "element" => pieces[p].nelems,
                            _ => pieces[p].nverts,
                        };
                        parts_owned.push(Value::zeros(dtype, n));
                    }
                }
            }
            let parts: Vec<&Value> = parts_owned.iter().collect();
            let f = output.entry("fields").entry(&field_name);
            f.entry("association").set(assoc);
            f.entry("topology").set(topo_name.clone());
            f.entry("values").set(Value::concat(&parts)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::{
        rectilinear_mesh_2d, tri_fan_mesh, uniform_mesh_2d, with_element_field,
    };
    use crate::mesh::topology as topo_q;

    #[test]
    fn glue_two_abutting_rectilinear_domains() {
        let left = rectilinear_mesh_2d(&[0.0, 1.0, 2.0, 3.0, 4.0], &[0.0, 1.0, 2.0, 3.0, 4.0]);
        let right = rectilinear_mesh_2d(&[4.0, 5.0, 6.0, 7.0, 8.0], &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(recommended_topology(&[&left, &right]), "uniform");
        let mut out = Node::new();
        combine(0, &[&left, &right], &mut out).unwrap();
        assert_eq!(out.fetch_i64("coordsets/coords/dims/i"), Some(9));
        assert_eq!(out.fetch_i64("coordsets/coords/dims/j"), Some(5));
        let (_, topo) = topo_q::resolve(&out, "").unwrap();
        assert_eq!(topo_q::num_elements(&out, topo).unwrap(), 32);
        assert_eq!(out.fetch_i64("state/domain_id"), Some(0));
    }

    #[test]
    fn uneven_axes_stay_rectilinear() {
        let a = rectilinear_mesh_2d(&[0.0, 1.0, 3.0], &[0.0, 1.0]);
        let b = rectilinear_mesh_2d(&[3.0, 4.0, 6.0], &[0.0, 1.0]);
        assert_eq!(recommended_topology(&[&a, &b]), "rectilinear");
        let mut out = Node::new();
        combine(2, &[&a, &b], &mut out).unwrap();
        assert_eq!(
            out.fetch_value("coordsets/coords/values/x")
                .unwrap()
                .as_f64_slice()
                .unwrap(),
            &[0.0, 1.0, 3.0, 4.0, 6.0]
        );
    }

    #[test]
    fn overlapping_domains_fall_back_to_unstructured() {
        let a = rectilinear_mesh_2d(&[0.0, 1.0, 2.0], &[0.0, 1.0]);
        let b = rectilinear_mesh_2d(&[1.0, 2.0, 3.0], &[0.0, 1.0]);
        assert_eq!(recommended_topology(&[&a, &b]), "unstructured");
    }

    #[test]
    fn structured_fields_scatter_by_placement() {
        let mut left = rectilinear_mesh_2d(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]);
        let mut right = rectilinear_mesh_2d(&[2.0, 3.0, 4.0], &[0.0, 1.0, 2.0]);
        with_element_field(&mut left, "rho", vec![1, 2, 3, 4]);
        with_element_field(&mut right, "rho", vec![5, 6, 7, 8]);
        let mut out = Node::new();
        combine(0, &[&right, &left], &mut out).unwrap();
        // global grid is 4x2 cells; left block is columns 0-1, right 2-3
        let vals = out.fetch_value("fields/rho/values").unwrap().to_i64_vec().unwrap();
        assert_eq!(vals, vec![1, 2, 5, 6, 3, 4, 7, 8]);
    }

    #[test]
    fn unstructured_concat_offsets_vertices() {
        let a = tri_fan_mesh(2);
        let b = tri_fan_mesh(3);
        let mut out = Node::new();
        combine(1, &[&a, &b], &mut out).unwrap();
        let (_, topo) = topo_q::resolve(&out, "").unwrap();
        assert_eq!(topo_q::num_elements(&out, topo).unwrap(), 5);
        let conn = out
            .fetch_value("topologies/mesh/elements/connectivity")
            .unwrap()
            .to_i64_vec()
            .unwrap();
        // second input's vertex ids shifted by the first input's 4 vertices
        assert_eq!(&conn[6..9], &[4, 5, 6]);
        let x = out.fetch_value("coordsets/coords/values/x").unwrap();
        assert_eq!(x.len(), 4 + 5);
    }

    #[test]
    fn missing_fields_zero_fill() {
        let mut a = tri_fan_mesh(2);
        let b = tri_fan_mesh(2);
        with_element_field(&mut a, "rho", vec![7, 8]);
        let mut out = Node::new();
        combine(0, &[&a, &b], &mut out).unwrap();
        let vals = out.fetch_value("fields/rho/values").unwrap().to_i64_vec().unwrap();
        assert_eq!(vals, vec![7, 8, 0, 0]);
    }

    #[test]
    fn single_input_identity_for_extracted_chunk() {
        use crate::extract::extract;
        use crate::selection::create_selection_all_elements;
        let mut mesh = tri_fan_mesh(4);
        with_element_field(&mut mesh, "rho", vec![1, 2, 3, 4]);
        let sel = create_selection_all_elements(&mesh).unwrap();
        let chunk = extract(sel.as_ref(), &mesh, &[]).unwrap();
        let mut out = Node::new();
        combine(0, &[&chunk], &mut out).unwrap();
        assert_eq!(
            out.fetch_value("coordsets/coords/values/x"),
            mesh.fetch_value("coordsets/coords/values/x")
        );
        assert_eq!(
            out.fetch_value("topologies/mesh/elements/connectivity")
                .unwrap()
                .to_i64_vec(),
            mesh.fetch_value("topologies/mesh/elements/connectivity")
                .unwrap()
                .to_i64_vec()
        );
        assert_eq!(
            out.fetch_value("fields/rho/values"),
            mesh.fetch_value("fields/rho/values")
        );
    }

    #[test]
    fn uniform_inputs_glue_to_uniform() {
        let a = uniform_mesh_2d(2, 2);
        assert_eq!(recommended_topology(&[&a]), "uniform");
    }
}
