//! Topology queries over Blueprint-style mesh trees.

use crate::error::RepartError;
use crate::tree::Node;

use super::coordset;

/// Topology kinds, in ascending generality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TopoKind {
    Uniform,
    Rectilinear,
    Structured,
    Unstructured,
}

impl TopoKind {
    pub fn parse(s: &str) -> Result<Self, RepartError> {
        match s {
            "uniform" => Ok(TopoKind::Uniform),
            "rectilinear" => Ok(TopoKind::Rectilinear),
            "structured" => Ok(TopoKind::Structured),
            "unstructured" => Ok(TopoKind::Unstructured),
            other => Err(RepartError::UnsupportedTopology(other.to_string())),
        }
    }

    /// Structured kinds carry an implicit IJK element numbering.
    pub fn is_logical(self) -> bool {
        self != TopoKind::Unstructured
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TopoKind::Uniform => "uniform",
            TopoKind::Rectilinear => "rectilinear",
            TopoKind::Structured => "structured",
            TopoKind::Unstructured => "unstructured",
        }
    }
}

/// Kind of the given topology node.
pub fn kind(topo: &Node) -> Result<TopoKind, RepartError> {
    let t = topo
        .fetch_str("type")
        .ok_or_else(|| RepartError::MalformedMesh("topology has no type".into()))?;
    TopoKind::parse(t)
}

/// Look up a topology by name, or the first one when `name` is empty.
pub fn resolve<'m>(mesh: &'m Node, name: &str) -> Result<(&'m str, &'m Node), RepartError> {
    let topos = mesh
        .child("topologies")
        .ok_or_else(|| RepartError::MalformedMesh("mesh has no topologies".into()))?;
    if name.is_empty() {
        return topos
            .child_at(0)
            .ok_or_else(|| RepartError::MalformedMesh("mesh has no topologies".into()));
    }
    topos
        .children()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| RepartError::MissingTopology(name.to_string()))
}

/// The coordset a topology references (first coordset if unnamed).
pub fn coordset_for<'m>(mesh: &'m Node, topo: &Node) -> Result<(&'m str, &'m Node), RepartError> {
    let coordsets = mesh
        .child("coordsets")
        .ok_or_else(|| RepartError::MalformedMesh("mesh has no coordsets".into()))?;
    match topo.fetch_str("coordset") {
        Some(name) => coordsets
            .children()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| RepartError::MissingCoordset(name.to_string())),
        None => coordsets
            .child_at(0)
            .ok_or_else(|| RepartError::MalformedMesh("mesh has no coordsets".into())),
    }
}

/// Vertex counts per axis for a logical topology (1 on unused axes).
pub fn vertex_dims(mesh: &Node, topo: &Node) -> Result<[usize; 3], RepartError> {
    match kind(topo)? {
        TopoKind::Uniform | TopoKind::Rectilinear => {
            let (_, cs) = coordset_for(mesh, topo)?;
            coordset::vertex_dims(cs)
        }
        TopoKind::Structured => {
            let mut d = [1usize; 3];
            for (a, key) in ["elements/dims/i", "elements/dims/j", "elements/dims/k"]
                .iter()
                .enumerate()
            {
                if let Some(v) = topo.fetch_i64(key) {
                    d[a] = v as usize + 1;
                }
            }
            Ok(d)
        }
        TopoKind::Unstructured => Err(RepartError::UnsupportedTopology(
            "unstructured topology has no logical dims".into(),
        )),
    }
}

/// Cell counts per axis for a logical topology (1 on unused axes).
pub fn cell_dims(mesh: &Node, topo: &Node) -> Result<[usize; 3], RepartError> {
    let v = vertex_dims(mesh, topo)?;
    Ok([
        v[0].saturating_sub(1).max(1),
        v[1].saturating_sub(1).max(1),
        v[2].saturating_sub(1).max(1),
    ])
}

/// Number of vertices each element of `shape` references.
pub fn shape_vertex_count(shape: &str) -> Result<usize, RepartError> {
    match shape {
        "point" => Ok(1),
        "line" => Ok(2),
        "tri" => Ok(3),
        "quad" => Ok(4),
        "tet" => Ok(4),
        "hex" => Ok(8),
        other => Err(RepartError::MalformedMesh(format!(
            "unknown element shape `{other}`"
        ))),
    }
}

/// Total number of elements in a topology.
pub fn num_elements(mesh: &Node, topo: &Node) -> Result<usize, RepartError> {
    match kind(topo)? {
        TopoKind::Unstructured => {
            let elems = topo
                .child("elements")
                .ok_or_else(|| RepartError::MalformedMesh("unstructured topology has no elements".into()))?;
            if let Some(sizes) = elems.fetch_value("sizes") {
                return Ok(sizes.len());
            }
            let shape = elems
                .fetch_str("shape")
                .ok_or_else(|| RepartError::MalformedMesh("elements have no shape".into()))?;
            let conn = elems
                .fetch_value("connectivity")
                .ok_or_else(|| RepartError::MalformedMesh("elements have no connectivity".into()))?;
            Ok(conn.len() / shape_vertex_count(shape)?)
        }
        _ => {
            let c = cell_dims(mesh, topo)?;
            Ok(c[0] * c[1] * c[2])
        }
    }
}

/// Spatial dimension of a logical topology (trailing unit axes dropped).
pub fn logical_dimension(vdims: [usize; 3]) -> usize {
    if vdims[2] > 1 {
        3
    } else if vdims[1] > 1 {
        2
    } else {
        1
    }
}

/// Connectivity, sizes, and offsets of a topology's elements in explicit
/// (unstructured) form. Logical topologies are materialized row-major with
/// `i` varying fastest: `line` in 1D, `quad` in 2D, `hex` in 3D.
pub fn unstructured_form(
    mesh: &Node,
    topo: &Node,
) -> Result<(String, Vec<u64>, Vec<usize>, Vec<usize>), RepartError> {
    if kind(topo)? == TopoKind::Unstructured {
        let elems = topo.child("elements").ok_or_else(|| {
            RepartError::MalformedMesh("unstructured topology has no elements".into())
        })?;
        let shape = elems
            .fetch_str("shape")
            .ok_or_else(|| RepartError::MalformedMesh("elements have no shape".into()))?
            .to_string();
        let conn: Vec<u64> = elems
            .fetch_value("connectivity")
            .and_then(|v| v.to_i64_vec())
            .ok_or_else(|| RepartError::MalformedMesh("elements have no connectivity".into()))?
            .into_iter()
            .map(|x| x as u64)
            .collect();
        let nverts = shape_vertex_count(&shape)?;
        let nelem = conn.len() / nverts;
        let sizes = match elems.fetch_value("sizes").and_then(|v| v.to_i64_vec()) {
            Some(s) => s.into_iter().map(|x| x as usize).collect(),
            None => vec![nverts; nelem],
        };
        let offsets = match elems.fetch_value("offsets").and_then(|v| v.to_i64_vec()) {
            Some(o) => o.into_iter().map(|x| x as usize).collect(),
            None => {
                let mut off = Vec::with_capacity(sizes.len());
                let mut acc = 0usize;
                for s in &sizes {
                    off.push(acc);
                    acc += s;
                }
                off
            }
        };
        return Ok((shape, conn, sizes, offsets));
    }

    let vd = vertex_dims(mesh, topo)?;
    let cd = cell_dims(mesh, topo)?;
    let dim = logical_dimension(vd);
    let (shape, corners) = match dim {
        1 => ("line", 2),
        2 => ("quad", 4),
        _ => ("hex", 8),
    };
    let (nx, nxy) = (vd[0] as u64, (vd[0] * vd[1]) as u64);
    let vid = |i: u64, j: u64, k: u64| k * nxy + j * nx + i;
    let mut conn = Vec::with_capacity(cd[0] * cd[1] * cd[2] * corners);
    for k in 0..cd[2] as u64 {
        for j in 0..cd[1] as u64 {
            for i in 0..cd[0] as u64 {
                match dim {
                    1 => conn.extend_from_slice(&[vid(i, 0, 0), vid(i + 1, 0, 0)]),
                    2 => conn.extend_from_slice(&[
                        vid(i, j, 0),
                        vid(i + 1, j, 0),
                        vid(i + 1, j + 1, 0),
                        vid(i, j + 1, 0),
                    ]),
                    _ => conn.extend_from_slice(&[
                        vid(i, j, k),
                        vid(i + 1, j, k),
                        vid(i + 1, j + 1, k),
                        vid(i, j + 1, k),
                        vid(i, j, k + 1),
                        vid(i + 1, j, k + 1),
                        vid(i + 1, j + 1, k + 1),
                        vid(i, j + 1, k + 1),
                    ]),
                }
            }
        }
    }
    let nelem = cd[0] * cd[1] * cd[2];
    let sizes = vec![corners; nelem];
    let offsets = (0..nelem).map(|e| e * corners).collect();
    Ok((shape.to_string(), conn, sizes, offsets))
}
