//! Coordset queries and explicit-coordset construction.

use crate::error::RepartError;
use crate::tree::{Node, Value};

pub const AXIS_NAMES: [&str; 3] = ["x", "y", "z"];
const SPACING_NAMES: [&str; 3] = ["dx", "dy", "dz"];
const DIM_NAMES: [&str; 3] = ["i", "j", "k"];

/// Vertex counts per axis (1 on unused axes).
pub fn vertex_dims(cs: &Node) -> Result<[usize; 3], RepartError> {
    let t = cs
        .fetch_str("type")
        .ok_or_else(|| RepartError::MalformedMesh("coordset has no type".into()))?;
    let mut d = [1usize; 3];
    match t {
        "uniform" => {
            for (a, key) in DIM_NAMES.iter().enumerate() {
                if let Some(v) = cs.fetch_i64(&format!("dims/{key}")) {
                    d[a] = v as usize;
                }
            }
        }
        "rectilinear" | "explicit" => {
            for (a, axis) in AXIS_NAMES.iter().enumerate() {
                if let Some(v) = cs.fetch_value(&format!("values/{axis}")) {
                    d[a] = v.len();
                }
            }
            if t == "explicit" {
                // explicit coordsets are unordered point lists, not a grid
                return Err(RepartError::UnsupportedTopology(
                    "explicit coordset has no logical dims".into(),
                ));
            }
        }
        other => {
            return Err(RepartError::MalformedMesh(format!(
                "unknown coordset type `{other}`"
            )))
        }
    }
    Ok(d)
}

/// Total number of vertices in a coordset of any type.
pub fn num_vertices(cs: &Node) -> Result<usize, RepartError> {
    let t = cs
        .fetch_str("type")
        .ok_or_else(|| RepartError::MalformedMesh("coordset has no type".into()))?;
    match t {
        "explicit" => {
            for axis in AXIS_NAMES {
                if let Some(v) = cs.fetch_value(&format!("values/{axis}")) {
                    return Ok(v.len());
                }
            }
            Err(RepartError::MalformedMesh("explicit coordset has no values".into()))
        }
        _ => {
            let d = vertex_dims(cs)?;
            Ok(d[0] * d[1] * d[2])
        }
    }
}

/// Number of spatial axes carried by the coordset.
pub fn dimension(cs: &Node) -> usize {
    let t = cs.fetch_str("type").unwrap_or("");
    if t == "uniform" {
        DIM_NAMES
            .iter()
            .filter(|k| cs.has_path(&format!("dims/{k}")))
            .count()
    } else {
        AXIS_NAMES
            .iter()
            .filter(|a| cs.has_path(&format!("values/{a}")))
            .count()
    }
}

/// Per-axis vertex coordinates of an axis-aligned (uniform or rectilinear)
/// coordset. Errors on explicit coordsets.
pub fn axis_coords(cs: &Node) -> Result<Vec<Vec<f64>>, RepartError> {
    let t = cs
        .fetch_str("type")
        .ok_or_else(|| RepartError::MalformedMesh("coordset has no type".into()))?;
    match t {
        "uniform" => {
            let dims = vertex_dims(cs)?;
            let mut axes = Vec::new();
            for (a, key) in DIM_NAMES.iter().enumerate() {
                if !cs.has_path(&format!("dims/{key}")) {
                    break;
                }
                let origin = cs
                    .fetch_f64(&format!("origin/{}", AXIS_NAMES[a]))
                    .unwrap_or(0.0);
                let spacing = cs
                    .fetch_f64(&format!("spacing/{}", SPACING_NAMES[a]))
                    .unwrap_or(1.0);
                axes.push((0..dims[a]).map(|i| origin + i as f64 * spacing).collect());
            }
            Ok(axes)
        }
        "rectilinear" => {
            let mut axes = Vec::new();
            for axis in AXIS_NAMES {
                match cs.fetch_value(&format!("values/{axis}")) {
                    Some(v) => axes.push(v.to_f64_vec().ok_or_else(|| {
                        RepartError::MalformedMesh(format!("axis {axis} is not numeric"))
                    })?),
                    None => break,
                }
            }
            Ok(axes)
        }
        other => Err(RepartError::UnsupportedTopology(format!(
            "cannot take axis coords of `{other}` coordset"
        ))),
    }
}

/// Coordinates of one grid vertex by flat id (row-major, `i` fastest).
fn grid_vertex_coord(axes: &[Vec<f64>], vid: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(axes.len());
    let mut rem = vid;
    for axis in axes {
        out.push(axis[rem % axis.len()]);
        rem /= axis.len();
    }
    out
}

/// Build an explicit coordset containing the listed vertices, in order.
pub fn gather_explicit(cs: &Node, vertex_ids: &[usize]) -> Result<Node, RepartError> {
    let t = cs
        .fetch_str("type")
        .ok_or_else(|| RepartError::MalformedMesh("coordset has no type".into()))?;

    let mut out = Node::new();
    out.entry("type").set("explicit");

    if t == "explicit" {
        let values = cs
            .child("values")
            .ok_or_else(|| RepartError::MalformedMesh("explicit coordset has no values".into()))?;
        let out_values = out.entry("values");
        for (axis, arr) in values.children() {
            out_values.set_child(axis, Node::leaf(arr.value().gather(vertex_ids)));
        }
        return Ok(out);
    }

    let axes = axis_coords(cs)?;
    let mut cols: Vec<Vec<f64>> = vec![Vec::with_capacity(vertex_ids.len()); axes.len()];
    for &vid in vertex_ids {
        let coord = grid_vertex_coord(&axes, vid);
        for (a, &c) in coord.iter().enumerate() {
            cols[a].push(c);
        }
    }
    let out_values = out.entry("values");
    for (a, col) in cols.into_iter().enumerate() {
        out_values.set_child(AXIS_NAMES[a], Node::leaf(Value::Float64(col)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectilinear_cs(x: &[f64], y: &[f64]) -> Node {
        let mut cs = Node::new();
        cs.entry("type").set("rectilinear");
        cs.entry_path("values/x").set(x.to_vec());
        cs.entry_path("values/y").set(y.to_vec());
        cs
    }

    #[test]
    fn uniform_axis_coords() {
        let mut cs = Node::new();
        cs.entry("type").set("uniform");
        cs.entry_path("dims/i").set(3i64);
        cs.entry_path("dims/j").set(2i64);
        cs.entry_path("origin/x").set(1.0);
        cs.entry_path("spacing/dx").set(0.5);
        let axes = axis_coords(&cs).unwrap();
        assert_eq!(axes[0], vec![1.0, 1.5, 2.0]);
        assert_eq!(axes[1], vec![0.0, 1.0]);
        assert_eq!(num_vertices(&cs).unwrap(), 6);
    }

    #[test]
    fn gather_from_rectilinear() {
        let cs = rectilinear_cs(&[0.0, 1.0, 2.0], &[0.0, 10.0]);
        // vertex 4 of the 3x2 grid is (x=1, y=10)
        let out = gather_explicit(&cs, &[4, 0]).unwrap();
        assert_eq!(out.fetch_str("type"), Some("explicit"));
        assert_eq!(
            out.fetch_value("values/x").unwrap().as_f64_slice().unwrap(),
            &[1.0, 0.0]
        );
        assert_eq!(
            out.fetch_value("values/y").unwrap().as_f64_slice().unwrap(),
            &[10.0, 0.0]
        );
    }
}
