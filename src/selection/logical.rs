//! IJK-box selection within a structured topology.

use std::fmt;

use crate::error::RepartError;
use crate::mesh::topology;
use crate::tree::Node;

use super::{Selection, SelectionCore};

/// Inclusive cell-index box `[start, end]` on a logical topology.
#[derive(Debug, Default)]
pub struct LogicalSelection {
    core: SelectionCore,
    start: [usize; 3],
    end: [usize; 3],
}

impl LogicalSelection {
    /// A box spanning a whole grid of `cell_dims` cells.
    pub fn spanning(topology: &str, cell_dims: [usize; 3]) -> Self {
        LogicalSelection {
            core: SelectionCore {
                topology: topology.to_string(),
                ..SelectionCore::default()
            },
            start: [0, 0, 0],
            end: [
                cell_dims[0].max(1) - 1,
                cell_dims[1].max(1) - 1,
                cell_dims[2].max(1) - 1,
            ],
        }
    }

    fn with_box(&self, start: [usize; 3], end: [usize; 3]) -> Self {
        LogicalSelection {
            core: self.core.child(),
            start,
            end,
        }
    }

    fn extent(&self, axis: usize) -> usize {
        self.end[axis] - self.start[axis] + 1
    }

    fn read_triple(options: &Node, key: &str) -> Result<Option<[usize; 3]>, RepartError> {
        let Some(n) = options.fetch(key) else {
            return Ok(None);
        };
        let vals = n.value().to_i64_vec().ok_or_else(|| {
            RepartError::Options(format!("logical selection `{key}` must be an integer array"))
        })?;
        if vals.is_empty() || vals.len() > 3 || vals.iter().any(|&v| v < 0) {
            return Err(RepartError::Options(format!(
                "logical selection `{key}` must hold 1-3 non-negative indices"
            )));
        }
        let mut out = [0usize; 3];
        for (a, &v) in vals.iter().enumerate() {
            out[a] = v as usize;
        }
        Ok(Some(out))
    }
}

impl Selection for LogicalSelection {
    fn core(&self) -> &SelectionCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut SelectionCore {
        &mut self.core
    }
    fn kind_name(&self) -> &'static str {
        "logical"
    }

    fn init(&mut self, options: &Node) -> Result<(), RepartError> {
        self.core.init_common(options)?;
        if let Some(s) = Self::read_triple(options, "start")? {
            self.start = s;
        }
        if let Some(e) = Self::read_triple(options, "end")? {
            self.end = e;
        }
        if (0..3).any(|a| self.end[a] < self.start[a]) {
            return Err(RepartError::Options(
                "logical selection end precedes start".into(),
            ));
        }
        Ok(())
    }

    fn applicable(&self, mesh: &Node) -> bool {
        let Ok((_, topo)) = self.selected_topology(mesh) else {
            return false;
        };
        let Ok(kind) = topology::kind(topo) else {
            return false;
        };
        if !kind.is_logical() {
            return false;
        }
        match topology::cell_dims(mesh, topo) {
            Ok(cd) => (0..3).all(|a| self.end[a] < cd[a]),
            Err(_) => false,
        }
    }

    fn length(&self, _mesh: &Node) -> usize {
        self.extent(0) * self.extent(1) * self.extent(2)
    }

    /// Splits along the longest axis into two halves; the lower half gets
    /// the extra cell layer when the extent is odd. Ties prefer X over Y
    /// over Z.
    fn partition(&self, _mesh: &Node) -> Result<Vec<Box<dyn Selection>>, RepartError> {
        let mut axis = 0;
        for a in 1..3 {
            if self.extent(a) > self.extent(axis) {
                axis = a;
            }
        }
        let n = self.extent(axis);
        if n < 2 {
            return Err(RepartError::Invariant(
                "logical selection of a single cell layer cannot be split".into(),
            ));
        }
        let lower_len = n - n / 2;
        let mut lo_end = self.end;
        lo_end[axis] = self.start[axis] + lower_len - 1;
        let mut hi_start = self.start;
        hi_start[axis] = self.start[axis] + lower_len;
        Ok(vec![
            Box::new(self.with_box(self.start, lo_end)),
            Box::new(self.with_box(hi_start, self.end)),
        ])
    }

    fn element_ids_for_topo(&self, mesh: &Node, erange: (usize, usize)) -> Vec<usize> {
        let Ok((_, topo)) = self.selected_topology(mesh) else {
            return Vec::new();
        };
        let Ok(cd) = topology::cell_dims(mesh, topo) else {
            return Vec::new();
        };
        let mut ids = Vec::with_capacity(self.length(mesh));
        for k in self.start[2]..=self.end[2] {
            for j in self.start[1]..=self.end[1] {
                for i in self.start[0]..=self.end[0] {
                    let id = k * cd[0] * cd[1] + j * cd[0] + i;
                    if id >= erange.0 && id <= erange.1 {
                        ids.push(id);
                    }
                }
            }
        }
        ids
    }

    fn determine_is_whole(&self, mesh: &Node) -> bool {
        let Ok((_, topo)) = self.selected_topology(mesh) else {
            return false;
        };
        match topology::cell_dims(mesh, topo) {
            Ok(cd) => self.start == [0, 0, 0] && (0..3).all(|a| self.end[a] + 1 == cd[a]),
            Err(_) => false,
        }
    }

    fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(
            out,
            "{{type: logical, domain: {}, topology: \"{}\", start: {:?}, end: {:?}}}",
            self.core.domain, self.core.topology, self.start, self.end
        )
    }
}
