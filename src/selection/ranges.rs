//! Element-id interval-list selection.

use std::fmt;

use crate::error::RepartError;
use crate::tree::Node;

use super::{Selection, SelectionCore};

/// Selects elements by a list of inclusive id intervals.
#[derive(Debug, Default)]
pub struct RangesSelection {
    core: SelectionCore,
    ranges: Vec<(u64, u64)>,
}

impl RangesSelection {
    /// A single range `[0, n-1]` covering a topology of `n` elements.
    pub fn covering(topology: &str, n: usize) -> Self {
        RangesSelection {
            core: SelectionCore {
                topology: topology.to_string(),
                ..SelectionCore::default()
            },
            ranges: if n == 0 {
                Vec::new()
            } else {
                vec![(0, n as u64 - 1)]
            },
        }
    }

    fn with_ranges(&self, ranges: Vec<(u64, u64)>) -> Self {
        RangesSelection {
            core: self.core.child(),
            ranges,
        }
    }

    fn total(&self) -> usize {
        self.ranges.iter().map(|&(lo, hi)| (hi - lo + 1) as usize).sum()
    }
}

impl Selection for RangesSelection {
    fn core(&self) -> &SelectionCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut SelectionCore {
        &mut self.core
    }
    fn kind_name(&self) -> &'static str {
        "ranges"
    }

    fn init(&mut self, options: &Node) -> Result<(), RepartError> {
        self.core.init_common(options)?;
        let vals = options
            .fetch_value("ranges")
            .and_then(|v| v.to_i64_vec())
            .ok_or_else(|| {
                RepartError::Options("ranges selection requires a `ranges` integer array".into())
            })?;
        if vals.len() % 2 != 0 {
            return Err(RepartError::Options(
                "ranges selection requires [lo, hi] pairs".into(),
            ));
        }
        self.ranges.clear();
        for pair in vals.chunks_exact(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if lo < 0 || hi < lo {
                return Err(RepartError::Options(format!(
                    "invalid range [{lo}, {hi}]"
                )));
            }
            self.ranges.push((lo as u64, hi as u64));
        }
        Ok(())
    }

    fn applicable(&self, mesh: &Node) -> bool {
        self.selected_topology(mesh).is_ok()
    }

    fn length(&self, _mesh: &Node) -> usize {
        self.total()
    }

    /// Splits so the two halves hold equal element counts (lower half gets
    /// the extra on odd totals); a straddling range is broken in place.
    fn partition(&self, _mesh: &Node) -> Result<Vec<Box<dyn Selection>>, RepartError> {
        let n = self.total();
        if n < 2 {
            return Err(RepartError::Invariant(
                "ranges selection with fewer than two elements cannot be split".into(),
            ));
        }
        let want = n - n / 2;
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        let mut taken = 0usize;
        for &(lo, hi) in &self.ranges {
            let len = (hi - lo + 1) as usize;
            if taken >= want {
                upper.push((lo, hi));
            } else if taken + len <= want {
                lower.push((lo, hi));
                taken += len;
            } else {
                let keep = (want - taken) as u64;
                lower.push((lo, lo + keep - 1));
                upper.push((lo + keep, hi));
                taken = want;
            }
        }
        Ok(vec![
            Box::new(self.with_ranges(lower)),
            Box::new(self.with_ranges(upper)),
        ])
    }

    fn element_ids_for_topo(&self, _mesh: &Node, erange: (usize, usize)) -> Vec<usize> {
        let mut ids = Vec::with_capacity(self.total());
        for &(lo, hi) in &self.ranges {
            for e in lo..=hi {
                let e = e as usize;
                if e >= erange.0 && e <= erange.1 {
                    ids.push(e);
                }
            }
        }
        ids
    }

    fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(
            out,
            "{{type: ranges, domain: {}, topology: \"{}\", ranges: {:?}}}",
            self.core.domain, self.core.topology, self.ranges
        )
    }
}
