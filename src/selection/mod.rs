//! Selection algebra: region descriptors that know how to test
//! applicability, measure length, split, and enumerate element ids for one
//! topology of one domain.
//!
//! Selections are polymorphic (`Box<dyn Selection>`); the shared state every
//! kind carries lives in [`SelectionCore`]. The registered kinds are
//! `logical`, `explicit`, `ranges`, and `field`.

pub mod explicit;
pub mod field;
pub mod logical;
pub mod ranges;

pub use explicit::ExplicitSelection;
pub use field::FieldSelection;
pub use logical::LogicalSelection;
pub use ranges::RangesSelection;

use std::cell::Cell;
use std::fmt;

use crate::error::RepartError;
use crate::mesh::topology;
use crate::tree::Node;

/// Sentinel for a selection with no pinned destination rank.
pub const FREE_RANK_ID: i32 = -1;
/// Sentinel for a selection with no pinned destination domain.
pub const FREE_DOMAIN_ID: i32 = -1;

/// Cached whole-mesh tristate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Whole {
    Undetermined,
    No,
    Yes,
}

/// State shared by every selection kind.
#[derive(Debug, Clone)]
pub struct SelectionCore {
    /// Source domain index the selection applies to.
    pub domain: usize,
    /// Target process, or [`FREE_RANK_ID`].
    pub destination_rank: i32,
    /// Target domain id, or [`FREE_DOMAIN_ID`].
    pub destination_domain: i32,
    /// Name of the referenced topology; empty means the first topology.
    pub topology: String,
    /// Emit original-id mapping fields when extracting.
    pub preserve_mapping: bool,
    whole: Cell<Whole>,
}

impl Default for SelectionCore {
    fn default() -> Self {
        SelectionCore {
            domain: 0,
            destination_rank: FREE_RANK_ID,
            destination_domain: FREE_DOMAIN_ID,
            topology: String::new(),
            preserve_mapping: false,
            whole: Cell::new(Whole::Undetermined),
        }
    }
}

impl SelectionCore {
    /// Read the common descriptor keys (`domain`, `topology`,
    /// `destination_rank`, `destination_domain`).
    pub fn init_common(&mut self, options: &Node) -> Result<(), RepartError> {
        if let Some(n) = options.fetch("domain") {
            self.domain = n
                .value()
                .as_i64()
                .filter(|&d| d >= 0)
                .ok_or_else(|| RepartError::Options("selection domain must be a non-negative integer".into()))?
                as usize;
        }
        if let Some(t) = options.fetch_str("topology") {
            self.topology = t.to_string();
        }
        if let Some(n) = options.fetch("destination_rank") {
            self.destination_rank = n
                .value()
                .as_i64()
                .ok_or_else(|| RepartError::Options("destination_rank must be an integer".into()))?
                as i32;
        }
        if let Some(n) = options.fetch("destination_domain") {
            self.destination_domain = n
                .value()
                .as_i64()
                .ok_or_else(|| RepartError::Options("destination_domain must be an integer".into()))?
                as i32;
        }
        Ok(())
    }

    /// A fresh core bound to one domain and topology, destinations free.
    pub fn for_topology(domain: usize, topology: impl Into<String>) -> SelectionCore {
        SelectionCore {
            domain,
            topology: topology.into(),
            ..SelectionCore::default()
        }
    }

    /// A copy for a sub-selection: same domain, destinations, topology, and
    /// mapping flag; whole cache reset.
    pub fn child(&self) -> SelectionCore {
        SelectionCore {
            whole: Cell::new(Whole::Undetermined),
            ..self.clone()
        }
    }
}

/// A region descriptor over one topology of one domain.
pub trait Selection: fmt::Debug + Send {
    /// Shared state access.
    fn core(&self) -> &SelectionCore;
    fn core_mut(&mut self) -> &mut SelectionCore;

    /// Name this kind registers under in the factory.
    fn kind_name(&self) -> &'static str;

    /// Initialize from a selection descriptor node.
    fn init(&mut self, options: &Node) -> Result<(), RepartError>;

    /// Whether the selection type makes sense for the given mesh.
    fn applicable(&self, mesh: &Node) -> bool;

    /// Number of cells in the selection.
    fn length(&self, mesh: &Node) -> usize;

    /// Split into sub-selections that cover this one.
    fn partition(&self, mesh: &Node) -> Result<Vec<Box<dyn Selection>>, RepartError>;

    /// Element ids of this selection inside `erange` (inclusive) of the
    /// referenced topology, ascending where the kind has a natural order.
    fn element_ids_for_topo(&self, mesh: &Node, erange: (usize, usize)) -> Vec<usize>;

    /// Whether the selection covers every cell of its topology.
    fn determine_is_whole(&self, mesh: &Node) -> bool {
        let Ok((_, topo)) = self.selected_topology(mesh) else {
            return false;
        };
        let Ok(n) = topology::num_elements(mesh, topo) else {
            return false;
        };
        n > 0 && self.element_ids_for_topo(mesh, (0, n - 1)).len() == n
    }

    /// One-line description for diagnostics.
    fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Cached form of [`determine_is_whole`](Selection::determine_is_whole).
    fn get_whole(&self, mesh: &Node) -> bool {
        match self.core().whole.get() {
            Whole::Yes => true,
            Whole::No => false,
            Whole::Undetermined => {
                let w = self.determine_is_whole(mesh);
                self.set_whole(w);
                w
            }
        }
    }

    /// Force the whole-mesh flag.
    fn set_whole(&self, value: bool) {
        self.core()
            .whole
            .set(if value { Whole::Yes } else { Whole::No });
    }

    /// The topology node this selection references.
    fn selected_topology<'m>(&self, mesh: &'m Node) -> Result<(&'m str, &'m Node), RepartError> {
        topology::resolve(mesh, &self.core().topology)
    }
}

impl fmt::Display for dyn Selection + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f)
    }
}

/// Factory for the registered selection kinds.
pub fn create_selection(type_name: &str) -> Result<Box<dyn Selection>, RepartError> {
    match type_name {
        "logical" => Ok(Box::<LogicalSelection>::default()),
        "explicit" => Ok(Box::<ExplicitSelection>::default()),
        "ranges" => Ok(Box::<RangesSelection>::default()),
        "field" => Ok(Box::<FieldSelection>::default()),
        other => Err(RepartError::UnknownSelectionType(other.to_string())),
    }
}

/// A selection of the kind that best covers all elements of the mesh's
/// first topology: logical for grid topologies, ranges otherwise.
pub fn create_selection_all_elements(mesh: &Node) -> Result<Box<dyn Selection>, RepartError> {
    let (name, topo) = topology::resolve(mesh, "")?;
    let sel: Box<dyn Selection> = if topology::kind(topo)?.is_logical() {
        let cd = topology::cell_dims(mesh, topo)?;
        Box::new(LogicalSelection::spanning(name, cd))
    } else {
        let n = topology::num_elements(mesh, topo)?;
        Box::new(RangesSelection::covering(name, n))
    };
    sel.set_whole(true);
    Ok(sel)
}
