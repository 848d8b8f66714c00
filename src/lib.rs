//! # mesh-repart
//!
//! mesh-repart redistributes Blueprint-style mesh domains into a
//! caller-specified target number of output domains, on one process or
//! across a set of communicating ranks. It combines a selection algebra
//! (geometric and logical ways to carve a mesh), an iterative splitting
//! driver that converges on the target count, a global mapping phase that
//! balances chunks over destination domains and ranks, and a rank-to-rank
//! exchange that migrates whole mesh trees with non-blocking point-to-point
//! communication.
//!
//! ## Features
//! - Logical (IJK box), explicit, ranges, and field-driven selections
//! - Chunk extraction with dtype-preserving field slicing and optional
//!   original-id mapping fields
//! - Structured re-gluing of axis-aligned chunks, unstructured fallback
//! - Deterministic global chunk→(rank, domain) assignment
//! - Pluggable communication backends (serial, in-process mailbox, MPI)
//!
//! ## Usage
//! ```
//! use mesh_repart::prelude::*;
//! use mesh_repart::tree::Node;
//!
//! // a 4x4-cell uniform grid
//! let mut mesh = Node::new();
//! let cs = mesh.entry_path("coordsets/coords");
//! cs.entry("type").set("uniform");
//! cs.entry_path("dims/i").set(5i64);
//! cs.entry_path("dims/j").set(5i64);
//! let topo = mesh.entry_path("topologies/mesh");
//! topo.entry("type").set("uniform");
//! topo.entry("coordset").set("coords");
//!
//! let mut options = Node::new();
//! options.entry("target").set(2i64);
//! let mut output = Node::new();
//! partition(&mesh, &options, &mut output).unwrap();
//! assert_eq!(output.num_children(), 2);
//! ```
//!
//! The optional `mpi-support` feature provides an MPI-backed communicator
//! (`comm::MpiComm`) for [`partitioner::parallel_partition`].

pub mod combine;
pub mod comm;
pub mod error;
pub mod exchange;
pub mod extract;
pub mod mesh;
pub mod partitioner;
pub mod selection;
pub mod tree;

/// A convenient prelude to import the most-used types and entry points.
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, LocalComm, NoComm, Wait};
    pub use crate::error::RepartError;
    pub use crate::partitioner::{parallel_partition, partition, Chunk, Partitioner};
    pub use crate::selection::{
        create_selection, create_selection_all_elements, Selection, FREE_DOMAIN_ID, FREE_RANK_ID,
    };
    pub use crate::tree::{DType, Node, Value};
}
