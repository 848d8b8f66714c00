//! RepartError: unified error type for mesh-repart public APIs.
//!
//! Fatal conditions surface through this enum; non-fatal conditions
//! (unsplittable selections, target mismatches, skipped chunks) are logged
//! and execution continues.

use thiserror::Error;

/// Unified error type for repartitioning operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepartError {
    /// An options entry was malformed or had the wrong type.
    #[error("Options error: {0}")]
    Options(String),
    /// A selection descriptor named a type the factory does not know.
    #[error("Unknown selection type `{0}`")]
    UnknownSelectionType(String),
    /// A selection does not apply to the mesh it references.
    #[error("Selection {index} is not applicable to topology `{topology}`")]
    InapplicableSelection {
        /// Index of the selection in the options list.
        index: usize,
        /// Name of the topology the selection referenced.
        topology: String,
    },
    /// A selection referenced a source domain index outside the input set.
    #[error("Selection references domain {domain} but only {ndomains} domain(s) were supplied")]
    InvalidDomain { domain: usize, ndomains: usize },
    /// The named topology does not exist in the mesh.
    #[error("Mesh has no topology named `{0}`")]
    MissingTopology(String),
    /// The named coordset does not exist in the mesh.
    #[error("Mesh has no coordset named `{0}`")]
    MissingCoordset(String),
    /// A mesh node was missing a required child or held the wrong type.
    #[error("Malformed mesh: {0}")]
    MalformedMesh(String),
    /// A topology kind that this operation cannot handle.
    #[error("Unsupported topology type `{0}`")]
    UnsupportedTopology(String),
    /// An element id fell outside the topology it was resolved against.
    #[error("Element id {id} outside topology of length {len}")]
    ElementOutOfRange { id: usize, len: usize },
    /// Inputs to the combiner could not be merged.
    #[error("Combine error: {0}")]
    Combine(String),
    /// A point-to-point or collective transport call failed.
    #[error("Transport failure with rank {peer}: {message}")]
    Transport { peer: usize, message: String },
    /// A migrated payload could not be decoded.
    #[error("Wire decode error: {0}")]
    Decode(String),
    /// An internal consistency check failed.
    #[error("Invariant violation: {0}")]
    Invariant(String),
}
