//! The partitioner façade: owns meshes and selections, and sequences
//! *initialize → split → extract → map → communicate → combine → emit*.
//!
//! One generic [`Partitioner`] serves both modes. The collective decisions
//! (total selection count, largest-selection search, target counting, chunk
//! mapping, chunk migration) consult the communicator and collapse to the
//! local answers at `size() == 1`, so the serial partitioner is simply the
//! [`NoComm`] instantiation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::combine;
use crate::comm::collective::{all_gather_v, all_reduce_max, all_reduce_max_loc, all_reduce_sum};
use crate::comm::{CommTag, Communicator, NoComm};
use crate::error::RepartError;
use crate::exchange::{ChunkInfo, MeshExchange};
use crate::extract::extract;
use crate::mesh::{self, topology};
use crate::selection::{
    create_selection, create_selection_all_elements, Selection, FREE_DOMAIN_ID, FREE_RANK_ID,
};
use crate::tree::{DType, Node};

/// Base tag for chunk migration; each chunk claims three tags above it.
pub const PARTITION_TAG_BASE: u16 = 12000;

const TAG_TARGET: CommTag = CommTag::new(11000);
const TAG_COUNT_TARGETS: CommTag = CommTag::new(11002);
const TAG_TOTAL_SELECTIONS: CommTag = CommTag::new(11004);
const TAG_LARGEST_SELECTION: CommTag = CommTag::new(11006);
const TAG_MAP_CHUNKS: CommTag = CommTag::new(11008);

enum ChunkMesh<'a> {
    Borrowed(&'a Node),
    Owned(Arc<Node>),
}

/// An extracted (or passed-through) mesh subset, the unit of migration.
///
/// The mesh is borrowed from the input unless this chunk owns it; ownership
/// releases with the chunk.
pub struct Chunk<'a> {
    mesh: ChunkMesh<'a>,
    pub destination_rank: i32,
    pub destination_domain: i32,
}

impl<'a> Chunk<'a> {
    pub fn borrowed(mesh: &'a Node, destination_rank: i32, destination_domain: i32) -> Self {
        Chunk {
            mesh: ChunkMesh::Borrowed(mesh),
            destination_rank,
            destination_domain,
        }
    }

    pub fn owned(mesh: Node, destination_rank: i32, destination_domain: i32) -> Self {
        Chunk {
            mesh: ChunkMesh::Owned(Arc::new(mesh)),
            destination_rank,
            destination_domain,
        }
    }

    pub fn mesh(&self) -> &Node {
        match &self.mesh {
            ChunkMesh::Borrowed(m) => m,
            ChunkMesh::Owned(m) => m,
        }
    }

    pub fn owns(&self) -> bool {
        matches!(self.mesh, ChunkMesh::Owned(_))
    }

    /// Total element count over every topology of the chunk's mesh.
    pub fn num_elements(&self) -> u64 {
        let mesh = self.mesh();
        let Some(topos) = mesh.child("topologies") else {
            return 0;
        };
        topos
            .children()
            .map(|(_, t)| topology::num_elements(mesh, t).unwrap_or(0) as u64)
            .sum()
    }
}

/// Repartitions a set of input domains into `target` output domains.
pub struct Partitioner<'a, C: Communicator = NoComm> {
    comm: &'a C,
    rank: usize,
    size: usize,
    target: u32,
    options_target: u32,
    meshes: Vec<&'a Node>,
    selections: Vec<Box<dyn Selection>>,
    selected_fields: Vec<String>,
    mapping: bool,
}

impl<'a, C: Communicator> Partitioner<'a, C> {
    pub fn new(comm: &'a C) -> Self {
        Partitioner {
            comm,
            rank: comm.rank(),
            size: comm.size(),
            target: 0,
            options_target: 0,
            meshes: Vec::new(),
            selections: Vec::new(),
            selected_fields: Vec::new(),
            mapping: false,
        }
    }

    /// Number of selections currently held on this rank.
    pub fn num_local_selections(&self) -> usize {
        self.selections.len()
    }

    /// Read the mesh and options; instantiate and validate selections.
    ///
    /// With no `selections` in the options, one whole-mesh selection is
    /// synthesized per local input domain.
    pub fn initialize(&mut self, mesh: &'a Node, options: &Node) -> Result<(), RepartError> {
        self.meshes = mesh::domains(mesh);
        self.options_target = options_get_target(options)?;
        self.selected_fields = options_get_fields(options)?;
        self.mapping = options_get_mapping(options)?;

        self.selections.clear();
        match options.child("selections") {
            Some(list) if list.num_children() > 0 => {
                for (index, (_, descriptor)) in list.children().enumerate() {
                    let type_name = descriptor.fetch_str("type").ok_or_else(|| {
                        RepartError::Options(format!("selection {index} has no type"))
                    })?;
                    let mut sel = create_selection(type_name)?;
                    sel.init(descriptor)?;
                    let domain = sel.core().domain;
                    if domain >= self.meshes.len() {
                        return Err(RepartError::InvalidDomain {
                            domain,
                            ndomains: self.meshes.len(),
                        });
                    }
                    if sel.core().destination_rank != FREE_RANK_ID
                        && sel.core().destination_rank as usize >= self.size
                    {
                        return Err(RepartError::Options(format!(
                            "selection {index} pins destination_rank {} but there are {} rank(s)",
                            sel.core().destination_rank,
                            self.size
                        )));
                    }
                    if !sel.applicable(self.meshes[domain]) {
                        return Err(RepartError::InapplicableSelection {
                            index,
                            topology: sel.core().topology.clone(),
                        });
                    }
                    sel.core_mut().preserve_mapping = self.mapping;
                    self.selections.push(sel);
                }
                self.add_complement_selections()?;
            }
            _ => {
                for (domain, dom_mesh) in self.meshes.iter().enumerate() {
                    let mut sel = create_selection_all_elements(dom_mesh)?;
                    sel.core_mut().domain = domain;
                    sel.core_mut().preserve_mapping = self.mapping;
                    self.selections.push(sel);
                }
            }
        }
        Ok(())
    }

    /// Elements of a topology that no user selection chose become an
    /// explicit remainder selection, so providing selections over part of a
    /// domain still conserves the domain's cells. Only `(domain, topology)`
    /// pairs that appear in some user selection are considered.
    fn add_complement_selections(&mut self) -> Result<(), RepartError> {
        let mut covered: BTreeMap<(usize, String), Vec<bool>> = BTreeMap::new();
        for sel in &self.selections {
            let mesh = self.mesh_for(sel.as_ref())?;
            let (topo_name, topo) = sel.selected_topology(mesh)?;
            let n = topology::num_elements(mesh, topo)?;
            if n == 0 {
                continue;
            }
            let mask = covered
                .entry((sel.core().domain, topo_name.to_string()))
                .or_insert_with(|| vec![false; n]);
            for id in sel.element_ids_for_topo(mesh, (0, n - 1)) {
                mask[id] = true;
            }
        }
        for ((domain, topo_name), mask) in covered {
            let missing: Vec<u64> = mask
                .iter()
                .enumerate()
                .filter(|(_, &c)| !c)
                .map(|(id, _)| id as u64)
                .collect();
            if missing.is_empty() {
                continue;
            }
            let mut core = crate::selection::SelectionCore::for_topology(domain, topo_name);
            core.preserve_mapping = self.mapping;
            self.selections
                .push(Box::new(crate::selection::ExplicitSelection::from_ids(
                    core, missing,
                )));
        }
        Ok(())
    }

    fn mesh_for(&self, sel: &dyn Selection) -> Result<&'a Node, RepartError> {
        let domain = sel.core().domain;
        self.meshes
            .get(domain)
            .copied()
            .ok_or(RepartError::InvalidDomain {
                domain,
                ndomains: self.meshes.len(),
            })
    }

    /// Total number of selections across all ranks.
    fn get_total_selections(&self) -> Result<u64, RepartError> {
        all_reduce_sum(self.comm, TAG_TOTAL_SELECTIONS, self.selections.len() as u64)
    }

    /// Rank holding the largest selection, its local index there, and the
    /// length. Ties break to the lowest rank, then the lowest local index.
    fn get_largest_selection(&self) -> Result<(usize, usize, u64), RepartError> {
        let mut local_largest = 0u64;
        let mut local_index = 0usize;
        for (i, sel) in self.selections.iter().enumerate() {
            let len = self.mesh_for(sel.as_ref()).map(|m| sel.length(m) as u64)?;
            if len > local_largest {
                local_largest = len;
                local_index = i;
            }
        }
        let (value, rank) = all_reduce_max_loc(self.comm, TAG_LARGEST_SELECTION, local_largest)?;
        Ok((rank, local_index, value))
    }

    /// Target count implied by the selections: free selections plus distinct
    /// reserved destination domains, over all ranks.
    fn count_targets(&self) -> Result<u32, RepartError> {
        let local_dd: Vec<i32> = self
            .selections
            .iter()
            .map(|s| s.core().destination_domain)
            .collect();
        let (global_dd, _, _) = all_gather_v(self.comm, TAG_COUNT_TARGETS, &local_dd)?;
        let mut free = 0u32;
        let mut named = BTreeSet::new();
        for dd in global_dd {
            if dd == FREE_DOMAIN_ID {
                free += 1;
            } else {
                named.insert(dd);
            }
        }
        Ok(free + named.len() as u32)
    }

    /// Split selections until the global count reaches the target.
    ///
    /// Field selections are data-driven and expand first, one sub-selection
    /// per distinct field value, before the target is computed. The loop
    /// then repeatedly splits the globally largest selection; it stops with
    /// a warning when the largest selection cannot be split further.
    pub fn split_selections(&mut self) -> Result<(), RepartError> {
        // Data-driven pre-pass.
        let mut i = 0;
        while i < self.selections.len() {
            if self.selections[i].kind_name() == "field" {
                let mesh = self.mesh_for(self.selections[i].as_ref())?;
                let subs = self.selections[i].partition(mesh)?;
                drop(self.selections.splice(i..=i, subs));
            } else {
                i += 1;
            }
        }

        let requested = all_reduce_max(self.comm, TAG_TARGET, self.options_target as u64)? as u32;
        self.target = if requested > 0 {
            requested
        } else {
            self.count_targets()?
        };

        let mut n = self.get_total_selections()?;
        while n < self.target as u64 {
            let (sel_rank, sel_index, largest) = self.get_largest_selection()?;
            if largest <= 1 {
                log::warn!(
                    "cannot reach target {}: largest selection has {} element(s)",
                    self.target,
                    largest
                );
                break;
            }
            if sel_rank == self.rank {
                let mesh = self.mesh_for(self.selections[sel_index].as_ref())?;
                match self.selections[sel_index].partition(mesh) {
                    Ok(subs) => {
                        drop(self.selections.splice(sel_index..=sel_index, subs));
                    }
                    Err(e) => {
                        log::warn!("selection {sel_index} refused to split: {e}");
                    }
                }
            }
            let n_next = self.get_total_selections()?;
            if n_next == n {
                log::warn!(
                    "splitting made no progress at {} of {} selections",
                    n,
                    self.target
                );
                break;
            }
            n = n_next;
        }
        Ok(())
    }

    /// Produce one chunk per selection. Whole-mesh selections with no
    /// mapping request pass the input mesh through unextracted; everything
    /// else is materialized. A failing extraction skips its chunk with a
    /// warning rather than aborting the partitioner.
    pub fn extract_chunks(&self) -> Result<Vec<Chunk<'a>>, RepartError> {
        let mut chunks = Vec::with_capacity(self.selections.len());
        for sel in &self.selections {
            let mesh = self.mesh_for(sel.as_ref())?;
            let dest_rank = sel.core().destination_rank;
            let dest_domain = sel.core().destination_domain;
            if sel.get_whole(mesh) && !sel.core().preserve_mapping {
                chunks.push(Chunk::borrowed(mesh, dest_rank, dest_domain));
                continue;
            }
            match extract(sel.as_ref(), mesh, &self.selected_fields) {
                Ok(chunk_mesh) => chunks.push(Chunk::owned(chunk_mesh, dest_rank, dest_domain)),
                Err(e) => log::warn!("skipping chunk for selection `{}`: {e}", sel.kind_name()),
            }
        }
        Ok(chunks)
    }

    /// Assign every chunk (globally) a destination domain and rank.
    ///
    /// Returns `(dest_rank, dest_domain, offsets)` over the global chunk
    /// array; all three are identical on every rank, which is what the
    /// matching sends/recvs in [`communicate_chunks`] rely on.
    #[allow(clippy::type_complexity)]
    pub fn map_chunks(
        &self,
        chunks: &[Chunk<'a>],
    ) -> Result<(Vec<i32>, Vec<i32>, Vec<usize>), RepartError> {
        let local_info: Vec<ChunkInfo> = chunks
            .iter()
            .map(|c| ChunkInfo {
                num_elements: c.num_elements(),
                destination_rank: c.destination_rank,
                destination_domain: c.destination_domain,
            })
            .collect();
        let (global, _counts, offsets) = all_gather_v(self.comm, TAG_MAP_CHUNKS, &local_info)?;
        let ntotal = global.len();
        log::debug!("map_chunks: {ntotal} global chunk(s), target {}", self.target);

        let mut dest_rank: Vec<i32> = global.iter().map(|c| c.destination_rank).collect();
        let mut dest_domain: Vec<i32> = global.iter().map(|c| c.destination_domain).collect();
        if ntotal == 0 {
            return Ok((dest_rank, dest_domain, offsets));
        }

        // Reserved domain ids and their element counts.
        let mut domain_elem_counts: BTreeMap<i32, u64> = BTreeMap::new();
        for info in &global {
            if info.destination_domain != FREE_DOMAIN_ID {
                *domain_elem_counts.entry(info.destination_domain).or_insert(0) +=
                    info.num_elements;
            }
        }
        let reserved = domain_elem_counts.len() as u32;
        if reserved > self.target {
            // Absorption: free chunks join the reserved domains.
            log::warn!(
                "{} unique reserved domain id(s) exceed the target of {}",
                reserved,
                self.target
            );
        } else {
            // Seed fresh ids: smallest non-negative ids not yet reserved.
            let mut domid = 0i32;
            for _ in 0..self.target - reserved {
                while domain_elem_counts.contains_key(&domid) {
                    domid += 1;
                }
                domain_elem_counts.insert(domid, 0);
            }
        }

        // Greedy least-loaded fill of free chunks, in global order; ties
        // break to the lowest domain id.
        for (i, info) in global.iter().enumerate() {
            if dest_domain[i] == FREE_DOMAIN_ID {
                let (&best, _) = domain_elem_counts
                    .iter()
                    .min_by_key(|&(&id, &count)| (count, id))
                    .ok_or_else(|| RepartError::Invariant("no destination domains exist".into()))?;
                dest_domain[i] = best;
                *domain_elem_counts.get_mut(&best).ok_or_else(|| {
                    RepartError::Invariant("domain count table lost an id".into())
                })? += info.num_elements;
            }
        }

        let produced: BTreeSet<i32> = dest_domain.iter().copied().collect();
        if (produced.len() as u32) < self.target {
            log::warn!(
                "producing {} domain(s) instead of the requested {}",
                produced.len(),
                self.target
            );
        }

        // Final per-domain totals, for descending-size rank packing.
        let mut domain_totals: BTreeMap<i32, u64> = BTreeMap::new();
        for (i, info) in global.iter().enumerate() {
            *domain_totals.entry(dest_domain[i]).or_insert(0) += info.num_elements;
        }

        // Domains not pinned to a rank, largest first (equal sizes: lowest
        // domain id first); each goes to the least-loaded rank, ties to the
        // lowest rank.
        let mut rank_elem_counts = vec![0u64; self.size];
        let mut domains_to_assign = BTreeSet::new();
        for i in 0..ntotal {
            if dest_rank[i] == FREE_RANK_ID {
                domains_to_assign.insert(dest_domain[i]);
            } else {
                rank_elem_counts[dest_rank[i] as usize] += global[i].num_elements;
            }
        }
        let mut ordered: Vec<i32> = domains_to_assign.into_iter().collect();
        ordered.sort_by_key(|d| (std::cmp::Reverse(domain_totals[d]), *d));
        for domid in ordered {
            let best_rank = (0..self.size)
                .min_by_key(|&r| (rank_elem_counts[r], r))
                .ok_or_else(|| RepartError::Invariant("no ranks to assign to".into()))?;
            rank_elem_counts[best_rank] += domain_totals[&domid];
            for i in 0..ntotal {
                if dest_domain[i] == domid {
                    dest_rank[i] = best_rank as i32;
                }
            }
        }

        log::debug!("map_chunks: dest_rank={dest_rank:?} dest_domain={dest_domain:?}");
        Ok((dest_rank, dest_domain, offsets))
    }

    /// Migrate chunks to their destination ranks and return the chunks this
    /// rank will assemble, with their destination domains.
    ///
    /// Every rank posts all of its sends, then drains its receives; tags are
    /// unique per global chunk index so each message matches exactly one
    /// receive. Received trees get `state/domain_id` rewritten to their
    /// destination domain after completion.
    pub fn communicate_chunks(
        &self,
        chunks: Vec<Chunk<'a>>,
        dest_rank: &[i32],
        dest_domain: &[i32],
        offsets: &[usize],
    ) -> Result<Vec<Chunk<'a>>, RepartError> {
        let ntotal = dest_rank.len();
        let nlocal = chunks.len();
        let my_offset = offsets[self.rank];

        // Sender of each global chunk, derived from the offsets.
        let mut src_rank = vec![self.size - 1; ntotal];
        for r in 0..self.size {
            let end = if r + 1 < self.size { offsets[r + 1] } else { ntotal };
            for s in src_rank.iter_mut().take(end).skip(offsets[r]) {
                *s = r;
            }
        }

        let tag_for = |g: usize| CommTag::new(PARTITION_TAG_BASE).offset((3 * g) as u16);

        let mut exchange = MeshExchange::new(self.comm);
        let mut local = Vec::with_capacity(nlocal);
        for (k, chunk) in chunks.into_iter().enumerate() {
            let g = my_offset + k;
            if dest_rank[g] != self.rank as i32 {
                log::debug!("send chunk {g} to rank {}", dest_rank[g]);
                exchange.add_isend(chunk.mesh(), dest_rank[g] as usize, tag_for(g));
                local.push(None);
            } else {
                local.push(Some(chunk));
            }
        }

        let mut assembled: Vec<(usize, Chunk<'a>)> = Vec::new();
        for g in 0..ntotal {
            if dest_rank[g] != self.rank as i32 {
                continue;
            }
            if g >= my_offset && g < my_offset + nlocal {
                // Already ours; reuse in place with the assigned domain.
                let mut chunk = local[g - my_offset]
                    .take()
                    .ok_or_else(|| RepartError::Invariant("local chunk consumed twice".into()))?;
                chunk.destination_domain = dest_domain[g];
                assembled.push((g, chunk));
            } else {
                log::debug!("recv chunk {g} from rank {}", src_rank[g]);
                exchange.add_irecv(g, src_rank[g], tag_for(g));
            }
        }

        for (g, mut node) in exchange.execute()? {
            node.entry_path("state/domain_id").set(dest_domain[g] as i64);
            assembled.push((g, Chunk::owned(node, self.rank as i32, dest_domain[g])));
        }

        assembled.sort_by_key(|(g, _)| *g);
        Ok(assembled
            .into_iter()
            .map(|(g, mut chunk)| {
                chunk.destination_domain = dest_domain[g];
                chunk
            })
            .collect())
    }

    /// Run the full pipeline and populate `output` with this rank's share of
    /// the result: the single mesh when the target is one domain, otherwise
    /// one `domain_<id>` child per owned output domain.
    pub fn execute(&mut self, output: &mut Node) -> Result<(), RepartError> {
        self.split_selections()?;
        let chunks = self.extract_chunks()?;
        let (dest_rank, dest_domain, offsets) = self.map_chunks(&chunks)?;
        let assembled = self.communicate_chunks(chunks, &dest_rank, &dest_domain, &offsets)?;

        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (i, chunk) in assembled.iter().enumerate() {
            groups.entry(chunk.destination_domain).or_default().push(i);
        }

        let single = self.target == 1 && groups.len() == 1;
        for (domain, idxs) in groups {
            let inputs: Vec<&Node> = idxs.iter().map(|&i| assembled[i].mesh()).collect();
            if single {
                combine::combine(domain, &inputs, output)?;
            } else {
                let child = output.entry(&format!("domain_{domain:06}"));
                combine::combine(domain, &inputs, child)?;
            }
        }
        Ok(())
    }
}

fn options_get_target(options: &Node) -> Result<u32, RepartError> {
    let Some(node) = options.child("target") else {
        return Ok(0);
    };
    if !matches!(
        node.value().dtype(),
        DType::Int32 | DType::Int64 | DType::UInt64
    ) {
        return Err(RepartError::Options("target must be an integer".into()));
    }
    let v = node
        .value()
        .as_i64()
        .ok_or_else(|| RepartError::Options("target must be an integer".into()))?;
    if v < 0 {
        return Err(RepartError::Options("target must be non-negative".into()));
    }
    Ok(v as u32)
}

fn options_get_fields(options: &Node) -> Result<Vec<String>, RepartError> {
    let Some(list) = options.child("fields") else {
        return Ok(Vec::new());
    };
    let mut fields = Vec::new();
    for (name, entry) in list.children() {
        // entries are either string leaves or bare named children
        match entry.value().as_str() {
            Some(s) => fields.push(s.to_string()),
            None => fields.push(name.to_string()),
        }
    }
    Ok(fields)
}

fn options_get_mapping(options: &Node) -> Result<bool, RepartError> {
    let Some(node) = options.child("mapping") else {
        return Ok(false);
    };
    node.value()
        .as_i64()
        .map(|v| v != 0)
        .ok_or_else(|| RepartError::Options("mapping must be an integer flag".into()))
}

/// Repartition `mesh` into `options.target` domains, serially.
///
/// `mesh` is a single domain or a list of domains; `output` receives either
/// a single domain (target 1) or one child per output domain.
pub fn partition(mesh: &Node, options: &Node, output: &mut Node) -> Result<(), RepartError> {
    let comm = NoComm;
    let mut p = Partitioner::new(&comm);
    p.initialize(mesh, options)?;
    p.execute(output)
}

/// Repartition across the ranks of `comm`; same contract as [`partition`],
/// with each rank receiving the output domains mapped to it.
pub fn parallel_partition<C: Communicator>(
    mesh: &Node,
    options: &Node,
    output: &mut Node,
    comm: &C,
) -> Result<(), RepartError> {
    let mut p = Partitioner::new(comm);
    p.initialize(mesh, options)?;
    p.execute(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::{tri_fan_mesh, uniform_mesh_2d};

    fn target_options(target: i64) -> Node {
        let mut opts = Node::new();
        opts.entry("target").set(target);
        opts
    }

    #[test]
    fn initialize_synthesizes_whole_selections() {
        let mesh = uniform_mesh_2d(4, 4);
        let comm = NoComm;
        let mut p = Partitioner::new(&comm);
        p.initialize(&mesh, &target_options(2)).unwrap();
        assert_eq!(p.num_local_selections(), 1);
        assert_eq!(p.selections[0].kind_name(), "logical");
    }

    #[test]
    fn initialize_rejects_unknown_selection_type() {
        let mesh = uniform_mesh_2d(4, 4);
        let mut opts = Node::new();
        opts.entry_path("selections/s0/type").set("voronoi");
        let comm = NoComm;
        let mut p = Partitioner::new(&comm);
        assert!(matches!(
            p.initialize(&mesh, &opts),
            Err(RepartError::UnknownSelectionType(_))
        ));
    }

    #[test]
    fn initialize_rejects_inapplicable_selection() {
        let mesh = tri_fan_mesh(4);
        let mut opts = Node::new();
        let s = opts.entry_path("selections/s0");
        s.entry("type").set("logical");
        s.entry("start").set(vec![0i64, 0]);
        s.entry("end").set(vec![1i64, 1]);
        let comm = NoComm;
        let mut p = Partitioner::new(&comm);
        assert!(matches!(
            p.initialize(&mesh, &opts),
            Err(RepartError::InapplicableSelection { .. })
        ));
    }

    #[test]
    fn split_reaches_target_count() {
        let mesh = uniform_mesh_2d(10, 10);
        let comm = NoComm;
        let mut p = Partitioner::new(&comm);
        p.initialize(&mesh, &target_options(4)).unwrap();
        p.split_selections().unwrap();
        assert_eq!(p.num_local_selections(), 4);
        let total: usize = p
            .selections
            .iter()
            .map(|s| s.length(&mesh))
            .sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn split_stops_on_unsplittable_selection() {
        let mesh = tri_fan_mesh(2);
        let comm = NoComm;
        let mut p = Partitioner::new(&comm);
        p.initialize(&mesh, &target_options(5)).unwrap();
        p.split_selections().unwrap();
        // two single-triangle selections cannot split further
        assert_eq!(p.num_local_selections(), 2);
    }

    #[test]
    fn map_chunks_fills_least_loaded_domain() {
        let m_big = uniform_mesh_2d(4, 4); // 16 elements
        let m_small = uniform_mesh_2d(2, 1); // 2 elements
        let comm = NoComm;
        let mut p = Partitioner::new(&comm);
        p.target = 2;
        let chunks = vec![
            Chunk::borrowed(&m_big, FREE_RANK_ID, FREE_DOMAIN_ID),
            Chunk::borrowed(&m_small, FREE_RANK_ID, FREE_DOMAIN_ID),
            Chunk::borrowed(&m_small, FREE_RANK_ID, FREE_DOMAIN_ID),
        ];
        let (dest_rank, dest_domain, offsets) = p.map_chunks(&chunks).unwrap();
        assert_eq!(offsets, vec![0]);
        assert_eq!(dest_rank, vec![0, 0, 0]);
        // big chunk takes domain 0; both small ones land in domain 1
        assert_eq!(dest_domain, vec![0, 1, 1]);
    }

    #[test]
    fn map_chunks_absorbs_when_reserved_exceed_target() {
        let m = uniform_mesh_2d(2, 2);
        let comm = NoComm;
        let mut p = Partitioner::new(&comm);
        p.target = 1;
        let chunks = vec![
            Chunk::borrowed(&m, FREE_RANK_ID, 7),
            Chunk::borrowed(&m, FREE_RANK_ID, 9),
            Chunk::borrowed(&m, FREE_RANK_ID, FREE_DOMAIN_ID),
        ];
        let (_, dest_domain, _) = p.map_chunks(&chunks).unwrap();
        // no fresh ids: the free chunk joins the lightest reserved domain
        assert_eq!(dest_domain[0], 7);
        assert_eq!(dest_domain[1], 9);
        assert!(dest_domain[2] == 7 || dest_domain[2] == 9);
    }

    #[test]
    fn options_validation() {
        let mut opts = Node::new();
        opts.entry("target").set(2.5);
        assert!(options_get_target(&opts).is_err());
        let mut opts = Node::new();
        opts.entry("target").set(-3i64);
        assert!(options_get_target(&opts).is_err());
        let mut opts = Node::new();
        opts.entry("target").set(3i64);
        assert_eq!(options_get_target(&opts).unwrap(), 3);
        assert_eq!(options_get_target(&Node::new()).unwrap(), 0);

        let mut opts = Node::new();
        opts.entry_path("fields/f0").set("rho");
        opts.entry_path("fields/pressure");
        assert_eq!(
            options_get_fields(&opts).unwrap(),
            vec!["rho".to_string(), "pressure".to_string()]
        );
    }
}
