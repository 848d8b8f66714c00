//! Collectives built over the point-to-point [`Communicator`] trait.
//!
//! Every collective posts its receives, posts its sends, then drains — the
//! same phasing the completion paths use for size exchange. All of them
//! degenerate to the local answer at `size() == 1`, which is what makes the
//! serial partitioner a trivial instantiation of the parallel one.

use bytemuck::{Pod, Zeroable};

use super::{CommTag, Communicator, Wait};
use crate::error::RepartError;

fn transport_err(peer: usize, what: &str) -> RepartError {
    RepartError::Transport {
        peer,
        message: format!("{what} returned no data"),
    }
}

/// Gather one `T` from every rank; result is indexed by rank and identical
/// on all ranks.
pub fn all_gather<C, T>(comm: &C, tag: CommTag, value: T) -> Result<Vec<T>, RepartError>
where
    C: Communicator,
    T: Pod,
{
    let (rank, size) = (comm.rank(), comm.size());
    let mut out = vec![value; size];
    if size == 1 {
        return Ok(out);
    }

    let mut recvs = Vec::with_capacity(size - 1);
    for peer in (0..size).filter(|&p| p != rank) {
        let mut template = vec![0u8; std::mem::size_of::<T>()];
        recvs.push((peer, comm.irecv(peer, tag.as_u16(), &mut template)));
    }
    let mut sends = Vec::with_capacity(size - 1);
    for peer in (0..size).filter(|&p| p != rank) {
        sends.push(comm.isend(peer, tag.as_u16(), bytemuck::bytes_of(&value)));
    }
    for (peer, h) in recvs {
        let raw = h.wait().ok_or_else(|| transport_err(peer, "all_gather recv"))?;
        if raw.len() != std::mem::size_of::<T>() {
            return Err(RepartError::Transport {
                peer,
                message: format!(
                    "all_gather expected {} bytes, got {}",
                    std::mem::size_of::<T>(),
                    raw.len()
                ),
            });
        }
        out[peer] = *bytemuck::from_bytes(&raw);
    }
    for s in sends {
        let _ = s.wait();
    }
    Ok(out)
}

/// Gather a variable-length slice of `T` from every rank. Returns the
/// concatenated global array (rank order), per-rank counts, and exclusive
/// prefix offsets — all identical on every rank.
#[allow(clippy::type_complexity)]
pub fn all_gather_v<C, T>(
    comm: &C,
    tag: CommTag,
    local: &[T],
) -> Result<(Vec<T>, Vec<usize>, Vec<usize>), RepartError>
where
    C: Communicator,
    T: Pod,
{
    let (rank, size) = (comm.rank(), comm.size());
    let counts_u64 = all_gather(comm, tag, local.len() as u64)?;
    let counts: Vec<usize> = counts_u64.iter().map(|&c| c as usize).collect();
    let mut offsets = vec![0usize; size];
    for r in 1..size {
        offsets[r] = offsets[r - 1] + counts[r - 1];
    }
    let total: usize = counts.iter().sum();

    let data_tag = tag.offset(1);
    let mut recvs = Vec::new();
    for peer in (0..size).filter(|&p| p != rank && counts[p] > 0) {
        let mut template = vec![0u8; counts[peer] * std::mem::size_of::<T>()];
        recvs.push((peer, comm.irecv(peer, data_tag.as_u16(), &mut template)));
    }
    let mut sends = Vec::new();
    if !local.is_empty() {
        for peer in (0..size).filter(|&p| p != rank) {
            sends.push(comm.isend(peer, data_tag.as_u16(), bytemuck::cast_slice(local)));
        }
    }

    let mut global = vec![T::zeroed(); total];
    global[offsets[rank]..offsets[rank] + local.len()].copy_from_slice(local);
    for (peer, h) in recvs {
        let raw = h
            .wait()
            .ok_or_else(|| transport_err(peer, "all_gather_v recv"))?;
        let expect = counts[peer] * std::mem::size_of::<T>();
        if raw.len() != expect {
            return Err(RepartError::Transport {
                peer,
                message: format!("all_gather_v expected {expect} bytes, got {}", raw.len()),
            });
        }
        bytemuck::cast_slice_mut(&mut global[offsets[peer]..offsets[peer] + counts[peer]])
            .copy_from_slice(&raw);
    }
    for s in sends {
        let _ = s.wait();
    }
    Ok((global, counts, offsets))
}

/// Sum of one `u64` per rank.
pub fn all_reduce_sum(comm: &impl Communicator, tag: CommTag, value: u64) -> Result<u64, RepartError> {
    Ok(all_gather(comm, tag, value)?.into_iter().sum())
}

/// Max of one `u64` per rank.
pub fn all_reduce_max(comm: &impl Communicator, tag: CommTag, value: u64) -> Result<u64, RepartError> {
    Ok(all_gather(comm, tag, value)?
        .into_iter()
        .max()
        .unwrap_or(value))
}

/// Max with location: the maximum value and the lowest rank holding it.
pub fn all_reduce_max_loc(
    comm: &impl Communicator,
    tag: CommTag,
    value: u64,
) -> Result<(u64, usize), RepartError> {
    let gathered = all_gather(comm, tag, value)?;
    let mut best = (gathered[0], 0usize);
    for (r, &v) in gathered.iter().enumerate().skip(1) {
        if v > best.0 {
            best = (v, r);
        }
    }
    Ok(best)
}
