//! Schema-aware migration of whole mesh trees between ranks.
//!
//! Each migrating chunk travels as three tagged messages sharing a base tag:
//! a fixed 16-byte header `(schema_len, data_len)`, the self-describing
//! schema bytes, and the concatenated leaf buffers. The receiver learns the
//! payload sizes from the header before the payloads arrive, so trees of any
//! shape cross without a prior size agreement.
//!
//! All multi-byte integers on the wire are little-endian.

use bytemuck::{Pod, Zeroable};

use crate::comm::{CommTag, Communicator, Wait};
use crate::error::RepartError;
use crate::tree::{Node, Value};

/// Per-chunk descriptor gathered across ranks during `map_chunks`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct ChunkInfo {
    /// Total element count over the chunk's topologies.
    pub num_elements: u64,
    /// Pinned destination rank or `FREE_RANK_ID`.
    pub destination_rank: i32,
    /// Pinned destination domain or `FREE_DOMAIN_ID`.
    pub destination_domain: i32,
}

const _: () = {
    assert!(std::mem::size_of::<ChunkInfo>() == 16);
    assert!(std::mem::align_of::<ChunkInfo>() == 8);
};

// Value dtype tags on the wire.
const DT_EMPTY: u8 = 0;
const DT_STRING: u8 = 1;
const DT_INT32: u8 = 2;
const DT_INT64: u8 = 3;
const DT_UINT64: u8 = 4;
const DT_FLOAT64: u8 = 5;

/// Serialize a tree into `(schema, data)` byte buffers.
///
/// Schema entry, depth first: dtype `u8`, leaf element count `u64`,
/// child count `u32`, then per child a length-prefixed name and its entry.
/// Data is every leaf buffer in schema order.
pub fn serialize_node(node: &Node) -> (Vec<u8>, Vec<u8>) {
    let mut schema = Vec::new();
    let mut data = Vec::new();
    encode_entry(node, &mut schema, &mut data);
    (schema, data)
}

fn encode_entry(node: &Node, schema: &mut Vec<u8>, data: &mut Vec<u8>) {
    match node.value() {
        Value::Empty => {
            schema.push(DT_EMPTY);
            schema.extend_from_slice(&0u64.to_le_bytes());
        }
        Value::String(s) => {
            schema.push(DT_STRING);
            schema.extend_from_slice(&(s.len() as u64).to_le_bytes());
            data.extend_from_slice(s.as_bytes());
        }
        Value::Int32(v) => {
            schema.push(DT_INT32);
            schema.extend_from_slice(&(v.len() as u64).to_le_bytes());
            for x in v {
                data.extend_from_slice(&x.to_le_bytes());
            }
        }
        Value::Int64(v) => {
            schema.push(DT_INT64);
            schema.extend_from_slice(&(v.len() as u64).to_le_bytes());
            for x in v {
                data.extend_from_slice(&x.to_le_bytes());
            }
        }
        Value::UInt64(v) => {
            schema.push(DT_UINT64);
            schema.extend_from_slice(&(v.len() as u64).to_le_bytes());
            for x in v {
                data.extend_from_slice(&x.to_le_bytes());
            }
        }
        Value::Float64(v) => {
            schema.push(DT_FLOAT64);
            schema.extend_from_slice(&(v.len() as u64).to_le_bytes());
            for x in v {
                data.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
    schema.extend_from_slice(&(node.num_children() as u32).to_le_bytes());
    for (name, child) in node.children() {
        schema.extend_from_slice(&(name.len() as u32).to_le_bytes());
        schema.extend_from_slice(name.as_bytes());
        encode_entry(child, schema, data);
    }
}

/// Rebuild a tree from its `(schema, data)` buffers.
pub fn deserialize_node(schema: &[u8], data: &[u8]) -> Result<Node, RepartError> {
    let mut cursor = Cursor {
        schema,
        data,
        spos: 0,
        dpos: 0,
    };
    let node = decode_entry(&mut cursor)?;
    if cursor.spos != schema.len() {
        return Err(RepartError::Decode(format!(
            "trailing schema bytes: {} of {}",
            cursor.spos,
            schema.len()
        )));
    }
    Ok(node)
}

struct Cursor<'b> {
    schema: &'b [u8],
    data: &'b [u8],
    spos: usize,
    dpos: usize,
}

impl<'b> Cursor<'b> {
    fn schema_bytes(&mut self, n: usize) -> Result<&'b [u8], RepartError> {
        let end = self.spos + n;
        if end > self.schema.len() {
            return Err(RepartError::Decode("schema truncated".into()));
        }
        let out = &self.schema[self.spos..end];
        self.spos = end;
        Ok(out)
    }

    fn data_bytes(&mut self, n: usize) -> Result<&'b [u8], RepartError> {
        let end = self.dpos + n;
        if end > self.data.len() {
            return Err(RepartError::Decode("data truncated".into()));
        }
        let out = &self.data[self.dpos..end];
        self.dpos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, RepartError> {
        Ok(self.schema_bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, RepartError> {
        Ok(u32::from_le_bytes(self.schema_bytes(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, RepartError> {
        Ok(u64::from_le_bytes(self.schema_bytes(8)?.try_into().unwrap()))
    }
}

fn decode_entry(c: &mut Cursor) -> Result<Node, RepartError> {
    let dtype = c.u8()?;
    let count = c.u64()? as usize;
    let mut node = Node::new();
    match dtype {
        DT_EMPTY => {}
        DT_STRING => {
            let bytes = c.data_bytes(count)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| RepartError::Decode("string leaf is not UTF-8".into()))?;
            node.set(s.to_string());
        }
        DT_INT32 => {
            let bytes = c.data_bytes(count * 4)?;
            node.set(
                bytes
                    .chunks_exact(4)
                    .map(|b| i32::from_le_bytes(b.try_into().unwrap()))
                    .collect::<Vec<_>>(),
            );
        }
        DT_INT64 => {
            let bytes = c.data_bytes(count * 8)?;
            node.set(
                bytes
                    .chunks_exact(8)
                    .map(|b| i64::from_le_bytes(b.try_into().unwrap()))
                    .collect::<Vec<_>>(),
            );
        }
        DT_UINT64 => {
            let bytes = c.data_bytes(count * 8)?;
            node.set(
                bytes
                    .chunks_exact(8)
                    .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
                    .collect::<Vec<_>>(),
            );
        }
        DT_FLOAT64 => {
            let bytes = c.data_bytes(count * 8)?;
            node.set(
                bytes
                    .chunks_exact(8)
                    .map(|b| f64::from_le_bytes(b.try_into().unwrap()))
                    .collect::<Vec<_>>(),
            );
        }
        other => {
            return Err(RepartError::Decode(format!("unknown dtype tag {other}")));
        }
    }
    let nchildren = c.u32()? as usize;
    for _ in 0..nchildren {
        let name_len = c.u32()? as usize;
        let name = std::str::from_utf8(c.schema_bytes(name_len)?)
            .map_err(|_| RepartError::Decode("child name is not UTF-8".into()))?
            .to_string();
        let child = decode_entry(c)?;
        node.set_child(&name, child);
    }
    Ok(node)
}

const HEADER_LEN: usize = 16;

/// Batch engine that migrates whole trees with non-blocking sends/recvs.
///
/// All sends post before any receive is drained, so no rank blocks between
/// posting its sends and posting its receives; completion order across ranks
/// is arbitrary.
pub struct MeshExchange<'c, C: Communicator> {
    comm: &'c C,
    sends: Vec<(usize, CommTag, Vec<u8>, Vec<u8>)>,
    recvs: Vec<(usize, usize, CommTag)>,
}

impl<'c, C: Communicator> MeshExchange<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        MeshExchange {
            comm,
            sends: Vec::new(),
            recvs: Vec::new(),
        }
    }

    /// Queue a tree for sending to `dest` with the given base tag.
    pub fn add_isend(&mut self, node: &Node, dest: usize, tag: CommTag) {
        let (schema, data) = serialize_node(node);
        self.sends.push((dest, tag, schema, data));
    }

    /// Queue a receive from `src`; `slot` keys the decoded tree in the
    /// result of [`execute`](Self::execute).
    pub fn add_irecv(&mut self, slot: usize, src: usize, tag: CommTag) {
        self.recvs.push((slot, src, tag));
    }

    /// Drive every queued operation to completion and return the received
    /// trees keyed by slot.
    pub fn execute(self) -> Result<Vec<(usize, Node)>, RepartError> {
        let mut pending = Vec::with_capacity(self.sends.len() * 3);
        for (dest, tag, schema, data) in &self.sends {
            let mut header = [0u8; HEADER_LEN];
            header[..8].copy_from_slice(&(schema.len() as u64).to_le_bytes());
            header[8..].copy_from_slice(&(data.len() as u64).to_le_bytes());
            pending.push(self.comm.isend(*dest, tag.as_u16(), &header));
            pending.push(self.comm.isend(*dest, tag.offset(1).as_u16(), schema));
            pending.push(self.comm.isend(*dest, tag.offset(2).as_u16(), data));
        }

        let mut header_recvs = Vec::with_capacity(self.recvs.len());
        for &(slot, src, tag) in &self.recvs {
            let mut template = [0u8; HEADER_LEN];
            header_recvs.push((slot, src, tag, self.comm.irecv(src, tag.as_u16(), &mut template)));
        }

        let mut out = Vec::with_capacity(self.recvs.len());
        for (slot, src, tag, h) in header_recvs {
            let header = h.wait().ok_or_else(|| RepartError::Transport {
                peer: src,
                message: "chunk header receive failed".into(),
            })?;
            if header.len() != HEADER_LEN {
                return Err(RepartError::Transport {
                    peer: src,
                    message: format!("chunk header was {} bytes", header.len()),
                });
            }
            let schema_len = u64::from_le_bytes(header[..8].try_into().unwrap()) as usize;
            let data_len = u64::from_le_bytes(header[8..].try_into().unwrap()) as usize;
            let mut schema = vec![0u8; schema_len];
            let hs = self.comm.irecv(src, tag.offset(1).as_u16(), &mut schema);
            let mut data = vec![0u8; data_len];
            let hd = self.comm.irecv(src, tag.offset(2).as_u16(), &mut data);
            let schema = hs.wait().ok_or_else(|| RepartError::Transport {
                peer: src,
                message: "chunk schema receive failed".into(),
            })?;
            let data = hd.wait().ok_or_else(|| RepartError::Transport {
                peer: src,
                message: "chunk data receive failed".into(),
            })?;
            out.push((slot, deserialize_node(&schema, &data)?));
        }

        for s in pending {
            let _ = s.wait();
        }
        Ok(out)
    }
}
