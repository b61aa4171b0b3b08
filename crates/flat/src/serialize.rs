//! Snapshot format of a [`BruteforceSearch`](crate::BruteforceSearch).
//!
//! ```text
//! magic        8 bytes  "NDLFLAT\0"
//! version      u32
//! dim          u32
//! metric       u8
//! max_elements u64
//! count        u64
//! count x { label u32, vector dim x f32 }
//! ```

use needle_core::codec::{ByteReader, ByteWriter};
use needle_core::{IndexError, IndexResult, InternalId, MetricSpace, PointStore};

pub const MAGIC: &[u8; 8] = b"NDLFLAT\0";
pub const VERSION: u32 = 1;

pub(crate) fn encode(space: &MetricSpace, store: &PointStore) -> Vec<u8> {
    let dim = space.num_dimensions();
    let mut w = ByteWriter::with_capacity(40 + store.len() * (4 + dim * 4));
    w.put_bytes(MAGIC);
    w.put_u32(VERSION);
    w.put_space(space);
    w.put_u64(store.capacity() as u64);
    w.put_u64(store.len() as u64);
    for id in 0..store.len() as InternalId {
        w.put_u32(store.label(id));
        w.put_f32s(store.vector(id));
    }
    w.into_inner()
}

pub(crate) fn decode(space: &MetricSpace, bytes: &[u8]) -> IndexResult<PointStore> {
    let mut r = ByteReader::new(bytes);
    r.expect_magic(MAGIC)?;
    let version = r.u32("version")?;
    if version != VERSION {
        return Err(IndexError::CorruptData(format!(
            "unsupported format version {}",
            version
        )));
    }
    r.expect_space(space)?;
    let dim = space.num_dimensions();

    let max_elements = r.len_u64("max elements")?;
    let count = r.len_u64("element count")?;
    if count > max_elements || count > u32::MAX as usize {
        return Err(IndexError::CorruptData(format!(
            "element count {} exceeds capacity {}",
            count, max_elements
        )));
    }

    let plausible = count.min(r.remaining() / (4 + dim * 4) + 1);
    let mut labels = Vec::with_capacity(plausible);
    let mut data = Vec::with_capacity(plausible * dim);
    for _ in 0..count {
        labels.push(r.u32("label")?);
        r.f32s_into(dim, &mut data, "vector")?;
    }
    r.finish()?;

    PointStore::from_parts(dim, max_elements, labels, data, vec![false; count])
}
