use std::io::{Read, Write};

use crate::{
    error::{ChainError, MeridianResult},
    protocol::ChainId,
    store::table::{SecondaryIndexes, StoredObject, Table},
};

const MAGIC: &[u8; 8] = b"MRDNSNP1";

fn corrupt(what: impl std::fmt::Display) -> crate::error::MeridianError {
    ChainError::SnapshotCorrupt(what.to_string()).into()
}

/// Streams the store into a sequential snapshot: a magic header, the chain
/// id, then one section per table in a fixed order. Each section carries the
/// table's instance counter, a digest of the type schema, and its records in
/// ascending id order.
pub struct SnapshotWriter<W: Write> {
    out: W,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(mut out: W, chain_id: ChainId) -> MeridianResult<Self> {
        out.write_all(MAGIC).map_err(corrupt)?;
        out.write_all(&chain_id.0).map_err(corrupt)?;
        Ok(Self { out })
    }

    pub fn section<T: StoredObject, I: SecondaryIndexes<T>>(
        &mut self,
        table: &Table<T, I>,
    ) -> MeridianResult<()> {
        self.out
            .write_all(&[T::TAG.space() as u8, T::TAG.type_number()])
            .map_err(corrupt)?;
        self.out
            .write_all(&table.next_instance().to_le_bytes())
            .map_err(corrupt)?;
        self.out
            .write_all(blake3::hash(T::SCHEMA.as_bytes()).as_bytes())
            .map_err(corrupt)?;
        self.out
            .write_all(&(table.len() as u64).to_le_bytes())
            .map_err(corrupt)?;
        for obj in table.iter() {
            let record = postcard::to_allocvec(obj).map_err(corrupt)?;
            self.out
                .write_all(&(record.len() as u32).to_le_bytes())
                .map_err(corrupt)?;
            self.out.write_all(&record).map_err(corrupt)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> MeridianResult<()> {
        self.out.flush().map_err(corrupt)
    }
}

/// Reads a snapshot written by [`SnapshotWriter`]. Sections must be read in
/// the same fixed order they were written; secondary indices are rebuilt by
/// replaying every record through the table's insert pipeline.
pub struct SnapshotReader<R: Read> {
    input: R,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(mut input: R, expected_chain_id: ChainId) -> MeridianResult<Self> {
        let mut magic = [0u8; 8];
        input.read_exact(&mut magic).map_err(corrupt)?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let mut chain_id = [0u8; 32];
        input.read_exact(&mut chain_id).map_err(corrupt)?;
        if chain_id != expected_chain_id.0 {
            return Err(ChainError::WrongChainId.into());
        }
        Ok(Self { input })
    }

    pub fn section<T: StoredObject, I: SecondaryIndexes<T>>(
        &mut self,
        table: &mut Table<T, I>,
    ) -> MeridianResult<()> {
        let mut tag = [0u8; 2];
        self.input.read_exact(&mut tag).map_err(corrupt)?;
        if tag != [T::TAG.space() as u8, T::TAG.type_number()] {
            return Err(corrupt(format!(
                "section order mismatch, expected {:?}",
                T::TAG
            )));
        }
        let next_instance = self.read_u64()?;
        let mut digest = [0u8; 32];
        self.input.read_exact(&mut digest).map_err(corrupt)?;
        if digest != *blake3::hash(T::SCHEMA.as_bytes()).as_bytes() {
            return Err(ChainError::SnapshotDigestMismatch(T::SCHEMA).into());
        }
        let count = self.read_u64()?;
        let mut last_instance = None;
        for _ in 0..count {
            let mut len = [0u8; 4];
            self.input.read_exact(&mut len).map_err(corrupt)?;
            let mut record = vec![0u8; u32::from_le_bytes(len) as usize];
            self.input.read_exact(&mut record).map_err(corrupt)?;
            let obj: T = postcard::from_bytes(&record).map_err(corrupt)?;
            if last_instance.is_some_and(|last| obj.instance() <= last) {
                return Err(corrupt("records out of order"));
            }
            last_instance = Some(obj.instance());
            table.restore(obj)?;
        }
        table.set_next_instance(next_instance);
        Ok(())
    }

    fn read_u64(&mut self) -> MeridianResult<u64> {
        let mut buf = [0u8; 8];
        self.input.read_exact(&mut buf).map_err(corrupt)?;
        Ok(u64::from_le_bytes(buf))
    }
}
