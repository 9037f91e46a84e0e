//! Sequential scan over every chunk of one table file.
//!
//! The scan walks the meta-index in series-id order, pulling one
//! chunk-meta block at a time and handing chunks out to the caller. The
//! query monitor is polled between chunk reads, never inside decode loops,
//! so an aborted query stops at the next chunk boundary.
//!
//! The caller is expected to hold a usage lease on the file (see
//! [`TableFile::try_use`]) for the lifetime of the scan.

use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::record::{ReadContext, Record};

use super::file::TableFile;
use super::format::ChunkMeta;

pub struct ChunkScan<'a> {
    file: &'a TableFile,
    monitor: Option<&'a dyn Monitor>,
    meta_pos: usize,
    block: Vec<ChunkMeta>,
    chunk_pos: usize,
    seg_rec: Record,
}

impl<'a> ChunkScan<'a> {
    pub fn new(file: &'a TableFile) -> Self {
        Self {
            file,
            monitor: None,
            meta_pos: 0,
            block: Vec::new(),
            chunk_pos: 0,
            seg_rec: Record::new(),
        }
    }

    pub fn with_monitor(file: &'a TableFile, monitor: &'a dyn Monitor) -> Self {
        let mut scan = Self::new(file);
        scan.monitor = Some(monitor);
        scan
    }

    /// Next chunk meta in series-id order, or `None` at the end of the
    /// file. Returns `Error::Aborted` once the monitor trips.
    pub fn next_chunk(&mut self) -> Result<Option<ChunkMeta>> {
        loop {
            if let Some(monitor) = self.monitor {
                if monitor.aborted() {
                    return Err(Error::Aborted);
                }
            }

            if self.chunk_pos < self.block.len() {
                let cm = self.block[self.chunk_pos].clone();
                self.chunk_pos += 1;
                return Ok(Some(cm));
            }

            if self.meta_pos >= self.file.meta_index_item_num() {
                return Ok(None);
            }
            let mi = self.file.meta_index_at(self.meta_pos)?;
            self.file
                .read_chunk_meta_data(self.meta_pos, &mi, &mut self.block)?;
            self.meta_pos += 1;
            self.chunk_pos = 0;
        }
    }

    /// Materialize a whole chunk: every segment decoded and appended into
    /// `dst` in time order.
    pub fn read_chunk(
        &mut self,
        cm: &ChunkMeta,
        dst: &mut Record,
        ctx: &mut ReadContext,
    ) -> Result<()> {
        dst.clear();
        for seg in 0..cm.segment_count() {
            self.file.read_at(cm, seg, &mut self.seg_rec, ctx)?;
            dst.times.extend_from_slice(&self.seg_rec.times);
            dst.values.extend_from_slice(&self.seg_rec.values);
        }
        Ok(())
    }
}
