//! Random access reads through a block cache

use crate::domain::repositories::CsvError;
use moka::sync::Cache;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

/// Serves arbitrary byte ranges of an input from cached, aligned blocks.
/// The cache is bounded by total block bytes.
pub struct RandomAccessCachedReader<R> {
    input: R,
    len: u64,
    block_size: u64,
    blocks: Cache<u64, Arc<Vec<u8>>>,
    reads: u64,
    misses: u64,
}

impl<R: Read + Seek> RandomAccessCachedReader<R> {
    pub fn new(mut input: R, memory_limit: u64, block_size: usize) -> Result<Self, CsvError> {
        if block_size == 0 {
            return Err(CsvError::invalid("block size must be positive"));
        }
        let len = input.seek(SeekFrom::End(0))?;
        let blocks = Cache::builder()
            .weigher(|_block: &u64, bytes: &Arc<Vec<u8>>| -> u32 { bytes.len().try_into().unwrap_or(u32::MAX) })
            .max_capacity(memory_limit.max(block_size as u64))
            .build();
        Ok(Self {
            input,
            len,
            block_size: block_size as u64,
            blocks,
            reads: 0,
            misses: 0,
        })
    }

    /// Length of the underlying input
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fill `buf` with the bytes starting at `position`
    pub fn read(&mut self, position: u64, buf: &mut [u8]) -> Result<(), CsvError> {
        if position + buf.len() as u64 > self.len {
            return Err(CsvError::broken(format!(
                "read of {} bytes at {} is past the end of input ({} bytes)",
                buf.len(),
                position,
                self.len
            )));
        }
        self.reads += 1;
        let mut missed = false;
        let mut done = 0;
        while done < buf.len() {
            let absolute = position + done as u64;
            let index = absolute / self.block_size;
            let block = match self.blocks.get(&index) {
                Some(block) => block,
                None => {
                    missed = true;
                    self.load_block(index)?
                }
            };
            let offset = (absolute - index * self.block_size) as usize;
            let n = (block.len() - offset).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&block[offset..offset + n]);
            done += n;
        }
        if missed {
            self.misses += 1;
        }
        Ok(())
    }

    fn load_block(&mut self, index: u64) -> Result<Arc<Vec<u8>>, CsvError> {
        let start = index * self.block_size;
        let len = self.block_size.min(self.len - start) as usize;
        let mut bytes = vec![0; len];
        self.input.seek(SeekFrom::Start(start))?;
        self.input.read_exact(&mut bytes)?;
        let block = Arc::new(bytes);
        self.blocks.insert(index, block.clone());
        Ok(block)
    }

    /// Share of reads that needed at least one block from the input
    pub fn miss_rate(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            self.misses as f64 / self.reads as f64
        }
    }
}
