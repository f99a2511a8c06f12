//! Buffered reading of several byte regions of one file at once

use crate::domain::repositories::CsvError;
use std::io::{Read, Seek, SeekFrom};

/// A byte range `[start, start + len)` of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub len: u64,
}

impl Region {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// `next` starts exactly where this region ends
    pub fn is_consecutive(&self, next: &Region) -> bool {
        self.end() == next.start
    }

    /// Split `[0, total)` into regions of `len` bytes; the last one may be shorter
    pub fn split(total: u64, len: u64) -> Vec<Region> {
        if len == 0 {
            return Vec::new();
        }
        (0..total)
            .step_by(len as usize)
            .map(|start| Region::new(start, len.min(total - start)))
            .collect()
    }
}

struct RegionCursor {
    region: Region,
    /// Next file position to load into the cache
    position: u64,
    cache: Vec<u8>,
    cache_pos: usize,
    cache_len: usize,
}

impl RegionCursor {
    fn remaining(&self) -> u64 {
        (self.region.end() - self.position) + (self.cache_len - self.cache_pos) as u64
    }
}

/// Reads sequentially from several regions of the same input, each with its own cache
pub struct MultiRegionReader<R> {
    input: R,
    cursors: Vec<RegionCursor>,
}

impl<R: Read + Seek> MultiRegionReader<R> {
    pub fn new(input: R, regions: Vec<Region>, cache_size: usize) -> Result<Self, CsvError> {
        if cache_size == 0 {
            return Err(CsvError::invalid("region cache size must be positive"));
        }
        for pair in regions.windows(2) {
            if pair[1].start < pair[0].end() {
                return Err(CsvError::invalid(format!(
                    "regions must be ordered and must not overlap: {:?} then {:?}",
                    pair[0], pair[1]
                )));
            }
        }
        let cursors = regions
            .into_iter()
            .map(|region| RegionCursor {
                region,
                position: region.start,
                cache: vec![0; cache_size.min(region.len as usize).max(1)],
                cache_pos: 0,
                cache_len: 0,
            })
            .collect();
        Ok(Self { input, cursors })
    }

    pub fn region_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn region_len_sum(&self) -> u64 {
        self.cursors.iter().map(|c| c.region.len).sum()
    }

    pub fn is_over(&self, region: usize) -> bool {
        self.cursors[region].remaining() == 0
    }

    /// Copy the next bytes of `region` into `buf`. Fewer than `buf.len()` bytes are
    /// returned only when the region runs out.
    pub fn read(&mut self, region: usize, buf: &mut [u8]) -> Result<usize, CsvError> {
        let Self { input, cursors } = self;
        let cursor = &mut cursors[region];
        let mut copied = 0;
        while copied < buf.len() {
            if cursor.cache_pos == cursor.cache_len {
                let to_load = (cursor.region.end() - cursor.position).min(cursor.cache.len() as u64) as usize;
                if to_load == 0 {
                    break;
                }
                input.seek(SeekFrom::Start(cursor.position))?;
                input.read_exact(&mut cursor.cache[..to_load]).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        CsvError::broken(format!("input ends inside region {:?}", cursor.region))
                    } else {
                        e.into()
                    }
                })?;
                cursor.position += to_load as u64;
                cursor.cache_pos = 0;
                cursor.cache_len = to_load;
            }
            let n = (cursor.cache_len - cursor.cache_pos).min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&cursor.cache[cursor.cache_pos..cursor.cache_pos + n]);
            cursor.cache_pos += n;
            copied += n;
        }
        Ok(copied)
    }
}
