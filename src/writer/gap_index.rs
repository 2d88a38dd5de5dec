// src/writer/gap_index.rs
//! Sparse index rows describing where runs start inside a file.
//!
//! A file stores its samples densely. Every discontinuity in absolute
//! position gets one `(absolute_sample, in_file_offset)` row, and every file
//! gets a row anchoring its first sample. Continuations of the previous write
//! into the same file produce no row at all.

use crate::error::{ArchiveError, Result};
use smallvec::SmallVec;

/// Start of one contiguous run inside a write buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Sample position relative to the channel start offset
    pub position: u64,
    /// Sample offset into the write buffer
    pub offset: u64,
}

/// The validated run list of one write call.
///
/// Construction checks everything about the run arrays, so nothing downstream
/// has to. Run `i` covers buffer samples `offsets[i]..offsets[i + 1]` (or the
/// end of the buffer) at consecutive positions from `positions[i]`. The last
/// run may start at the end of the buffer; it holds no samples and only moves
/// the position the next write is expected at.
#[derive(Debug, Clone)]
pub struct RunTable {
    runs: SmallVec<[Run; 4]>,
    buffer_len: u64,
}

impl RunTable {
    pub fn new(positions: &[u64], offsets: &[u64], buffer_len: u64) -> Result<Self> {
        if positions.len() != offsets.len() {
            return Err(ArchiveError::MismatchedRuns {
                positions: positions.len(),
                offsets: offsets.len(),
            });
        }
        if positions.is_empty() {
            return Err(ArchiveError::NoRuns);
        }
        if buffer_len == 0 {
            return Err(ArchiveError::EmptyWrite);
        }
        if offsets[0] != 0 {
            return Err(ArchiveError::NonzeroFirstOffset(offsets[0]));
        }

        let mut runs: SmallVec<[Run; 4]> = SmallVec::with_capacity(positions.len());
        for (index, (&position, &offset)) in positions.iter().zip(offsets).enumerate() {
            // An offset equal to the length marks a trailing run with no samples
            if offset > buffer_len {
                return Err(ArchiveError::OffsetOutOfBuffer { index, offset, length: buffer_len });
            }
            if index > 0 {
                let previous = runs[index - 1];
                if position <= previous.position {
                    return Err(ArchiveError::PositionsNotIncreasing { index });
                }
                if offset <= previous.offset {
                    return Err(ArchiveError::OffsetsNotIncreasing { index });
                }
                let offset_advance = offset - previous.offset;
                let position_advance = position - previous.position;
                if offset_advance > position_advance {
                    return Err(ArchiveError::RunOverflow { index, offset_advance, position_advance });
                }
            }
            runs.push(Run { position, offset });
        }

        let table = RunTable { runs, buffer_len };
        let last = table.last();
        last.position
            .checked_add(buffer_len - last.offset)
            .ok_or(ArchiveError::PositionOverflow { position: last.position })?;
        Ok(table)
    }

    /// A single run covering the whole buffer
    pub fn continuous(position: u64, buffer_len: u64) -> Result<Self> {
        Self::new(&[position], &[0], buffer_len)
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Buffer length in samples
    pub fn buffer_len(&self) -> u64 {
        self.buffer_len
    }

    pub fn first(&self) -> Run {
        self.runs[0]
    }

    pub fn last(&self) -> Run {
        self.runs[self.runs.len() - 1]
    }

    /// Index of the run covering buffer sample `offset`
    fn covering(&self, offset: u64) -> usize {
        // runs[0].offset == 0, so at least one run qualifies
        self.runs.partition_point(|r| r.offset <= offset).saturating_sub(1)
    }

    /// Relative sample position of buffer sample `offset`
    pub fn position_of(&self, offset: u64) -> u64 {
        let run = self.runs[self.covering(offset)];
        run.position + (offset - run.offset)
    }

    /// Run starting exactly at the end of the buffer, if any
    pub fn trailing(&self) -> Option<Run> {
        let last = self.last();
        (last.offset == self.buffer_len).then_some(last)
    }

    /// Position the writer expects after buffer samples `..end` are stored.
    ///
    /// At the end of the buffer a trailing run moves it forward to that
    /// run's position.
    pub fn position_after(&self, end: u64) -> u64 {
        match self.trailing() {
            Some(run) if end == self.buffer_len => run.position,
            _ => self.position_of(end - 1) + 1,
        }
    }

    /// Position the writer expects once the whole buffer is stored
    pub fn end_position(&self) -> u64 {
        self.position_after(self.buffer_len)
    }

    /// Gap samples between the first and last sample of the buffer
    pub fn internal_gaps(&self) -> u64 {
        let last = self.last();
        (last.position - self.first().position) - last.offset
    }
}

/// One row of a file's sparse index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRow {
    /// Absolute sample position, start offset included
    pub sample: u64,
    /// Offset of that sample inside the file's sample dataset
    pub offset: u64,
}

impl IndexRow {
    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.sample.to_le_bytes());
        out[8..].copy_from_slice(&self.offset.to_le_bytes());
        out
    }
}

/// The part of one write call that lands in the current file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexWindow {
    /// Buffer samples already consumed by earlier files in this call
    pub first: u64,
    /// Room left in the current file
    pub capacity: u64,
    /// Where the window's first sample goes in the current file
    pub dataset_index: u64,
    /// Relative position the writer expects next
    pub expected: u64,
}

/// Computes index rows for one window of a write call
#[derive(Debug, Clone, Copy)]
pub struct GapIndexBuilder {
    start_offset: u64,
}

impl GapIndexBuilder {
    pub fn new(start_offset: u64) -> Self {
        GapIndexBuilder { start_offset }
    }

    /// Rows for every run starting inside `window`, ordered by file offset.
    ///
    /// A run at the window's first sample is dropped when it merely continues
    /// a partly filled file. When no run starts exactly at the window's first
    /// sample, a row anchoring that sample is put in front.
    pub fn rows(&self, runs: &RunTable, window: &IndexWindow) -> Vec<IndexRow> {
        let end = window.first.saturating_add(window.capacity);
        let start = runs.runs().partition_point(|r| r.offset < window.first);
        let candidates = runs.runs()[start..].iter().take_while(|r| r.offset < end);

        let mut rows = Vec::with_capacity(runs.len() - start + 1);
        let anchored = runs.runs().get(start).map_or(false, |r| r.offset == window.first);
        if !anchored {
            rows.push(IndexRow {
                sample: runs.position_of(window.first) + self.start_offset,
                offset: window.dataset_index,
            });
        }

        for run in candidates {
            let continuation = run.offset == window.first
                && window.dataset_index > 0
                && run.position == window.expected;
            if continuation {
                continue;
            }
            rows.push(IndexRow {
                sample: run.position + self.start_offset,
                offset: run.offset - window.first + window.dataset_index,
            });
        }
        rows
    }
}
