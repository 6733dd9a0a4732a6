// SPDX-License-Identifier: MPL-2.0

//! Row decomposition of an N×N field over a group of workers.

use std::ops::Range;

use crate::error::{Error, Result};

/// Contiguous block of rows owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionDescriptor {
    /// First row of the block.
    pub starting_row: usize,
    /// Number of rows in the block, possibly zero.
    pub row_count: usize,
}

impl PartitionDescriptor {
    /// Block of `row_count` rows starting at `starting_row`.
    pub fn new(starting_row: usize, row_count: usize) -> Self {
        Self {
            starting_row,
            row_count,
        }
    }

    /// Rows of the block.
    pub fn rows(&self) -> Range<usize> {
        self.starting_row..self.starting_row + self.row_count
    }

    /// Wire representation, the pair `(starting_row, row_count)`.
    pub fn to_wire(&self) -> [u64; 2] {
        [self.starting_row as u64, self.row_count as u64]
    }

    /// Read the pair sent by [`to_wire`](Self::to_wire).
    pub fn from_wire(wire: &[u64]) -> Result<Self> {
        match wire {
            [start, count] => Ok(Self::new(*start as usize, *count as usize)),
            _ => Err(Error::protocol(format!(
                "row assignment must be 2 integers, got {}",
                wire.len()
            ))),
        }
    }
}

/// Rows owned by `rank` when `n` rows are split over `group_size` workers.
///
/// Every worker gets `ceil(n / group_size)` rows except the last ones,
/// which get what remains, possibly nothing.
pub fn local_rows(n: usize, group_size: usize, rank: usize) -> PartitionDescriptor {
    if group_size == 0 {
        return PartitionDescriptor::default();
    }
    let block = (n + group_size - 1) / group_size;
    let starting_row = (rank * block).min(n);
    let row_count = block.min(n - starting_row);
    PartitionDescriptor::new(starting_row, row_count)
}

/// Row blocks of every rank of a group, in rank order.
pub fn all_rows(n: usize, group_size: usize) -> Vec<PartitionDescriptor> {
    (0..group_size)
        .map(|rank| local_rows(n, group_size, rank))
        .collect()
}

/// Offset and number of samples sent to or received from one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionEntry {
    /// Index of the first sample in the full field.
    pub offset: usize,
    /// Number of samples.
    pub count: usize,
}

/// Per rank offsets and counts of a row distributed field, owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTable {
    row_width: usize,
    entries: Vec<DistributionEntry>,
}

impl DistributionTable {
    /// Build the table from the row blocks of all ranks, in rank order.
    ///
    /// The blocks must tile the rows `0..n_rows` exactly,
    /// anything else is a configuration error.
    pub fn from_descriptors(
        row_width: usize,
        n_rows: usize,
        descriptors: &[PartitionDescriptor],
    ) -> Result<Self> {
        let total: usize = descriptors.iter().map(|d| d.row_count).sum();
        if total != n_rows {
            return Err(Error::partition(format!(
                "row counts sum to {}, expected {}",
                total, n_rows
            )));
        }

        let mut blocks: Vec<&PartitionDescriptor> =
            descriptors.iter().filter(|d| d.row_count > 0).collect();
        blocks.sort_by_key(|d| d.starting_row);
        let mut next_row = 0;
        for block in blocks {
            if block.starting_row != next_row {
                return Err(Error::partition(format!(
                    "rows {:?} do not start at row {}",
                    block.rows(),
                    next_row
                )));
            }
            next_row = block.rows().end;
        }

        let entries = descriptors
            .iter()
            .map(|d| DistributionEntry {
                offset: d.starting_row * row_width,
                count: d.row_count * row_width,
            })
            .collect();
        Ok(Self { row_width, entries })
    }

    /// Number of ranks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for a table without ranks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Samples per row.
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Entries in rank order.
    pub fn entries(&self) -> &[DistributionEntry] {
        &self.entries
    }

    /// Entry of one rank.
    pub fn entry(&self, rank: usize) -> Option<DistributionEntry> {
        self.entries.get(rank).copied()
    }

    /// Sample range of one rank in the full field.
    pub fn range(&self, rank: usize) -> Option<Range<usize>> {
        self.entry(rank).map(|e| e.offset..e.offset + e.count)
    }

    /// Byte offset of one rank for samples of `elem_size` bytes.
    pub fn byte_offset(&self, rank: usize, elem_size: usize) -> Option<usize> {
        self.entry(rank).map(|e| e.offset * elem_size)
    }

    /// Byte count of one rank for samples of `elem_size` bytes.
    pub fn byte_count(&self, rank: usize, elem_size: usize) -> Option<usize> {
        self.entry(rank).map(|e| e.count * elem_size)
    }
}
