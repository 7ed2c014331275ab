/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/// The offset of nodes without neighbors.
///
/// No valid address can be equal to this value, since it would require
/// more than 2⁴⁶ pages.
pub const ZERO_DEGREE: u64 = u64::MAX;

/// Per-node degrees and addresses of the encoded lists.
///
/// Both arrays are indexed directly by node id and are filled once during
/// construction.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyIndex {
    degrees: Box<[u32]>,
    offsets: Box<[u64]>,
}

impl AdjacencyIndex {
    /// Creates an index from its parts.
    ///
    /// # Panics
    ///
    /// If the two arrays have different lengths. In debug builds, also if
    /// degree zero and offset [`ZERO_DEGREE`] do not go together.
    pub fn new(degrees: Box<[u32]>, offsets: Box<[u64]>) -> Self {
        assert_eq!(
            degrees.len(),
            offsets.len(),
            "Different number of degrees and offsets"
        );
        debug_assert!(degrees
            .iter()
            .zip(offsets.iter())
            .all(|(&d, &o)| (d == 0) == (o == ZERO_DEGREE)));
        Self { degrees, offsets }
    }

    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.degrees.len()
    }

    #[inline(always)]
    pub fn degree(&self, node: usize) -> u32 {
        self.degrees[node]
    }

    /// Returns the address of the list of `node`, or `None` if the node
    /// has no neighbors.
    #[inline(always)]
    pub fn offset(&self, node: usize) -> Option<u64> {
        match self.offsets[node] {
            ZERO_DEGREE => None,
            offset => Some(offset),
        }
    }

    /// Returns the sum of the degrees.
    pub fn num_arcs(&self) -> u64 {
        self.degrees.iter().map(|&d| d as u64).sum()
    }

    pub fn degrees(&self) -> &[u32] {
        &self.degrees
    }

    pub fn size_in_bytes(&self) -> u64 {
        (self.degrees.len() * size_of::<u32>() + self.offsets.len() * size_of::<u64>()) as u64
    }
}
