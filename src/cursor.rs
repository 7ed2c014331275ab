/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Cursors over the neighbors and the properties of a node.
//!
//! An [`AdjacencyCursor`] is created unbound and can be bound to any node
//! with [`init`](AdjacencyCursor::init) as many times as needed. Neighbors
//! are decoded lazily, [`CHUNK_SIZE`] at a time, into a buffer inside the
//! cursor, so a cursor is cheap to rebind but should be reused rather than
//! recreated in tight loops.
//!
//! The search operations ([`skip_until`](AdjacencyCursor::skip_until),
//! [`advance`](AdjacencyCursor::advance) and
//! [`advance_by`](AdjacencyCursor::advance_by)) return `None` when the list
//! does not contain the requested element: this is a normal outcome, and it
//! leaves the cursor exhausted. Consuming an exhausted cursor, or using a
//! cursor that has never been bound, is a bug and panics.

use crate::codec::{decode_block, CHUNK_SIZE};
use crate::graph::{CompressedGraph, Properties};

/// A cursor over the sorted neighbors of a node.
///
/// Cursors borrow the graph immutably, so any number of them can traverse
/// the same graph from different threads. A single cursor carries its
/// decoding state and cannot be shared, but it can be cloned: the clone is
/// an independent cursor positioned at the same place.
#[derive(Debug, Clone)]
pub struct AdjacencyCursor<'a> {
    graph: &'a CompressedGraph,
    /// Bytes of the page of the current list, starting at the list.
    bytes: &'a [u8],
    /// Offset in `bytes` of the next block to decode.
    offset: usize,
    block: [u64; CHUNK_SIZE],
    /// Position of the next id in `block`.
    pos: usize,
    /// Number of valid ids in `block`.
    len: usize,
    /// Number of ids still to be decoded.
    undecoded: usize,
    /// Last decoded id, or the base of the list.
    last: u64,
    bound: bool,
}

impl<'a> AdjacencyCursor<'a> {
    /// Creates an unbound cursor on `graph`.
    pub fn new(graph: &'a CompressedGraph) -> Self {
        Self {
            graph,
            bytes: &[],
            offset: 0,
            block: [0; CHUNK_SIZE],
            pos: 0,
            len: 0,
            undecoded: 0,
            last: 0,
            bound: false,
        }
    }

    /// Binds the cursor to the neighbors of `node`.
    ///
    /// Returns false if `node` has no neighbors, in which case the cursor is
    /// bound but exhausted. The page table is not accessed for such nodes.
    pub fn init(&mut self, node: usize) -> bool {
        let index = self.graph.index();
        self.bound = true;
        self.pos = 0;
        self.len = 0;
        self.offset = 0;
        self.last = 0;
        self.undecoded = index.degree(node) as usize;
        match index.offset(node) {
            Some(address) => {
                self.bytes = self
                    .graph
                    .page_table()
                    .bytes_at(address, self.graph.page_shift());
                true
            }
            None => {
                self.bytes = &[];
                false
            }
        }
    }

    /// Makes this cursor a copy of `other`, reusing its storage.
    pub fn copy_from(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Returns whether the cursor has been bound to a node.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    #[inline(always)]
    fn check_bound(&self) {
        assert!(self.bound, "The cursor is not bound to a node");
    }

    /// Returns the number of neighbors not consumed yet.
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.check_bound();
        self.len - self.pos + self.undecoded
    }

    #[inline(always)]
    pub fn has_next(&self) -> bool {
        self.remaining() != 0
    }

    /// Decodes the next block. There must be ids left to decode.
    #[inline]
    fn fill(&mut self) {
        assert!(self.undecoded != 0, "No neighbors left");
        let count = self.undecoded.min(CHUNK_SIZE);
        let block = &mut self.block[..count];
        self.offset = decode_block(self.bytes, self.offset, self.last, block);
        self.last = block[count - 1];
        self.undecoded -= count;
        self.pos = 0;
        self.len = count;
    }

    /// Makes sure the block contains the next id, returning false if the
    /// list is exhausted.
    #[inline(always)]
    fn ensure_block(&mut self) -> bool {
        if self.pos == self.len {
            if self.undecoded == 0 {
                return false;
            }
            self.fill();
        }
        true
    }

    /// Returns and consumes the next neighbor.
    ///
    /// # Panics
    ///
    /// If the cursor is unbound or exhausted.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> usize {
        self.check_bound();
        assert!(self.ensure_block(), "No neighbors left");
        let id = self.block[self.pos];
        self.pos += 1;
        id as usize
    }

    /// Returns the next neighbor without consuming it.
    ///
    /// # Panics
    ///
    /// If the cursor is unbound or exhausted.
    #[inline]
    pub fn peek(&mut self) -> usize {
        self.check_bound();
        assert!(self.ensure_block(), "No neighbors left");
        self.block[self.pos] as usize
    }

    /// Consumes neighbors until the first one satisfying `found`, which is
    /// consumed and returned. Since neighbors are sorted, `found` must be
    /// monotone.
    #[inline]
    fn search(&mut self, found: impl Fn(u64) -> bool) -> Option<usize> {
        self.check_bound();
        loop {
            if !self.ensure_block() {
                return None;
            }
            let block = &self.block[self.pos..self.len];
            let skip = block.partition_point(|&id| !found(id));
            if skip < block.len() {
                let id = block[skip];
                self.pos += skip + 1;
                return Some(id as usize);
            }
            self.pos = self.len;
        }
    }

    /// Consumes and returns the first neighbor strictly greater than
    /// `target`, or returns `None` if there is no such neighbor.
    pub fn skip_until(&mut self, target: usize) -> Option<usize> {
        let target = target as u64;
        self.search(|id| id > target)
    }

    /// Consumes and returns the first neighbor greater than or equal to
    /// `target`, or returns `None` if there is no such neighbor.
    pub fn advance(&mut self, target: usize) -> Option<usize> {
        let target = target as u64;
        self.search(|id| id >= target)
    }

    /// Skips `n` neighbors, and then consumes and returns the next one, or
    /// returns `None` if fewer than `n + 1` neighbors are left.
    pub fn advance_by(&mut self, mut n: usize) -> Option<usize> {
        if n >= self.remaining() {
            self.pos = self.len;
            self.undecoded = 0;
            return None;
        }
        while n >= self.len - self.pos {
            n -= self.len - self.pos;
            self.fill();
        }
        self.pos += n;
        Some(self.next())
    }

    /// Returns an iterator consuming the rest of the neighbors.
    pub fn successors(&mut self) -> Successors<'_, 'a> {
        self.check_bound();
        Successors(self)
    }
}

/// An iterator over the neighbors left in a cursor.
#[derive(Debug)]
pub struct Successors<'c, 'a>(&'c mut AdjacencyCursor<'a>);

impl Iterator for Successors<'_, '_> {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        if self.0.ensure_block() {
            let id = self.0.block[self.0.pos];
            self.0.pos += 1;
            Some(id as usize)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.0.remaining();
        (len, Some(len))
    }
}

impl ExactSizeIterator for Successors<'_, '_> {}

/// A cursor over the values of a property for the arcs of a node, in the
/// same order as the neighbors returned by an [`AdjacencyCursor`] bound to
/// the same node.
///
/// Values are read by position, not by neighbor: after a search on the
/// adjacency cursor, the value of the returned neighbor is found by
/// [skipping](Self::skip) the values of the neighbors consumed before it.
#[derive(Debug, Clone)]
pub struct PropertyCursor<'a> {
    graph: &'a CompressedGraph,
    properties: &'a Properties,
    bytes: &'a [u8],
    remaining: usize,
    bound: bool,
}

impl<'a> PropertyCursor<'a> {
    pub(crate) fn new(graph: &'a CompressedGraph, properties: &'a Properties) -> Self {
        Self {
            graph,
            properties,
            bytes: &[],
            remaining: 0,
            bound: false,
        }
    }

    /// Binds the cursor to the values of the arcs of `node`, returning
    /// false if `node` has no arcs.
    pub fn init(&mut self, node: usize) -> bool {
        self.bound = true;
        self.remaining = self.graph.index().degree(node) as usize;
        match self.properties.offset(node) {
            Some(address) => {
                let len = self.remaining * size_of::<f64>();
                self.bytes = &self
                    .properties
                    .page_table()
                    .bytes_at(address, self.graph.page_shift())[..len];
                true
            }
            None => {
                self.bytes = &[];
                false
            }
        }
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        assert!(self.bound, "The cursor is not bound to a node");
        self.remaining
    }

    #[inline(always)]
    pub fn has_next(&self) -> bool {
        self.remaining() != 0
    }

    /// Returns and consumes the next property.
    ///
    /// # Panics
    ///
    /// If the cursor is unbound or exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> f64 {
        assert!(self.remaining() != 0, "No properties left");
        let (head, tail) = self.bytes.split_at(size_of::<f64>());
        let mut value = [0; size_of::<f64>()];
        value.copy_from_slice(head);
        self.bytes = tail;
        self.remaining -= 1;
        f64::from_le_bytes(value)
    }

    /// Skips `n` properties.
    ///
    /// # Panics
    ///
    /// If fewer than `n` properties are left.
    pub fn skip(&mut self, n: usize) {
        assert!(n <= self.remaining(), "Cannot skip {n} properties");
        self.bytes = &self.bytes[n * size_of::<f64>()..];
        self.remaining -= n;
    }
}
