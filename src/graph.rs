/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::fmt::{Display, Formatter};

use lender::{ExactSizeLender, Lend, Lender, Lending};

use crate::builder::AdjacencyBuilder;
use crate::cursor::{AdjacencyCursor, PropertyCursor, Successors};
use crate::index::{AdjacencyIndex, ZERO_DEGREE};
use crate::mem::human_readable;
use crate::pages::PageTable;

/// A per-arc `f64` property, stored as little-endian bytes in its own
/// pages, in the same order as the neighbors.
#[derive(Debug, Clone)]
pub struct Properties {
    pages: PageTable,
    offsets: Box<[u64]>,
}

impl Properties {
    pub(crate) fn new(pages: PageTable, offsets: Box<[u64]>) -> Self {
        Self { pages, offsets }
    }

    #[inline(always)]
    pub fn offset(&self, node: usize) -> Option<u64> {
        match self.offsets[node] {
            ZERO_DEGREE => None,
            offset => Some(offset),
        }
    }

    pub fn page_table(&self) -> &PageTable {
        &self.pages
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.pages.size_in_bytes() + (self.offsets.len() * size_of::<u64>()) as u64
    }
}

/// The memory used by the parts of a [`CompressedGraph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphMemory {
    /// Degrees and offsets.
    pub index: u64,
    /// Pages containing the encoded lists.
    pub pages: u64,
    /// Pages and offsets of all properties.
    pub properties: u64,
    /// The number of oversized pages among the list pages.
    pub oversized_pages: usize,
}

impl GraphMemory {
    pub fn total(&self) -> u64 {
        self.index + self.pages + self.properties
    }
}

impl Display for GraphMemory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (index {}, pages {}, properties {}, {} oversized pages)",
            human_readable(self.total()),
            human_readable(self.index),
            human_readable(self.pages),
            human_readable(self.properties),
            self.oversized_pages
        )
    }
}

/// An immutable graph whose adjacency lists are delta-encoded into pages.
///
/// Instances are created by an [`AdjacencyBuilder`] and cannot be modified.
/// All access methods take `&self`, and there is no interior mutability, so
/// a graph can be shared freely among threads, each using its own cursors.
///
/// ```
/// use pagedgraph::prelude::*;
///
/// let graph = CompressedGraph::from_arcs(4, [(0, 1), (0, 3), (2, 0), (0, 2)])?;
/// assert_eq!(graph.num_arcs(), 4);
/// assert_eq!(graph.degree(0), 3);
///
/// let mut cursor = graph.cursor(0);
/// assert_eq!(cursor.advance(2), Some(2));
/// assert_eq!(cursor.next(), 3);
/// assert!(!cursor.has_next());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CompressedGraph {
    index: AdjacencyIndex,
    pages: PageTable,
    page_shift: u32,
    properties: Box<[Properties]>,
}

impl CompressedGraph {
    pub(crate) fn from_parts(
        index: AdjacencyIndex,
        pages: PageTable,
        page_shift: u32,
        properties: Box<[Properties]>,
    ) -> Self {
        Self {
            index,
            pages,
            page_shift,
            properties,
        }
    }

    /// Builds a graph from a sequence of arcs with the default
    /// [`AdjacencyBuilder`] configuration, using the current thread only.
    pub fn from_arcs(
        num_nodes: usize,
        arcs: impl IntoIterator<Item = (usize, usize)>,
    ) -> anyhow::Result<Self> {
        let loader = AdjacencyBuilder::new(num_nodes)?.start()?;
        {
            let mut sink = loader.sink();
            for (src, dst) in arcs {
                sink.push(src, dst)?;
            }
        }
        loader.build(&crate::thread_pool![1])
    }

    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.index.num_nodes()
    }

    /// Returns the number of stored arcs, which is twice the number of
    /// inserted edges for undirected graphs.
    pub fn num_arcs(&self) -> u64 {
        self.index.num_arcs()
    }

    #[inline(always)]
    pub fn degree(&self, node: usize) -> u32 {
        self.index.degree(node)
    }

    pub fn index(&self) -> &AdjacencyIndex {
        &self.index
    }

    pub fn page_table(&self) -> &PageTable {
        &self.pages
    }

    pub fn page_shift(&self) -> u32 {
        self.page_shift
    }

    /// Returns the properties, indexed by key.
    pub fn properties(&self) -> &[Properties] {
        &self.properties
    }

    pub fn num_properties(&self) -> usize {
        self.properties.len()
    }

    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }

    /// Returns an unbound cursor, to be bound with
    /// [`AdjacencyCursor::init`].
    pub fn unbound_cursor(&self) -> AdjacencyCursor<'_> {
        AdjacencyCursor::new(self)
    }

    /// Returns a cursor bound to `node`.
    pub fn cursor(&self, node: usize) -> AdjacencyCursor<'_> {
        let mut cursor = AdjacencyCursor::new(self);
        cursor.init(node);
        cursor
    }

    /// Returns a cursor over the values of property `key` for the arcs of
    /// `node`, or `None` if there is no such property.
    pub fn property_cursor(&self, node: usize, key: usize) -> Option<PropertyCursor<'_>> {
        let mut cursor = PropertyCursor::new(self, self.properties.get(key)?);
        cursor.init(node);
        Some(cursor)
    }

    /// Returns the neighbors of `node` in a vector.
    pub fn successors(&self, node: usize) -> Vec<usize> {
        let mut cursor = self.cursor(node);
        cursor.successors().collect()
    }

    /// Calls `f` with `node` and each of its neighbors, in increasing order,
    /// until `f` returns false.
    pub fn for_each_neighbor(&self, node: usize, mut f: impl FnMut(usize, usize) -> bool) {
        let mut cursor = self.cursor(node);
        for succ in cursor.successors() {
            if !f(node, succ) {
                break;
            }
        }
    }

    /// Calls `f` with `node`, each of its neighbors and the value of
    /// property `key` for the corresponding arc, until `f` returns false. If
    /// there is no such property, `fallback` is used as value.
    pub fn for_each_relationship_with_property(
        &self,
        node: usize,
        key: usize,
        fallback: f64,
        mut f: impl FnMut(usize, usize, f64) -> bool,
    ) {
        let mut cursor = self.cursor(node);
        let mut props = self.property_cursor(node, key);
        for succ in cursor.successors() {
            let value = props.as_mut().map_or(fallback, |props| props.next());
            if !f(node, succ, value) {
                break;
            }
        }
    }

    /// Returns a lender on all nodes, in order, and their neighbors.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter {
            cursor: AdjacencyCursor::new(self),
            node: 0,
            num_nodes: self.num_nodes(),
        }
    }

    /// Returns the memory used by the graph.
    pub fn memory_usage(&self) -> GraphMemory {
        GraphMemory {
            index: self.index.size_in_bytes(),
            pages: self.pages.size_in_bytes(),
            properties: self.properties.iter().map(Properties::size_in_bytes).sum(),
            oversized_pages: self.pages.num_oversized(self.page_shift),
        }
    }
}

/// A lender on the nodes of a [`CompressedGraph`] returning pairs made of a
/// node and an iterator on its neighbors.
///
/// A single cursor is reused for all nodes: the iterator borrows it and
/// must be dropped before calling `next` again.
#[derive(Debug, Clone)]
pub struct NodeIter<'a> {
    cursor: AdjacencyCursor<'a>,
    node: usize,
    num_nodes: usize,
}

impl<'lend, 'a> Lending<'lend> for NodeIter<'a> {
    type Lend = (usize, Successors<'lend, 'a>);
}

impl Lender for NodeIter<'_> {
    #[inline(always)]
    fn next(&mut self) -> Option<Lend<'_, Self>> {
        if self.node >= self.num_nodes {
            return None;
        }
        let node = self.node;
        self.node += 1;
        self.cursor.init(node);
        Some((node, self.cursor.successors()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.num_nodes - self.node;
        (len, Some(len))
    }
}

impl ExactSizeLender for NodeIter<'_> {
    #[inline(always)]
    fn len(&self) -> usize {
        self.num_nodes - self.node
    }
}
