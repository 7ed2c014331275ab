/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Estimation of the memory needed by a [`CompressedGraph`](crate::graph::CompressedGraph)
//! before building it.
//!
//! Estimates follow the layout produced by the
//! [builder](crate::builder::AdjacencyBuilder): every node is assumed to have
//! the average degree, and its encoded list is placed in pages using the
//! same policy as a [`PageAllocator`](crate::pages::PageAllocator), so lists
//! larger than a page are accounted as oversized pages of exact size.
//!
//! The lower bound assumes one-byte first ids and perfectly packed pages;
//! the upper bound assumes first ids as large as the number of nodes, the
//! largest tail waste on each page and a partially filled page for each
//! partition. Unless an average gap is given, the lower bound assumes gaps
//! of one between consecutive neighbors, and the upper bound neighbors
//! spread evenly over all nodes.
//!
//! Gaps with a given mean can have very different encoded lengths: gaps of
//! 126 and 128 have mean 127, but need one and two bytes. For this reason,
//! the length of a gap is bounded from above by the smallest concave
//! function above [`varint_len`], and from below by the largest convex
//! function below it, which bound the total length of any list of gaps with
//! the given mean.

use std::fmt::{Display, Formatter};
use std::num::NonZeroUsize;
use std::ops::Add;

use anyhow::{ensure, Result};
use thiserror::Error;

use crate::codec::{varint_len, MAX_VARINT_LEN};
use crate::pages::{MAX_PAGE_SHIFT, MIN_PAGE_SHIFT, PAGE_SHIFT};

const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Formats a number of bytes using binary units.
///
/// ```
/// use pagedgraph::mem::human_readable;
///
/// assert_eq!(human_readable(1000), "1000 Bytes");
/// assert_eq!(human_readable(1536), "1.50 KiB");
/// assert_eq!(human_readable(3 << 30), "3.00 GiB");
/// ```
pub fn human_readable(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} Bytes");
    }
    let unit = ((63 - bytes.leading_zeros()) / 10) as usize;
    let value = bytes as f64 / (1_u64 << (10 * unit)) as f64;
    format!("{value:.2} {}", UNITS[unit - 1])
}

/// Which end of a [`MemoryRange`] to compare with the available memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bound {
    #[default]
    Min,
    Max,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimationError {
    #[error("The graph requires {required} bytes ({bound:?} estimate), but only {available} bytes are available")]
    InsufficientMemory {
        required: u64,
        available: u64,
        bound: Bound,
    },
}

/// A range of memory sizes, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryRange {
    pub min: u64,
    pub max: u64,
}

impl MemoryRange {
    pub fn new(min: u64, max: u64) -> Self {
        debug_assert!(min <= max, "{min} > {max}");
        Self { min, max }
    }

    /// Returns a range containing a single value.
    pub fn of(bytes: u64) -> Self {
        Self::new(bytes, bytes)
    }

    pub fn times(self, n: u64) -> Self {
        Self::new(self.min * n, self.max * n)
    }

    /// Returns the smallest range containing both ranges.
    pub fn union(self, other: Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn contains(&self, bytes: u64) -> bool {
        (self.min..=self.max).contains(&bytes)
    }

    /// Fails if the chosen bound exceeds `available` bytes.
    pub fn check(&self, available: u64, bound: Bound) -> Result<(), EstimationError> {
        let required = match bound {
            Bound::Min => self.min,
            Bound::Max => self.max,
        };
        if required > available {
            return Err(EstimationError::InsufficientMemory {
                required,
                available,
                bound,
            });
        }
        Ok(())
    }
}

impl Add for MemoryRange {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.min + rhs.min, self.max + rhs.max)
    }
}

impl Display for MemoryRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.min == self.max {
            write!(f, "{}", human_readable(self.min))
        } else {
            write!(
                f,
                "[{} ... {}]",
                human_readable(self.min),
                human_readable(self.max)
            )
        }
    }
}

/// The `k`-th varint threshold, that is, the smallest value needing `k + 1`
/// bytes.
#[inline(always)]
fn threshold(k: u32) -> f64 {
    (1_u128 << (7 * k)) as f64
}

/// The smallest concave function not smaller than [`varint_len`].
///
/// It interpolates linearly between the points `(0, 1)` and
/// `(128ᵏ, k + 1)`.
fn varint_len_upper(delta: u64) -> f64 {
    let k = varint_len(delta) as u32;
    if k as usize == MAX_VARINT_LEN {
        return MAX_VARINT_LEN as f64;
    }
    let lo = if k == 1 { 0.0 } else { threshold(k - 1) };
    let hi = threshold(k);
    k as f64 + (delta as f64 - lo) / (hi - lo)
}

/// The largest convex function not larger than [`varint_len`], for gaps
/// smaller than 2⁶³.
///
/// It interpolates linearly between the points `(128ᵏ - 1, k)`.
fn varint_len_lower(delta: u64) -> f64 {
    let k = varint_len(delta.saturating_add(1)) as u32 - 1;
    if k == 0 {
        return 1.0;
    }
    if k as usize == MAX_VARINT_LEN - 1 {
        return k as f64;
    }
    let lo = threshold(k) - 1.0;
    let hi = threshold(k + 1) - 1.0;
    k as f64 + (delta as f64 - lo) / (hi - lo)
}

/// Memory needed by `nodes` encoded lists of `len` bytes each.
///
/// If `packed` is true, pages are assumed to be completely filled; otherwise,
/// each page wastes the space that is too small for a list, and each
/// partition leaves one page partially filled.
fn paged_size(nodes: u64, len: u64, page_shift: u32, packed: bool, num_partitions: u64) -> u64 {
    let page_size = 1_u64 << page_shift;
    if nodes == 0 || len == 0 {
        return 0;
    }
    if len > page_size {
        return nodes * len;
    }
    let pages = if packed {
        (nodes * len).div_ceil(page_size)
    } else {
        let per_page = page_size / len;
        (nodes.div_ceil(per_page) + num_partitions - 1).min(nodes)
    };
    pages * page_size
}

/// An estimate of the memory needed by a graph.
///
/// ```
/// use pagedgraph::mem::Estimate;
///
/// let estimate = Estimate::new(1_000_000, 10).page_shift(16)?;
/// let total = estimate.total();
/// assert!(total.min <= total.max);
/// assert_eq!(estimate.index().min, 12_000_000);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Estimate {
    node_count: u64,
    avg_degree: u64,
    avg_delta: Option<u64>,
    page_shift: u32,
    num_partitions: NonZeroUsize,
    num_properties: usize,
}

impl Estimate {
    pub fn new(node_count: u64, avg_degree: u64) -> Self {
        Self {
            node_count,
            avg_degree,
            avg_delta: None,
            page_shift: PAGE_SHIFT,
            num_partitions: NonZeroUsize::MIN,
            num_properties: 0,
        }
    }

    /// Creates an estimate from the number of nodes and arcs, rounding the
    /// average degree up.
    pub fn from_counts(node_count: u64, arc_count: u64) -> Self {
        let avg_degree = if node_count == 0 {
            0
        } else {
            arc_count.div_ceil(node_count)
        };
        Self::new(node_count, avg_degree)
    }

    /// Sets the average gap between consecutive neighbors.
    pub fn avg_delta(self, avg_delta: u64) -> Self {
        Self {
            avg_delta: Some(avg_delta),
            ..self
        }
    }

    /// Sets the logarithm of the size of standard pages.
    pub fn page_shift(self, page_shift: u32) -> Result<Self> {
        ensure!(
            (MIN_PAGE_SHIFT..=MAX_PAGE_SHIFT).contains(&page_shift),
            "The page shift must be in [{MIN_PAGE_SHIFT}..{MAX_PAGE_SHIFT}], but it is {page_shift}"
        );
        Ok(Self { page_shift, ..self })
    }

    /// Sets the number of partitions the graph will be built with.
    pub fn num_partitions(self, num_partitions: NonZeroUsize) -> Self {
        Self {
            num_partitions,
            ..self
        }
    }

    /// Sets the number of properties of each arc.
    pub fn num_properties(self, num_properties: usize) -> Self {
        Self {
            num_properties,
            ..self
        }
    }

    fn lists(&self, len: MemoryRange) -> MemoryRange {
        let partitions = self.num_partitions.get() as u64;
        MemoryRange::new(
            paged_size(self.node_count, len.min, self.page_shift, true, partitions),
            paged_size(self.node_count, len.max, self.page_shift, false, partitions),
        )
    }

    /// The memory used by the pages of encoded lists.
    pub fn adjacency(&self) -> MemoryRange {
        if self.node_count == 0 || self.avg_degree == 0 {
            return MemoryRange::default();
        }
        let (best_delta, worst_delta) = match self.avg_delta {
            Some(delta) => (delta, delta),
            None => (1, self.node_count.div_ceil(self.avg_degree)),
        };
        let tail = (self.avg_degree - 1) as f64;
        let first_worst = varint_len(self.node_count - 1) as u64;
        self.lists(MemoryRange::new(
            1 + (tail * varint_len_lower(best_delta)).floor() as u64,
            first_worst + (tail * varint_len_upper(worst_delta)).ceil() as u64,
        ))
    }

    /// The memory used by degrees and offsets.
    pub fn index(&self) -> MemoryRange {
        MemoryRange::of(self.node_count * (size_of::<u32>() + size_of::<u64>()) as u64)
    }

    /// The memory used by the values of the properties and their offsets.
    pub fn properties(&self) -> MemoryRange {
        if self.num_properties == 0 {
            return MemoryRange::default();
        }
        let len = self.avg_degree * size_of::<f64>() as u64;
        (self.lists(MemoryRange::of(len))
            + MemoryRange::of(self.node_count * size_of::<u64>() as u64))
        .times(self.num_properties as u64)
    }

    pub fn total(&self) -> MemoryRange {
        self.adjacency() + self.index() + self.properties()
    }
}

/// Estimates the memory needed by a graph without properties, built with a
/// single partition and standard pages.
pub fn estimate(node_count: u64, avg_degree: u64, avg_delta: u64) -> MemoryRange {
    Estimate::new(node_count, avg_degree)
        .avg_delta(avg_delta)
        .total()
}
