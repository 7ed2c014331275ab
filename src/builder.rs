/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Concurrent construction of a [`CompressedGraph`].
//!
//! Construction happens in three phases. First, an [`AdjacencyBuilder`] is
//! configured and turned into a [`GraphLoader`] by
//! [`start`](AdjacencyBuilder::start): from then on the configuration is
//! frozen. Then, any number of producers push arcs through [`EdgeSink`]s:
//! each sink keeps a small buffer for every partition of the nodes and hands
//! full buffers over to the loader. Finally, [`GraphLoader::build`] consumes
//! the loader and encodes the partitions in parallel, each one into the
//! pages of its own [`PageAllocator`]; the page lists are then concatenated,
//! relocating the addresses of each partition.
//!
//! Arcs may carry any number of `f64` properties. Each property is stored in
//! its own pages and has its own default value and [`Aggregation`].
//!
//! ```
//! use pagedgraph::prelude::*;
//! use rayon::prelude::*;
//!
//! let loader = AdjacencyBuilder::new(5)?
//!     .orientation(Orientation::Undirected)
//!     .aggregation(Aggregation::Sum)
//!     .with_property(1.0)
//!     .with_aggregated_property(0.0, Aggregation::Max)
//!     .start()?;
//!
//! let arcs = vec![
//!     (0, 1, [0.5, 3.0]),
//!     (1, 2, [1.5, 1.0]),
//!     (0, 1, [2.0, 2.0]),
//!     (4, 3, [1.0, 0.0]),
//! ];
//! loader.par_extend_with_properties(arcs.into_par_iter())?;
//! let graph = loader.build(&pagedgraph::thread_pool![2])?;
//!
//! assert_eq!(graph.successors(1), [0, 2]);
//! let mut sums = graph.property_cursor(1, 0).unwrap();
//! assert_eq!(sums.next(), 2.5);
//! assert_eq!(sums.next(), 1.5);
//! let mut maxima = graph.property_cursor(1, 1).unwrap();
//! assert_eq!(maxima.next(), 3.0);
//! assert_eq!(maxima.next(), 1.0);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! The configuration cannot be changed once arcs can be pushed:
//!
//! ```compile_fail
//! use pagedgraph::prelude::*;
//!
//! let loader = AdjacencyBuilder::new(5)?.start()?;
//! loader.sink().push(0, 1)?;
//! let loader = loader.orientation(Orientation::Reverse);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use anyhow::{ensure, Context, Result};
use dsi_progress_logger::{concurrent_progress_logger, ProgressLog};
use rayon::prelude::*;
use thiserror::Error;

use crate::codec::{encode_deltas, EncodeError};
use crate::graph::{CompressedGraph, Properties};
use crate::index::{AdjacencyIndex, ZERO_DEGREE};
use crate::pages::{
    AllocStats, PageAllocator, PageTable, MAX_PAGE_SHIFT, MIN_PAGE_SHIFT, PAGE_SHIFT,
};

/// How arcs are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    /// An arc `(src, dst)` is stored in the list of `src`.
    #[default]
    Natural,
    /// An arc `(src, dst)` is stored in the list of `dst`.
    Reverse,
    /// An arc `(src, dst)` is stored in the lists of both `src` and `dst`.
    ///
    /// Loops are thus stored twice in the list of their node.
    Undirected,
}

/// What to do with parallel arcs, that is, arcs with the same source and
/// target.
///
/// All policies but [`None`](Aggregation::None) keep a single arc. The
/// remaining variants describe how the values of a property of the merged
/// arcs are combined; they are all equivalent when there are no properties.
///
/// [`First`](Aggregation::First) and [`Last`](Aggregation::Last) depend on
/// the order in which arcs reach the loader, which is the insertion order
/// only when there is a single producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregation {
    /// Keep all parallel arcs.
    #[default]
    None,
    /// Keep the value of the first arc.
    First,
    /// Keep the value of the last arc.
    Last,
    Sum,
    Min,
    Max,
    /// Store the number of parallel arcs.
    Count,
}

impl Aggregation {
    /// Combines the values of a nonempty group of parallel arcs.
    fn combine(self, values: impl ExactSizeIterator<Item = f64>) -> f64 {
        let count = values.len();
        let mut values = values;
        match self {
            Aggregation::None => unreachable!("Parallel arcs are kept, not combined"),
            Aggregation::First => values.next().unwrap_or_default(),
            Aggregation::Last => values.last().unwrap_or_default(),
            Aggregation::Sum => values.sum(),
            Aggregation::Min => values.fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Count => count as f64,
        }
    }
}

/// Errors in the arcs given to a [`GraphLoader`].
///
/// Any of these errors aborts the construction: the first one is recorded
/// by the loader and returned again by [`GraphLoader::build`], so no graph
/// is built from a partially accepted sequence of arcs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Node {node} out of range: the graph has {num_nodes} nodes")]
    NodeOutOfRange { node: usize, num_nodes: usize },
    #[error("Arc ({src}, {dst}) has {actual} properties, but the graph has {expected}")]
    PropertyCount {
        src: usize,
        dst: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Node {node} has {degree} neighbors, but the maximum degree is {}", u32::MAX)]
    DegreeOverflow { node: usize, degree: usize },
    #[error("Cannot encode the neighbors of node {node}")]
    Encode {
        node: usize,
        #[source]
        source: EncodeError,
    },
}

/// The configuration of a property.
#[derive(Debug, Clone, Copy)]
struct PropertyConfig {
    default_value: f64,
    /// `None` means the aggregation of the builder.
    aggregation: Option<Aggregation>,
}

/// The configuration of a [`GraphLoader`].
///
/// Configuration methods take the builder by value; once it is complete,
/// [`start`](Self::start) validates it and returns the loader accepting
/// arcs.
///
/// ```
/// use std::num::NonZeroUsize;
/// use pagedgraph::prelude::*;
///
/// let loader = AdjacencyBuilder::new(1000)?
///     .num_partitions(NonZeroUsize::new(4).unwrap())
///     .page_shift(12)?
///     .start()?;
/// assert_eq!(loader.num_nodes(), 1000);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct AdjacencyBuilder {
    num_nodes: usize,
    orientation: Orientation,
    aggregation: Aggregation,
    properties: Vec<PropertyConfig>,
    num_partitions: NonZeroUsize,
    page_shift: u32,
    batch_size: NonZeroUsize,
    expected_num_arcs: Option<usize>,
}

impl AdjacencyBuilder {
    pub fn new(num_nodes: usize) -> Result<Self> {
        Ok(Self {
            num_nodes,
            orientation: Orientation::default(),
            aggregation: Aggregation::default(),
            properties: vec![],
            num_partitions: NonZeroUsize::new(num_cpus::get()).context("zero CPUs")?,
            page_shift: PAGE_SHIFT,
            batch_size: NonZeroUsize::new(1 << 12).context("zero batch size")?,
            expected_num_arcs: None,
        })
    }

    pub fn orientation(self, orientation: Orientation) -> Self {
        Self {
            orientation,
            ..self
        }
    }

    /// How to handle parallel arcs. The default is to keep them.
    ///
    /// This is also the aggregation of properties added with
    /// [`with_property`](Self::with_property).
    pub fn aggregation(self, aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            ..self
        }
    }

    /// Adds a property, aggregated like the arcs; arcs pushed without
    /// properties get `default_value`.
    pub fn with_property(mut self, default_value: f64) -> Self {
        self.properties.push(PropertyConfig {
            default_value,
            aggregation: None,
        });
        self
    }

    /// Adds a property with its own aggregation.
    ///
    /// If parallel arcs are merged, `aggregation` must not be
    /// [`Aggregation::None`]; if they are kept, it must be.
    pub fn with_aggregated_property(mut self, default_value: f64, aggregation: Aggregation) -> Self {
        self.properties.push(PropertyConfig {
            default_value,
            aggregation: Some(aggregation),
        });
        self
    }

    /// How many partitions to split the nodes into.
    ///
    /// Partitions are the unit of parallelism of the encoding phase.
    /// Defaults to `num_cpus::get()`.
    pub fn num_partitions(self, num_partitions: NonZeroUsize) -> Self {
        Self {
            num_partitions,
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

    /// How many arcs a sink keeps for each partition before handing them
    /// over to the loader.
    pub fn batch_size(self, batch_size: NonZeroUsize) -> Self {
        Self { batch_size, ..self }
    }

    /// Approximate number of arcs to be pushed. Used only for progress
    /// reporting.
    pub fn expected_num_arcs(self, expected_num_arcs: usize) -> Self {
        Self {
            expected_num_arcs: Some(expected_num_arcs),
            ..self
        }
    }

    /// Checks the configuration and returns a loader accepting arcs.
    pub fn start(self) -> Result<GraphLoader> {
        let merge = self.aggregation != Aggregation::None;
        let mut aggregations = Vec::with_capacity(self.properties.len());
        for (key, property) in self.properties.iter().enumerate() {
            let aggregation = property.aggregation.unwrap_or(self.aggregation);
            ensure!(
                merge == (aggregation != Aggregation::None),
                "Property {key} has aggregation {aggregation:?}, but parallel arcs are aggregated with {:?}",
                self.aggregation
            );
            aggregations.push(aggregation);
        }
        let nodes_per_partition = self
            .num_nodes
            .div_ceil(self.num_partitions.get())
            .max(1);
        Ok(GraphLoader {
            num_nodes: self.num_nodes,
            orientation: self.orientation,
            batch_size: self.batch_size,
            expected_num_arcs: self.expected_num_arcs,
            nodes_per_partition,
            defaults: self.properties.iter().map(|p| p.default_value).collect(),
            config: EncodeConfig {
                aggregation: self.aggregation,
                page_shift: self.page_shift,
                aggregations: aggregations.into_boxed_slice(),
            },
            partitions: (0..self.num_partitions.get())
                .map(|_| Mutex::new(Vec::new()))
                .collect(),
            num_pushed: AtomicU64::new(0),
            error: OnceLock::new(),
        })
    }
}

/// Arcs pushed by a sink for one partition, with their properties in
/// row-major order.
#[derive(Debug, Default)]
struct Batch {
    arcs: Vec<(usize, usize)>,
    values: Vec<f64>,
}

/// Collects arcs from many threads and builds a [`CompressedGraph`] from
/// them.
///
/// Arcs are pushed through [sinks](Self::sink), or from a parallel iterator
/// with [`par_extend`](Self::par_extend). If an arc is rejected, the loader
/// remembers the error and [`build`](Self::build) will fail with it.
#[derive(Debug)]
pub struct GraphLoader {
    num_nodes: usize,
    orientation: Orientation,
    batch_size: NonZeroUsize,
    expected_num_arcs: Option<usize>,
    nodes_per_partition: usize,
    /// Default values of the properties.
    defaults: Box<[f64]>,
    config: EncodeConfig,
    /// Batches pushed by sinks, by partition.
    partitions: Box<[Mutex<Vec<Batch>>]>,
    num_pushed: AtomicU64,
    /// The first rejected arc.
    error: OnceLock<BuildError>,
}

impl GraphLoader {
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_properties(&self) -> usize {
        self.defaults.len()
    }

    /// Returns a new sink pushing arcs into this loader.
    ///
    /// Sinks can be created freely, one for each producer thread; they hand
    /// their arcs over to the loader when they are dropped, at the latest.
    pub fn sink(&self) -> EdgeSink<'_> {
        EdgeSink {
            loader: self,
            buffers: (0..self.partitions.len())
                .map(|_| Batch::default())
                .collect(),
        }
    }

    /// Pushes all arcs returned by a parallel iterator. If the graph has
    /// properties, the arcs get their default values.
    pub fn par_extend(&self, arcs: impl ParallelIterator<Item = (usize, usize)>) -> Result<()> {
        self.par_extend_inner(arcs.map(|(src, dst)| (src, dst, None::<[f64; 0]>)))
    }

    /// Pushes all arcs returned by a parallel iterator, with one value for
    /// each property.
    pub fn par_extend_with_properties<P: AsRef<[f64]> + Send>(
        &self,
        arcs: impl ParallelIterator<Item = (usize, usize, P)>,
    ) -> Result<()> {
        self.par_extend_inner(arcs.map(|(src, dst, values)| (src, dst, Some(values))))
    }

    fn par_extend_inner<P: AsRef<[f64]> + Send>(
        &self,
        arcs: impl ParallelIterator<Item = (usize, usize, Option<P>)>,
    ) -> Result<()> {
        let mut pl = concurrent_progress_logger!(
            item_name = "arc",
            local_speed = true,
            expected_updates = self.expected_num_arcs,
        );
        pl.start("Pushing arcs");
        arcs.map_with(pl.clone(), |pl, arc| {
            pl.light_update();
            arc
        })
        .try_for_each_init(
            || self.sink(),
            |sink, (src, dst, values)| sink.add(src, dst, values.as_ref().map(AsRef::as_ref)),
        )?;
        pl.done();
        Ok(())
    }

    /// Encodes the arcs pushed so far, using the threads of `pool`, and
    /// returns the resulting graph.
    ///
    /// Fails if any arc was rejected, even if the error was ignored.
    pub fn build(self, pool: &rayon::ThreadPool) -> Result<CompressedGraph> {
        if let Some(err) = self.error.into_inner() {
            return Err(err).context("An arc was rejected while loading");
        }
        let num_nodes = self.num_nodes;
        let nodes_per_partition = self.nodes_per_partition;
        log::info!(
            "Building a graph with {} nodes and {} properties from {} arcs in {} partitions of {} nodes",
            num_nodes,
            self.defaults.len(),
            self.num_pushed.load(Ordering::Relaxed),
            self.partitions.len(),
            nodes_per_partition,
        );

        let mut pl = concurrent_progress_logger!(
            display_memory = true,
            item_name = "node",
            local_speed = true,
            expected_updates = Some(num_nodes),
        );
        pl.start("Encoding adjacency lists");

        let config = self.config;
        let partitions = self.partitions.into_vec();
        let job_pl = pl.clone();
        let jobs = pool.install(|| {
            partitions
                .into_par_iter()
                .enumerate()
                .map_with(job_pl, |pl, (partition_id, batches)| {
                    let batches = batches.into_inner().unwrap_or_else(PoisonError::into_inner);
                    let first_node = (partition_id * nodes_per_partition).min(num_nodes);
                    let last_node = (first_node + nodes_per_partition).min(num_nodes);
                    let job = config.encode(first_node, last_node, batches)?;
                    pl.update_with_count(last_node - first_node);
                    Ok(job)
                })
                .collect::<Result<Vec<Job>, BuildError>>()
        })?;
        pl.done();

        merge(num_nodes, config.page_shift, config.aggregations.len(), jobs)
    }
}

/// A handle pushing arcs into a [`GraphLoader`].
///
/// A sink buffers arcs locally, so it must be used by one thread only.
/// Buffered arcs are handed over to the loader when the sink is dropped.
#[derive(Debug)]
pub struct EdgeSink<'l> {
    loader: &'l GraphLoader,
    buffers: Vec<Batch>,
}

impl EdgeSink<'_> {
    /// Pushes an arc. If the graph has properties, the arc gets their
    /// default values.
    pub fn push(&mut self, src: usize, dst: usize) -> Result<(), BuildError> {
        self.add(src, dst, None)
    }

    /// Pushes an arc of a graph with a single property.
    pub fn push_with_property(
        &mut self,
        src: usize,
        dst: usize,
        value: f64,
    ) -> Result<(), BuildError> {
        self.add(src, dst, Some(&[value]))
    }

    /// Pushes an arc with one value for each property.
    pub fn push_with_properties(
        &mut self,
        src: usize,
        dst: usize,
        values: &[f64],
    ) -> Result<(), BuildError> {
        self.add(src, dst, Some(values))
    }

    fn add(&mut self, src: usize, dst: usize, values: Option<&[f64]>) -> Result<(), BuildError> {
        self.check(src, dst, values).inspect_err(|err| {
            // only the first error is kept
            let _ = self.loader.error.set(err.clone());
        })?;
        let loader = self.loader;
        let values = values.unwrap_or(&*loader.defaults);
        match loader.orientation {
            Orientation::Natural => self.put(src, dst, values),
            Orientation::Reverse => self.put(dst, src, values),
            Orientation::Undirected => {
                self.put(src, dst, values);
                self.put(dst, src, values);
            }
        }
        Ok(())
    }

    fn check(&self, src: usize, dst: usize, values: Option<&[f64]>) -> Result<(), BuildError> {
        let num_nodes = self.loader.num_nodes;
        for node in [src, dst] {
            if node >= num_nodes {
                return Err(BuildError::NodeOutOfRange { node, num_nodes });
            }
        }
        let expected = self.loader.defaults.len();
        match values {
            Some(values) if values.len() != expected => Err(BuildError::PropertyCount {
                src,
                dst,
                expected,
                actual: values.len(),
            }),
            _ => Ok(()),
        }
    }

    #[inline(always)]
    fn put(&mut self, src: usize, dst: usize, values: &[f64]) {
        let partition_id = src / self.loader.nodes_per_partition;
        if self.buffers[partition_id].arcs.len() >= self.loader.batch_size.get() {
            self.flush(partition_id);
        }
        let batch = &mut self.buffers[partition_id];
        batch.arcs.push((src, dst));
        batch.values.extend_from_slice(values);
    }

    fn flush(&mut self, partition_id: usize) {
        let batch = std::mem::take(&mut self.buffers[partition_id]);
        if batch.arcs.is_empty() {
            return;
        }
        self.loader
            .num_pushed
            .fetch_add(batch.arcs.len() as u64, Ordering::Relaxed);
        self.loader.partitions[partition_id]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
    }
}

impl Drop for EdgeSink<'_> {
    fn drop(&mut self) {
        for partition_id in 0..self.buffers.len() {
            self.flush(partition_id);
        }
    }
}

#[derive(Debug, Clone)]
struct EncodeConfig {
    aggregation: Aggregation,
    page_shift: u32,
    /// The aggregation of each property.
    aggregations: Box<[Aggregation]>,
}

/// The encoded lists of a range of nodes.
#[derive(Debug)]
struct Job {
    first_node: usize,
    degrees: Vec<u32>,
    /// Addresses relative to `pages`.
    offsets: Vec<u64>,
    pages: Vec<Box<[u8]>>,
    stats: AllocStats,
    /// For each property, addresses relative to its pages.
    prop_offsets: Vec<Vec<u64>>,
    prop_pages: Vec<Vec<Box<[u8]>>>,
}

impl EncodeConfig {
    /// Sorts, aggregates and encodes the lists of the nodes in
    /// `[first_node..last_node)`, whose arcs are contained in `batches`.
    fn encode(
        &self,
        first_node: usize,
        last_node: usize,
        batches: Vec<Batch>,
    ) -> Result<Job, BuildError> {
        let num_nodes = last_node - first_node;
        let num_props = self.aggregations.len();

        // counting sort by source, stable with respect to batch order
        let mut starts = vec![0_usize; num_nodes + 1];
        for &(src, _) in batches.iter().flat_map(|batch| &batch.arcs) {
            starts[src - first_node + 1] += 1;
        }
        for i in 0..num_nodes {
            starts[i + 1] += starts[i];
        }
        let num_arcs = starts[num_nodes];
        let mut targets = vec![0_u64; num_arcs];
        let mut values = vec![0.0; num_arcs * num_props];
        let mut pos = starts[..num_nodes].to_vec();
        for batch in batches {
            for (i, &(src, dst)) in batch.arcs.iter().enumerate() {
                let p = &mut pos[src - first_node];
                targets[*p] = dst as u64;
                values[*p * num_props..(*p + 1) * num_props]
                    .copy_from_slice(&batch.values[i * num_props..(i + 1) * num_props]);
                *p += 1;
            }
        }
        drop(pos);

        let mut job = Job {
            first_node,
            degrees: vec![0; num_nodes],
            offsets: vec![ZERO_DEGREE; num_nodes],
            pages: vec![],
            stats: AllocStats::default(),
            prop_offsets: vec![vec![ZERO_DEGREE; num_nodes]; num_props],
            prop_pages: vec![],
        };
        let mut alloc = PageAllocator::new(self.page_shift);
        let mut prop_allocs = (0..num_props)
            .map(|_| PageAllocator::new(self.page_shift))
            .collect::<Vec<_>>();
        let mut ids = Vec::new();
        let mut props = vec![Vec::new(); num_props];
        let mut order = Vec::new();
        let mut bytes = Vec::new();

        for i in 0..num_nodes {
            let node = first_node + i;
            let range = starts[i]..starts[i + 1];
            ids.clear();
            if num_props == 0 {
                ids.extend_from_slice(&targets[range]);
                ids.sort_unstable();
                if self.aggregation != Aggregation::None {
                    ids.dedup();
                }
            } else {
                order.clear();
                order.extend(range);
                // stable, so that parallel arcs keep their order
                order.sort_by_key(|&arc| targets[arc]);
                self.aggregate(&order, &targets, &values, &mut ids, &mut props);
            }

            if ids.is_empty() {
                continue;
            }
            job.degrees[i] = u32::try_from(ids.len()).map_err(|_| BuildError::DegreeOverflow {
                node,
                degree: ids.len(),
            })?;
            bytes.clear();
            encode_deltas(&ids, 0, &mut bytes)
                .map_err(|source| BuildError::Encode { node, source })?;
            job.offsets[i] = alloc.insert(&bytes);

            for ((prop_alloc, offsets), column) in
                prop_allocs.iter_mut().zip(&mut job.prop_offsets).zip(&props)
            {
                let (address, dst) = prop_alloc.allocate(column.len() * size_of::<f64>());
                for (chunk, value) in dst.chunks_exact_mut(size_of::<f64>()).zip(column) {
                    chunk.copy_from_slice(&value.to_le_bytes());
                }
                offsets[i] = address;
            }
        }

        job.stats = alloc.stats();
        job.pages = alloc.into_pages();
        job.prop_pages = prop_allocs
            .into_iter()
            .map(PageAllocator::into_pages)
            .collect();
        log::debug!(
            "Encoded nodes [{}..{}) with {} arcs: {}",
            first_node,
            last_node,
            num_arcs,
            job.stats
        );
        Ok(job)
    }

    /// Applies the aggregation policies to the arcs in `order`, which are
    /// sorted by target.
    fn aggregate(
        &self,
        order: &[usize],
        targets: &[u64],
        values: &[f64],
        ids: &mut Vec<u64>,
        props: &mut [Vec<f64>],
    ) {
        let num_props = props.len();
        props.iter_mut().for_each(Vec::clear);
        if self.aggregation == Aggregation::None {
            ids.extend(order.iter().map(|&arc| targets[arc]));
            for (key, column) in props.iter_mut().enumerate() {
                column.extend(order.iter().map(|&arc| values[arc * num_props + key]));
            }
            return;
        }
        for group in order.chunk_by(|&a, &b| targets[a] == targets[b]) {
            ids.push(targets[group[0]]);
            for (key, column) in props.iter_mut().enumerate() {
                let group_values = group.iter().map(|&arc| values[arc * num_props + key]);
                column.push(self.aggregations[key].combine(group_values));
            }
        }
    }
}

/// Adds the base of a page list to an address.
#[inline(always)]
fn relocate(offset: u64, base: usize, page_shift: u32) -> u64 {
    if offset == ZERO_DEGREE {
        offset
    } else {
        offset + ((base as u64) << page_shift)
    }
}

/// Concatenates the jobs, which must be sorted by first node.
fn merge(
    num_nodes: usize,
    page_shift: u32,
    num_props: usize,
    mut jobs: Vec<Job>,
) -> Result<CompressedGraph> {
    let (pages, bases) = PageTable::concat(
        jobs.iter_mut()
            .map(|job| std::mem::take(&mut job.pages))
            .collect(),
    );
    let mut prop_tables = Vec::with_capacity(num_props);
    for key in 0..num_props {
        prop_tables.push(PageTable::concat(
            jobs.iter_mut()
                .map(|job| std::mem::take(&mut job.prop_pages[key]))
                .collect(),
        ));
    }

    let mut degrees = Vec::with_capacity(num_nodes);
    let mut offsets = Vec::with_capacity(num_nodes);
    let mut prop_offsets = vec![Vec::with_capacity(num_nodes); num_props];
    let mut stats = AllocStats::default();
    let mut next_node = 0;

    for (job_id, (job, base)) in jobs.into_iter().zip(bases).enumerate() {
        ensure!(
            job.first_node == next_node,
            "Jobs are not contiguous: expected first node {}, got {}",
            next_node,
            job.first_node
        );
        next_node += job.degrees.len();
        degrees.extend(job.degrees);
        offsets.extend(job.offsets.into_iter().map(|o| relocate(o, base, page_shift)));
        for ((column, job_column), (_, prop_bases)) in prop_offsets
            .iter_mut()
            .zip(job.prop_offsets)
            .zip(&prop_tables)
        {
            let prop_base = prop_bases[job_id];
            column.extend(
                job_column
                    .into_iter()
                    .map(|o| relocate(o, prop_base, page_shift)),
            );
        }
        stats += job.stats;
    }
    ensure!(
        next_node == num_nodes,
        "Jobs cover {} nodes instead of {}",
        next_node,
        num_nodes
    );

    let index = AdjacencyIndex::new(degrees.into_boxed_slice(), offsets.into_boxed_slice());
    log::info!(
        "Encoded {} arcs of {} nodes into {} pages: {}",
        index.num_arcs(),
        num_nodes,
        pages.num_pages(),
        stats
    );
    let properties = prop_tables
        .into_iter()
        .zip(prop_offsets)
        .map(|((table, _), offsets)| Properties::new(table, offsets.into_boxed_slice()))
        .collect();
    Ok(CompressedGraph::from_parts(index, pages, page_shift, properties))
}
