/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::collections::VecDeque;

use anyhow::{ensure, Result};
use clap::Parser;
use dsi_progress_logger::{progress_logger, ProgressLog};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::NumThreadsArg;
use crate::builder::{AdjacencyBuilder, Orientation};
use crate::graph::CompressedGraph;

/// The number of arcs generated by each parallel task.
const ARCS_PER_TASK: u64 = 1 << 16;

#[derive(Parser, Debug)]
#[command(about = "Builds a random graph and benchmarks its traversal.", long_about = None)]
pub struct CliArgs {
    /// The number of nodes.
    #[arg(short, long)]
    pub nodes: usize,
    /// The number of arcs.
    #[arg(short, long)]
    pub arcs: u64,
    /// The seed of the pseudorandom number generator.
    #[arg(short, long, default_value_t = 0)]
    pub seed: u64,
    /// Store the graph as undirected.
    #[arg(short, long)]
    pub undirected: bool,
    /// The logarithm of the page size.
    #[arg(long, default_value_t = crate::pages::PAGE_SHIFT)]
    pub page_shift: u32,
    /// Number of repeats of the traversals.
    #[arg(short = 'R', long, default_value_t = 1)]
    pub repeats: usize,
    #[clap(flatten)]
    pub num_threads: NumThreadsArg,
}

pub fn main(args: CliArgs) -> Result<()> {
    ensure!(args.nodes > 0, "The graph must have at least one node");
    let pool = crate::thread_pool![args.num_threads.num_threads];
    let orientation = if args.undirected {
        Orientation::Undirected
    } else {
        Orientation::Natural
    };
    let loader = AdjacencyBuilder::new(args.nodes)?
        .orientation(orientation)
        .page_shift(args.page_shift)?
        .expected_num_arcs(args.arcs as usize)
        .start()?;

    let start = std::time::Instant::now();
    let (nodes, arcs, seed) = (args.nodes, args.arcs, args.seed);
    pool.install(|| {
        loader.par_extend(
            (0..arcs.div_ceil(ARCS_PER_TASK))
                .into_par_iter()
                .flat_map_iter(move |task| {
                    let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(task));
                    let len = ARCS_PER_TASK.min(arcs - task * ARCS_PER_TASK);
                    (0..len).map(move |_| (rng.random_range(0..nodes), rng.random_range(0..nodes)))
                }),
        )
    })?;
    let graph = loader.build(&pool)?;
    log::info!(
        "Built the graph in {:.3}s: {}",
        start.elapsed().as_secs_f64(),
        graph.memory_usage()
    );

    for _ in 0..args.repeats {
        pool.install(|| par_scan(&graph));
        visit(&graph);
    }
    Ok(())
}

/// Decodes all lists in parallel.
fn par_scan(graph: &CompressedGraph) {
    let start = std::time::Instant::now();
    let checksum = (0..graph.num_nodes())
        .into_par_iter()
        .map_init(
            || graph.unbound_cursor(),
            |cursor, node| {
                cursor.init(node);
                cursor.successors().map(|succ| succ as u64).sum::<u64>()
            },
        )
        .reduce(|| 0, u64::wrapping_add);
    let elapsed = start.elapsed().as_secs_f64();
    log::info!(
        "Scanned {} arcs in {:.3}s ({:.3} ns/arc), checksum {}",
        graph.num_arcs(),
        elapsed,
        1E9 * elapsed / graph.num_arcs().max(1) as f64,
        checksum
    );
}

/// Performs a breadth-first visit from every unvisited node.
fn visit(graph: &CompressedGraph) {
    let num_nodes = graph.num_nodes();
    let mut seen = vec![false; num_nodes];
    let mut queue = VecDeque::new();
    let mut cursor = graph.unbound_cursor();

    let mut pl = progress_logger![
        display_memory = true,
        item_name = "node",
        local_speed = true,
        expected_updates = Some(num_nodes),
    ];
    pl.start("Visiting graph...");

    for start in 0..num_nodes {
        if seen[start] {
            continue;
        }
        queue.push_back(start);
        seen[start] = true;

        while let Some(node) = queue.pop_front() {
            pl.light_update();
            cursor.init(node);
            for succ in cursor.successors() {
                if !seen[succ] {
                    seen[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
    }

    pl.done();
}
