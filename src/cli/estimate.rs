/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::num::NonZeroUsize;

use anyhow::{bail, Result};
use clap::Parser;

use super::bytes_parser;
use crate::mem::{Bound, Estimate};

#[derive(Parser, Debug)]
#[command(about = "Estimates the memory needed by a compressed graph.", long_about = None)]
pub struct CliArgs {
    /// The number of nodes.
    #[arg(short, long)]
    pub nodes: u64,
    /// The average degree; if missing, it is computed from the number of arcs.
    #[arg(short = 'd', long, required_unless_present = "arcs")]
    pub avg_degree: Option<u64>,
    /// The number of arcs.
    #[arg(short, long, conflicts_with = "avg_degree")]
    pub arcs: Option<u64>,
    /// The average gap between consecutive neighbors; if missing, the
    /// estimate ranges from gaps of one to evenly spread neighbors.
    #[arg(long)]
    pub avg_delta: Option<u64>,
    /// The logarithm of the page size.
    #[arg(long, default_value_t = crate::pages::PAGE_SHIFT)]
    pub page_shift: u32,
    /// The number of partitions used to build the graph.
    #[arg(short, long, default_value_t = NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN))]
    pub partitions: NonZeroUsize,
    /// The number of properties of each arc.
    #[arg(long, default_value_t = 0)]
    pub properties: usize,
    /// The available memory (e.g., 16GiB); the command fails if the
    /// estimate does not fit.
    #[arg(long, value_parser = bytes_parser)]
    pub available: Option<u64>,
    /// Compare the upper bound, rather than the lower bound, with the
    /// available memory.
    #[arg(long)]
    pub max: bool,
}

pub fn main(args: CliArgs) -> Result<()> {
    let mut estimate = match (args.avg_degree, args.arcs) {
        (Some(avg_degree), _) => Estimate::new(args.nodes, avg_degree),
        (None, Some(arcs)) => Estimate::from_counts(args.nodes, arcs),
        (None, None) => bail!("Either the average degree or the number of arcs is needed"),
    }
    .page_shift(args.page_shift)?
    .num_partitions(args.partitions)
    .num_properties(args.properties);
    if let Some(avg_delta) = args.avg_delta {
        estimate = estimate.avg_delta(avg_delta);
    }

    let total = estimate.total();
    println!("adjacency:  {}", estimate.adjacency());
    println!("index:      {}", estimate.index());
    if args.properties > 0 {
        println!("properties: {}", estimate.properties());
    }
    println!("total:      {}", total);

    if let Some(available) = args.available {
        let bound = if args.max { Bound::Max } else { Bound::Min };
        total.check(available, bound)?;
        log::info!("The graph fits in {} bytes", available);
    }
    Ok(())
}
