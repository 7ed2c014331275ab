/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::num::NonZeroUsize;

use anyhow::Result;
use pagedgraph::prelude::*;
use pagedgraph::thread_pool;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

fn init_logger() {
    // several tests share the logger
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

fn random_arcs(num_nodes: usize, num_arcs: usize, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..num_arcs)
        .map(|_| (rng.random_range(0..num_nodes), rng.random_range(0..num_nodes)))
        .collect()
}

/// Returns the sorted lists of the graph described by `arcs`.
fn naive_lists(num_nodes: usize, arcs: &[(usize, usize)], undirected: bool) -> Vec<Vec<usize>> {
    let mut lists = vec![vec![]; num_nodes];
    for &(src, dst) in arcs {
        lists[src].push(dst);
        if undirected {
            lists[dst].push(src);
        }
    }
    for list in &mut lists {
        list.sort_unstable();
    }
    lists
}

fn lists(graph: &CompressedGraph) -> Vec<Vec<usize>> {
    (0..graph.num_nodes())
        .map(|node| graph.successors(node))
        .collect()
}

#[test]
fn test_directed_matches_naive() -> Result<()> {
    init_logger();
    let (num_nodes, num_arcs) = (1000, 20_000);
    let arcs = random_arcs(num_nodes, num_arcs, 0);
    let loader = AdjacencyBuilder::new(num_nodes)?
        .num_partitions(NonZeroUsize::new(7).unwrap())
        .page_shift(8)?
        .start()?;
    loader.par_extend(arcs.par_iter().copied())?;
    let graph = loader.build(&thread_pool![4])?;

    assert_eq!(graph.num_nodes(), num_nodes);
    assert_eq!(graph.num_arcs(), num_arcs as u64);
    let degree_sum: u64 = (0..num_nodes).map(|node| graph.degree(node) as u64).sum();
    assert_eq!(degree_sum, num_arcs as u64);
    assert_eq!(lists(&graph), naive_lists(num_nodes, &arcs, false));
    Ok(())
}

#[test]
fn test_undirected_degree_sum() -> Result<()> {
    init_logger();
    let (num_nodes, num_arcs) = (500, 5_000);
    let arcs = random_arcs(num_nodes, num_arcs, 1);
    let loader = AdjacencyBuilder::new(num_nodes)?
        .orientation(Orientation::Undirected)
        .page_shift(6)?
        .start()?;
    loader.par_extend(arcs.par_iter().copied())?;
    let graph = loader.build(&thread_pool![3])?;

    assert_eq!(graph.num_arcs(), 2 * num_arcs as u64);
    assert_eq!(lists(&graph), naive_lists(num_nodes, &arcs, true));
    Ok(())
}

#[test]
fn test_reverse() -> Result<()> {
    let loader = AdjacencyBuilder::new(4)?
        .orientation(Orientation::Reverse)
        .start()?;
    loader.par_extend([(0, 1), (0, 2), (3, 2), (1, 1)].into_par_iter())?;
    let graph = loader.build(&thread_pool![2])?;
    assert_eq!(lists(&graph), vec![vec![], vec![0, 1], vec![0, 3], vec![]]);
    Ok(())
}

#[test]
fn test_concurrency_does_not_matter() -> Result<()> {
    init_logger();
    let (num_nodes, num_arcs) = (2000, 30_000);
    let arcs = random_arcs(num_nodes, num_arcs, 2);

    let sequential = {
        let loader = AdjacencyBuilder::new(num_nodes)?
            .num_partitions(NonZeroUsize::MIN)
            .aggregation(Aggregation::Sum)
            .with_property(0.0)
            .start()?;
        {
            let mut sink = loader.sink();
            for &(src, dst) in &arcs {
                sink.push_with_property(src, dst, (src % 7) as f64)?;
            }
        }
        loader.build(&thread_pool![1])?
    };

    for num_threads in [2, 5, 8] {
        let loader = AdjacencyBuilder::new(num_nodes)?
            .num_partitions(NonZeroUsize::new(3 * num_threads).unwrap())
            .batch_size(NonZeroUsize::new(100).unwrap())
            .aggregation(Aggregation::Sum)
            .with_property(0.0)
            .page_shift(7)?
            .start()?;
        // producers with their own sinks
        std::thread::scope(|s| {
            for chunk in arcs.chunks(arcs.len().div_ceil(num_threads)) {
                let mut sink = loader.sink();
                s.spawn(move || -> Result<(), BuildError> {
                    for &(src, dst) in chunk {
                        sink.push_with_property(src, dst, (src % 7) as f64)?;
                    }
                    Ok(())
                });
            }
        });
        let parallel = loader.build(&thread_pool![num_threads])?;

        assert_eq!(parallel.num_arcs(), sequential.num_arcs());
        for node in 0..num_nodes {
            assert_eq!(parallel.degree(node), sequential.degree(node));
            let mut expected = vec![];
            sequential.for_each_relationship_with_property(node, 0, f64::NAN, |_, succ, value| {
                expected.push((succ, value));
                true
            });
            let mut found = vec![];
            parallel.for_each_relationship_with_property(node, 0, f64::NAN, |_, succ, value| {
                found.push((succ, value));
                true
            });
            assert_eq!(found, expected, "node {node}");
        }
    }
    Ok(())
}

#[test]
fn test_aggregation() -> Result<()> {
    let arcs = [(0, 2, 1.0), (0, 1, 5.0), (0, 2, 3.0), (0, 2, 2.0), (1, 0, 4.0)];
    let expected = [
        (Aggregation::None, vec![(1, 5.0), (2, 1.0), (2, 3.0), (2, 2.0)]),
        (Aggregation::First, vec![(1, 5.0), (2, 1.0)]),
        (Aggregation::Last, vec![(1, 5.0), (2, 2.0)]),
        (Aggregation::Sum, vec![(1, 5.0), (2, 6.0)]),
        (Aggregation::Min, vec![(1, 5.0), (2, 1.0)]),
        (Aggregation::Max, vec![(1, 5.0), (2, 3.0)]),
        (Aggregation::Count, vec![(1, 1.0), (2, 3.0)]),
    ];
    for (aggregation, expected) in expected {
        let loader = AdjacencyBuilder::new(3)?
            .aggregation(aggregation)
            .with_property(0.0)
            .start()?;
        {
            let mut sink = loader.sink();
            for (src, dst, value) in arcs {
                sink.push_with_property(src, dst, value)?;
            }
        }
        let graph = loader.build(&thread_pool![2])?;
        let mut found = vec![];
        graph.for_each_relationship_with_property(0, 0, f64::NAN, |src, dst, value| {
            assert_eq!(src, 0);
            found.push((dst, value));
            true
        });
        assert_eq!(found, expected, "{aggregation:?}");
        assert_eq!(graph.successors(1), [0]);
    }
    Ok(())
}

#[test]
fn test_aggregation_without_properties() -> Result<()> {
    let loader = AdjacencyBuilder::new(3)?
        .aggregation(Aggregation::Max)
        .start()?;
    loader.par_extend([(0, 2), (0, 2), (0, 1), (2, 2), (2, 2)].into_par_iter())?;
    let graph = loader.build(&thread_pool![2])?;
    assert_eq!(lists(&graph), vec![vec![1, 2], vec![], vec![2]]);
    assert!(!graph.has_properties());
    assert!(graph.property_cursor(0, 0).is_none());
    Ok(())
}

#[test]
fn test_default_property() -> Result<()> {
    let loader = AdjacencyBuilder::new(3)?.with_property(7.5).start()?;
    {
        let mut sink = loader.sink();
        sink.push(0, 1)?;
        sink.push_with_property(0, 2, 1.0)?;
    }
    let graph = loader.build(&thread_pool![1])?;
    let mut props = graph.property_cursor(0, 0).unwrap();
    assert_eq!(props.remaining(), 2);
    assert_eq!(props.next(), 7.5);
    assert_eq!(props.next(), 1.0);
    assert!(!props.has_next());
    let mut props = graph.property_cursor(1, 0).unwrap();
    assert!(!props.init(1));
    assert!(graph.property_cursor(0, 1).is_none());
    Ok(())
}

#[test]
fn test_errors() -> Result<()> {
    let loader = AdjacencyBuilder::new(3)?.start()?;
    let mut sink = loader.sink();
    assert_eq!(
        sink.push(0, 3),
        Err(BuildError::NodeOutOfRange {
            node: 3,
            num_nodes: 3
        })
    );
    assert_eq!(
        sink.push_with_property(1, 2, 1.0),
        Err(BuildError::PropertyCount {
            src: 1,
            dst: 2,
            expected: 0,
            actual: 1
        })
    );
    drop(sink);

    let loader = AdjacencyBuilder::new(3)?.with_property(0.0).start()?;
    assert_eq!(
        loader.sink().push_with_properties(1, 2, &[1.0, 2.0]),
        Err(BuildError::PropertyCount {
            src: 1,
            dst: 2,
            expected: 1,
            actual: 2
        })
    );

    let loader = AdjacencyBuilder::new(3)?.start()?;
    let err = loader
        .par_extend([(0, 1), (5, 0)].into_par_iter())
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<BuildError>(),
        Some(&BuildError::NodeOutOfRange {
            node: 5,
            num_nodes: 3
        })
    );

    assert!(AdjacencyBuilder::new(3)?.page_shift(2).is_err());
    assert!(AdjacencyBuilder::new(3)?.page_shift(31).is_err());
    Ok(())
}

#[test]
fn test_rejected_arc_fails_build() -> Result<()> {
    let loader = AdjacencyBuilder::new(3)?.start()?;
    assert!(loader
        .par_extend([(0, 1), (1, 2), (5, 0)].into_par_iter())
        .is_err());
    // the accepted arcs have been handed over, but no graph is built
    let err = loader.build(&thread_pool![1]).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BuildError>(),
        Some(&BuildError::NodeOutOfRange {
            node: 5,
            num_nodes: 3
        })
    );

    // the error is kept even if the caller ignores it
    let loader = AdjacencyBuilder::new(3)?.with_property(1.0).start()?;
    {
        let mut sink = loader.sink();
        sink.push(0, 1)?;
        let _ = sink.push_with_properties(1, 2, &[]);
        sink.push(1, 2)?;
    }
    let err = loader.build(&thread_pool![1]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::PropertyCount { actual: 0, .. })
    ));
    Ok(())
}

#[test]
fn test_configuration_is_checked() -> Result<()> {
    // properties must agree with the handling of parallel arcs
    assert!(AdjacencyBuilder::new(3)?
        .with_aggregated_property(0.0, Aggregation::Sum)
        .start()
        .is_err());
    assert!(AdjacencyBuilder::new(3)?
        .aggregation(Aggregation::First)
        .with_aggregated_property(0.0, Aggregation::None)
        .start()
        .is_err());
    assert!(AdjacencyBuilder::new(3)?
        .aggregation(Aggregation::First)
        .with_aggregated_property(0.0, Aggregation::Count)
        .with_property(0.0)
        .start()
        .is_ok());

    // a loader owns a copy of the configuration, so changing the builder
    // afterwards affects only new loaders
    let builder = AdjacencyBuilder::new(4)?.with_property(7.5);
    let loader = builder.clone().start()?;
    loader.sink().push(0, 1)?;
    let other = builder
        .num_partitions(NonZeroUsize::new(2).unwrap())
        .start()?
        .build(&thread_pool![1])?;
    assert_eq!(other.num_arcs(), 0);
    let graph = loader.build(&thread_pool![1])?;
    assert_eq!(graph.num_arcs(), 1);
    assert_eq!(graph.property_cursor(0, 0).unwrap().next(), 7.5);
    Ok(())
}

#[test]
fn test_multiple_properties() -> Result<()> {
    // parallel arcs keep the first value of the first property, and sum
    // and maximize the other ones
    let arcs = [
        (0, 1, [1.0, 1.0, 5.0]),
        (0, 2, [2.0, 2.0, 1.0]),
        (0, 1, [3.0, 3.0, 8.0]),
        (0, 1, [4.0, 4.0, 2.0]),
        (2, 0, [5.0, 5.0, 3.0]),
    ];
    let loader = AdjacencyBuilder::new(3)?
        .aggregation(Aggregation::First)
        .with_property(0.0)
        .with_aggregated_property(0.0, Aggregation::Sum)
        .with_aggregated_property(0.0, Aggregation::Max)
        .start()?;
    assert_eq!(loader.num_properties(), 3);
    {
        let mut sink = loader.sink();
        for (src, dst, values) in arcs {
            sink.push_with_properties(src, dst, &values)?;
        }
        sink.push(2, 1)?;
    }
    let graph = loader.build(&thread_pool![2])?;
    assert_eq!(graph.num_properties(), 3);
    assert_eq!(graph.successors(0), [1, 2]);

    let column = |node: usize, key: usize| {
        let mut values = vec![];
        graph.for_each_relationship_with_property(node, key, f64::NAN, |_, _, value| {
            values.push(value);
            true
        });
        values
    };
    assert_eq!(column(0, 0), [1.0, 2.0]);
    assert_eq!(column(0, 1), [8.0, 2.0]);
    assert_eq!(column(0, 2), [8.0, 1.0]);
    // default values
    assert_eq!(column(2, 0), [5.0, 0.0]);
    assert_eq!(column(2, 2), [3.0, 0.0]);
    assert!(column(1, 0).is_empty());
    assert!(column(0, 3).iter().all(|value| value.is_nan()));

    let usage = graph.memory_usage();
    assert_eq!(usage.properties, 3 * graph.properties()[0].size_in_bytes());
    Ok(())
}

#[test]
fn test_empty() -> Result<()> {
    let graph = AdjacencyBuilder::new(0)?.start()?.build(&thread_pool![2])?;
    assert_eq!(graph.num_nodes(), 0);
    assert_eq!(graph.num_arcs(), 0);
    assert_eq!(graph.page_table().num_pages(), 0);

    let graph = AdjacencyBuilder::new(10)?.start()?.build(&thread_pool![2])?;
    assert_eq!(graph.num_arcs(), 0);
    assert_eq!(graph.page_table().num_pages(), 0);
    assert!(!graph.cursor(9).has_next());
    Ok(())
}

#[test]
fn test_oversized_node_isolation() -> Result<()> {
    init_logger();
    let num_nodes = 300_000;
    let big = 123_456;
    let mut rng = SmallRng::seed_from_u64(3);
    let mut arcs: Vec<(usize, usize)> = (0..200_000).map(|i| (big, i)).collect();
    for node in (0..num_nodes).step_by(10) {
        for _ in 0..rng.random_range(0..=42) {
            arcs.push((node, rng.random_range(0..num_nodes)));
        }
    }

    for num_threads in [1, 4] {
        // shuffle the arrival order
        let mut arcs = arcs.clone();
        for i in (1..arcs.len()).rev() {
            arcs.swap(i, rng.random_range(0..=i));
        }
        let loader = AdjacencyBuilder::new(num_nodes)?
            .num_partitions(NonZeroUsize::new(2 * num_threads).unwrap())
            .page_shift(16)?
            .start()?;
        loader.par_extend(arcs.par_iter().copied())?;
        let graph = loader.build(&thread_pool![num_threads])?;

        let pages = graph.page_table();
        let oversized = (0..pages.num_pages())
            .filter(|&page| pages.page(page).len() > 1 << 16)
            .collect::<Vec<_>>();
        assert_eq!(oversized.len(), 1);
        assert_eq!(graph.memory_usage().oversized_pages, 1);
        let address = graph.index().offset(big).unwrap();
        assert_eq!(address >> 16, oversized[0] as u64);
        assert_eq!(address & 0xFFFF, 0);

        assert_eq!(graph.degree(big), 200_000);
        assert_eq!(graph.num_arcs(), arcs.len() as u64);
        let mut cursor = graph.cursor(big);
        assert_eq!(cursor.advance(199_999), Some(199_999));
        assert!(!cursor.has_next());
        assert_eq!(
            graph.successors(big).iter().sum::<usize>(),
            200_000 * 199_999 / 2
        );
        assert_eq!(lists(&graph), naive_lists(num_nodes, &arcs, false));
    }
    Ok(())
}

#[cfg_attr(not(feature = "slow_tests"), ignore)]
#[test]
fn test_very_dense_nodes() -> Result<()> {
    init_logger();
    let num_nodes = 1_000_000;
    let loader = AdjacencyBuilder::new(num_nodes)?
        .orientation(Orientation::Undirected)
        .page_shift(14)?
        .start()?;
    // node 1337 is adjacent to the even nodes, node 42 to the odd ones
    loader.par_extend(
        (0..num_nodes / 2)
            .into_par_iter()
            .flat_map_iter(|i| [(1337, 2 * i), (42, 2 * i + 1)]),
    )?;
    let graph = loader.build(&thread_pool![])?;

    assert_eq!(graph.num_arcs(), 2 * num_nodes as u64);
    assert_eq!(graph.degree(1337), 500_001);
    assert_eq!(graph.degree(42), 500_001);
    assert_eq!(graph.memory_usage().oversized_pages, 2);
    let even: usize = graph.successors(1337).iter().sum();
    let odd: usize = graph.successors(42).iter().sum();
    // 1337 and 42 also appear as each other's neighbors
    assert_eq!(even, (0..num_nodes / 2).map(|i| 2 * i).sum::<usize>() + 42);
    assert_eq!(odd, (0..num_nodes / 2).map(|i| 2 * i + 1).sum::<usize>() + 1337);
    Ok(())
}
