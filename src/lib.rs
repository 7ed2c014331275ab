/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_pub)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]

pub mod builder;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod cursor;
pub mod graph;
pub mod index;
pub mod mem;
pub mod pages;

#[macro_use]
pub mod utils;

pub mod prelude {
    pub use crate::builder::{
        AdjacencyBuilder, Aggregation, BuildError, EdgeSink, GraphLoader, Orientation,
    };
    pub use crate::codec::{EncodeError, CHUNK_SIZE};
    pub use crate::cursor::{AdjacencyCursor, PropertyCursor, Successors};
    pub use crate::graph::{CompressedGraph, GraphMemory, NodeIter};
    pub use crate::index::ZERO_DEGREE;
    pub use crate::mem::{estimate, Bound, Estimate, EstimationError, MemoryRange};
    pub use crate::pages::PAGE_SHIFT;
}
