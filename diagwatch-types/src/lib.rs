//! # diagwatch-types
//!
//! Core types for diagnostic aggregation. This crate defines the schema shared
//! by status producers, the aggregator and anything subscribing to the
//! aggregated health summary.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature for JSON and friends
//! - **Raw vs. validated**: [`RawStatus`] is what producers send, [`StatusReport`]
//!   is what survived validation
//! - **Versioned schema**: Snapshots include version info for forward compatibility
//! - **Ergonomic builders**: Fluent API for constructing reports and snapshots
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: JSON/MessagePack/etc. serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use diagwatch_types::{Level, Snapshot, StatusReport};
//!
//! let snapshot = Snapshot::builder()
//!     .sequence(7)
//!     .node("/", Level::Error, |n| n)
//!     .node("/robot", Level::Error, |n| {
//!         n.report(StatusReport::builder("motor").level(Level::Error).message("stalled"))
//!          .report(StatusReport::builder("battery").level(Level::Ok))
//!     })
//!     .build();
//!
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.level(), Level::Error);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. The version is included in serialized
//! snapshots to allow consumers to handle format evolution gracefully.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod level;
mod report;
mod snapshot;

pub use level::*;
pub use report::*;
pub use snapshot::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
/// Consumers should check this version and handle older formats appropriately.
pub const SCHEMA_VERSION: u32 = 1;
