//! Tag statistics aggregation with compact geographic distributions.
//!
//! `tagstats` consumes a stream of tagged entities (nodes with coordinates,
//! ways referencing nodes, relations referencing anything) in strict phase
//! order and aggregates per-key and per-tag statistics: occurrence counts by
//! entity type, distinct values, user counts, tag co-occurrence, relation
//! type breakdowns and a rendered geographic distribution image for every
//! key. Everything runs single-threaded in one pass; the finished aggregates
//! are written to a pluggable [`StatsSink`] inside one transaction.
//!
//! # Example
//!
//! ```rust
//! use geo::Point;
//! use tagstats::{Aggregator, AggregatorConfig, MemorySink, Node, Tag, Way};
//!
//! let mut aggregator = Aggregator::new(AggregatorConfig::default())?;
//!
//! aggregator.node(
//!     &Node::new(1, 42, Some(Point::new(13.4, 52.5)))
//!         .with_tags(vec![Tag::new("highway", "crossing")]),
//! )?;
//! aggregator.node(&Node::new(2, 42, Some(Point::new(13.5, 52.5))))?;
//!
//! let mut ways = aggregator.end_nodes()?;
//! ways.way(&Way::new(10, 42, vec![1, 2]).with_tags(vec![Tag::new("highway", "residential")]));
//!
//! let mut sink = MemorySink::new();
//! let summary = ways.end_ways().finalize(&mut sink)?;
//!
//! assert_eq!(summary.keys, 1);
//! assert_eq!(sink.find_key("highway").unwrap().counts.ways(), 1);
//! # Ok::<(), tagstats::TagStatsError>(())
//! ```
//!
//! # Phases
//!
//! The phase protocol is part of the aggregator's type: [`Aggregator<Nodes>`]
//! only accepts nodes, [`Aggregator::end_nodes`] consumes it and returns the
//! way-phase aggregator, and so on. Feeding entities out of order is a
//! compile error, not a runtime surprise.

pub mod basic;
pub mod config;
pub mod distribution;
pub mod entity;
pub mod error;
pub mod grid;
pub mod handler;
pub mod interner;
pub mod location;
pub mod sink;
pub mod stats;

pub use geo::Point;

pub use basic::DatasetStats;
pub use config::{AggregatorConfig, GridConfig, IndexBackend, Selection};
pub use distribution::{GeoDistribution, GridUnion, Image};
pub use entity::{EntityType, Member, Node, Relation, Tag, Way};
pub use error::{Result, TagStatsError};
pub use grid::{Grid, SENTINEL_CELL};
pub use handler::{AggregateSummary, Aggregator, Nodes, Relations, Ways};
pub use interner::{Interner, Symbol};
pub use location::LocationIndex;
pub use sink::{
    DistributionRow, KeyCombinationRow, KeyRow, MemorySink, RelationRoleRow, RelationTypeRow,
    StatsSink, TagCombinationRow, TagRow,
};
pub use stats::{Counter, KeyStats, KeyValueStats, RelationTypeStats};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{Aggregator, AggregatorConfig, Result, TagStatsError};

    pub use geo::Point;

    pub use crate::{GridConfig, IndexBackend, Selection};

    pub use crate::{EntityType, Member, Node, Relation, Tag, Way};

    pub use crate::{MemorySink, StatsSink};
}
