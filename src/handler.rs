//! Phase-aware aggregation orchestrator.
//!
//! The entity-stream driver feeds entities in strict phase order: all nodes,
//! then all ways, then all relations. Way geography is resolved through the
//! location index filled during the node phase, so the ordering is a hard
//! precondition. The phases are encoded in the type of the aggregator
//! itself: way callbacks simply do not exist before [`Aggregator::end_nodes`]
//! has been called.
//!
//! ```rust
//! use tagstats::{Aggregator, AggregatorConfig, MemorySink, Node, Tag};
//! use geo::Point;
//!
//! let mut aggregator = Aggregator::new(AggregatorConfig::default())?;
//! let node = Node::new(1, 42, Some(Point::new(13.4, 52.5)))
//!     .with_tags(vec![Tag::new("amenity", "cafe")]);
//! aggregator.node(&node)?;
//!
//! let mut sink = MemorySink::new();
//! aggregator.end_nodes()?.end_ways().finalize(&mut sink)?;
//! assert_eq!(sink.find_key("amenity").unwrap().counts.nodes(), 1);
//! # Ok::<(), tagstats::TagStatsError>(())
//! ```

use std::marker::PhantomData;

use log::{debug, info};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::basic::DatasetStats;
use crate::config::AggregatorConfig;
use crate::distribution::{GeoDistribution, GridUnion};
use crate::entity::{EntityType, Node, Relation, Tag, Way};
use crate::error::Result;
use crate::grid::{Grid, SENTINEL_CELL};
use crate::interner::{Interner, Symbol};
use crate::location::LocationIndex;
use crate::sink::{
    DistributionRow, KeyCombinationRow, KeyRow, RelationRoleRow, RelationTypeRow, StatsSink,
    TagCombinationRow, TagRow,
};
use crate::stats::{KeyStats, KeyValueStats, RelationTypeStats};

/// Phase marker: node callbacks are accepted.
pub struct Nodes;
/// Phase marker: way callbacks are accepted.
pub struct Ways;
/// Phase marker: relation callbacks are accepted.
pub struct Relations;

/// Counts returned by [`Aggregator::finalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Distinct tag keys seen.
    pub keys: usize,
    /// Tracked (key, value) statistics entries.
    pub key_values: usize,
    /// Distinct relation types tracked.
    pub relation_types: usize,
    /// Distinct grid cells covered by the whole dataset.
    pub cells_all: u64,
}

/// The aggregation orchestrator.
///
/// Single-threaded and synchronous: the driver invokes one callback at a
/// time and every aggregate map is owned exclusively by this struct until
/// `finalize` consumes it.
pub struct Aggregator<Phase = Nodes> {
    state: State,
    _phase: PhantomData<Phase>,
}

struct State {
    grid: Grid,
    min_combination_count: u64,
    /// Without a selection everything is tracked on demand.
    track_all: bool,
    location_index: LocationIndex,
    interner: Interner,
    key_stats: FxHashMap<Symbol, KeyStats>,
    key_value_stats: FxHashMap<Symbol, KeyValueStats>,
    tag_distributions: FxHashMap<(Symbol, Symbol), GeoDistribution>,
    relation_type_stats: FxHashMap<Symbol, RelationTypeStats>,
    union: GridUnion,
    dataset: DatasetStats,
    /// Images rendered at phase flushes, handed to the sink at finalize.
    images: Vec<DistributionRow>,
}

fn split_key_value(text: &str) -> (&str, &str) {
    text.split_once('=').unwrap_or((text, ""))
}

impl Aggregator<Nodes> {
    /// Create an aggregator ready for the node phase.
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        let grid = Grid::new(&config.grid)?;
        let location_index = LocationIndex::new(config.index_backend, grid.size())?;

        let mut interner = Interner::new();
        let mut key_value_stats = FxHashMap::default();
        let mut tag_distributions = FxHashMap::default();
        let mut relation_type_stats = FxHashMap::default();
        let track_all = config.selection.is_none();

        if let Some(selection) = &config.selection {
            for key in &selection.keys {
                key_value_stats.insert(interner.intern(key), KeyValueStats::default());
            }
            for (key, value) in &selection.tags {
                key_value_stats.insert(interner.intern_tag(key, value), KeyValueStats::default());
            }
            for (key, value) in &selection.frequent_tags {
                tag_distributions.insert(
                    (interner.intern(key), interner.intern(value)),
                    GeoDistribution::new(),
                );
            }
            for rtype in &selection.relation_types {
                relation_type_stats.insert(interner.intern(rtype), RelationTypeStats::default());
            }
        }

        info!("processing nodes");
        Ok(Self {
            state: State {
                grid,
                min_combination_count: config.min_combination_count,
                track_all,
                location_index,
                interner,
                key_stats: FxHashMap::default(),
                key_value_stats,
                tag_distributions,
                relation_type_stats,
                union: GridUnion::new(),
                dataset: DatasetStats::default(),
                images: Vec::new(),
            },
            _phase: PhantomData,
        })
    }

    /// Process one node: quantize its coordinate, remember it in the
    /// location index and collect tag statistics.
    pub fn node(&mut self, node: &Node) -> Result<()> {
        self.state.dataset.record_node(node);
        let cell = self.state.grid.cell_opt(node.location);
        let cells: &[u32] = if cell == SENTINEL_CELL { &[] } else { &[cell] };
        self.state
            .collect_tags(EntityType::Node, node.uid, &node.tags, cells);
        self.state.location_index.set(node.id, cell)
    }

    /// Close the node phase: flush node-phase distribution images and move
    /// on to ways.
    pub fn end_nodes(mut self) -> Result<Aggregator<Ways>> {
        info!("node phase done: {} nodes", self.state.dataset.nodes());
        self.state.location_index.freeze()?;
        self.state.flush_distributions(EntityType::Node);
        self.state.log_memory();
        info!("processing ways");
        Ok(Aggregator {
            state: self.state,
            _phase: PhantomData,
        })
    }
}

impl Aggregator<Ways> {
    /// Process one way: resolve its geographic footprint through the
    /// location index and collect tag statistics. Every resolved node
    /// contributes its cell; unresolved references are skipped.
    pub fn way(&mut self, way: &Way) {
        self.state.dataset.record_way(way);

        let mut cells = Vec::with_capacity(way.nodes.len());
        for &node_id in &way.nodes {
            match self.state.location_index.get(node_id) {
                Some(cell) => cells.push(cell),
                // Node is missing for the way: a data-quality condition,
                // not fatal. The rest of the way still counts.
                None => debug!("way {} references unknown node {}", way.id, node_id),
            }
        }

        self.state
            .collect_tags(EntityType::Way, way.uid, &way.tags, &cells);
    }

    /// Close the way phase: flush way-phase distribution images and move on
    /// to relations.
    pub fn end_ways(mut self) -> Aggregator<Relations> {
        info!("way phase done: {} ways", self.state.dataset.ways());
        self.state.flush_distributions(EntityType::Way);
        self.state.log_memory();
        info!("processing relations");
        Aggregator {
            state: self.state,
            _phase: PhantomData,
        }
    }
}

impl Aggregator<Relations> {
    /// Process one relation: collect tag statistics and route member and
    /// role counts to the relation type statistics. Relations contribute no
    /// geo-distribution cells.
    pub fn relation(&mut self, relation: &Relation) {
        self.state.dataset.record_relation(relation);
        self.state
            .collect_tags(EntityType::Relation, relation.uid, &relation.tags, &[]);
        self.state.route_relation_type(relation);
    }

    /// Write every aggregate to the sink in a single transaction. On any
    /// sink failure the transaction is rolled back and the whole run is
    /// considered failed.
    pub fn finalize(mut self, sink: &mut dyn StatsSink) -> Result<AggregateSummary> {
        info!(
            "relation phase done: {} relations",
            self.state.dataset.relations()
        );
        self.state.log_memory();
        info!("writing results");

        sink.begin()?;
        match self.state.write_all(sink) {
            Ok(summary) => {
                sink.commit()?;
                info!(
                    "done: {} keys, {} tracked tags, {} grid cells covered",
                    summary.keys, summary.key_values, summary.cells_all
                );
                Ok(summary)
            }
            Err(e) => {
                // The write failure is the interesting error; a failing
                // rollback cannot improve on it.
                let _ = sink.rollback();
                Err(e)
            }
        }
    }
}

impl<Phase> Aggregator<Phase> {
    /// Whole-dataset counters collected so far.
    pub fn dataset_stats(&self) -> &DatasetStats {
        &self.state.dataset
    }

    /// The shared grid all distributions quantize into.
    pub fn grid(&self) -> &Grid {
        &self.state.grid
    }

    /// Capacity diagnostics for the location index.
    pub fn location_index_memory(&self) -> usize {
        self.state.location_index.used_memory()
    }
}

impl State {
    /// The common tag-collection pass shared by all three entity kinds.
    ///
    /// `cells` is the entity's resolved geographic footprint: one cell for a
    /// node, one per resolved node reference for a way, empty for a
    /// relation.
    fn collect_tags(&mut self, entity_type: EntityType, uid: u64, tags: &[Tag], cells: &[u32]) {
        if tags.is_empty() {
            return;
        }

        let mut keys: SmallVec<[Symbol; 16]> = SmallVec::new();
        let mut combination_candidates: SmallVec<[SmallVec<[Symbol; 2]>; 16]> = SmallVec::new();

        for tag in tags {
            let key = self.interner.intern(&tag.key);
            let value = self.interner.intern(&tag.value);
            keys.push(key);

            let stat = self.key_stats.entry(key).or_default();
            stat.update(value, entity_type, uid);
            for &cell in cells {
                stat.distribution.add_cell(cell, &mut self.union);
            }

            if !cells.is_empty() {
                if self.track_all {
                    let dist = self.tag_distributions.entry((key, value)).or_default();
                    for &cell in cells {
                        dist.add_cell(cell, &mut self.union);
                    }
                } else if let Some(dist) = self.tag_distributions.get_mut(&(key, value)) {
                    for &cell in cells {
                        dist.add_cell(cell, &mut self.union);
                    }
                }
            }

            // Both the bare key and the key=value form take part in the
            // tag-combination pass when they are tracked.
            let mut candidates: SmallVec<[Symbol; 2]> = SmallVec::new();
            if self.key_value_stats.contains_key(&key) {
                candidates.push(key);
            }
            let key_value = self.interner.intern_tag(&tag.key, &tag.value);
            if self.track_all {
                self.key_value_stats.entry(key_value).or_default();
                candidates.push(key_value);
            } else if self.key_value_stats.contains_key(&key_value) {
                candidates.push(key_value);
            }
            combination_candidates.push(candidates);
        }

        // Each unordered pair of distinct keys is counted exactly once; the
        // lexicographically smaller key owns the pair.
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                let (a, b) = self.order_by_text(keys[i], keys[j]);
                if let Some(stat) = self.key_stats.get_mut(&a) {
                    stat.add_key_combination(b, entity_type);
                }
            }
        }

        for i in 0..combination_candidates.len() {
            for j in (i + 1)..combination_candidates.len() {
                for c1 in combination_candidates[i].iter().copied() {
                    for c2 in combination_candidates[j].iter().copied() {
                        let (a, b) = self.order_by_text(c1, c2);
                        if let Some(stat) = self.key_value_stats.get_mut(&a) {
                            stat.add_key_combination(b, entity_type);
                        }
                    }
                }
            }
        }
    }

    fn order_by_text(&self, a: Symbol, b: Symbol) -> (Symbol, Symbol) {
        if self.interner.resolve(a) <= self.interner.resolve(b) {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn route_relation_type(&mut self, relation: &Relation) {
        let Some(rtype) = relation.type_tag() else {
            return;
        };
        let rtype = self.interner.intern(rtype);

        let stat = if self.track_all {
            self.relation_type_stats.entry(rtype).or_default()
        } else {
            match self.relation_type_stats.get_mut(&rtype) {
                Some(stat) => stat,
                None => return,
            }
        };

        stat.record_relation();
        for member in &relation.members {
            let role = self.interner.intern(&member.role);
            stat.record_member(role, member.entity_type);
        }
    }

    /// Render and clear every geo-distribution after a phase that can still
    /// contribute coordinates has ended, keeping only the image bytes and
    /// the snapshotted cell counts. This bounds peak memory when grid
    /// resolution or key cardinality is large.
    fn flush_distributions(&mut self, entity_type: EntityType) {
        let mut image_bytes = 0usize;

        for (&key, stat) in self.key_stats.iter_mut() {
            stat.set_cells_count(entity_type, stat.distribution.cells());
            let image = stat.distribution.render(&self.grid);
            stat.distribution.clear();
            let bytes = image.into_bytes();
            image_bytes += bytes.len();
            self.images.push(DistributionRow {
                key: self.interner.resolve(key).to_string(),
                value: None,
                entity_type,
                image: bytes,
            });
        }

        for (&(key, value), dist) in self.tag_distributions.iter_mut() {
            let image = dist.render(&self.grid);
            dist.clear();
            let bytes = image.into_bytes();
            image_bytes += bytes.len();
            self.images.push(DistributionRow {
                key: self.interner.resolve(key).to_string(),
                value: Some(self.interner.resolve(value).to_string()),
                entity_type,
                image: bytes,
            });
        }

        debug!(
            "flushed distribution images: {} kB, {} grid cells covered so far",
            image_bytes / 1024,
            self.union.count_all_set_cells()
        );
    }

    fn log_memory(&self) {
        debug!(
            "location index: {} entries, {} kB",
            self.location_index.size(),
            self.location_index.used_memory() / 1024
        );
        debug!(
            "string store: {} strings, {} kB",
            self.interner.len(),
            self.interner.used_memory() / 1024
        );
        debug!(
            "aggregates: {} keys, {} tracked tags, {} relation types",
            self.key_stats.len(),
            self.key_value_stats.len(),
            self.relation_type_stats.len()
        );
    }

    fn write_all(&mut self, sink: &mut dyn StatsSink) -> Result<AggregateSummary> {
        for (name, value) in self.dataset.rows() {
            sink.dataset_stat(name, value)?;
        }

        for (&key, stat) in &self.key_stats {
            let key_text = self.interner.resolve(key);

            for (&value, counter) in stat.value_counts() {
                sink.tag(TagRow {
                    key: key_text.to_string(),
                    value: self.interner.resolve(value).to_string(),
                    counts: *counter,
                })?;
            }

            sink.key(KeyRow {
                key: key_text.to_string(),
                counts: *stat.key(),
                values_all: stat.value_counts().len() as u64,
                values: *stat.values(),
                users: stat.users().len() as u64,
                cells_nodes: stat.cells().nodes(),
                cells_ways: stat.cells().ways(),
            })?;

            for (&other, counter) in stat.key_combinations() {
                if counter.all() >= self.min_combination_count {
                    sink.key_combination(KeyCombinationRow {
                        key1: key_text.to_string(),
                        key2: self.interner.resolve(other).to_string(),
                        counts: *counter,
                    })?;
                }
            }
        }

        for (&key_value, stat) in &self.key_value_stats {
            let (key1, value1) = split_key_value(self.interner.resolve(key_value));
            for (&other, counter) in stat.combinations() {
                if counter.all() >= self.min_combination_count {
                    let (key2, value2) = split_key_value(self.interner.resolve(other));
                    sink.tag_combination(TagCombinationRow {
                        key1: key1.to_string(),
                        value1: value1.to_string(),
                        key2: key2.to_string(),
                        value2: value2.to_string(),
                        counts: *counter,
                    })?;
                }
            }
        }

        for (&rtype, stat) in &self.relation_type_stats {
            let rtype_text = self.interner.resolve(rtype);
            sink.relation_type(RelationTypeRow {
                rtype: rtype_text.to_string(),
                count: stat.count(),
                members: *stat.members(),
            })?;

            for (&role, counter) in stat.roles() {
                sink.relation_role(RelationRoleRow {
                    rtype: rtype_text.to_string(),
                    role: self.interner.resolve(role).to_string(),
                    counts: *counter,
                })?;
            }
        }

        for row in self.images.drain(..) {
            sink.distribution(row)?;
        }

        let cells_all = self.union.count_all_set_cells();
        sink.grid_summary(cells_all)?;

        Ok(AggregateSummary {
            keys: self.key_stats.len(),
            key_values: self.key_value_stats.len(),
            relation_types: self.relation_type_stats.len(),
            cells_all,
        })
    }
}
