//! Hash-keyed statistics aggregates.
//!
//! All maps are keyed by interned [`Symbol`] handles; the interner arena owns
//! the text, aggregates own only handles.

use rustc_hash::FxHashMap;

use crate::distribution::GeoDistribution;
use crate::entity::EntityType;
use crate::interner::Symbol;

/// Fixed-arity counter with one slot per entity type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    counts: [u64; 3],
}

impl Counter {
    pub fn incr(&mut self, entity_type: EntityType) {
        self.counts[entity_type.index()] += 1;
    }

    pub fn count(&self, entity_type: EntityType) -> u64 {
        self.counts[entity_type.index()]
    }

    pub fn set_count(&mut self, entity_type: EntityType, value: u64) {
        self.counts[entity_type.index()] = value;
    }

    pub fn nodes(&self) -> u64 {
        self.counts[EntityType::Node.index()]
    }

    pub fn ways(&self) -> u64 {
        self.counts[EntityType::Way.index()]
    }

    pub fn relations(&self) -> u64 {
        self.counts[EntityType::Relation.index()]
    }

    pub fn all(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// All statistics collected for a single tag key.
#[derive(Debug, Default)]
pub struct KeyStats {
    /// Occurrences of the key, by entity type.
    key: Counter,
    /// Distinct values, by entity type. A value is counted for a type the
    /// first time it is seen on an entity of that type.
    values: Counter,
    /// Distinct-cell snapshots taken from the distribution at phase flushes.
    cells: Counter,
    key_combinations: FxHashMap<Symbol, Counter>,
    users: FxHashMap<u64, u64>,
    value_counts: FxHashMap<Symbol, Counter>,
    pub(crate) distribution: GeoDistribution,
}

impl KeyStats {
    /// Record one (key, entity) occurrence with the given tag value.
    pub fn update(&mut self, value: Symbol, entity_type: EntityType, uid: u64) {
        self.key.incr(entity_type);

        match self.value_counts.entry(value) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                let mut counter = Counter::default();
                counter.incr(entity_type);
                entry.insert(counter);
                self.values.incr(entity_type);
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let counter = entry.get_mut();
                counter.incr(entity_type);
                if counter.count(entity_type) == 1 {
                    // First occurrence of this value for this entity type.
                    self.values.incr(entity_type);
                }
            }
        }

        *self.users.entry(uid).or_insert(0) += 1;
    }

    /// Record a co-occurrence with another key on the same entity.
    pub fn add_key_combination(&mut self, other_key: Symbol, entity_type: EntityType) {
        self.key_combinations
            .entry(other_key)
            .or_default()
            .incr(entity_type);
    }

    pub fn set_cells_count(&mut self, entity_type: EntityType, count: u64) {
        self.cells.set_count(entity_type, count);
    }

    pub fn key(&self) -> &Counter {
        &self.key
    }

    pub fn values(&self) -> &Counter {
        &self.values
    }

    pub fn cells(&self) -> &Counter {
        &self.cells
    }

    pub fn key_combinations(&self) -> &FxHashMap<Symbol, Counter> {
        &self.key_combinations
    }

    pub fn users(&self) -> &FxHashMap<u64, u64> {
        &self.users
    }

    pub fn value_counts(&self) -> &FxHashMap<Symbol, Counter> {
        &self.value_counts
    }
}

/// Statistics for one exact (key, value) tag: which other tags co-occur.
#[derive(Debug, Default)]
pub struct KeyValueStats {
    combinations: FxHashMap<Symbol, Counter>,
}

impl KeyValueStats {
    pub fn add_key_combination(&mut self, other: Symbol, entity_type: EntityType) {
        self.combinations.entry(other).or_default().incr(entity_type);
    }

    pub fn combinations(&self) -> &FxHashMap<Symbol, Counter> {
        &self.combinations
    }
}

/// Statistics for one relation `type` value.
#[derive(Debug, Default)]
pub struct RelationTypeStats {
    count: u64,
    members: Counter,
    roles: FxHashMap<Symbol, Counter>,
}

impl RelationTypeStats {
    /// Record one relation of this type.
    pub fn record_relation(&mut self) {
        self.count += 1;
    }

    /// Record one member. An empty role is a valid, distinct role key.
    pub fn record_member(&mut self, role: Symbol, member_type: EntityType) {
        self.members.incr(member_type);
        self.roles.entry(role).or_default().incr(member_type);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn members(&self) -> &Counter {
        &self.members
    }

    pub fn roles(&self) -> &FxHashMap<Symbol, Counter> {
        &self.roles
    }
}
