//! Persistence sink abstraction.
//!
//! The sink receives the finalized statistics in a single pass wrapped in one
//! transaction: `begin`, all rows, `commit`. If any call fails, the
//! orchestrator rolls the transaction back and the whole run is considered
//! failed. A relational implementation maps each method onto an insert
//! statement; [`MemorySink`] collects rows in memory for tests and tooling.

use bytes::Bytes;

use crate::entity::EntityType;
use crate::error::Result;
use crate::stats::Counter;

/// Finalized statistics for one tag key.
#[derive(Debug, Clone)]
pub struct KeyRow {
    pub key: String,
    /// Occurrences by entity type.
    pub counts: Counter,
    /// Total distinct values over all entity types.
    pub values_all: u64,
    /// Distinct values by entity type.
    pub values: Counter,
    /// Distinct users that used this key.
    pub users: u64,
    pub cells_nodes: u64,
    pub cells_ways: u64,
}

/// Finalized occurrence counts for one (key, value) tag.
#[derive(Debug, Clone)]
pub struct TagRow {
    pub key: String,
    pub value: String,
    pub counts: Counter,
}

/// Co-occurrence counts for an unordered pair of keys.
#[derive(Debug, Clone)]
pub struct KeyCombinationRow {
    pub key1: String,
    pub key2: String,
    pub counts: Counter,
}

/// Co-occurrence counts for a pair of tracked tags. `value1`/`value2` are
/// empty when the tracked side is a bare key.
#[derive(Debug, Clone)]
pub struct TagCombinationRow {
    pub key1: String,
    pub value1: String,
    pub key2: String,
    pub value2: String,
    pub counts: Counter,
}

/// Totals for one relation `type` value.
#[derive(Debug, Clone)]
pub struct RelationTypeRow {
    pub rtype: String,
    pub count: u64,
    /// Member counts by member entity type.
    pub members: Counter,
}

/// Per-role member counts for one relation type.
#[derive(Debug, Clone)]
pub struct RelationRoleRow {
    pub rtype: String,
    pub role: String,
    pub counts: Counter,
}

/// A rendered geo-distribution image for a key or a (key, value) pair,
/// emitted at the end of the phase named by `entity_type`.
#[derive(Debug, Clone)]
pub struct DistributionRow {
    pub key: String,
    pub value: Option<String>,
    pub entity_type: EntityType,
    /// Raw RGBA image bytes, row-major, one pixel per grid cell.
    pub image: Bytes,
}

/// Transactional writer for finalized statistics.
pub trait StatsSink {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    /// One whole-dataset counter as a (name, value) row.
    fn dataset_stat(&mut self, name: &str, value: u64) -> Result<()>;

    fn key(&mut self, row: KeyRow) -> Result<()>;
    fn tag(&mut self, row: TagRow) -> Result<()>;
    fn key_combination(&mut self, row: KeyCombinationRow) -> Result<()>;
    fn tag_combination(&mut self, row: TagCombinationRow) -> Result<()>;
    fn relation_type(&mut self, row: RelationTypeRow) -> Result<()>;
    fn relation_role(&mut self, row: RelationRoleRow) -> Result<()>;
    fn distribution(&mut self, row: DistributionRow) -> Result<()>;

    /// Total distinct cells covered by the whole dataset.
    fn grid_summary(&mut self, cells: u64) -> Result<()>;
}

/// In-memory sink collecting every row, for tests and small batches.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub dataset_stats: Vec<(String, u64)>,
    pub keys: Vec<KeyRow>,
    pub tags: Vec<TagRow>,
    pub key_combinations: Vec<KeyCombinationRow>,
    pub tag_combinations: Vec<TagCombinationRow>,
    pub relation_types: Vec<RelationTypeRow>,
    pub relation_roles: Vec<RelationRoleRow>,
    pub distributions: Vec<DistributionRow>,
    pub grid_cells: Option<u64>,
    pub in_transaction: bool,
    pub committed: bool,
    pub rolled_back: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_key(&self, key: &str) -> Option<&KeyRow> {
        self.keys.iter().find(|row| row.key == key)
    }

    pub fn find_tag(&self, key: &str, value: &str) -> Option<&TagRow> {
        self.tags
            .iter()
            .find(|row| row.key == key && row.value == value)
    }

    pub fn find_key_combination(&self, key1: &str, key2: &str) -> Option<&KeyCombinationRow> {
        self.key_combinations
            .iter()
            .find(|row| row.key1 == key1 && row.key2 == key2)
    }
}

impl StatsSink for MemorySink {
    fn begin(&mut self) -> Result<()> {
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.committed = true;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.rolled_back = true;
        Ok(())
    }

    fn dataset_stat(&mut self, name: &str, value: u64) -> Result<()> {
        self.dataset_stats.push((name.to_string(), value));
        Ok(())
    }

    fn key(&mut self, row: KeyRow) -> Result<()> {
        self.keys.push(row);
        Ok(())
    }

    fn tag(&mut self, row: TagRow) -> Result<()> {
        self.tags.push(row);
        Ok(())
    }

    fn key_combination(&mut self, row: KeyCombinationRow) -> Result<()> {
        self.key_combinations.push(row);
        Ok(())
    }

    fn tag_combination(&mut self, row: TagCombinationRow) -> Result<()> {
        self.tag_combinations.push(row);
        Ok(())
    }

    fn relation_type(&mut self, row: RelationTypeRow) -> Result<()> {
        self.relation_types.push(row);
        Ok(())
    }

    fn relation_role(&mut self, row: RelationRoleRow) -> Result<()> {
        self.relation_roles.push(row);
        Ok(())
    }

    fn distribution(&mut self, row: DistributionRow) -> Result<()> {
        self.distributions.push(row);
        Ok(())
    }

    fn grid_summary(&mut self, cells: u64) -> Result<()> {
        self.grid_cells = Some(cells);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_transaction_flags() {
        let mut sink = MemorySink::new();
        sink.begin().unwrap();
        assert!(sink.in_transaction);
        sink.dataset_stat("nodes", 3).unwrap();
        sink.commit().unwrap();
        assert!(sink.committed);
        assert!(!sink.in_transaction);
        assert_eq!(sink.dataset_stats, vec![("nodes".to_string(), 3)]);
    }

    #[test]
    fn test_memory_sink_lookups() {
        let mut sink = MemorySink::new();
        sink.key(KeyRow {
            key: "highway".to_string(),
            counts: Counter::default(),
            values_all: 0,
            values: Counter::default(),
            users: 0,
            cells_nodes: 0,
            cells_ways: 0,
        })
        .unwrap();

        assert!(sink.find_key("highway").is_some());
        assert!(sink.find_key("name").is_none());
    }
}
