//! Input model for the entity-stream driver.
//!
//! The driver decodes the source dataset and invokes the aggregator callbacks
//! with these types, in file order: all nodes, then all ways, then all
//! relations. Every node referenced by a way is guaranteed to have been
//! delivered before the first way.

use geo::Point;
use serde::{Deserialize, Serialize};

/// The three kinds of entities in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A point entity with a coordinate.
    Node,
    /// A path/area entity referencing nodes.
    Way,
    /// A grouping entity referencing other entities.
    Relation,
}

impl EntityType {
    pub(crate) fn index(self) -> usize {
        match self {
            EntityType::Node => 0,
            EntityType::Way => 1,
            EntityType::Relation => 2,
        }
    }

    /// Single-character code used by persistence sinks ("n", "w", "r").
    pub fn as_char(self) -> char {
        match self {
            EntityType::Node => 'n',
            EntityType::Way => 'w',
            EntityType::Relation => 'r',
        }
    }
}

/// A textual key/value tag on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A point entity. The coordinate may be missing or invalid.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u64,
    pub uid: u64,
    pub tags: Vec<Tag>,
    pub location: Option<Point<f64>>,
}

impl Node {
    pub fn new(id: u64, uid: u64, location: Option<Point<f64>>) -> Self {
        Self {
            id,
            uid,
            tags: Vec::new(),
            location,
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }
}

/// A path/area entity referencing previously delivered nodes by id.
#[derive(Debug, Clone)]
pub struct Way {
    pub id: u64,
    pub uid: u64,
    pub tags: Vec<Tag>,
    pub nodes: Vec<u64>,
}

impl Way {
    pub fn new(id: u64, uid: u64, nodes: Vec<u64>) -> Self {
        Self {
            id,
            uid,
            tags: Vec::new(),
            nodes,
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// A way is closed if it has at least two node references and the first
    /// and last reference the same node.
    pub fn is_closed(&self) -> bool {
        self.nodes.len() >= 2 && self.nodes.first() == self.nodes.last()
    }
}

/// One member of a relation.
#[derive(Debug, Clone)]
pub struct Member {
    pub entity_type: EntityType,
    pub id: u64,
    /// The declared role. An empty role is valid and distinct.
    pub role: String,
}

impl Member {
    pub fn new(entity_type: EntityType, id: u64, role: impl Into<String>) -> Self {
        Self {
            entity_type,
            id,
            role: role.into(),
        }
    }
}

/// A grouping entity referencing other entities.
#[derive(Debug, Clone)]
pub struct Relation {
    pub id: u64,
    pub uid: u64,
    pub tags: Vec<Tag>,
    pub members: Vec<Member>,
}

impl Relation {
    pub fn new(id: u64, uid: u64, members: Vec<Member>) -> Self {
        Self {
            id,
            uid,
            tags: Vec::new(),
            members,
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// The value of the `type` tag, if present.
    pub fn type_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == "type")
            .map(|tag| tag.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_way_closed() {
        assert!(Way::new(1, 0, vec![5, 6, 7, 5]).is_closed());
        assert!(!Way::new(1, 0, vec![5, 6, 7]).is_closed());
        assert!(!Way::new(1, 0, vec![5]).is_closed());
        assert!(!Way::new(1, 0, vec![]).is_closed());
    }

    #[test]
    fn test_relation_type_tag() {
        let relation = Relation::new(1, 0, vec![])
            .with_tags(vec![Tag::new("type", "multipolygon"), Tag::new("name", "x")]);
        assert_eq!(relation.type_tag(), Some("multipolygon"));

        let untyped = Relation::new(2, 0, vec![]).with_tags(vec![Tag::new("name", "y")]);
        assert_eq!(untyped.type_tag(), None);
    }

    #[test]
    fn test_entity_type_char() {
        assert_eq!(EntityType::Node.as_char(), 'n');
        assert_eq!(EntityType::Way.as_char(), 'w');
        assert_eq!(EntityType::Relation.as_char(), 'r');
    }
}
