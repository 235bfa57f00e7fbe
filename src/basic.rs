//! Whole-dataset counters collected alongside the tag aggregates.

use crate::entity::{Node, Relation, Way};

/// Basic statistics over the entire entity stream: entity counts, tag
/// counts, maxima and a few structural measures. Written to the sink as
/// (name, value) rows at finalize time.
#[derive(Debug, Default, Clone)]
pub struct DatasetStats {
    nodes: u64,
    nodes_without_tags: u64,
    node_tags: u64,
    max_node_id: u64,
    max_tags_on_node: u64,
    ways: u64,
    ways_without_tags: u64,
    way_tags: u64,
    way_nodes: u64,
    closed_ways: u64,
    max_way_id: u64,
    max_tags_on_way: u64,
    max_nodes_on_way: u64,
    relations: u64,
    relations_without_tags: u64,
    relations_without_type: u64,
    relation_tags: u64,
    relation_members: u64,
    relation_member_nodes: u64,
    relation_member_ways: u64,
    relation_member_relations: u64,
    max_relation_id: u64,
    max_tags_on_relation: u64,
    max_members_on_relation: u64,
    max_user_id: u64,
    anon_user_objects: u64,
}

impl DatasetStats {
    fn record_common(&mut self, uid: u64) {
        if uid == 0 {
            self.anon_user_objects += 1;
        }
        self.max_user_id = self.max_user_id.max(uid);
    }

    pub fn record_node(&mut self, node: &Node) {
        let tag_count = node.tags.len() as u64;
        self.record_common(node.uid);
        self.nodes += 1;
        if tag_count == 0 {
            self.nodes_without_tags += 1;
        }
        self.node_tags += tag_count;
        self.max_node_id = self.max_node_id.max(node.id);
        self.max_tags_on_node = self.max_tags_on_node.max(tag_count);
    }

    pub fn record_way(&mut self, way: &Way) {
        let tag_count = way.tags.len() as u64;
        self.record_common(way.uid);
        self.ways += 1;
        if tag_count == 0 {
            self.ways_without_tags += 1;
        }
        if way.is_closed() {
            self.closed_ways += 1;
        }
        self.way_tags += tag_count;
        self.way_nodes += way.nodes.len() as u64;
        self.max_way_id = self.max_way_id.max(way.id);
        self.max_tags_on_way = self.max_tags_on_way.max(tag_count);
        self.max_nodes_on_way = self.max_nodes_on_way.max(way.nodes.len() as u64);
    }

    pub fn record_relation(&mut self, relation: &Relation) {
        let tag_count = relation.tags.len() as u64;
        self.record_common(relation.uid);
        self.relations += 1;
        if tag_count == 0 {
            self.relations_without_tags += 1;
        }
        if relation.type_tag().is_none() {
            self.relations_without_type += 1;
        }
        self.relation_tags += tag_count;
        self.relation_members += relation.members.len() as u64;
        self.max_relation_id = self.max_relation_id.max(relation.id);
        self.max_tags_on_relation = self.max_tags_on_relation.max(tag_count);
        self.max_members_on_relation = self
            .max_members_on_relation
            .max(relation.members.len() as u64);

        for member in &relation.members {
            match member.entity_type {
                crate::entity::EntityType::Node => self.relation_member_nodes += 1,
                crate::entity::EntityType::Way => self.relation_member_ways += 1,
                crate::entity::EntityType::Relation => self.relation_member_relations += 1,
            }
        }
    }

    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    pub fn ways(&self) -> u64 {
        self.ways
    }

    pub fn relations(&self) -> u64 {
        self.relations
    }

    /// All counters as (name, value) rows, in a fixed order.
    pub fn rows(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("nodes", self.nodes),
            ("nodes_without_tags", self.nodes_without_tags),
            ("nodes_with_tags", self.nodes - self.nodes_without_tags),
            ("node_tags", self.node_tags),
            ("max_node_id", self.max_node_id),
            ("max_tags_on_node", self.max_tags_on_node),
            ("ways", self.ways),
            ("ways_without_tags", self.ways_without_tags),
            ("way_tags", self.way_tags),
            ("way_nodes", self.way_nodes),
            ("closed_ways", self.closed_ways),
            ("max_way_id", self.max_way_id),
            ("max_tags_on_way", self.max_tags_on_way),
            ("max_nodes_on_way", self.max_nodes_on_way),
            ("relations", self.relations),
            ("relations_without_tags", self.relations_without_tags),
            ("relations_without_type", self.relations_without_type),
            ("relation_tags", self.relation_tags),
            ("relation_members", self.relation_members),
            ("relation_member_nodes", self.relation_member_nodes),
            ("relation_member_ways", self.relation_member_ways),
            ("relation_member_relations", self.relation_member_relations),
            ("max_relation_id", self.max_relation_id),
            ("max_tags_on_relation", self.max_tags_on_relation),
            ("max_members_on_relation", self.max_members_on_relation),
            ("max_user_id", self.max_user_id),
            ("anon_user_objects", self.anon_user_objects),
        ]
    }
}
