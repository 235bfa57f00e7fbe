use geo::Point;
use tagstats::{
    Aggregator, AggregatorConfig, IndexBackend, MemorySink, Node, Relation, Tag, Way,
};

fn config() -> AggregatorConfig {
    AggregatorConfig::default().with_min_combination_count(1)
}

#[test]
fn test_empty_dataset() {
    let aggregator = Aggregator::new(config()).unwrap();
    let mut sink = MemorySink::new();
    let summary = aggregator
        .end_nodes()
        .unwrap()
        .end_ways()
        .finalize(&mut sink)
        .unwrap();

    assert!(sink.committed);
    assert_eq!(summary.keys, 0);
    assert_eq!(summary.cells_all, 0);
    assert!(sink.keys.is_empty());
    assert!(sink.distributions.is_empty());

    let rows: std::collections::HashMap<_, _> = sink.dataset_stats.iter().cloned().collect();
    assert_eq!(rows["nodes"], 0);
    assert_eq!(rows["relations"], 0);
}

#[test]
fn test_node_without_location() {
    let mut aggregator = Aggregator::new(config()).unwrap();
    aggregator
        .node(&Node::new(1, 1, None).with_tags(vec![Tag::new("note", "fixme")]))
        .unwrap();

    let mut sink = MemorySink::new();
    aggregator
        .end_nodes()
        .unwrap()
        .end_ways()
        .finalize(&mut sink)
        .unwrap();

    // Tag statistics still count; geography is just absent.
    let key = sink.find_key("note").unwrap();
    assert_eq!(key.counts.nodes(), 1);
    assert_eq!(key.cells_nodes, 0);
}

#[test]
fn test_way_with_no_nodes() {
    let mut aggregator = Aggregator::new(config()).unwrap();
    let mut ways = aggregator.end_nodes().unwrap();
    ways.way(&Way::new(1, 1, vec![]).with_tags(vec![Tag::new("highway", "road")]));

    let mut sink = MemorySink::new();
    ways.end_ways().finalize(&mut sink).unwrap();

    let key = sink.find_key("highway").unwrap();
    assert_eq!(key.counts.ways(), 1);
    assert_eq!(key.cells_ways, 0);
}

#[test]
fn test_relation_without_type_tag() {
    let mut aggregator = Aggregator::new(config()).unwrap();
    let mut relations = aggregator.end_nodes().unwrap().end_ways();
    relations.relation(&Relation::new(1, 1, vec![]).with_tags(vec![Tag::new("name", "x")]));

    let mut sink = MemorySink::new();
    relations.finalize(&mut sink).unwrap();

    assert!(sink.relation_types.is_empty());
    assert_eq!(sink.find_key("name").unwrap().counts.relations(), 1);

    let rows: std::collections::HashMap<_, _> = sink.dataset_stats.iter().cloned().collect();
    assert_eq!(rows["relations_without_type"], 1);
}

#[test]
fn test_duplicate_node_id_last_wins() {
    for backend in [IndexBackend::SparseMem, IndexBackend::SparseMapped] {
        let mut aggregator =
            Aggregator::new(config().with_index_backend(backend)).unwrap();

        // Same id delivered twice with different coordinates.
        aggregator
            .node(&Node::new(1, 1, Some(Point::new(0.5, 0.5))))
            .unwrap();
        aggregator
            .node(&Node::new(1, 1, Some(Point::new(100.5, 50.5))))
            .unwrap();
        aggregator
            .node(&Node::new(2, 1, Some(Point::new(100.5, 50.5))))
            .unwrap();

        let mut ways = aggregator.end_nodes().unwrap();
        ways.way(&Way::new(7, 1, vec![1, 2]).with_tags(vec![Tag::new("k", "v")]));

        let mut sink = MemorySink::new();
        ways.end_ways().finalize(&mut sink).unwrap();

        // Both references resolve to the same, latest cell.
        let key = sink.find_key("k").unwrap();
        assert_eq!(key.cells_ways, 1, "backend {:?}", backend);
    }
}

#[test]
fn test_empty_tag_value() {
    let mut aggregator = Aggregator::new(config()).unwrap();
    aggregator
        .node(
            &Node::new(1, 1, Some(Point::new(0.0, 0.0)))
                .with_tags(vec![Tag::new("fixme", "")]),
        )
        .unwrap();

    let mut sink = MemorySink::new();
    aggregator
        .end_nodes()
        .unwrap()
        .end_ways()
        .finalize(&mut sink)
        .unwrap();

    // The empty string is a valid, distinct value.
    let key = sink.find_key("fixme").unwrap();
    assert_eq!(key.values_all, 1);
    assert!(sink.find_tag("fixme", "").is_some());
}

#[test]
fn test_same_key_many_values() {
    let mut aggregator = Aggregator::new(config()).unwrap();
    for i in 0..50u64 {
        aggregator
            .node(
                &Node::new(i, 1, Some(Point::new(0.0, 0.0)))
                    .with_tags(vec![Tag::new("ref", format!("A{i}"))]),
            )
            .unwrap();
    }

    let mut sink = MemorySink::new();
    aggregator
        .end_nodes()
        .unwrap()
        .end_ways()
        .finalize(&mut sink)
        .unwrap();

    let key = sink.find_key("ref").unwrap();
    assert_eq!(key.counts.nodes(), 50);
    assert_eq!(key.values_all, 50);
    assert_eq!(key.values.nodes(), 50);
    // All occurrences land in a single cell.
    assert_eq!(key.cells_nodes, 1);
    assert_eq!(sink.tags.iter().filter(|row| row.key == "ref").count(), 50);
}

#[test]
fn test_repeated_key_on_same_entity() {
    // Duplicate keys on one entity are counted as two occurrences and one
    // self-combination.
    let mut aggregator = Aggregator::new(config()).unwrap();
    aggregator
        .node(
            &Node::new(1, 1, Some(Point::new(0.0, 0.0)))
                .with_tags(vec![Tag::new("name", "a"), Tag::new("name", "b")]),
        )
        .unwrap();

    let mut sink = MemorySink::new();
    aggregator
        .end_nodes()
        .unwrap()
        .end_ways()
        .finalize(&mut sink)
        .unwrap();

    let key = sink.find_key("name").unwrap();
    assert_eq!(key.counts.nodes(), 2);
    assert_eq!(key.values_all, 2);
    let combo = sink.find_key_combination("name", "name").unwrap();
    assert_eq!(combo.counts.nodes(), 1);
}

#[test]
fn test_dense_mapped_backend_grows() {
    // Ids far beyond the initial mapped capacity force a remap.
    let mut aggregator = Aggregator::new(
        config().with_index_backend(IndexBackend::DenseMapped),
    )
    .unwrap();

    aggregator
        .node(&Node::new(1_000_000, 1, Some(Point::new(5.0, 5.0))))
        .unwrap();

    let mut ways = aggregator.end_nodes().unwrap();
    ways.way(&Way::new(1, 1, vec![1_000_000]).with_tags(vec![Tag::new("k", "v")]));

    let mut sink = MemorySink::new();
    ways.end_ways().finalize(&mut sink).unwrap();

    assert_eq!(sink.find_key("k").unwrap().cells_ways, 1);
}

#[test]
fn test_poles_and_date_line() {
    let mut aggregator = Aggregator::new(config()).unwrap();

    // Valid extremes of the default bounding box.
    aggregator
        .node(
            &Node::new(1, 1, Some(Point::new(-180.0, 90.0)))
                .with_tags(vec![Tag::new("a", "nw")]),
        )
        .unwrap();
    aggregator
        .node(
            &Node::new(2, 1, Some(Point::new(179.999, -89.999)))
                .with_tags(vec![Tag::new("a", "se")]),
        )
        .unwrap();
    // The exclusive corner itself carries no geography.
    aggregator
        .node(
            &Node::new(3, 1, Some(Point::new(180.0, -90.0)))
                .with_tags(vec![Tag::new("a", "out")]),
        )
        .unwrap();

    let mut sink = MemorySink::new();
    let summary = aggregator
        .end_nodes()
        .unwrap()
        .end_ways()
        .finalize(&mut sink)
        .unwrap();

    assert_eq!(summary.cells_all, 2);
    let key = sink.find_key("a").unwrap();
    assert_eq!(key.counts.nodes(), 3);
    assert_eq!(key.cells_nodes, 2);
}
