//! Graph Builder Integration Tests
//!
//! Tests for upserts, cascading removal, edge validation and structural
//! equality.

use omniwire::domain::{Address, Edge, Eid, Graph, GraphBuilder, GraphDefinition, GraphError, Node, Point, Vector};

type TestGraph = Graph<&'static str, u32>;

fn point(eid: u32, address: &str) -> Point {
    Point::new(Eid(eid), Address::parse(address).unwrap())
}

fn builder_with_nodes(points: &[Point]) -> GraphBuilder<&'static str, u32> {
    let mut builder = GraphBuilder::new();
    builder.add_nodes(points.iter().map(|p| Node::new(p.clone(), "node")));
    builder
}

#[test]
fn test_nodes_are_overwritten_by_point() {
    let a = point(1, "0xa");
    let mut builder: GraphBuilder<&'static str, u32> = GraphBuilder::new();
    builder
        .add_nodes([Node::new(a.clone(), "first")])
        .add_nodes([Node::new(point(1, "0x000a"), "second")]);

    let graph = builder.build();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.get_node_at(&a).unwrap().config, "second");
}

#[test]
fn test_edges_are_overwritten_by_vector() {
    let (a, b) = (point(1, "0xa"), point(2, "0xb"));
    let mut builder = builder_with_nodes(&[a.clone()]);

    builder.add_edges([Edge::new(Vector::new(a.clone(), b.clone()), 1)]).unwrap();
    builder.add_edges([Edge::new(Vector::new(a.clone(), b.clone()), 2)]).unwrap();

    assert_eq!(builder.graph().edge_count(), 1);
    assert_eq!(builder.get_edge_at(&Vector::new(a, b)).unwrap().config, 2);
}

#[test]
fn test_edge_to_unknown_point_is_allowed() {
    let (a, b) = (point(1, "0xa"), point(2, "0xb"));
    let mut builder = builder_with_nodes(&[a.clone()]);

    assert!(builder.add_edges([Edge::new(Vector::new(a.clone(), b.clone()), 1)]).is_ok());
    assert_eq!(builder.get_edges_to(&b).len(), 1);
}

#[test]
fn test_impossible_vector_is_rejected() {
    let (a, other) = (point(1, "0xa"), point(1, "0xb"));
    let mut builder = builder_with_nodes(&[a.clone(), other.clone()]);

    let error = builder
        .add_edges([Edge::new(Vector::new(a.clone(), other.clone()), 1)])
        .unwrap_err();
    assert!(matches!(error, GraphError::ImpossibleVector { .. }));
    assert_eq!(builder.graph().edge_count(), 0);
}

#[test]
fn test_failed_add_edges_leaves_graph_untouched() {
    let (a, b, c) = (point(1, "0xa"), point(2, "0xb"), point(3, "0xc"));
    let mut builder = builder_with_nodes(&[a.clone()]);

    let error = builder
        .add_edges([
            Edge::new(Vector::new(a.clone(), b.clone()), 1),
            Edge::new(Vector::new(c.clone(), b.clone()), 2),
        ])
        .unwrap_err();

    assert_eq!(
        error,
        GraphError::MissingFromNode {
            vector: Vector::new(c.clone(), b.clone()),
            from: c,
        }
    );
    // The valid edge of the same call was not inserted either
    assert!(builder.get_edge_at(&Vector::new(a, b)).is_none());
}

#[test]
fn test_removing_node_cascades_outgoing_edges_only() {
    let (a, b, c) = (point(1, "0xa"), point(2, "0xb"), point(3, "0xc"));
    let mut builder = builder_with_nodes(&[a.clone(), b.clone(), c.clone()]);
    builder
        .add_edges([
            Edge::new(Vector::new(a.clone(), b.clone()), 1),
            Edge::new(Vector::new(a.clone(), c.clone()), 2),
            Edge::new(Vector::new(b.clone(), a.clone()), 3),
        ])
        .unwrap();

    builder.remove_node_at(&a);

    assert!(builder.get_node_at(&a).is_none());
    assert!(builder.get_edges_from(&a).is_empty());

    // The edge arriving at the removed node stays
    let incoming = builder.get_edges_to(&a);
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].config, 3);
}

#[test]
fn test_remove_missing_items_is_a_no_op() {
    let a = point(1, "0xa");
    let mut builder = builder_with_nodes(&[a.clone()]);
    let before = builder.graph().clone();

    builder
        .remove_node_at(&point(9, "0x9"))
        .remove_edge_at(&Vector::new(a.clone(), point(2, "0xb")));

    assert_eq!(*builder.graph(), before);
}

#[test]
fn test_lookups_never_fail() {
    let graph: TestGraph = GraphBuilder::new().build();
    let a = point(1, "0xa");

    assert!(graph.is_empty());
    assert!(graph.get_node_at(&a).is_none());
    assert!(graph.get_edge_at(&Vector::new(a.clone(), point(2, "0xb"))).is_none());
    assert!(graph.get_edges_from(&a).is_empty());
}

#[test]
fn test_edges_from_keep_insertion_order() {
    let (a, b, c, d) = (point(1, "0xa"), point(2, "0xb"), point(3, "0xc"), point(4, "0xd"));
    let mut builder = builder_with_nodes(&[a.clone()]);
    builder
        .add_edges([
            Edge::new(Vector::new(a.clone(), d.clone()), 4),
            Edge::new(Vector::new(a.clone(), b.clone()), 2),
            Edge::new(Vector::new(a.clone(), c.clone()), 3),
        ])
        .unwrap();

    let configs: Vec<u32> = builder.get_edges_from(&a).iter().map(|e| e.config).collect();
    assert_eq!(configs, vec![4, 2, 3]);
}

#[test]
fn test_structural_equality() {
    let (a, b) = (point(1, "0xa"), point(2, "0xb"));

    let mut first = builder_with_nodes(&[a.clone(), b.clone()]);
    first.add_edges([Edge::new(Vector::new(a.clone(), b.clone()), 1)]).unwrap();
    let first = first.build();

    // Same content inserted in a different order
    let mut second = builder_with_nodes(&[b.clone(), a.clone()]);
    second.add_edges([Edge::new(Vector::new(a.clone(), b.clone()), 1)]).unwrap();
    let second = second.build();
    assert_eq!(first, second);

    // A builder started from a graph can diverge without touching it
    let mut copy = GraphBuilder::from_graph(&first);
    copy.add_edges([Edge::new(Vector::new(a.clone(), b.clone()), 7)]).unwrap();
    assert_ne!(copy.build(), first);
    assert_eq!(first.get_edge_at(&Vector::new(a, b)).unwrap().config, 1);
}

#[test]
fn test_graph_definition_yaml() {
    let yaml = r#"
contracts:
  - point: { eid: 1, address: "0xa" }
    config: 10
connections:
  - vector:
      from: { eid: 1, address: "0xa" }
      to: { eid: 2, address: "0xb" }
    config: 20
"#;
    let definition: GraphDefinition<u32, u32> = serde_yaml::from_str(yaml).unwrap();
    let graph = Graph::from_definition(definition).unwrap();

    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edges().next().unwrap().config, 20);
}
