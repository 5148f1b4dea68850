//! The configuration graph.
//!
//! Nodes carry the desired configuration of one contract instance and
//! edges the desired configuration of one directed pathway. The graph
//! can only be mutated through `GraphBuilder`, which enforces:
//!
//! - one node per point and one edge per vector (last write wins)
//! - an edge needs a possible vector and a node at its `from` point
//! - removing a node removes the edges leaving it (not the ones arriving)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::point::{Point, Vector};

/// Desired configuration of one contract instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<N> {
    pub point: Point,
    pub config: N,
}

impl<N> Node<N> {
    pub fn new(point: Point, config: N) -> Self {
        Self { point, config }
    }
}

/// Desired configuration of one directed pathway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<E> {
    pub vector: Vector,
    pub config: E,
}

impl<E> Edge<E> {
    pub fn new(vector: Vector, config: E) -> Self {
        Self { vector, config }
    }
}

/// Errors raised by graph mutations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cannot add edge {vector}: cannot connect two points on the same chain")]
    ImpossibleVector { vector: Vector },

    #[error("Cannot add edge {vector}: {from} is not in the graph")]
    MissingFromNode { vector: Vector, from: Point },
}

/// Declarative graph source (as found in wire config files)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition<N, E> {
    #[serde(default = "Vec::new")]
    pub contracts: Vec<Node<N>>,

    #[serde(default = "Vec::new")]
    pub connections: Vec<Edge<E>>,
}

/// Read-only view of a configuration graph
#[derive(Debug, Clone)]
pub struct Graph<N, E> {
    nodes: HashMap<Point, Node<N>>,
    node_order: Vec<Point>,
    edges: HashMap<Vector, Edge<E>>,
    edge_order: Vec<Vector>,
}

impl<N, E> Default for Graph<N, E> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            node_order: Vec::new(),
            edges: HashMap::new(),
            edge_order: Vec::new(),
        }
    }
}

/// Two graphs are equal when they hold the same nodes and edges
impl<N: PartialEq, E: PartialEq> PartialEq for Graph<N, E> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl<N, E> Graph<N, E> {
    /// Build a graph from its declarative definition
    pub fn from_definition(definition: GraphDefinition<N, E>) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new();
        builder.add_nodes(definition.contracts);
        builder.add_edges(definition.connections)?;
        Ok(builder.build())
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node<N>> {
        self.node_order.iter().filter_map(|point| self.nodes.get(point))
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &Edge<E>> {
        self.edge_order.iter().filter_map(|vector| self.edges.get(vector))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn get_node_at(&self, point: &Point) -> Option<&Node<N>> {
        self.nodes.get(point)
    }

    pub fn get_edge_at(&self, vector: &Vector) -> Option<&Edge<E>> {
        self.edges.get(vector)
    }

    pub fn get_edges_from(&self, point: &Point) -> Vec<&Edge<E>> {
        self.edges().filter(|edge| &edge.vector.from == point).collect()
    }

    pub fn get_edges_to(&self, point: &Point) -> Vec<&Edge<E>> {
        self.edges().filter(|edge| &edge.vector.to == point).collect()
    }
}

/// The only way to mutate a `Graph`
#[derive(Debug, Clone)]
pub struct GraphBuilder<N, E> {
    graph: Graph<N, E>,
}

impl<N, E> Default for GraphBuilder<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> GraphBuilder<N, E> {
    pub fn new() -> Self {
        Self {
            graph: Graph::default(),
        }
    }

    /// Start from a copy of an existing graph
    pub fn from_graph(graph: &Graph<N, E>) -> Self
    where
        N: Clone,
        E: Clone,
    {
        Self {
            graph: graph.clone(),
        }
    }

    /// Upsert nodes by point
    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node<N>>) -> &mut Self {
        for node in nodes {
            let point = node.point.clone();
            if self.graph.nodes.insert(point.clone(), node).is_none() {
                self.graph.node_order.push(point);
            }
        }
        self
    }

    /// Upsert edges by vector.
    ///
    /// Every edge is validated before any is inserted, so a failing call
    /// leaves the graph untouched.
    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = Edge<E>>) -> Result<&mut Self, GraphError> {
        let edges: Vec<Edge<E>> = edges.into_iter().collect();
        for edge in &edges {
            self.assert_can_add_edge(edge)?;
        }

        for edge in edges {
            let vector = edge.vector.clone();
            if self.graph.edges.insert(vector.clone(), edge).is_none() {
                self.graph.edge_order.push(vector);
            }
        }
        Ok(self)
    }

    /// Remove a node and every edge leaving it
    pub fn remove_node_at(&mut self, point: &Point) -> &mut Self {
        let outgoing: Vec<Vector> = self
            .graph
            .get_edges_from(point)
            .into_iter()
            .map(|edge| edge.vector.clone())
            .collect();
        for vector in &outgoing {
            self.remove_edge_at(vector);
        }

        if self.graph.nodes.remove(point).is_some() {
            self.graph.node_order.retain(|p| p != point);
        }
        self
    }

    pub fn remove_edge_at(&mut self, vector: &Vector) -> &mut Self {
        if self.graph.edges.remove(vector).is_some() {
            self.graph.edge_order.retain(|v| v != vector);
        }
        self
    }

    pub fn get_node_at(&self, point: &Point) -> Option<&Node<N>> {
        self.graph.get_node_at(point)
    }

    pub fn get_edge_at(&self, vector: &Vector) -> Option<&Edge<E>> {
        self.graph.get_edge_at(vector)
    }

    pub fn get_edges_from(&self, point: &Point) -> Vec<&Edge<E>> {
        self.graph.get_edges_from(point)
    }

    pub fn get_edges_to(&self, point: &Point) -> Vec<&Edge<E>> {
        self.graph.get_edges_to(point)
    }

    /// Borrow the graph built so far
    pub fn graph(&self) -> &Graph<N, E> {
        &self.graph
    }

    pub fn build(self) -> Graph<N, E> {
        self.graph
    }

    fn assert_can_add_edge(&self, edge: &Edge<E>) -> Result<(), GraphError> {
        if !edge.vector.is_possible() {
            return Err(GraphError::ImpossibleVector {
                vector: edge.vector.clone(),
            });
        }
        if self.graph.get_node_at(&edge.vector.from).is_none() {
            return Err(GraphError::MissingFromNode {
                vector: edge.vector.clone(),
                from: edge.vector.from.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::point::{Address, Eid};

    fn point(eid: u32, address: &str) -> Point {
        Point::new(Eid(eid), Address::parse(address).unwrap())
    }

    #[test]
    fn test_nodes_keep_insertion_order() {
        let mut builder: GraphBuilder<u8, ()> = GraphBuilder::new();
        builder.add_nodes([
            Node::new(point(3, "0x3"), 3),
            Node::new(point(1, "0x1"), 1),
            Node::new(point(2, "0x2"), 2),
        ]);
        // Overwriting does not move the node
        builder.add_nodes([Node::new(point(3, "0x3"), 30)]);

        let configs: Vec<u8> = builder.graph().nodes().map(|n| n.config).collect();
        assert_eq!(configs, vec![30, 1, 2]);
    }

    #[test]
    fn test_from_definition() {
        let yaml = r#"
contracts:
  - point: { eid: 1, address: "0x1" }
    config: 10
  - point: { eid: 2, address: "0x2" }
    config: 20
connections:
  - vector:
      from: { eid: 1, address: "0x1" }
      to: { eid: 2, address: "0x2" }
    config: "one to two"
"#;
        let definition: GraphDefinition<u32, String> = serde_yaml::from_str(yaml).unwrap();
        let graph = Graph::from_definition(definition).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.get_edges_from(&point(1, "0x1"))[0].config,
            "one to two".to_string()
        );
    }

    #[test]
    fn test_from_definition_rejects_dangling_from() {
        let definition: GraphDefinition<(), ()> = GraphDefinition {
            contracts: vec![],
            connections: vec![Edge::new(Vector::new(point(1, "0x1"), point(2, "0x2")), ())],
        };
        assert!(matches!(
            Graph::from_definition(definition),
            Err(GraphError::MissingFromNode { .. })
        ));
    }
}
