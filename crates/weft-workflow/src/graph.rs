use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::JobNode;
use crate::error::WorkflowError;

/// Graph structure for traversal and analysis.
///
/// Ordered maps keep every traversal deterministic for a given workflow.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: BTreeMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: BTreeMap<String, Vec<String>>,
  /// Nodes with no incoming edges.
  entry_points: Vec<String>,
  /// Nodes with multiple incoming edges (join points).
  join_points: BTreeSet<String>,
}

impl Graph {
  /// Build a graph from nodes and edges.
  pub fn new(nodes: &BTreeMap<String, JobNode>, edges: &[(String, String)]) -> Self {
    let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut reverse_adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for node_id in nodes.keys() {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    for list in adjacency.values_mut().chain(reverse_adjacency.values_mut()) {
      list.sort();
      list.dedup();
    }

    let entry_points: Vec<String> = nodes
      .keys()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let join_points: BTreeSet<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
      join_points,
    }
  }

  /// Get entry points (nodes with no incoming edges).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check if a node is a join point (has multiple incoming edges).
  pub fn is_join_point(&self, node_id: &str) -> bool {
    self.join_points.contains(node_id)
  }

  /// Get all join points.
  pub fn join_points(&self) -> &BTreeSet<String> {
    &self.join_points
  }

  /// All transitive predecessors of a node.
  pub fn ancestors(&self, node_id: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&str> = self.upstream(node_id).iter().map(String::as_str).collect();
    while let Some(id) = stack.pop() {
      if seen.insert(id.to_string()) {
        stack.extend(self.upstream(id).iter().map(String::as_str));
      }
    }
    seen
  }

  /// Topological order using Kahn's algorithm, smallest id first among
  /// ready nodes. Fails when the graph contains a cycle.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: BTreeMap<&str, usize> = self
      .reverse_adjacency
      .iter()
      .map(|(id, up)| (id.as_str(), up.len()))
      .collect();

    let mut ready: BTreeSet<&str> = in_degree
      .iter()
      .filter(|(_, d)| **d == 0)
      .map(|(id, _)| *id)
      .collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(id) = ready.pop_first() {
      order.push(id.to_string());
      for next in self.downstream(id) {
        if let Some(d) = in_degree.get_mut(next.as_str()) {
          *d -= 1;
          if *d == 0 {
            ready.insert(next.as_str());
          }
        }
      }
    }

    if order.len() != in_degree.len() {
      let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
      let remaining = in_degree
        .keys()
        .filter(|id| !placed.contains(*id))
        .map(|id| id.to_string())
        .collect();
      return Err(WorkflowError::CycleDetected(remaining));
    }

    Ok(order)
  }

  /// Breadth-first closure of `roots` over upstream edges, roots included.
  pub fn upstream_closure<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&str> = roots.into_iter().collect();
    while let Some(id) = queue.pop_front() {
      if seen.insert(id.to_string()) {
        queue.extend(self.upstream(id).iter().map(String::as_str));
      }
    }
    seen
  }
}
