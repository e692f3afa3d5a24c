use crate::frame::{Frame, UNKNOWN_SCRIPT};

/// One kind of object size observed at a call path.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AllocationRecord {
  pub count: u32,
  pub size: u64,
}

/// Index of a node inside its owning [`CallTree`] arena.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NodeId(usize);

impl NodeId {
  #[must_use]
  pub fn index(self) -> usize {
    self.0
  }
}

/// A single call-tree node. Owned by the arena; the parent link is a plain
/// index used for traversal bookkeeping, never for destruction ordering.
#[derive(Debug, Clone)]
pub struct TreeNode {
  allocations: Vec<AllocationRecord>,
  children: Vec<NodeId>,
  frame: Frame,
  parent: Option<NodeId>,
}

impl TreeNode {
  #[must_use]
  pub fn allocations(&self) -> &[AllocationRecord] {
    &self.allocations
  }

  /// Children in insertion order, unique by frame.
  #[must_use]
  pub fn children(&self) -> &[NodeId] {
    &self.children
  }

  #[must_use]
  pub fn frame(&self) -> &Frame {
    &self.frame
  }

  #[must_use]
  pub fn parent(&self) -> Option<NodeId> {
    self.parent
  }

  /// Direct allocation count at this node, descendants excluded.
  #[must_use]
  pub fn total_count(&self) -> u64 {
    self
      .allocations
      .iter()
      .map(|record| u64::from(record.count))
      .sum()
  }

  /// Direct allocated bytes at this node, descendants excluded.
  #[must_use]
  pub fn total_size(&self) -> u64 {
    self
      .allocations
      .iter()
      .map(|record| record.size.saturating_mul(u64::from(record.count)))
      .sum()
  }
}

/// Aggregation tree keyed by frame-identity path.
///
/// Nodes live in an arena owned by the tree; a node exists iff at least one
/// sample traversed its call path. No two siblings share a frame.
#[derive(Debug, Clone)]
pub struct CallTree {
  nodes: Vec<TreeNode>,
}

impl Default for CallTree {
  fn default() -> Self {
    Self::new()
  }
}

impl CallTree {
  const ROOT: NodeId = NodeId(0);

  fn child_by_frame(&self, parent: NodeId, frame: &Frame) -> Option<NodeId> {
    self.nodes[parent.0]
      .children
      .iter()
      .copied()
      .find(|child| &self.nodes[child.0].frame == frame)
  }

  fn child_or_insert(&mut self, parent: NodeId, frame: &Frame) -> NodeId {
    if let Some(existing) = self.child_by_frame(parent, frame) {
      return existing;
    }

    let id = NodeId(self.nodes.len());
    self.nodes.push(TreeNode {
      allocations: Vec::new(),
      children: Vec::new(),
      frame: frame.clone(),
      parent: Some(parent),
    });
    self.nodes[parent.0].children.push(id);
    id
  }

  /// Record one sample at `path`, creating intermediate nodes as needed.
  ///
  /// The terminal node either increments an existing record with a matching
  /// size or appends a fresh one with `count = 1`.
  pub fn insert(&mut self, path: &[Frame], size: u64) {
    let mut current = Self::ROOT;
    for frame in path {
      current = self.child_or_insert(current, frame);
    }

    let node = &mut self.nodes[current.0];
    match node.allocations.iter_mut().find(|record| record.size == size) {
      Some(record) => record.count = record.count.saturating_add(1),
      None => node.allocations.push(AllocationRecord { count: 1, size }),
    }
  }

  /// Whether no sample was ever recorded.
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.nodes.len() == 1 && self.nodes[0].allocations.is_empty()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[must_use]
  pub fn new() -> Self {
    Self {
      nodes: vec![TreeNode {
        allocations: Vec::new(),
        children: Vec::new(),
        frame: Frame::new("(root)", UNKNOWN_SCRIPT, 0),
        parent: None,
      }],
    }
  }

  #[must_use]
  pub fn node(&self, id: NodeId) -> &TreeNode {
    &self.nodes[id.0]
  }

  #[must_use]
  pub fn root(&self) -> NodeId {
    Self::ROOT
  }

  /// Rolled-up `(size, count)` totals for a node including all descendants.
  ///
  /// The per-node report never performs this aggregation; this is the
  /// additive "total under this function including callees" view.
  #[must_use]
  pub fn subtree_totals(&self, id: NodeId) -> (u64, u64) {
    let node = &self.nodes[id.0];
    let mut size = node.total_size();
    let mut count = node.total_count();

    for child in &node.children {
      let (child_size, child_count) = self.subtree_totals(*child);
      size = size.saturating_add(child_size);
      count = count.saturating_add(child_count);
    }

    (size, count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::SmallRng;
  use rand::{Rng, SeedableRng};

  fn frame(name: &str) -> Frame {
    Frame::new(name, "test.js", 1)
  }

  #[test]
  fn merges_records_with_matching_sizes() {
    let mut tree = CallTree::new();
    let path = vec![frame("a"), frame("b")];

    tree.insert(&path, 16);
    tree.insert(&path, 16);
    tree.insert(&path, 32);

    let a = tree.node(tree.root()).children()[0];
    let b = tree.node(a).children()[0];
    let records = tree.node(b).allocations();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0], AllocationRecord { count: 2, size: 16 });
    assert_eq!(records[1], AllocationRecord { count: 1, size: 32 });
  }

  #[test]
  fn intermediate_nodes_exist_without_records() {
    let mut tree = CallTree::new();
    tree.insert(&[frame("a"), frame("b"), frame("c")], 8);

    let a = tree.node(tree.root()).children()[0];
    assert!(tree.node(a).allocations().is_empty());
    assert_eq!(tree.node(a).total_count(), 0);
    assert_eq!(tree.node(a).children().len(), 1);
  }

  #[test]
  fn siblings_never_share_a_frame() {
    let names = ["a", "b", "c", "d"];
    let mut rng = SmallRng::seed_from_u64(99);
    let mut tree = CallTree::new();

    for _ in 0..500 {
      let depth = rng.random_range(1..=4);
      let path: Vec<Frame> = (0..depth)
        .map(|_| frame(names[rng.random_range(0..names.len())]))
        .collect();
      tree.insert(&path, rng.random_range(8..256));
    }

    for index in 0..tree.len() {
      let node = tree.node(NodeId(index));
      for (i, left) in node.children().iter().enumerate() {
        for right in &node.children()[i + 1..] {
          assert_ne!(tree.node(*left).frame(), tree.node(*right).frame());
        }
      }
    }
  }

  #[test]
  fn insertion_order_does_not_change_totals() {
    let samples = [
      (vec![frame("a"), frame("b")], 16),
      (vec![frame("a"), frame("c")], 8),
      (vec![frame("a"), frame("b")], 16),
      (vec![frame("d")], 64),
    ];

    let mut forward = CallTree::new();
    for (path, size) in &samples {
      forward.insert(path, *size);
    }

    let mut reversed = CallTree::new();
    for (path, size) in samples.iter().rev() {
      reversed.insert(path, *size);
    }

    let forward_totals = forward.subtree_totals(forward.root());
    let reversed_totals = reversed.subtree_totals(reversed.root());
    assert_eq!(forward_totals, reversed_totals);
    assert_eq!(forward.len(), reversed.len());
  }

  #[test]
  fn subtree_totals_roll_up_descendants() {
    let mut tree = CallTree::new();
    tree.insert(&[frame("a"), frame("b")], 16);
    tree.insert(&[frame("a"), frame("c")], 8);
    tree.insert(&[frame("a")], 4);

    let a = tree.node(tree.root()).children()[0];
    assert_eq!(tree.subtree_totals(a), (28, 3));
    assert_eq!(tree.node(a).total_size(), 4);
  }
}
