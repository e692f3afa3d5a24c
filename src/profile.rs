use crate::frame::CallPath;
use crate::tree::{CallTree, NodeId, TreeNode};

/// One recorded `(call path, size)` observation, kept in recording order.
#[derive(Debug, Clone)]
pub struct RecordedSample {
  pub path: CallPath,
  pub size: u64,
}

/// Frozen result of one profiling session.
///
/// Materialized atomically when sampling stops; independent of any further
/// runtime activity.
#[derive(Debug, Clone)]
pub struct Profile {
  samples: Vec<RecordedSample>,
  tree: CallTree,
}

impl Profile {
  /// A profile with no samples and an empty tree, as produced by stopping a
  /// profiler that never recorded anything.
  #[must_use]
  pub fn empty() -> Self {
    Self {
      samples: Vec::new(),
      tree: CallTree::new(),
    }
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.samples.is_empty() && self.tree.is_empty()
  }

  #[must_use]
  pub(crate) fn new(tree: CallTree, samples: Vec<RecordedSample>) -> Self {
    Self { samples, tree }
  }

  #[must_use]
  pub fn node(&self, id: NodeId) -> &TreeNode {
    self.tree.node(id)
  }

  #[must_use]
  pub fn root(&self) -> NodeId {
    self.tree.root()
  }

  #[must_use]
  pub fn samples(&self) -> &[RecordedSample] {
    &self.samples
  }

  #[must_use]
  pub fn tree(&self) -> &CallTree {
    &self.tree
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Frame;

  #[test]
  fn empty_profile_has_no_children_and_no_samples() {
    let profile = Profile::empty();
    assert!(profile.is_empty());
    assert!(profile.node(profile.root()).children().is_empty());
  }

  #[test]
  fn profile_freezes_tree_and_samples() {
    let mut tree = CallTree::new();
    let path = vec![Frame::new("f", "s.js", 1)];
    tree.insert(&path, 24);

    let profile = Profile::new(
      tree,
      vec![RecordedSample {
        path,
        size: 24,
      }],
    );

    assert!(!profile.is_empty());
    assert_eq!(profile.samples().len(), 1);
    assert_eq!(profile.node(profile.root()).children().len(), 1);
  }
}
