//! Composable transforms over a call tree.
//!
//! Filters are keyed by kind and evaluated in a fixed priority order, so the
//! derived tree depends only on which filters are active and never on the
//! order they were toggled in.

use crate::tree::{ALL_THREADS, CallTree};
use std::collections::BTreeMap;

/// Evaluation priority is the declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKind {
    Thread,
    Uninteresting,
    ImportSystem,
}

impl FilterKind {
    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::Thread => "thread",
            FilterKind::Uninteresting => "uninteresting",
            FilterKind::ImportSystem => "import-system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Keep only the top-level subtrees of one thread
    Thread(String),
    /// Hide frames that are not interesting, hoisting their children
    Uninteresting,
    /// Hide frames of the import machinery, hoisting their children
    ImportSystem,
}

impl Filter {
    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Thread(_) => FilterKind::Thread,
            Filter::Uninteresting => FilterKind::Uninteresting,
            Filter::ImportSystem => FilterKind::ImportSystem,
        }
    }

    pub fn apply(&self, tree: CallTree) -> CallTree {
        match self {
            Filter::Thread(thread) => filter_thread(tree, thread),
            Filter::Uninteresting => prune(tree, &|node| node.interesting),
            Filter::ImportSystem => prune(tree, &|node| !node.import_system),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Thread(thread) => write!(f, "thread={thread}"),
            other => write!(f, "{}", other.kind().label()),
        }
    }
}

fn filter_thread(mut root: CallTree, thread: &str) -> CallTree {
    if thread == ALL_THREADS {
        return root;
    }
    root.children.retain(|child| child.thread_id == thread);
    let (value, n_allocations) = root.children_totals();
    root.value = value;
    root.n_allocations = n_allocations;
    root
}

/// Drop every non-root node failing `keep`, splicing its (pruned) children
/// into its place.
fn prune(mut root: CallTree, keep: &dyn Fn(&CallTree) -> bool) -> CallTree {
    root.children = prune_children(std::mem::take(&mut root.children), keep);
    root
}

fn prune_children(children: Vec<CallTree>, keep: &dyn Fn(&CallTree) -> bool) -> Vec<CallTree> {
    let mut out = Vec::with_capacity(children.len());
    for mut child in children {
        let grandchildren = prune_children(std::mem::take(&mut child.children), keep);
        if keep(&child) {
            child.children = grandchildren;
            out.push(child);
        } else {
            out.extend(grandchildren);
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    filters: BTreeMap<FilterKind, Filter>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, replacing any active filter of the same kind. A thread
    /// filter for [`ALL_THREADS`] clears thread filtering instead.
    pub fn register(&mut self, filter: Filter) {
        if let Filter::Thread(thread) = &filter
            && thread == ALL_THREADS
        {
            self.unregister(FilterKind::Thread);
            return;
        }
        log::debug!("Registering filter {filter}");
        self.filters.insert(filter.kind(), filter);
    }

    pub fn unregister(&mut self, kind: FilterKind) {
        if self.filters.remove(&kind).is_some() {
            log::debug!("Removed {} filter", kind.label());
        }
    }

    pub fn is_active(&self, kind: FilterKind) -> bool {
        self.filters.contains_key(&kind)
    }

    pub fn active(&self) -> impl Iterator<Item = &Filter> {
        self.filters.values()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Derive the displayed tree. `tree` itself is left untouched.
    pub fn apply(&self, tree: &CallTree) -> CallTree {
        self.filters
            .values()
            .fold(tree.clone(), |acc, filter| filter.apply(acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeId;
    use crate::tree::tests::two_thread_tree;
    use pretty_assertions::assert_eq;

    fn ids(tree: &CallTree) -> Vec<NodeId> {
        tree.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_apply_is_deterministic() {
        let tree = two_thread_tree();
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Filter::Uninteresting);
        pipeline.register(Filter::Thread("A".into()));

        let first = pipeline.apply(&tree);
        let second = pipeline.apply(&tree);
        assert_eq!(first, second);
        assert_eq!(tree, two_thread_tree());
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let mut tree = two_thread_tree();
        tree.children[0].children[1].interesting = false;

        let mut forward = FilterPipeline::new();
        forward.register(Filter::Thread("A".into()));
        forward.register(Filter::Uninteresting);

        let mut backward = FilterPipeline::new();
        backward.register(Filter::Uninteresting);
        backward.register(Filter::Thread("A".into()));

        assert_eq!(forward.apply(&tree), backward.apply(&tree));
    }

    #[test]
    fn test_thread_filter_recomputes_root() {
        let tree = two_thread_tree();
        let filtered = Filter::Thread("A".into()).apply(tree.clone());

        assert_eq!(filtered.value, 60);
        assert_eq!(filtered.n_allocations, 6);
        assert_eq!(ids(&filtered), vec![0, 1, 2, 3]);

        let nobody = Filter::Thread("Z".into()).apply(tree);
        assert!(nobody.children.is_empty());
        assert_eq!(nobody.value, 0);
    }

    #[test]
    fn test_all_threads_clears_thread_filter() {
        let tree = two_thread_tree();
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Filter::Thread("A".into()));
        assert_eq!(pipeline.apply(&tree).value, 60);

        pipeline.register(Filter::Thread(ALL_THREADS.into()));
        assert!(!pipeline.is_active(FilterKind::Thread));
        assert_eq!(pipeline.apply(&tree), tree);

        let unchanged = Filter::Thread(ALL_THREADS.into()).apply(tree.clone());
        assert_eq!(unchanged.value, 100);
        assert_eq!(unchanged.children.len(), 2);
    }

    #[test]
    fn test_toggle_symmetry() {
        let tree = two_thread_tree();
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Filter::Uninteresting);
        let before = pipeline.apply(&tree);

        pipeline.register(Filter::ImportSystem);
        pipeline.unregister(FilterKind::ImportSystem);
        assert_eq!(pipeline.apply(&tree), before);

        // Unregistering something inactive is harmless
        pipeline.unregister(FilterKind::Thread);
        assert_eq!(pipeline.apply(&tree), before);
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let tree = two_thread_tree();
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Filter::Thread("A".into()));
        pipeline.register(Filter::Thread("B".into()));

        assert_eq!(pipeline.active().count(), 1);
        assert_eq!(pipeline.apply(&tree).value, 40);
    }

    #[test]
    fn test_uninteresting_nodes_are_hoisted() {
        let mut tree = two_thread_tree();
        // Hide "a"; its children move up under the root in its place
        tree.children[0].interesting = false;

        let filtered = Filter::Uninteresting.apply(tree);
        let top: Vec<(NodeId, &str, u64)> = filtered
            .children
            .iter()
            .map(|n| (n.id, n.name.as_str(), n.value))
            .collect();
        assert_eq!(top, vec![(2, "a1", 40), (3, "a2", 20), (4, "b", 40)]);
        assert_eq!(filtered.value, 100);
    }

    #[test]
    fn test_import_system_filter() {
        let mut tree = two_thread_tree();
        tree.children[1].import_system = true;
        tree.children[1].children[0].import_system = true;

        let filtered = Filter::ImportSystem.apply(tree);
        assert_eq!(ids(&filtered), vec![0, 1, 2, 3]);
    }
}
