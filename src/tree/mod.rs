//! In-memory call tree of allocation sites.
//!
//! Nodes are stack frames weighted by the bytes and allocation events folded
//! into them. Every node carries a pre-order id that is assigned once per
//! dataset load and survives filtering, so it can address zoom state.

pub mod aggregate;
pub mod frames;

use serde::{Deserialize, Serialize};

pub type NodeId = u64;

/// Id of the whole-tree root (and of the "no zoom" state)
pub const ROOT_ID: NodeId = 0;

/// Thread id carried by the root and by every node in merged-threads mode
pub const MERGED_THREAD: &str = "0x0";

/// Thread selector value meaning "show all threads"
pub const ALL_THREADS: &str = "-0x1";

/// Name given to the frame where an overly deep stack was cut off
pub const STACK_TOO_DEEP: &str = "<STACK TOO DEEP>";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Location {
            file: file.into(),
            line,
        }
    }

    /// File extension, or the whole file name if it has none
    pub fn extension(&self) -> &str {
        match self.file.rfind('.') {
            Some(idx) if idx + 1 < self.file.len() => &self.file[idx + 1..],
            _ => &self.file,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "{}:{}", self.file, self.line)
        } else {
            write!(f, "{}", self.file)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTree {
    #[serde(default)]
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub n_allocations: u64,
    #[serde(default = "merged_thread")]
    pub thread_id: String,
    #[serde(default = "interesting_by_default")]
    pub interesting: bool,
    #[serde(default)]
    pub import_system: bool,
    #[serde(default)]
    pub children: Vec<CallTree>,
}

fn merged_thread() -> String {
    MERGED_THREAD.to_string()
}

fn interesting_by_default() -> bool {
    true
}

impl CallTree {
    pub fn new(name: impl Into<String>, location: Option<Location>) -> Self {
        CallTree {
            id: ROOT_ID,
            name: name.into(),
            location,
            value: 0,
            n_allocations: 0,
            thread_id: merged_thread(),
            interesting: true,
            import_system: false,
            children: Vec::new(),
        }
    }

    /// An empty synthetic root
    pub fn root() -> Self {
        CallTree::new("<root>", None)
    }

    /// Number the tree in pre-order starting at the root (0).
    /// Returns the number of nodes.
    pub fn assign_ids(&mut self) -> u64 {
        let mut next: NodeId = ROOT_ID;
        let mut stack: Vec<&mut CallTree> = vec![self];
        while let Some(node) = stack.pop() {
            node.id = next;
            next += 1;
            stack.extend(node.children.iter_mut().rev());
        }
        next
    }

    /// Pre-order traversal
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    pub fn find(&self, id: NodeId) -> Option<&CallTree> {
        self.iter().find(|node| node.id == id)
    }

    /// Chain of nodes from the root down to `id` (both inclusive)
    pub fn path_to(&self, id: NodeId) -> Option<Vec<&CallTree>> {
        fn walk<'a>(node: &'a CallTree, id: NodeId, path: &mut Vec<&'a CallTree>) -> bool {
            path.push(node);
            if node.id == id {
                return true;
            }
            for child in &node.children {
                if walk(child, id, path) {
                    return true;
                }
            }
            path.pop();
            false
        }

        let mut path = Vec::new();
        walk(self, id, &mut path).then_some(path)
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Sum of (value, n_allocations) over the direct children
    pub fn children_totals(&self) -> (u64, u64) {
        self.children.iter().fold((0, 0), |(value, count), child| {
            (value + child.value, count + child.n_allocations)
        })
    }
}

pub struct Iter<'a> {
    stack: Vec<&'a CallTree>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a CallTree;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A loaded call tree together with the threads that contributed to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(flatten)]
    pub root: CallTree,
    #[serde(default)]
    pub unique_threads: Vec<String>,
}

impl Dataset {
    /// Wrap a freshly loaded tree, numbering its nodes
    pub fn new(mut root: CallTree, unique_threads: Vec<String>) -> Self {
        root.assign_ids();
        Dataset {
            root,
            unique_threads,
        }
    }
}
