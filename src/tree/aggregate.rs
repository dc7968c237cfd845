//! Folding allocation records into a call tree.

use super::frames::{self, StackFrame};
use super::{CallTree, Dataset, Location, MERGED_THREAD, STACK_TOO_DEEP};
use std::collections::{BTreeSet, HashMap};

/// Stacks deeper than this are cut off with a `<STACK TOO DEEP>` frame
pub const MAX_STACK_DEPTH: usize = 400;

/// One aggregated allocation site as stored in a profile
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRecord {
    pub timestamp_ms: i64,
    pub thread: String,
    pub size: u64,
    pub n_allocations: u64,
    /// Innermost frame first
    pub stack: Vec<StackFrame>,
}

type ChildKey = (StackFrame, String);

struct Slot {
    node: CallTree,
    children: Vec<usize>,
    index: HashMap<ChildKey, usize>,
}

impl Slot {
    fn new(node: CallTree) -> Self {
        Slot {
            node,
            children: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// Arena used while building, so children can be looked up by key
struct Builder {
    slots: Vec<Slot>,
}

impl Builder {
    fn child(&mut self, parent: usize, key: ChildKey, import_system: bool) -> usize {
        if let Some(&idx) = self.slots[parent].index.get(&key) {
            return idx;
        }

        let frame = &key.0;
        let mut node = CallTree::new(
            frame.function.clone(),
            Some(Location::new(frame.file.clone(), frame.line)),
        );
        node.interesting = frames::is_interesting(frame) && !frames::is_import_system(frame);
        node.import_system = import_system;

        let idx = self.slots.len();
        self.slots.push(Slot::new(node));
        self.slots[parent].children.push(idx);
        self.slots[parent].index.insert(key, idx);
        idx
    }

    fn finish(self) -> CallTree {
        let mut slots: Vec<Option<Slot>> = self.slots.into_iter().map(Some).collect();
        take(0, &mut slots)
    }
}

fn take(idx: usize, slots: &mut [Option<Slot>]) -> CallTree {
    let Some(slot) = slots[idx].take() else {
        return CallTree::root();
    };
    let mut node = slot.node;
    node.children = slot
        .children
        .iter()
        .map(|&child| take(child, slots))
        .collect();
    node
}

/// Build a dataset from allocation records.
///
/// Children are keyed by (frame, thread) so the same call path on two
/// threads yields two sibling subtrees. With `merge_threads` every record is
/// attributed to [`MERGED_THREAD`].
pub fn build_dataset<I>(records: I, merge_threads: bool) -> Dataset
where
    I: IntoIterator<Item = AllocationRecord>,
{
    let mut builder = Builder {
        slots: vec![Slot::new(CallTree::root())],
    };
    let mut unique_threads = BTreeSet::new();

    for record in records {
        let thread = if merge_threads {
            MERGED_THREAD.to_string()
        } else {
            record.thread
        };

        builder.slots[0].node.value += record.size;
        builder.slots[0].node.n_allocations += record.n_allocations;

        // Outermost frame first
        let stack: Vec<&StackFrame> = record.stack.iter().rev().collect();
        let mut current = 0;
        let mut skipped = 0;
        let mut import_system = false;

        for (index, frame) in stack.iter().enumerate() {
            if frames::is_interpreter_internal(frame) {
                skipped += 1;
                continue;
            }
            // The caller of the first import frame is the `import` statement
            // itself, so it is attributed to the import system too.
            let next_is_import = stack
                .get(index + 1)
                .is_some_and(|next| frames::is_import_system(next));
            if frames::is_import_system(frame) || next_is_import {
                import_system = true;
            }

            current = builder.child(
                current,
                ((*frame).clone(), thread.clone()),
                import_system,
            );
            let node = &mut builder.slots[current].node;
            node.value += record.size;
            node.n_allocations += record.n_allocations;
            node.thread_id = thread.clone();
            unique_threads.insert(thread.clone());

            if index - skipped > MAX_STACK_DEPTH {
                node.name = STACK_TOO_DEEP.to_string();
                node.location = None;
                break;
            }
        }
    }

    Dataset::new(builder.finish(), unique_threads.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(thread: &str, size: u64, stack: &[(&str, &str)]) -> AllocationRecord {
        AllocationRecord {
            timestamp_ms: 0,
            thread: thread.to_string(),
            size,
            n_allocations: 1,
            stack: stack
                .iter()
                .map(|(function, file)| StackFrame::new(*function, *file, 1))
                .collect(),
        }
    }

    #[test]
    fn test_totals_and_sharing() {
        let records = vec![
            record("0x1", 10, &[("leaf", "a.py"), ("main", "a.py")]),
            record("0x1", 5, &[("other", "a.py"), ("main", "a.py")]),
        ];
        let dataset = build_dataset(records, false);

        assert_eq!(dataset.root.value, 15);
        assert_eq!(dataset.root.n_allocations, 2);
        assert_eq!(dataset.root.children.len(), 1);

        let main = &dataset.root.children[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.value, 15);
        let names: Vec<&str> = main.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["leaf", "other"]);
        assert_eq!(dataset.unique_threads, vec!["0x1".to_string()]);
    }

    #[test]
    fn test_threads_split_top_level() {
        let records = vec![
            record("0x2", 40, &[("main", "a.py")]),
            record("0x1", 60, &[("main", "a.py")]),
        ];
        let dataset = build_dataset(records.clone(), false);
        assert_eq!(dataset.root.children.len(), 2);
        assert_eq!(dataset.unique_threads, vec!["0x1".to_string(), "0x2".to_string()]);

        let merged = build_dataset(records, true);
        assert_eq!(merged.root.children.len(), 1);
        assert_eq!(merged.root.children[0].value, 100);
        assert_eq!(merged.unique_threads, vec![MERGED_THREAD.to_string()]);
    }

    #[test]
    fn test_internal_frames_skipped() {
        let records = vec![record(
            "0x1",
            8,
            &[
                ("alloc_rows", "app.py"),
                ("_PyEval_EvalFrameDefault", "Python/ceval.c"),
                ("main", "app.py"),
            ],
        )];
        let dataset = build_dataset(records, false);
        let main = &dataset.root.children[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.children[0].name, "alloc_rows");
        assert_eq!(dataset.root.node_count(), 3);
    }

    #[test]
    fn test_import_flag_is_sticky() {
        let records = vec![record(
            "0x1",
            8,
            &[
                ("decode", "json/decoder.py"),
                ("_find_and_load", "<frozen importlib._bootstrap>"),
                ("<module>", "app.py"),
                ("main", "app.py"),
            ],
        )];
        let dataset = build_dataset(records, false);
        let main = &dataset.root.children[0];
        let module = &main.children[0];
        let loader = &module.children[0];
        let decode = &loader.children[0];

        assert!(!main.import_system);
        assert!(module.import_system);
        assert!(module.interesting);
        assert!(loader.import_system);
        assert!(!loader.interesting);
        assert!(decode.import_system);
    }

    #[test]
    fn test_deep_stack_truncated() {
        let stack: Vec<StackFrame> = (0..MAX_STACK_DEPTH + 10)
            .map(|i| StackFrame::new(format!("f{i}"), "deep.py", i as u32))
            .collect();
        let records = vec![AllocationRecord {
            timestamp_ms: 0,
            thread: "0x1".to_string(),
            size: 1,
            n_allocations: 1,
            stack,
        }];
        let dataset = build_dataset(records, false);

        let deepest = dataset.root.iter().last().unwrap();
        assert_eq!(deepest.name, STACK_TOO_DEEP);
        assert!(deepest.location.is_none());
        assert_eq!(dataset.root.node_count(), MAX_STACK_DEPTH + 3);
    }
}
