//! Zoom state and its history.
//!
//! The zoomed node is addressed by its id, mirrored into a `#<id>` fragment
//! so back/forward navigation can restore it.

use crate::render::FlameGraph;
use crate::tree::{NodeId, ROOT_ID};

/// Navigable history holding one zoom id per entry
pub trait History {
    fn push_state(&mut self, id: NodeId, title: &str);

    /// Fragment of the current entry, including the leading `#`
    fn fragment(&self) -> Option<String>;
}

/// Zoom id encoded in a fragment. Anything unparsable means the root.
pub fn parse_fragment(fragment: Option<&str>) -> NodeId {
    fragment
        .map(|f| f.trim_start_matches('#'))
        .and_then(|f| f.parse::<NodeId>().ok())
        .unwrap_or(ROOT_ID)
}

pub fn format_fragment(id: NodeId) -> String {
    format!("#{id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    fragment: Option<String>,
    title: String,
}

/// In-memory back/forward stack
#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: Vec<Entry>,
    cursor: usize,
}

impl HistoryStack {
    pub fn new(initial_fragment: Option<String>) -> Self {
        HistoryStack {
            entries: vec![Entry {
                fragment: initial_fragment,
                title: String::new(),
            }],
            cursor: 0,
        }
    }

    /// Step back one entry. Returns whether the current entry changed.
    pub fn back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn forward(&mut self) -> bool {
        if self.cursor + 1 >= self.entries.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn title(&self) -> &str {
        &self.entries[self.cursor].title
    }
}

impl Default for HistoryStack {
    fn default() -> Self {
        HistoryStack::new(None)
    }
}

impl History for HistoryStack {
    fn push_state(&mut self, id: NodeId, title: &str) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(Entry {
            fragment: Some(format_fragment(id)),
            title: title.to_string(),
        });
        self.cursor = self.entries.len() - 1;
    }

    fn fragment(&self) -> Option<String> {
        self.entries[self.cursor].fragment.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NavigationController {
    current: NodeId,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_id(&self) -> NodeId {
        self.current
    }

    pub fn reset_enabled(&self) -> bool {
        self.current != ROOT_ID
    }

    /// Zoom to a node picked by the user
    pub fn click<F, H>(&mut self, id: NodeId, name: &str, widget: &mut F, history: &mut H)
    where
        F: FlameGraph + ?Sized,
        H: History + ?Sized,
    {
        if id == self.current {
            return;
        }
        log::debug!("Zooming to #{id} ({name})");
        self.current = id;
        history.push_state(id, name);
        widget.zoom_to(id);
    }

    /// Re-apply the zoom named by the history's current fragment. Ids that
    /// are not in the rendered tree leave everything unchanged.
    pub fn restore<F, H>(&mut self, widget: &mut F, history: &H)
    where
        F: FlameGraph + ?Sized,
        H: History + ?Sized,
    {
        let id = parse_fragment(history.fragment().as_deref());
        if widget.find_by_id(id).is_none() {
            log::debug!("Zoom target #{id} not in the current tree");
            return;
        }
        self.current = id;
        if id == ROOT_ID {
            widget.reset_zoom();
        } else {
            widget.zoom_to(id);
        }
    }

    /// Follow the widget back to the root after a render dropped the
    /// zoomed node
    pub fn sync<F>(&mut self, widget: &F)
    where
        F: FlameGraph + ?Sized,
    {
        if widget.find_by_id(self.current).is_none() {
            log::debug!("Zoomed frame #{} left the tree", self.current);
            self.current = ROOT_ID;
        }
    }

    pub fn reset<F, H>(&mut self, widget: &mut F, history: &mut H)
    where
        F: FlameGraph + ?Sized,
        H: History + ?Sized,
    {
        if self.current == ROOT_ID {
            return;
        }
        self.current = ROOT_ID;
        history.push_state(ROOT_ID, "");
        widget.reset_zoom();
    }

    pub fn invert<F, H>(&mut self, widget: &mut F, history: &mut H)
    where
        F: FlameGraph + ?Sized,
        H: History + ?Sized,
    {
        let inverted = !widget.inverted();
        widget.set_inverted(inverted);
        widget.refresh();
        self.reset(widget, history);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tree::CallTree;
    use crate::tree::tests::two_thread_tree;
    use pretty_assertions::assert_eq;

    /// Flame widget that records the calls it receives
    #[derive(Default)]
    pub(crate) struct FakeFlame {
        pub tree: Option<CallTree>,
        pub zoom: NodeId,
        pub inverted: bool,
        pub renders: usize,
        pub refreshes: usize,
        pub width: u16,
        pub search: String,
    }

    impl FlameGraph for FakeFlame {
        fn render(&mut self, tree: CallTree) {
            if tree.find(self.zoom).is_none() {
                self.zoom = ROOT_ID;
            }
            self.tree = Some(tree);
            self.renders += 1;
        }

        fn refresh(&mut self) {
            self.refreshes += 1;
        }

        fn find_by_id(&self, id: NodeId) -> Option<&CallTree> {
            self.tree.as_ref()?.find(id)
        }

        fn zoom_to(&mut self, id: NodeId) {
            self.zoom = id;
        }

        fn reset_zoom(&mut self) {
            self.zoom = ROOT_ID;
        }

        fn inverted(&self) -> bool {
            self.inverted
        }

        fn set_inverted(&mut self, inverted: bool) {
            self.inverted = inverted;
        }

        fn set_width(&mut self, width: u16) {
            self.width = width;
        }

        fn search(&mut self, term: &str) {
            self.search = term.to_string();
        }
    }

    fn rendered() -> FakeFlame {
        let mut flame = FakeFlame::default();
        flame.render(two_thread_tree());
        flame
    }

    #[test]
    fn test_parse_fragment() {
        assert_eq!(parse_fragment(Some("#12")), 12);
        assert_eq!(parse_fragment(Some("7")), 7);
        assert_eq!(parse_fragment(Some("#")), 0);
        assert_eq!(parse_fragment(Some("#-3")), 0);
        assert_eq!(parse_fragment(Some("#abc")), 0);
        assert_eq!(parse_fragment(None), 0);
    }

    #[test]
    fn test_click_pushes_once() {
        let mut flame = rendered();
        let mut history = HistoryStack::default();
        let mut nav = NavigationController::new();

        nav.click(3, "a2", &mut flame, &mut history);
        nav.click(3, "a2", &mut flame, &mut history);

        assert_eq!(history.len(), 2);
        assert_eq!(history.fragment().as_deref(), Some("#3"));
        assert_eq!(history.title(), "a2");
        assert_eq!(flame.zoom, 3);
        assert!(nav.reset_enabled());
    }

    #[test]
    fn test_zoom_round_trip() {
        let mut flame = rendered();
        let mut history = HistoryStack::default();
        let mut nav = NavigationController::new();

        nav.click(1, "a", &mut flame, &mut history);
        nav.click(5, "b1", &mut flame, &mut history);

        assert!(history.back());
        nav.restore(&mut flame, &history);
        assert_eq!(nav.current_id(), 1);
        assert_eq!(flame.zoom, 1);

        assert!(history.back());
        nav.restore(&mut flame, &history);
        assert_eq!(nav.current_id(), 0);
        assert_eq!(flame.zoom, 0);
        assert!(!nav.reset_enabled());

        assert!(history.forward());
        nav.restore(&mut flame, &history);
        assert_eq!(nav.current_id(), 1);
    }

    #[test]
    fn test_restore_unknown_id_is_noop() {
        let mut flame = rendered();
        let history = HistoryStack::new(Some("#99".into()));
        let mut nav = NavigationController::new();

        nav.restore(&mut flame, &history);
        assert_eq!(nav.current_id(), 0);
        assert_eq!(flame.zoom, 0);
    }

    #[test]
    fn test_push_truncates_forward() {
        let mut flame = rendered();
        let mut history = HistoryStack::default();
        let mut nav = NavigationController::new();

        nav.click(1, "a", &mut flame, &mut history);
        nav.click(2, "a1", &mut flame, &mut history);
        history.back();
        nav.restore(&mut flame, &history);
        nav.click(4, "b", &mut flame, &mut history);

        assert_eq!(history.len(), 3);
        assert!(!history.forward());
    }

    #[test]
    fn test_sync_follows_widget_fallback() {
        let mut flame = rendered();
        let mut history = HistoryStack::default();
        let mut nav = NavigationController::new();

        nav.click(5, "b1", &mut flame, &mut history);
        nav.sync(&flame);
        assert_eq!(nav.current_id(), 5);

        let mut only_a = two_thread_tree();
        only_a.children.truncate(1);
        flame.render(only_a);
        nav.sync(&flame);
        assert_eq!(nav.current_id(), 0);
        assert!(!nav.reset_enabled());

        flame.render(two_thread_tree());
        nav.click(5, "b1", &mut flame, &mut history);
        assert_eq!(flame.zoom, 5);
    }

    #[test]
    fn test_invert_resets_zoom() {
        let mut flame = rendered();
        let mut history = HistoryStack::default();
        let mut nav = NavigationController::new();

        nav.click(2, "a1", &mut flame, &mut history);
        nav.invert(&mut flame, &mut history);

        assert!(flame.inverted);
        assert_eq!(flame.zoom, 0);
        assert_eq!(nav.current_id(), 0);
        assert_eq!(history.fragment().as_deref(), Some("#0"));
    }
}
