//! Terminal flamegraph widget state.

use crate::render::FlameGraph;
use crate::tree::{CallTree, NodeId, ROOT_ID};
use ratatui::style::Color;
use std::collections::HashSet;

/// One drawn frame: a node placed on a row at a horizontal span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlameCell {
    pub id: NodeId,
    pub depth: u16,
    pub x: u16,
    pub width: u16,
}

/// Direction for keyboard navigation between frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Left,
    Right,
    Parent,
    Child,
}

/// Lay out the tree zoomed to `zoom` across `width` columns.
///
/// Ancestors of the zoomed node and the node itself span the full width.
/// Descendants get columns in proportion to their value. Frames narrower
/// than `min_width` are dropped along with their subtrees.
pub fn compute_layout(root: &CallTree, zoom: NodeId, width: u16, min_width: u16) -> Vec<FlameCell> {
    let mut cells = Vec::new();
    if width == 0 {
        return cells;
    }
    let path = root.path_to(zoom).unwrap_or_else(|| vec![root]);
    let Some(&focus) = path.last() else {
        return cells;
    };

    for (depth, node) in path.iter().enumerate() {
        cells.push(FlameCell {
            id: node.id,
            depth: depth as u16,
            x: 0,
            width,
        });
    }
    layout_children(focus, path.len() as u16, 0, width, min_width.max(1), &mut cells);
    cells
}

fn layout_children(
    parent: &CallTree,
    depth: u16,
    x: u16,
    width: u16,
    min_width: u16,
    cells: &mut Vec<FlameCell>,
) {
    if parent.value == 0 {
        return;
    }
    let scale = width as f64 / parent.value as f64;
    let mut consumed = 0u64;
    for child in &parent.children {
        let start = (consumed as f64 * scale).round() as u16;
        consumed += child.value;
        let end = ((consumed as f64 * scale).round() as u16).min(width);
        let child_width = end.saturating_sub(start);
        if child_width < min_width {
            continue;
        }
        cells.push(FlameCell {
            id: child.id,
            depth,
            x: x + start,
            width: child_width,
        });
        layout_children(child, depth + 1, x + start, child_width, min_width, cells);
    }
}

/// Fill color of a frame
pub fn frame_color(node: &CallTree, highlighted: bool) -> Color {
    if highlighted {
        return Color::Rgb(0xff, 0xa5, 0x00);
    }
    let Some(location) = node.location.as_ref().filter(|_| !node.name.is_empty()) else {
        return Color::Rgb(0xee, 0xee, 0xee);
    };
    match location.extension() {
        "py" => Color::Rgb(0xcc, 0xeb, 0xc5),
        "c" | "cpp" | "h" => Color::Rgb(0xff, 0xff, 0xcc),
        _ => Color::Rgb(0xf2, 0xf2, 0xf2),
    }
}

pub struct FlameView {
    tree: CallTree,
    zoom: NodeId,
    inverted: bool,
    width: u16,
    min_frame_width: u16,
    cells: Vec<FlameCell>,
    selected: NodeId,
    search_term: String,
    hits: HashSet<NodeId>,
}

impl FlameView {
    pub fn new(width: u16, min_frame_width: u16, inverted: bool) -> Self {
        FlameView {
            tree: CallTree::root(),
            zoom: ROOT_ID,
            inverted,
            width,
            min_frame_width,
            cells: Vec::new(),
            selected: ROOT_ID,
            search_term: String::new(),
            hits: HashSet::new(),
        }
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    pub fn zoom(&self) -> NodeId {
        self.zoom
    }

    pub fn cells(&self) -> &[FlameCell] {
        &self.cells
    }

    pub fn selected(&self) -> NodeId {
        self.selected
    }

    pub fn selected_node(&self) -> Option<&CallTree> {
        self.tree.find(self.selected)
    }

    pub fn select(&mut self, id: NodeId) {
        if self.cells.iter().any(|c| c.id == id) {
            self.selected = id;
        }
    }

    pub fn is_hit(&self, id: NodeId) -> bool {
        self.hits.contains(&id)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn depth(&self) -> u16 {
        self.cells.iter().map(|c| c.depth + 1).max().unwrap_or(0)
    }

    /// Frame covering column `x` on row `depth`
    pub fn cell_at(&self, x: u16, depth: u16) -> Option<&FlameCell> {
        self.cells
            .iter()
            .find(|c| c.depth == depth && x >= c.x && x < c.x + c.width)
    }

    fn cell(&self, id: NodeId) -> Option<&FlameCell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Move the selection to a neighbouring frame
    pub fn step(&mut self, step: Step) {
        let Some(current) = self.cell(self.selected).copied() else {
            self.selected = self.zoom;
            return;
        };
        let target = match step {
            Step::Left => self
                .cells
                .iter()
                .filter(|c| c.depth == current.depth && c.x + c.width <= current.x)
                .max_by_key(|c| c.x),
            Step::Right => self
                .cells
                .iter()
                .filter(|c| c.depth == current.depth && c.x >= current.x + current.width)
                .min_by_key(|c| c.x),
            Step::Parent => current.depth.checked_sub(1).and_then(|depth| {
                self.cells
                    .iter()
                    .find(|c| c.depth == depth && c.x <= current.x && current.x < c.x + c.width)
            }),
            Step::Child => self
                .cells
                .iter()
                .filter(|c| {
                    c.depth == current.depth + 1
                        && c.x >= current.x
                        && c.x < current.x + current.width
                })
                .min_by_key(|c| c.x),
        };
        if let Some(cell) = target {
            self.selected = cell.id;
        }
    }

    fn recompute_hits(&mut self) {
        self.hits.clear();
        if self.search_term.is_empty() {
            return;
        }
        let term = self.search_term.as_str();
        self.hits = self
            .tree
            .iter()
            .filter(|node| {
                node.name.contains(term)
                    || node
                        .location
                        .as_ref()
                        .is_some_and(|loc| loc.file.contains(term))
            })
            .map(|node| node.id)
            .collect();
    }
}

impl FlameGraph for FlameView {
    fn render(&mut self, tree: CallTree) {
        self.tree = tree;
        if self.tree.find(self.zoom).is_none() {
            log::debug!("Zoomed frame #{} is gone, showing the whole tree", self.zoom);
            self.zoom = ROOT_ID;
        }
        if self.tree.find(self.selected).is_none() {
            self.selected = self.zoom;
        }
        self.recompute_hits();
    }

    fn refresh(&mut self) {
        self.cells = compute_layout(&self.tree, self.zoom, self.width, self.min_frame_width);
        if self.cell(self.selected).is_none() {
            self.selected = self.zoom;
        }
    }

    fn find_by_id(&self, id: NodeId) -> Option<&CallTree> {
        self.tree.find(id)
    }

    fn zoom_to(&mut self, id: NodeId) {
        self.zoom = id;
        self.selected = id;
        self.refresh();
    }

    fn reset_zoom(&mut self) {
        self.zoom = ROOT_ID;
        self.refresh();
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
        self.search_term = term.to_string();
        self.recompute_hits();
    }
}
