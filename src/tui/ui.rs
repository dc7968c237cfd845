use super::app::{App, Focus, Mode};
use super::flame::frame_color;
use crate::annotation::HIGH_WATER_MARK_LABEL;
use crate::range::{TimeRange, format_timestamp};
use crate::render::FlameGraph;
use crate::tree::{ALL_THREADS, CallTree};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Clear, Dataset, GraphType, List, ListItem, Paragraph},
};

const MARK_COLOR: Color = Color::Rgb(50, 171, 96);

pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),      // Header
            Constraint::Percentage(30), // Memory chart
            Constraint::Min(5),         // Flamegraph
            Constraint::Length(1),      // Selected frame details
            Constraint::Length(1),      // Footer / search prompt
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_memory_chart(frame, app, chunks[1]);
    render_flamegraph(frame, app, chunks[2]);
    render_details(frame, app, chunks[3]);
    if app.mode == Mode::Search {
        render_search(frame, app, chunks[4]);
    } else {
        render_footer(frame, app, chunks[4]);
    }

    if app.mode == Mode::ThreadPicker {
        render_thread_picker(frame, app);
    }
}

fn badge(text: String, bg: Color) -> Span<'static> {
    Span::styled(text, Style::default().bg(bg).fg(Color::Black))
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let viewer = app.viewer();
    let session = viewer.session();
    let root = session.tree();

    let range = viewer
        .current_range()
        .or_else(|| session.series().full_range())
        .map(|r| format!(" │ {}", format_range(r)))
        .unwrap_or_default();

    let mut spans = vec![
        Span::styled("memview", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(" VIEW ", Style::default().bg(Color::Blue).fg(Color::White)),
        Span::raw(format!(
            " {}{} │ {} in {} allocations ",
            session.label(),
            range,
            format_bytes(root.value),
            root.n_allocations
        )),
    ];

    if let Some(thread) = viewer.selected_thread() {
        spans.push(badge(format!(" thread {thread} "), Color::Magenta));
        spans.push(Span::raw(" "));
    }
    if !viewer.hide_uninteresting() {
        spans.push(badge(" ALL FRAMES ".into(), Color::Yellow));
        spans.push(Span::raw(" "));
    }
    if viewer.hide_import_system() {
        spans.push(badge(" NO IMPORTS ".into(), Color::Yellow));
        spans.push(Span::raw(" "));
    }
    if viewer.is_loading() {
        spans.push(badge(" LOADING ".into(), Color::Green));
        spans.push(Span::raw(" "));
    }
    if let Some(error) = viewer.last_error() {
        spans.push(Span::styled(
            format!("✗ {error}"),
            Style::default().fg(Color::Red),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_memory_chart(frame: &mut Frame, app: &mut App, area: Rect) {
    app.set_chart_area(area);

    let border_color = if app.focus == Focus::Chart {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let viewer = app.viewer();
    let series = viewer.session().series();
    let chart_state = viewer.chart();

    let mut title = String::from(" Memory ");
    if let Some(mark) = chart_state.mark() {
        title = format!(
            " Memory │ {}: {} ",
            HIGH_WATER_MARK_LABEL,
            format_bytes(mark.resident_bytes)
        );
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let Some(visible) = chart_state.visible() else {
        let msg = Paragraph::new(" No memory snapshots in this profile")
            .block(block)
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(msg, area);
        return;
    };

    let x_start = visible.start_ms as f64;
    let x_end = (visible.end_ms as f64).max(x_start + 1.0);

    let in_view = |points: Vec<(f64, f64)>| -> Vec<(f64, f64)> {
        points
            .into_iter()
            .filter(|(t, _)| *t >= x_start && *t <= x_end)
            .collect()
    };
    let resident = in_view(series.resident_points());
    let heap = in_view(series.heap_points());

    let y_max = resident
        .iter()
        .chain(heap.iter())
        .map(|(_, y)| *y)
        .fold(0.0f64, f64::max)
        .max(1.0)
        * 1.1;

    let mark_line: Vec<(f64, f64)> = chart_state
        .mark()
        .filter(|m| visible.contains(m.timestamp_ms))
        .map(|m| {
            let x = m.timestamp_ms as f64;
            vec![(x, 0.0), (x, y_max)]
        })
        .unwrap_or_default();

    let mut datasets = vec![
        Dataset::default()
            .name("resident")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Magenta))
            .data(&resident),
        Dataset::default()
            .name("heap")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&heap),
    ];
    if !mark_line.is_empty() {
        datasets.push(
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(MARK_COLOR))
                .data(&mark_line),
        );
    }

    let origin = chart_state.full().map(|r| r.start_ms).unwrap_or(visible.start_ms);
    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([x_start, x_end])
                .labels(generate_time_labels(
                    (x_start - origin as f64) / 1000.0,
                    (x_end - origin as f64) / 1000.0,
                )),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([0.0, y_max])
                .labels(vec![
                    Span::raw("0"),
                    Span::raw(format_bytes_short((y_max / 2.0) as u64)),
                    Span::raw(format_bytes_short(y_max as u64)),
                ]),
        );

    frame.render_widget(chart, area);
}

fn render_flamegraph(frame: &mut Frame, app: &mut App, area: Rect) {
    let border_color = if app.focus == Focus::Flame {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let flame = app.viewer().flame();
    let zoom_name = flame
        .find_by_id(flame.zoom())
        .map(|n| n.name.clone())
        .unwrap_or_default();
    let mut title = format!(" Flamegraph ({zoom_name}) ");
    if !flame.search_term().is_empty() {
        title.push_str(&format!("│ {} matches ", flame.hit_count()));
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    app.set_flame_area(inner);

    let flame = app.viewer().flame();
    let inverted = flame.inverted();
    let selected = flame.selected();
    let buf = frame.buffer_mut();

    for cell in flame.cells() {
        if cell.depth >= inner.height || cell.x >= inner.width {
            continue;
        }
        let Some(node) = flame.find_by_id(cell.id) else {
            continue;
        };
        let y = if inverted {
            inner.y + cell.depth
        } else {
            inner.bottom() - 1 - cell.depth
        };
        let x = inner.x + cell.x;
        let width = cell.width.min(inner.width - cell.x);

        let mut style = Style::default()
            .bg(frame_color(node, flame.is_hit(node.id)))
            .fg(Color::Black);
        if node.id == selected {
            style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
        }

        buf.set_style(Rect::new(x, y, width, 1), style);
        if width > 1 {
            buf.set_stringn(x, y, frame_label(node, width), width as usize, style);
        }
    }
}

fn frame_label(node: &CallTree, width: u16) -> String {
    let label = format!(" {}", node.name);
    if label.chars().count() <= width as usize {
        return label;
    }
    let keep = (width as usize).saturating_sub(1);
    let mut truncated: String = label.chars().take(keep).collect();
    truncated.push('…');
    truncated
}

fn render_details(frame: &mut Frame, app: &App, area: Rect) {
    let viewer = app.viewer();
    let Some(node) = viewer.flame().selected_node() else {
        frame.render_widget(Paragraph::new(""), area);
        return;
    };

    let location = node
        .location
        .as_ref()
        .map(|loc| loc.to_string())
        .unwrap_or_else(|| "-".to_string());
    let root_value = viewer.flame().tree().value.max(1);
    let pct = node.value as f64 * 100.0 / root_value as f64;

    let mut spans = vec![
        Span::styled(format!(" {} ", node.name), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {location} "), Style::default().fg(Color::DarkGray)),
        Span::raw(format!(
            " {} ({pct:.1}%) │ {} allocations",
            format_bytes(node.value),
            node.n_allocations
        )),
    ];
    if !viewer.session().merge_threads() {
        spans.push(Span::raw(format!(" │ thread {}", node.thread_id)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_search(frame: &mut Frame, app: &App, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" / ", Style::default().bg(Color::DarkGray)),
        Span::raw(format!(" {}", app.search_input())),
        Span::styled("█", Style::default().fg(Color::Gray)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().bg(Color::DarkGray));

    let mut spans = vec![
        key(" q "),
        Span::raw(" quit "),
        key(" Tab "),
        Span::raw(" focus "),
    ];

    if app.focus == Focus::Flame {
        spans.extend([
            key(" h/j/k/l "),
            Span::raw(" move "),
            key(" ⏎ "),
            Span::raw(" zoom "),
        ]);
    } else {
        spans.extend([
            key(" h/l "),
            Span::raw(" pan "),
            key(" +/- "),
            Span::raw(" zoom "),
            key(" 0 "),
            Span::raw(" all "),
        ]);
    }

    spans.extend([
        key(" r "),
        Span::raw(" reset "),
        key(" ⌫/] "),
        Span::raw(" back/fwd "),
        key(" i "),
        Span::raw(" invert "),
        key(" u "),
        Span::raw(" uninteresting "),
        key(" s "),
        Span::raw(" imports "),
        key(" / "),
        Span::raw(" search "),
    ]);
    if app.viewer().session().thread_choices().is_some() {
        spans.extend([key(" t "), Span::raw(" threads ")]);
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_thread_picker(frame: &mut Frame, app: &App) {
    let options = app.thread_options();
    let height = (options.len() as u16 + 2).min(frame.area().height);
    let area = centered_rect(30, height, frame.area());

    let items: Vec<ListItem> = options
        .iter()
        .enumerate()
        .map(|(i, thread)| {
            let label = if thread == ALL_THREADS {
                "All threads".to_string()
            } else {
                format!("Thread {thread}")
            };
            let style = if i == app.thread_cursor() {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            ListItem::new(label).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Thread ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(Clear, area);
    frame.render_widget(list, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn format_range(range: TimeRange) -> String {
    format!(
        "{} → {}",
        format_timestamp(range.start_ms),
        format_timestamp(range.end_ms)
    )
}

fn generate_time_labels(start: f64, end: f64) -> Vec<Span<'static>> {
    let mid = (start + end) / 2.0;

    vec![
        Span::raw(format_time(start.max(0.0))),
        Span::raw(format_time(mid.max(0.0))),
        Span::raw(format_time(end.max(0.0))),
    ]
}

/// Format seconds since the start of the capture
fn format_time(secs: f64) -> String {
    if secs >= 3600.0 {
        let h = (secs / 3600.0) as i64;
        let m = ((secs % 3600.0) / 60.0) as i64;
        format!("{h}h{m:02}m")
    } else if secs >= 60.0 {
        let m = (secs / 60.0) as i64;
        let s = (secs % 60.0) as i64;
        format!("{m}m{s:02}s")
    } else if secs >= 10.0 {
        format!("{}s", secs as i64)
    } else {
        format!("{secs:.1}s")
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b >= 1_099_511_627_776.0 {
        format!("{:.1}TB", b / 1_099_511_627_776.0)
    } else if b >= 1_073_741_824.0 {
        format!("{:.1}GB", b / 1_073_741_824.0)
    } else if b >= 1_048_576.0 {
        format!("{:.1}MB", b / 1_048_576.0)
    } else if b >= 1024.0 {
        format!("{:.1}KB", b / 1024.0)
    } else {
        format!("{bytes}B")
    }
}

fn format_bytes_short(bytes: u64) -> String {
    let b = bytes as f64;
    if b >= 1_073_741_824.0 {
        format!("{:.0}G", b / 1_073_741_824.0)
    } else if b >= 1_048_576.0 {
        format!("{:.0}M", b / 1_048_576.0)
    } else if b >= 1024.0 {
        format!("{:.0}K", b / 1024.0)
    } else {
        format!("{bytes}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.5KB");
        assert_eq!(format_bytes(5 * 1_048_576), "5.0MB");
        assert_eq!(format_bytes_short(3 * 1_073_741_824), "3G");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(2.5), "2.5s");
        assert_eq!(format_time(75.0), "1m15s");
        assert_eq!(format_time(3720.0), "1h02m");
    }

    #[test]
    fn test_frame_label_truncates() {
        let node = CallTree::new("load_everything", None);
        assert_eq!(frame_label(&node, 40), " load_everything");
        assert_eq!(frame_label(&node, 6), " load…");
    }
}
