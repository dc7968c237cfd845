use super::ViewerConfig;
use super::chart::SeriesChart;
use super::flame::{FlameView, Step};
use super::ui;
use crate::error::Result;
use crate::navigation::HistoryStack;
use crate::range::Debouncer;
use crate::remote::{Reaggregate, RefreshWorker};
use crate::render::FlameGraph;
use crate::session::{Session, Viewer};
use crate::tree::ALL_THREADS;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, prelude::*};
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on how long the loop sleeps waiting for input
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

/// Focus state for keyboard navigation
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Focus {
    Flame,
    Chart,
}

/// Input mode
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Normal,
    Search,
    ThreadPicker,
}

pub type TerminalViewer = Viewer<FlameView, SeriesChart, HistoryStack>;

/// TUI application state
pub struct App {
    viewer: TerminalViewer,
    worker: RefreshWorker,
    resize: Debouncer<u16>,
    running: bool,
    needs_redraw: bool,

    pub focus: Focus,
    pub mode: Mode,
    search_input: String,
    thread_cursor: usize,

    flame_area: Rect,
    chart_area: Rect,
}

impl App {
    pub fn new(session: Session, source: Arc<dyn Reaggregate>, config: ViewerConfig) -> Result<Self> {
        let (columns, _) = crossterm::terminal::size().unwrap_or((80, 24));
        let flame = FlameView::new(
            flame_width(columns),
            config.min_frame_width,
            config.inverted,
        );
        let chart = SeriesChart::new(session.series().full_range());
        let history = HistoryStack::new(config.initial_fragment.clone());

        let mut viewer = Viewer::new(session, flame, chart, history, config.debounce);
        viewer.start();

        Ok(App {
            viewer,
            worker: RefreshWorker::new(source),
            resize: Debouncer::new(config.resize_debounce),
            running: true,
            needs_redraw: true,
            focus: Focus::Flame,
            mode: Mode::Normal,
            search_input: String::new(),
            thread_cursor: 0,
            flame_area: Rect::default(),
            chart_area: Rect::default(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.main_loop(&mut terminal);

        // Restore terminal
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
        terminal.show_cursor()?;

        result
    }

    fn main_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        while self.running {
            if self.needs_redraw {
                terminal.draw(|frame| ui::render(frame, self))?;
                self.needs_redraw = false;
            }

            if event::poll(self.poll_timeout(Instant::now()))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        self.handle_key(key.code);
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(columns, _) => {
                        self.resize.push(flame_width(columns), Instant::now());
                    }
                    _ => {}
                }
                self.needs_redraw = true;
            }

            self.tick(Instant::now())?;
        }
        Ok(())
    }

    /// Sleep no longer than the nearest pending deadline
    fn poll_timeout(&self, now: Instant) -> Duration {
        [self.viewer.next_deadline(), self.resize.deadline()]
            .into_iter()
            .flatten()
            .map(|deadline| deadline.saturating_duration_since(now))
            .fold(FRAME_INTERVAL, Duration::min)
    }

    /// Move chart events, debounced requests and worker responses along
    fn tick(&mut self, now: Instant) -> Result<()> {
        for event in self.viewer.chart_mut().drain_events() {
            self.viewer.on_relayout(&event, now);
        }

        if let Some(request) = self.viewer.poll_refresh(now) {
            if let Err(e) = self.worker.dispatch(request) {
                self.viewer.on_dispatch_failed(request, e);
            }
            self.needs_redraw = true;
        }

        while let Some(response) = self.worker.try_recv() {
            self.viewer.on_refresh_response(response);
            self.needs_redraw = true;
        }

        if let Some(width) = self.resize.poll(now) {
            self.viewer.on_resize(width);
            self.needs_redraw = true;
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyCode) {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Search => self.handle_search_key(key),
            Mode::ThreadPicker => self.handle_picker_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Flame => Focus::Chart,
                    Focus::Chart => Focus::Flame,
                };
            }
            KeyCode::Char('i') => self.viewer.on_invert(),
            KeyCode::Char('r') | KeyCode::Esc => self.viewer.on_reset_zoom(),
            KeyCode::Char('u') => {
                let hide = !self.viewer.hide_uninteresting();
                self.viewer.set_hide_uninteresting(hide);
            }
            KeyCode::Char('s') => {
                let hide = !self.viewer.hide_import_system();
                self.viewer.set_hide_import_system(hide);
            }
            KeyCode::Char('t') => {
                if self.viewer.session().thread_choices().is_some() {
                    self.thread_cursor = 0;
                    self.mode = Mode::ThreadPicker;
                }
            }
            KeyCode::Char('/') => {
                self.search_input = self.viewer.flame().search_term().to_string();
                self.mode = Mode::Search;
            }
            KeyCode::Backspace => {
                if self.viewer.history_mut().back() {
                    self.viewer.on_pop_state();
                }
            }
            KeyCode::Char(']') => {
                if self.viewer.history_mut().forward() {
                    self.viewer.on_pop_state();
                }
            }
            KeyCode::Enter => {
                let id = self.viewer.flame().selected();
                self.viewer.on_node_click(id);
            }

            // Flamegraph navigation
            KeyCode::Char('h') | KeyCode::Left if self.focus == Focus::Flame => {
                self.viewer.flame_mut().step(Step::Left);
            }
            KeyCode::Char('l') | KeyCode::Right if self.focus == Focus::Flame => {
                self.viewer.flame_mut().step(Step::Right);
            }
            KeyCode::Char('k') | KeyCode::Up if self.focus == Focus::Flame => {
                let step = self.vertical_step(true);
                self.viewer.flame_mut().step(step);
            }
            KeyCode::Char('j') | KeyCode::Down if self.focus == Focus::Flame => {
                let step = self.vertical_step(false);
                self.viewer.flame_mut().step(step);
            }

            // Chart zoom/pan
            KeyCode::Char('+') | KeyCode::Char('=') if self.focus == Focus::Chart => {
                self.viewer.chart_mut().zoom_in();
            }
            KeyCode::Char('-') if self.focus == Focus::Chart => {
                self.viewer.chart_mut().zoom_out();
            }
            KeyCode::Char('h') | KeyCode::Left if self.focus == Focus::Chart => {
                self.viewer.chart_mut().pan_left();
            }
            KeyCode::Char('l') | KeyCode::Right if self.focus == Focus::Chart => {
                self.viewer.chart_mut().pan_right();
            }
            KeyCode::Char('0') if self.focus == Focus::Chart => {
                self.viewer.chart_mut().autorange();
            }
            _ => {}
        }
    }

    /// Up moves towards the root when it is drawn at the top
    fn vertical_step(&self, up: bool) -> Step {
        if up == self.viewer.flame().inverted() {
            Step::Parent
        } else {
            Step::Child
        }
    }

    fn handle_search_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Enter => self.mode = Mode::Normal,
            KeyCode::Esc => {
                self.search_input.clear();
                self.viewer.on_search("");
                self.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                self.search_input.pop();
                self.viewer.on_search(&self.search_input);
            }
            KeyCode::Char(c) => {
                self.search_input.push(c);
                self.viewer.on_search(&self.search_input);
            }
            _ => {}
        }
    }

    /// Entries of the thread picker: "all threads" followed by each thread
    pub fn thread_options(&self) -> Vec<String> {
        let mut options = vec![ALL_THREADS.to_string()];
        if let Some(threads) = self.viewer.session().thread_choices() {
            options.extend(threads.iter().cloned());
        }
        options
    }

    fn handle_picker_key(&mut self, key: KeyCode) {
        let count = self.thread_options().len();
        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.mode = Mode::Normal,
            KeyCode::Char('j') | KeyCode::Down => {
                self.thread_cursor = (self.thread_cursor + 1).min(count.saturating_sub(1));
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.thread_cursor = self.thread_cursor.saturating_sub(1);
            }
            KeyCode::Enter => {
                if let Some(thread) = self.thread_options().get(self.thread_cursor) {
                    let thread = thread.clone();
                    self.viewer.on_filter_thread(&thread);
                }
                self.mode = Mode::Normal;
            }
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let position = Position::new(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if self.chart_area.contains(position) {
                    self.focus = Focus::Chart;
                } else if self.flame_area.contains(position) {
                    self.focus = Focus::Flame;
                    self.click_flame(position);
                }
            }
            MouseEventKind::ScrollUp if self.chart_area.contains(position) => {
                self.viewer.chart_mut().zoom_in();
            }
            MouseEventKind::ScrollDown if self.chart_area.contains(position) => {
                self.viewer.chart_mut().zoom_out();
            }
            _ => {}
        }
    }

    fn click_flame(&mut self, position: Position) {
        let area = self.flame_area;
        let x = position.x - area.x;
        let row = position.y - area.y;
        let depth = if self.viewer.flame().inverted() {
            row
        } else {
            area.height.saturating_sub(1).saturating_sub(row)
        };
        let Some(id) = self.viewer.flame().cell_at(x, depth).map(|c| c.id) else {
            return;
        };
        self.viewer.flame_mut().select(id);
        self.viewer.on_node_click(id);
    }

    pub fn viewer(&self) -> &TerminalViewer {
        &self.viewer
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn thread_cursor(&self) -> usize {
        self.thread_cursor
    }

    /// Inner area of the flamegraph, used to map mouse clicks
    pub fn set_flame_area(&mut self, area: Rect) {
        self.flame_area = area;
    }

    pub fn set_chart_area(&mut self, area: Rect) {
        self.chart_area = area;
    }
}

/// Columns available to frames inside the bordered flamegraph block
fn flame_width(columns: u16) -> u16 {
    columns.saturating_sub(2)
}
