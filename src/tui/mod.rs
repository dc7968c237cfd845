mod app;
pub mod chart;
pub mod flame;
mod ui;

use crate::error::Result;
use crate::range::DEFAULT_DEBOUNCE;
use crate::remote::Reaggregate;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;

pub use app::App;
pub(crate) use ui::format_bytes;

/// Settings for an interactive viewing session
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Quiet period before a range change triggers re-aggregation
    pub debounce: Duration,
    /// Quiet period before a terminal resize relayouts the flamegraph
    pub resize_debounce: Duration,
    /// Frames narrower than this many columns are not drawn
    pub min_frame_width: u16,
    /// Draw the root at the top
    pub inverted: bool,
    /// Zoom to restore at startup (`#<id>`)
    pub initial_fragment: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            debounce: DEFAULT_DEBOUNCE,
            resize_debounce: Duration::from_millis(100),
            min_frame_width: 1,
            inverted: true,
            initial_fragment: None,
        }
    }
}

/// Run the interactive viewer until the user quits
pub fn run(session: Session, source: Arc<dyn Reaggregate>, config: ViewerConfig) -> Result<()> {
    let mut app = App::new(session, source, config)?;
    app.run()
}
