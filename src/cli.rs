use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "memview")]
#[command(about = "Interactive flamegraph and memory timeline viewer for allocation profiles")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive viewer for a recorded profile
    View {
        /// Profile database file (defaults to most recent)
        file: Option<PathBuf>,

        /// Re-aggregate through this endpoint instead of the local profile
        #[arg(long, short = 'e')]
        endpoint: Option<String>,

        /// Node to zoom to at startup, e.g. "#12"
        #[arg(long, short = 'z')]
        zoom: Option<String>,

        /// Attribute all allocations to a single thread
        #[arg(long)]
        merge_threads: bool,

        /// Delay after the last range change before re-aggregating
        #[arg(long, default_value = "500ms", value_parser = parse_duration)]
        debounce: Duration,

        /// Hide frames narrower than this many columns
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u16).range(1..))]
        min_frame_width: u16,

        /// Draw the root at the bottom
        #[arg(long)]
        flame: bool,

        /// Log file (defaults to memview.log in the temp directory)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Print the call tree of a profile
    Tree {
        /// Profile database file
        file: PathBuf,

        /// Only include allocations from this time on
        #[arg(long)]
        start: Option<String>,

        /// Only include allocations up to this time
        #[arg(long)]
        end: Option<String>,

        /// Only include one thread
        #[arg(long, short = 't')]
        thread: Option<String>,

        /// Attribute all allocations to a single thread
        #[arg(long, conflicts_with = "thread")]
        merge_threads: bool,

        /// Keep frames that are hidden by default
        #[arg(long)]
        show_uninteresting: bool,

        /// Hide frames of the import system
        #[arg(long)]
        hide_imports: bool,

        /// Maximum depth to print
        #[arg(long, short = 'd')]
        depth: Option<usize>,

        /// Output as JSON (the re-aggregation response body)
        #[arg(long)]
        json: bool,
    },

    /// List saved profile databases
    List {
        /// Directory to search (defaults to current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    // Try humantime first
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Try bare number as milliseconds
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 500ms, 1s, 250",
        s
    ))
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if let Command::View {
            endpoint: Some(endpoint),
            ..
        } = &self.command
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(format!("Endpoint must be an http(s) URL, got '{endpoint}'"));
        }

        if let Command::Tree {
            start: Some(start),
            end: Some(end),
            ..
        } = &self.command
            && let (Ok(start), Ok(end)) = (
                crate::range::parse_timestamp(start),
                crate::range::parse_timestamp(end),
            )
            && start > end
        {
            return Err("--start must not be after --end".to_string());
        }

        Ok(())
    }
}
