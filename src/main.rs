use anyhow::Context;
use clap::Parser;
use memview::cli::{Cli, Command};
use memview::commands::tree::TreeOptions;
use memview::error::exit_code;
use memview::tui::ViewerConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(memview_err) = e.downcast_ref::<memview::Error>() {
                ExitCode::from(memview_err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Validate CLI arguments
    cli.validate()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Invalid arguments")?;

    match cli.command {
        Command::View {
            file,
            endpoint,
            zoom,
            merge_threads,
            debounce,
            min_frame_width,
            flame,
            log_file,
        } => {
            let log_file = log_file.unwrap_or_else(memview::logging::default_log_file);
            memview::logging::init(Some(&log_file))
                .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

            let profile_path = match file {
                Some(f) => f,
                None => {
                    // Find most recent profile
                    memview::commands::list::most_recent_profile(std::path::Path::new("."))?
                        .ok_or_else(|| anyhow::anyhow!("No profiles found. Run 'memview list' to see available profiles."))?
                }
            };

            let config = ViewerConfig {
                debounce,
                min_frame_width,
                inverted: !flame,
                initial_fragment: zoom,
                ..ViewerConfig::default()
            };
            memview::commands::view::run(&profile_path, endpoint.as_deref(), merge_threads, config)
                .with_context(|| format!("Failed to view {}", profile_path.display()))?;
        }
        Command::Tree {
            file,
            start,
            end,
            thread,
            merge_threads,
            show_uninteresting,
            hide_imports,
            depth,
            json,
        } => {
            memview::logging::init(None)?;
            let options = TreeOptions {
                start,
                end,
                thread,
                merge_threads,
                show_uninteresting,
                hide_imports,
                depth,
                json,
            };
            memview::commands::tree::run(&file, &options)?;
        }
        Command::List { dir } => {
            memview::logging::init(None)?;
            memview::commands::list::run(dir.as_deref())?;
        }
        Command::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "memview", &mut std::io::stdout());
        }
    }

    Ok(())
}
