use crate::error::Result;
use crate::storage;
use comfy_table::{CellAlignment, Table, presets};
use std::path::{Path, PathBuf};

/// Profile info extracted from a database file
pub struct ProfileInfo {
    pub path: PathBuf,
    pub command: String,
    pub duration_secs: f64,
    pub allocations: u64,
    pub peak_resident: u64,
    pub created: String,
}

/// Whether a file name follows the `memview.*.db` pattern
fn is_profile_name(name: &str) -> bool {
    name.starts_with("memview.") && name.ends_with(".db")
}

/// Find all memview profile databases in a directory
pub fn find_profiles(dir: &Path) -> Result<Vec<ProfileInfo>> {
    let mut profiles = Vec::new();

    let entries = std::fs::read_dir(dir)?;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_profile_name(name) {
            continue;
        }
        match get_profile_info(&path) {
            Ok(info) => profiles.push(info),
            Err(e) => log::warn!("Skipping {}: {e}", path.display()),
        }
    }

    // Most recent first
    profiles.sort_by(|a, b| b.created.cmp(&a.created));

    Ok(profiles)
}

/// Get the most recent profile in a directory
pub fn most_recent_profile(dir: &Path) -> Result<Option<PathBuf>> {
    let profiles = find_profiles(dir)?;
    Ok(profiles.into_iter().next().map(|p| p.path))
}

/// Extract metadata from a profile database
fn get_profile_info(path: &Path) -> Result<ProfileInfo> {
    let conn = storage::open(path)?;

    let command = storage::load_meta(&conn, "command")?.unwrap_or_else(|| "unknown".to_string());
    let created = storage::load_meta(&conn, "start_time")?.unwrap_or_else(|| "unknown".to_string());

    let (first_ms, last_ms, peak): (i64, i64, i64) = conn.query_row(
        "SELECT COALESCE(MIN(timestamp_ms), 0), COALESCE(MAX(timestamp_ms), 0), COALESCE(MAX(resident_bytes), 0) FROM memory_snapshots",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let allocations: i64 = conn.query_row(
        "SELECT COALESCE(SUM(n_allocations), 0) FROM allocations",
        [],
        |row| row.get(0),
    )?;

    Ok(ProfileInfo {
        path: path.to_path_buf(),
        command,
        duration_secs: (last_ms - first_ms) as f64 / 1000.0,
        allocations: allocations as u64,
        peak_resident: peak as u64,
        created,
    })
}

fn format_duration(secs: f64) -> String {
    if secs >= 60.0 {
        format!("{:.0}m{:.0}s", (secs / 60.0).floor(), secs % 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}

/// Run the list command
pub fn run(dir: Option<&Path>) -> Result<()> {
    let search_dir = dir.unwrap_or_else(|| Path::new("."));
    let profiles = find_profiles(search_dir)?;

    if profiles.is_empty() {
        println!("No memview profiles found in {}", search_dir.display());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_HORIZONTAL_ONLY)
        .set_header(vec!["FILE", "COMMAND", "DURATION", "ALLOCATIONS", "PEAK RSS"]);

    for profile in &profiles {
        let filename = profile
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        table.add_row(vec![
            filename,
            profile.command.clone(),
            format_duration(profile.duration_secs),
            profile.allocations.to_string(),
            crate::tui::format_bytes(profile.peak_resident),
        ]);
    }
    for index in 2..5 {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }

    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::MemorySample;
    use crate::storage::ProfileWriter;
    use crate::tree::frames::StackFrame;

    #[test]
    fn test_find_profiles() {
        let dir = tempfile::tempdir().unwrap();

        let mut writer = ProfileWriter::create(&dir.path().join("memview.app.db"), "app").unwrap();
        writer.record_snapshot(MemorySample {
            timestamp_ms: 0,
            resident_bytes: 10,
            heap_bytes: 5,
        });
        writer.record_snapshot(MemorySample {
            timestamp_ms: 90_000,
            resident_bytes: 30,
            heap_bytes: 5,
        });
        writer
            .record_allocation(0, "0x1", 8, 3, &[StackFrame::new("f", "a.py", 1)])
            .unwrap();
        writer.finish().unwrap();

        std::fs::write(dir.path().join("other.db"), b"").unwrap();

        let profiles = find_profiles(dir.path()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].command, "app");
        assert_eq!(profiles[0].allocations, 3);
        assert_eq!(profiles[0].peak_resident, 30);
        assert_eq!(format_duration(profiles[0].duration_secs), "1m30s");

        assert_eq!(
            most_recent_profile(dir.path()).unwrap(),
            Some(dir.path().join("memview.app.db"))
        );
    }
}
