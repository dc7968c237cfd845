use super::schema::{self, SCHEMA_VERSION};
use crate::error::{Error, Result};
use crate::range::TimeRange;
use crate::series::{MemorySample, TimeSeries};
use crate::tree::aggregate::AllocationRecord;
use crate::tree::frames::StackFrame;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

/// Open an existing profile
pub fn open(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(Error::ProfileNotFound(path.display().to_string()));
    }
    let conn = Connection::open(path)?;

    match schema::get_meta(&conn, "version")? {
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => log::warn!(
            "Profile {} has schema version {v}, expected {SCHEMA_VERSION}",
            path.display()
        ),
        None => log::warn!("Profile {} has no schema version", path.display()),
    }
    Ok(conn)
}

pub fn load_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(schema::get_meta(conn, key)?)
}

/// The whole memory time series, ordered by timestamp
pub fn load_memory_series(conn: &Connection) -> Result<TimeSeries> {
    let mut stmt = conn.prepare(
        "SELECT timestamp_ms, resident_bytes, heap_bytes FROM memory_snapshots ORDER BY timestamp_ms",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MemorySample {
            timestamp_ms: row.get(0)?,
            resident_bytes: row.get::<_, i64>(1)? as u64,
            heap_bytes: row.get::<_, i64>(2)? as u64,
        })
    })?;

    let mut samples = Vec::new();
    for row in rows {
        samples.push(row?);
    }
    Ok(TimeSeries::new(samples))
}

fn load_stacks(conn: &Connection) -> Result<HashMap<i64, Vec<StackFrame>>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT sf.stack_id, f.function, f.file, f.line
        FROM stack_frames sf
        JOIN frames f ON sf.frame_id = f.id
        ORDER BY sf.stack_id, sf.depth
        "#,
    )?;
    let rows = stmt.query_map([], |row| {
        let stack_id: i64 = row.get(0)?;
        let frame = StackFrame::new(
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)? as u32,
        );
        Ok((stack_id, frame))
    })?;

    let mut stacks: HashMap<i64, Vec<StackFrame>> = HashMap::new();
    for row in rows {
        let (stack_id, frame) = row?;
        stacks.entry(stack_id).or_default().push(frame);
    }
    Ok(stacks)
}

/// Allocation records, optionally restricted to `range` (inclusive)
pub fn load_allocations(
    conn: &Connection,
    range: Option<TimeRange>,
) -> Result<Vec<AllocationRecord>> {
    let stacks = load_stacks(conn)?;
    let (start, end) = match range {
        Some(r) => (r.start_ms, r.end_ms),
        None => (i64::MIN, i64::MAX),
    };

    let mut stmt = conn.prepare(
        r#"
        SELECT timestamp_ms, thread, size, n_allocations, stack_id
        FROM allocations
        WHERE timestamp_ms >= ?1 AND timestamp_ms <= ?2
        ORDER BY id
        "#,
    )?;
    let rows = stmt.query_map(rusqlite::params![start, end], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (timestamp_ms, thread, size, n_allocations, stack_id) = row?;
        records.push(AllocationRecord {
            timestamp_ms,
            thread,
            size: size as u64,
            n_allocations: n_allocations as u64,
            stack: stacks.get(&stack_id).cloned().unwrap_or_default(),
        });
    }
    Ok(records)
}
