use super::schema::{self, SCHEMA_VERSION};
use crate::error::Result;
use crate::series::MemorySample;
use crate::tree::frames::StackFrame;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

/// Writes an allocation profile database
pub struct ProfileWriter {
    conn: Connection,
    /// Cache: frame -> frame id
    frame_cache: HashMap<StackFrame, i64>,
    /// Cache: full stack -> stack id
    stack_cache: HashMap<Vec<i64>, i64>,
    pending_snapshots: Vec<MemorySample>,
    pending_allocations: Vec<PendingAllocation>,
}

struct PendingAllocation {
    timestamp_ms: i64,
    thread: String,
    size: u64,
    n_allocations: u64,
    stack_id: i64,
}

impl ProfileWriter {
    /// Create a new profile file, replacing any existing one
    pub fn create(path: &Path, command: &str) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::create_tables(&conn)?;

        schema::set_meta(&conn, "version", &SCHEMA_VERSION.to_string())?;
        schema::set_meta(&conn, "command", command)?;
        schema::set_meta(&conn, "start_time", &chrono::Utc::now().to_rfc3339())?;

        Ok(ProfileWriter {
            conn,
            frame_cache: HashMap::new(),
            stack_cache: HashMap::new(),
            pending_snapshots: Vec::new(),
            pending_allocations: Vec::new(),
        })
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        schema::set_meta(&self.conn, key, value)?;
        Ok(())
    }

    /// Get or create the id of a frame
    fn frame_id(&mut self, frame: &StackFrame) -> Result<i64> {
        if let Some(&id) = self.frame_cache.get(frame) {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO frames (function, file, line) VALUES (?, ?, ?)",
            rusqlite::params![&frame.function, &frame.file, frame.line as i64],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM frames WHERE function = ? AND file = ? AND line = ?",
            rusqlite::params![&frame.function, &frame.file, frame.line as i64],
            |row| row.get(0),
        )?;

        self.frame_cache.insert(frame.clone(), id);
        Ok(id)
    }

    /// Get or create the id of a stack (innermost frame first)
    fn stack_id(&mut self, stack: &[StackFrame]) -> Result<i64> {
        let frame_ids = stack
            .iter()
            .map(|frame| self.frame_id(frame))
            .collect::<Result<Vec<_>>>()?;

        if let Some(&id) = self.stack_cache.get(&frame_ids) {
            return Ok(id);
        }

        let id = self.stack_cache.len() as i64 + 1;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO stack_frames (stack_id, depth, frame_id) VALUES (?, ?, ?)",
            )?;
            for (depth, frame_id) in frame_ids.iter().enumerate() {
                stmt.execute(rusqlite::params![id, depth as i64, frame_id])?;
            }
        }
        tx.commit()?;

        self.stack_cache.insert(frame_ids, id);
        Ok(id)
    }

    pub fn record_snapshot(&mut self, sample: MemorySample) {
        self.pending_snapshots.push(sample);
    }

    pub fn record_allocation(
        &mut self,
        timestamp_ms: i64,
        thread: &str,
        size: u64,
        n_allocations: u64,
        stack: &[StackFrame],
    ) -> Result<()> {
        let stack_id = self.stack_id(stack)?;
        self.pending_allocations.push(PendingAllocation {
            timestamp_ms,
            thread: thread.to_string(),
            size,
            n_allocations,
            stack_id,
        });
        Ok(())
    }

    /// Write pending rows in a single transaction
    pub fn flush(&mut self) -> Result<()> {
        if self.pending_snapshots.is_empty() && self.pending_allocations.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO memory_snapshots (timestamp_ms, resident_bytes, heap_bytes) VALUES (?, ?, ?)",
            )?;
            for sample in self.pending_snapshots.drain(..) {
                stmt.execute(rusqlite::params![
                    sample.timestamp_ms,
                    sample.resident_bytes as i64,
                    sample.heap_bytes as i64
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO allocations (timestamp_ms, thread, size, n_allocations, stack_id) VALUES (?, ?, ?, ?, ?)",
            )?;
            for alloc in self.pending_allocations.drain(..) {
                stmt.execute(rusqlite::params![
                    alloc.timestamp_ms,
                    alloc.thread,
                    alloc.size as i64,
                    alloc.n_allocations as i64,
                    alloc.stack_id
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Flush and close the profile
    pub fn finish(mut self) -> Result<()> {
        self.flush()?;
        schema::set_meta(&self.conn, "end_time", &chrono::Utc::now().to_rfc3339())?;
        Ok(())
    }
}
