//! SQLite-backed order source.
//!
//! RULE: Only store.rs talks to the database.
//! Engines receive typed records through the `OrderSource` trait and
//! never execute SQL directly.

use crate::{
    clock::DateRange,
    error::PulseResult,
    record::{ingest, OrderRecord, RawOrderRow},
    source::{in_window, OrderSource, RetryPolicy, SourceRules},
    types::{Country, SourceTier},
};
use chrono::Duration;
use rusqlite::{params, Connection, Row};

pub struct OrderStore {
    conn: Connection,
    rules: SourceRules,
}

impl OrderStore {
    /// Open (or create) the source database at `path`.
    pub fn open(path: &str, rules: SourceRules) -> PulseResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn, rules })
    }

    /// Open once per run, retrying under the run's policy.
    pub fn open_with_retry(
        path: &str,
        rules: SourceRules,
        policy: &RetryPolicy,
    ) -> PulseResult<Self> {
        policy.run(&format!("order store at {path}"), || {
            let store = Self::open(path, rules.clone())?;
            store.migrate()?;
            Ok(store)
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory(rules: SourceRules) -> PulseResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, rules })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PulseResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_order_sources.sql"))?;
        Ok(())
    }

    // ── Loading ────────────────────────────────────────────────

    /// Append a change-log row. Returns its arrival sequence number.
    pub fn insert_recent(&self, country: Country, row: &RawOrderRow) -> PulseResult<i64> {
        self.conn.execute(
            "INSERT INTO recent_orders
             (country, order_id, placed_at, gross_value, buyer_id, vendor_id, status, channel)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                country.code(),
                row.order_id,
                row.placed_at,
                row.gross_value,
                row.buyer_id,
                row.vendor_id,
                row.status,
                row.channel,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Upsert a historical row. The historical tier holds one row per order.
    pub fn insert_historical(&self, country: Country, row: &RawOrderRow) -> PulseResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO historical_orders
             (country, order_id, placed_at, gross_value, buyer_id, vendor_id, status, channel)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                country.code(),
                row.order_id,
                row.placed_at,
                row.gross_value,
                row.buyer_id,
                row.vendor_id,
                row.status,
                row.channel,
            ],
        )?;
        Ok(())
    }

    pub fn recent_row_count(&self, country: Country) -> PulseResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM recent_orders WHERE country = ?1",
            params![country.code()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Raw reads ──────────────────────────────────────────────

    /// Latest-arriving row per order, in arrival order.
    ///
    /// Deduplication spans the whole change log for the country, so a row
    /// superseded by a later one is never returned even when the later row
    /// moved the order outside `range`. The date prefilter then runs on the
    /// text column with one day of slack on each side; the exact local-date
    /// filter happens after normalization.
    pub fn recent_rows(&self, country: Country, range: DateRange) -> PulseResult<Vec<RawOrderRow>> {
        let (lo, hi) = padded_bounds(range);
        let mut stmt = self.conn.prepare(
            "SELECT order_id, placed_at, gross_value, buyer_id, vendor_id, status, channel
             FROM (
                 SELECT *,
                        ROW_NUMBER() OVER (PARTITION BY order_id ORDER BY load_seq DESC) AS rn
                 FROM recent_orders
                 WHERE country = ?1
             )
             WHERE rn = 1 AND substr(placed_at, 1, 10) BETWEEN ?2 AND ?3
             ORDER BY load_seq ASC",
        )?;
        let rows = stmt
            .query_map(params![country.code(), lo, hi], map_raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn historical_rows(
        &self,
        country: Country,
        range: DateRange,
    ) -> PulseResult<Vec<RawOrderRow>> {
        let (lo, hi) = padded_bounds(range);
        let mut stmt = self.conn.prepare(
            "SELECT order_id, placed_at, gross_value, buyer_id, vendor_id, status, channel
             FROM historical_orders
             WHERE country = ?1 AND substr(placed_at, 1, 10) BETWEEN ?2 AND ?3
             ORDER BY placed_at ASC, order_id ASC",
        )?;
        let rows = stmt
            .query_map(params![country.code(), lo, hi], map_raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl OrderSource for OrderStore {
    fn fetch_recent(
        &self,
        country: Country,
        range: DateRange,
        hour_cutoff: Option<u32>,
    ) -> PulseResult<Vec<OrderRecord>> {
        let offset = self.rules.offset(country)?;
        let rows = self.recent_rows(country, range)?;
        let records: Vec<OrderRecord> = ingest(&rows, country, SourceTier::Recent)
            .records
            .into_iter()
            .filter(|r| self.rules.admits_recent(r))
            .filter(|r| in_window(r, offset, range, hour_cutoff))
            .collect();
        log::info!(
            "country={country} recent {}..{} cutoff={hour_cutoff:?}: {} orders",
            range.start,
            range.end,
            records.len()
        );
        Ok(records)
    }

    fn fetch_historical(
        &self,
        country: Country,
        range: DateRange,
    ) -> PulseResult<Vec<OrderRecord>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let offset = self.rules.offset(country)?;
        let rows = self.historical_rows(country, range)?;
        let records: Vec<OrderRecord> = ingest(&rows, country, SourceTier::Historical)
            .records
            .into_iter()
            .filter(|r| self.rules.admits_historical(r))
            .filter(|r| in_window(r, offset, range, None))
            .collect();
        log::info!(
            "country={country} historical {}..{}: {} orders",
            range.start,
            range.end,
            records.len()
        );
        Ok(records)
    }
}

fn padded_bounds(range: DateRange) -> (String, String) {
    let lo = range.start - Duration::days(1);
    let hi = range.end + Duration::days(1);
    (lo.format("%Y-%m-%d").to_string(), hi.format("%Y-%m-%d").to_string())
}

fn map_raw_row(row: &Row<'_>) -> rusqlite::Result<RawOrderRow> {
    Ok(RawOrderRow {
        order_id: row.get(0)?,
        placed_at: row.get(1)?,
        gross_value: row.get(2)?,
        buyer_id: row.get(3)?,
        vendor_id: row.get(4)?,
        status: row.get(5)?,
        channel: row.get(6)?,
    })
}
