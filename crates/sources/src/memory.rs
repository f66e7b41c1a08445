use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use analitica_core::{
    AttrValue, Item, ScanCursor, ScanPage, SourceError, SourceResult,
    TableSource,
};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use parking_lot::RwLock;
use tracing::debug;

const OFFSET_KEY: &str = "offset";

/// In-process table source.
///
/// Tables are split into pages of `page_size` items. The cursor records the
/// offset of the next page, so scans are stable as long as the table is not
/// modified mid-scan.
pub struct MemTableSource {
    tables: RwLock<HashMap<String, Vec<Item>>>,
    page_size: usize,
    scans: AtomicUsize,
}

impl Default for MemTableSource {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MemTableSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
            scans: AtomicUsize::new(0),
        }
    }

    /// Builder-style variant of [`insert_table`](Self::insert_table).
    pub fn with_table(self, table: &str, items: Vec<Item>) -> Self {
        self.insert_table(table, items);
        self
    }

    /// Replace the contents of `table`.
    pub fn insert_table(&self, table: &str, items: Vec<Item>) {
        self.tables.write().insert(table.to_owned(), items);
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of `scan_page` calls served so far.
    pub fn scan_calls(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    fn decode_cursor(cursor: Option<ScanCursor>) -> SourceResult<usize> {
        let Some(cursor) = cursor else {
            return Ok(0);
        };
        cursor
            .key()
            .get(OFFSET_KEY)
            .and_then(AttrValue::as_number)
            .and_then(BigDecimal::to_usize)
            .ok_or_else(|| SourceError::Decode {
                details: "cursor was not issued by this source".into(),
            })
    }

    fn encode_cursor(offset: usize) -> ScanCursor {
        let mut key = Item::new();
        key.insert(
            OFFSET_KEY.to_owned(),
            AttrValue::Number(BigDecimal::from(offset as u64)),
        );
        ScanCursor::new(key)
    }
}

#[async_trait]
impl TableSource for MemTableSource {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn scan_page(
        &self,
        table: &str,
        cursor: Option<ScanCursor>,
    ) -> SourceResult<ScanPage> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let start = Self::decode_cursor(cursor)?;

        let tables = self.tables.read();
        let rows = tables.get(table).ok_or_else(|| {
            SourceError::TableNotFound {
                table: table.to_owned(),
            }
        })?;

        let start = start.min(rows.len());
        let end = (start + self.page_size).min(rows.len());
        let items = rows[start..end].to_vec();
        let next_cursor = (end < rows.len()).then(|| Self::encode_cursor(end));

        debug!(
            table,
            start,
            returned = items.len(),
            more = next_cursor.is_some(),
            "memory scan page"
        );
        Ok(ScanPage { items, next_cursor })
    }
}
