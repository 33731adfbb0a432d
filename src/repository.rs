use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SheetNames;
use crate::error::{RekapError, RekapResult};
use crate::model::{AppendSummary, Item, RecordSet, RekapRecord};
use crate::sheets::{SheetsClient, cell_name};

/// Typed access to master items and rekap output
///
/// The spreadsheet is one backing implementation; the engine only sees this trait.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Load every master item, including those with a zero cost
    ///
    /// # Errors
    /// * `RekapError::DataUnavailable` when the master sheet has no rows or lacks the key columns
    async fn load_items(&self) -> RekapResult<Vec<Item>>;

    /// Append records to the output table of `set`, writing the header row first
    /// when the table is still empty
    async fn append_records(
        &self,
        set: RecordSet,
        records: &[RekapRecord],
    ) -> RekapResult<AppendSummary>;

    /// Persist a manually supplied cost for `plu` into the master data
    async fn backfill_cost(&self, plu: &str, cost: f64) -> RekapResult<()>;
}

/// Column positions in the master sheet, located by header name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterColumns {
    pub plu: usize,
    pub description: Option<usize>,
    pub category: Option<usize>,
    pub tag: Option<usize>,
    pub cost: usize,
}

impl MasterColumns {
    pub fn locate(headers: &[String], sheet: &str) -> RekapResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let plu = find("PLU").ok_or_else(|| {
            RekapError::DataUnavailable(format!("Column PLU not found in sheet {}", sheet))
        })?;
        let cost = find("HPP").ok_or_else(|| {
            RekapError::DataUnavailable(format!("Column HPP not found in sheet {}", sheet))
        })?;

        Ok(MasterColumns {
            plu,
            description: find("DESCP"),
            category: find("C1"),
            tag: find("TAG"),
            cost,
        })
    }

    /// Build an item from a data row; rows with a blank plu yield `None`
    pub fn item(&self, row: &[String]) -> Option<Item> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let plu = cell(Some(self.plu));
        if plu.is_empty() {
            return None;
        }

        Some(Item {
            plu,
            description: cell(self.description),
            category: cell(self.category),
            tag: cell(self.tag),
            cost: parse_cost(&cell(Some(self.cost))),
        })
    }
}

/// Parse a cost cell; blank or unparseable text counts as zero (unknown)
pub fn parse_cost(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// [`ItemRepository`] over named sheets of a spreadsheet
pub struct SheetItemRepository {
    sheets: Arc<dyn SheetsClient>,
    names: SheetNames,
}

impl SheetItemRepository {
    pub fn new(sheets: Arc<dyn SheetsClient>, names: SheetNames) -> Self {
        Self { sheets, names }
    }

    fn sheet_for(&self, set: RecordSet) -> &str {
        match set {
            RecordSet::Stock => &self.names.stock,
            RecordSet::Reconciliation => &self.names.reconciliation,
        }
    }

    async fn read_master(&self) -> RekapResult<Vec<Vec<String>>> {
        let rows = self
            .sheets
            .read(&self.names.master, &self.names.master_range)
            .await?;
        if rows.is_empty() {
            return Err(RekapError::DataUnavailable(format!(
                "No data found in sheet {}",
                self.names.master
            )));
        }
        Ok(rows)
    }

    /// True when the header range of the output sheet holds nothing
    ///
    /// A failed probe counts as empty: a missing sheet gets created with its header
    /// by the append that follows.
    async fn needs_header(&self, set: RecordSet) -> bool {
        let sheet = self.sheet_for(set);
        match self.sheets.read(sheet, set.header_range()).await {
            Ok(rows) => rows.is_empty(),
            Err(e) => {
                tracing::warn!(sheet, error = %e, "header probe failed, treating sheet as empty");
                true
            }
        }
    }
}

#[async_trait]
impl ItemRepository for SheetItemRepository {
    async fn load_items(&self) -> RekapResult<Vec<Item>> {
        let rows = self.read_master().await?;
        let columns = MasterColumns::locate(&rows[0], &self.names.master)?;
        Ok(rows[1..].iter().filter_map(|row| columns.item(row)).collect())
    }

    async fn append_records(
        &self,
        set: RecordSet,
        records: &[RekapRecord],
    ) -> RekapResult<AppendSummary> {
        let sheet = self.sheet_for(set).to_string();

        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(records.len() + 1);
        if self.needs_header(set).await {
            tracing::info!(sheet = %sheet, "writing header row");
            rows.push(set.headers().iter().map(|h| Value::from(*h)).collect());
        }
        rows.extend(records.iter().map(|r| r.to_row(set)));

        let result = self.sheets.append(&sheet, rows).await?;
        tracing::info!(sheet = %sheet, records = records.len(), "appended rekap records");

        Ok(AppendSummary {
            total_records: records.len(),
            result,
        })
    }

    async fn backfill_cost(&self, plu: &str, cost: f64) -> RekapResult<()> {
        let rows = self.read_master().await?;
        let columns = MasterColumns::locate(&rows[0], &self.names.master)?;

        let position = rows[1..]
            .iter()
            .position(|row| row.get(columns.plu).is_some_and(|v| v.trim() == plu));

        match position {
            Some(idx) => {
                // Data starts on sheet row 2
                let range = cell_name(idx + 2, columns.cost);
                self.sheets
                    .update(&self.names.master, &range, vec![vec![Value::from(cost)]])
                    .await?;
                tracing::info!(plu, cost, range = %range, "backfilled item cost");
                Ok(())
            }
            None => Err(RekapError::DataUnavailable(format!(
                "PLU {} not found in sheet {}",
                plu, self.names.master
            ))),
        }
    }
}
