use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{RekapError, RekapResult};
use crate::token::TokenProvider;

lazy_static! {
    static ref CELL_REF_REGEX: Regex = Regex::new(r"^([A-Z]*)([0-9]*)$").unwrap();
}

/// Row-oriented access to a spreadsheet
///
/// Reads come back as strings exactly as the service formats them. Writes take
/// JSON values so numbers stay numeric in the sheet.
#[async_trait]
pub trait SheetsClient: Send + Sync {
    /// Read `range` of `sheet`; an empty range yields an empty vector
    async fn read(&self, sheet: &str, range: &str) -> RekapResult<Vec<Vec<String>>>;

    /// Append `rows` after the last non-empty row of `sheet`
    async fn append(&self, sheet: &str, rows: Vec<Vec<Value>>) -> RekapResult<Value>;

    /// Overwrite cells starting at the top-left corner of `range`
    async fn update(&self, sheet: &str, range: &str, rows: Vec<Vec<Value>>)
    -> RekapResult<Value>;
}

/// Convert a column number to letters (1 = A, 27 = AA)
pub fn col_to_letter(col: usize) -> String {
    let mut col = col;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}

/// Convert column letters to a column number (A = 1)
pub fn letter_to_col(letters: &str) -> usize {
    letters
        .chars()
        .fold(0, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1))
}

/// Name of the cell at a 1-based row and 0-based column index, e.g. `(2, 7)` is `H2`
pub fn cell_name(row: usize, col_index: usize) -> String {
    format!("{}{}", col_to_letter(col_index + 1), row)
}

/// Text of a cell as the sheet would display it
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

/// A parsed A1-notation range; `None` bounds are open-ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct A1Range {
    pub first_col: usize,
    pub last_col: Option<usize>,
    pub first_row: usize,
    pub last_row: Option<usize>,
}

impl A1Range {
    /// Parse `A:H`, `A1:K1`, `H5` and similar forms
    pub fn parse(range: &str) -> Option<A1Range> {
        let range = range.trim().to_ascii_uppercase();
        let (start, end) = match range.split_once(':') {
            Some((start, end)) => (start.to_string(), Some(end.to_string())),
            None => (range.clone(), None),
        };

        let (start_col, start_row) = Self::parse_ref(&start)?;
        let first_col = start_col.unwrap_or(1);
        let first_row = start_row.unwrap_or(1);

        let (last_col, last_row) = match end {
            Some(end) => {
                let (col, row) = Self::parse_ref(&end)?;
                (col, row)
            }
            // A single cell
            None => (start_col, start_row),
        };

        if first_row == 0 || last_row == Some(0) {
            return None;
        }
        Some(A1Range {
            first_col,
            last_col,
            first_row,
            last_row,
        })
    }

    fn parse_ref(cell: &str) -> Option<(Option<usize>, Option<usize>)> {
        let caps = CELL_REF_REGEX.captures(cell)?;
        let letters = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let digits = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if letters.is_empty() && digits.is_empty() {
            return None;
        }
        let col = (!letters.is_empty()).then(|| letter_to_col(letters));
        let row = if digits.is_empty() {
            None
        } else {
            Some(digits.parse::<usize>().ok()?)
        };
        Some((col, row))
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Option<Vec<Vec<Value>>>,
}

/// Google Sheets v4 values API
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GoogleSheetsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            spreadsheet_id: spreadsheet_id.into(),
            tokens,
        }
    }

    fn values_url(&self, reference: &str, suffix: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}{}",
            self.base_url.trim_end_matches('/'),
            self.spreadsheet_id,
            urlencoding::encode(reference),
            suffix
        )
    }

    async fn checked(response: reqwest::Response) -> RekapResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string));
            let reason = status.canonical_reason().unwrap_or("Unknown status");
            let message = match detail {
                Some(detail) => format!("{}: {}", reason, detail),
                None => reason.to_string(),
            };
            return Err(RekapError::RemoteService {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SheetsClient for GoogleSheetsClient {
    async fn read(&self, sheet: &str, range: &str) -> RekapResult<Vec<Vec<String>>> {
        let token = self.tokens.access_token().await?;
        let url = self.values_url(&format!("{}!{}", sheet, range), "");
        tracing::debug!(sheet, range, "reading sheet values");

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let body = Self::checked(response).await?;
        if body.is_null() {
            return Ok(Vec::new());
        }

        let parsed: ValueRange = serde_json::from_value(body)?;
        Ok(parsed
            .values
            .unwrap_or_default()
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append(&self, sheet: &str, rows: Vec<Vec<Value>>) -> RekapResult<Value> {
        let token = self.tokens.access_token().await?;
        let url = self.values_url(&format!("{}!A1", sheet), ":append?valueInputOption=RAW");
        tracing::debug!(sheet, rows = rows.len(), "appending rows");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        Self::checked(response).await
    }

    async fn update(
        &self,
        sheet: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> RekapResult<Value> {
        let token = self.tokens.access_token().await?;
        let url = self.values_url(&format!("{}!{}", sheet, range), "?valueInputOption=RAW");
        tracing::debug!(sheet, range, "updating cells");

        let response = self
            .http
            .put(&url)
            .bearer_auth(token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        Self::checked(response).await
    }
}

/// A call received by [`MemorySheets`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetCall {
    Read { sheet: String, range: String },
    Append { sheet: String, rows: usize },
    Update { sheet: String, range: String },
}

impl SheetCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, SheetCall::Read { .. })
    }
}

#[derive(Default)]
struct MemoryInner {
    sheets: HashMap<String, Vec<Vec<String>>>,
    calls: Vec<SheetCall>,
    failure: Option<(u16, String)>,
}

/// In-process spreadsheet with the same range semantics as the remote service
#[derive(Default)]
pub struct MemorySheets {
    inner: Mutex<MemoryInner>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a sheet with rows of cell text
    pub fn with_sheet(self, name: &str, rows: Vec<Vec<&str>>) -> Self {
        self.set_sheet(name, rows);
        self
    }

    pub fn set_sheet(&self, name: &str, rows: Vec<Vec<&str>>) {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(str::to_string).collect())
            .collect();
        self.lock().sheets.insert(name.to_string(), rows);
    }

    /// Current content of a sheet, or empty when it does not exist
    pub fn rows(&self, name: &str) -> Vec<Vec<String>> {
        self.lock().sheets.get(name).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<SheetCall> {
        self.lock().calls.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_write()).count()
    }

    /// Make every following call fail with the given upstream status
    pub fn fail_with(&self, status: u16, message: &str) {
        self.lock().failure = Some((status, message.to_string()));
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A panicking test thread must not wedge the remaining assertions
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_failure(inner: &MemoryInner) -> RekapResult<()> {
        match &inner.failure {
            Some((status, message)) => Err(RekapError::RemoteService {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn parse_range(range: &str) -> RekapResult<A1Range> {
        A1Range::parse(range).ok_or_else(|| RekapError::RemoteService {
            status: 400,
            message: format!("Unable to parse range: {}", range),
        })
    }

    fn last_filled_row(rows: &[Vec<String>]) -> usize {
        rows.iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_empty()))
            .map(|idx| idx + 1)
            .unwrap_or(0)
    }
}

#[async_trait]
impl SheetsClient for MemorySheets {
    async fn read(&self, sheet: &str, range: &str) -> RekapResult<Vec<Vec<String>>> {
        let mut inner = self.lock();
        inner.calls.push(SheetCall::Read {
            sheet: sheet.to_string(),
            range: range.to_string(),
        });
        Self::check_failure(&inner)?;

        let bounds = Self::parse_range(range)?;
        let rows = inner
            .sheets
            .get(sheet)
            .ok_or_else(|| RekapError::RemoteService {
                status: 400,
                message: format!("Unable to parse range: {}!{}", sheet, range),
            })?;

        let first_row = bounds.first_row - 1;
        let last_row = bounds
            .last_row
            .unwrap_or(rows.len())
            .min(rows.len());
        let first_col = bounds.first_col - 1;

        let mut values: Vec<Vec<String>> = Vec::new();
        for row in rows.iter().take(last_row).skip(first_row) {
            let last_col = bounds.last_col.unwrap_or(row.len()).min(row.len());
            let mut cells: Vec<String> = if first_col < last_col {
                row[first_col..last_col].to_vec()
            } else {
                Vec::new()
            };
            while cells.last().is_some_and(|c| c.is_empty()) {
                cells.pop();
            }
            values.push(cells);
        }
        while values.last().is_some_and(|r| r.is_empty()) {
            values.pop();
        }
        Ok(values)
    }

    async fn append(&self, sheet: &str, rows: Vec<Vec<Value>>) -> RekapResult<Value> {
        let mut inner = self.lock();
        inner.calls.push(SheetCall::Append {
            sheet: sheet.to_string(),
            rows: rows.len(),
        });
        Self::check_failure(&inner)?;

        let target = inner.sheets.entry(sheet.to_string()).or_default();
        let start = Self::last_filled_row(target);
        target.truncate(start);

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let count = rows.len();
        for row in rows {
            target.push(row.iter().map(cell_to_string).collect());
        }

        Ok(json!({
            "spreadsheetId": "memory",
            "updates": {
                "updatedRange": format!(
                    "{}!A{}:{}",
                    sheet,
                    start + 1,
                    cell_name(start + count, width.saturating_sub(1))
                ),
                "updatedRows": count,
            }
        }))
    }

    async fn update(
        &self,
        sheet: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> RekapResult<Value> {
        let mut inner = self.lock();
        inner.calls.push(SheetCall::Update {
            sheet: sheet.to_string(),
            range: range.to_string(),
        });
        Self::check_failure(&inner)?;

        let bounds = Self::parse_range(range)?;
        let target = inner.sheets.entry(sheet.to_string()).or_default();

        let mut updated = 0;
        for (r, row) in rows.iter().enumerate() {
            let row_idx = bounds.first_row - 1 + r;
            if target.len() <= row_idx {
                target.resize(row_idx + 1, Vec::new());
            }
            for (c, value) in row.iter().enumerate() {
                let col_idx = bounds.first_col - 1 + c;
                let cells = &mut target[row_idx];
                if cells.len() <= col_idx {
                    cells.resize(col_idx + 1, String::new());
                }
                cells[col_idx] = cell_to_string(value);
                updated += 1;
            }
        }

        Ok(json!({
            "spreadsheetId": "memory",
            "updatedRange": format!("{}!{}", sheet, range),
            "updatedCells": updated,
        }))
    }
}
