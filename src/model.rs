use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A row of the master item sheet
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Item {
    pub plu: String,
    pub description: String,
    pub category: String,
    pub tag: String,
    /// Unit cost (HPP); zero means unknown
    pub cost: f64,
}

impl Item {
    pub fn has_cost(&self) -> bool {
        self.cost != 0.0
    }
}

/// Which record sets a submission produces
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum RekapKind {
    #[serde(rename = "so")]
    Stock,
    #[serde(rename = "rekonsiliasi")]
    Reconciliation,
    #[serde(rename = "both")]
    Both,
}

impl RekapKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "so" => Some(RekapKind::Stock),
            "rekonsiliasi" => Some(RekapKind::Reconciliation),
            "both" => Some(RekapKind::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RekapKind::Stock => "so",
            RekapKind::Reconciliation => "rekonsiliasi",
            RekapKind::Both => "both",
        }
    }

    pub fn includes_stock(&self) -> bool {
        matches!(self, RekapKind::Stock | RekapKind::Both)
    }

    pub fn includes_reconciliation(&self) -> bool {
        matches!(self, RekapKind::Reconciliation | RekapKind::Both)
    }
}

/// One output table; `Both` never reaches the repository
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordSet {
    Stock,
    Reconciliation,
}

pub const STOCK_HEADERS: [&str; 11] = [
    "ID_REKAP",
    "TANGGAL",
    "PENGIRIM",
    "PLU",
    "DESKRIPSI",
    "KATEGORI",
    "TAG",
    "STOK",
    "SELISIH_QTY",
    "SELISIH_RP",
    "WAKTU",
];

pub const RECONCILIATION_HEADERS: [&str; 10] = [
    "ID_REKAP",
    "TANGGAL",
    "PENGIRIM",
    "PLU",
    "DESKRIPSI",
    "KATEGORI",
    "TAG",
    "STOK",
    "SELISIH_QTY",
    "SELISIH_RP",
];

impl RecordSet {
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            RecordSet::Stock => &STOCK_HEADERS,
            RecordSet::Reconciliation => &RECONCILIATION_HEADERS,
        }
    }

    /// Range covering the header row, used to probe whether the sheet is initialised
    pub fn header_range(&self) -> &'static str {
        match self {
            RecordSet::Stock => "A1:K1",
            RecordSet::Reconciliation => "A1:J1",
        }
    }

    /// Key of this set in the submission result
    pub fn result_key(&self) -> &'static str {
        match self {
            RecordSet::Stock => "rekapSO",
            RecordSet::Reconciliation => "rekapRekonsiliasi",
        }
    }
}

/// Body of `POST /api/rekap` as sent by the client
///
/// Fields stay loosely typed here so the engine can report a proper validation
/// error instead of a deserialisation failure.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct RekapRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "tanggal", default)]
    pub date: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(
        rename = "hppValues",
        default,
        deserialize_with = "deserialize_costs"
    )]
    pub supplied_costs: HashMap<String, f64>,
}

/// A request that passed validation
#[derive(Clone, Debug, PartialEq)]
pub struct RekapContext {
    pub kind: RekapKind,
    pub date: NaiveDate,
    pub shift: String,
    pub operator: String,
}

impl RekapContext {
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Accepts cost values given as JSON numbers or numeric strings; anything else is dropped
fn deserialize_costs<'de, D>(deserializer: D) -> Result<HashMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(plu, value)| {
            let cost = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            Some((plu, cost))
        })
        .collect())
}

/// An item that cannot be processed until its cost is supplied
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct PendingCostItem {
    pub plu: String,
    #[serde(rename = "descp")]
    pub description: String,
    #[serde(rename = "hpp", serialize_with = "serialize_cost")]
    pub cost: f64,
}

/// Whole costs go out as integers, so an unknown cost reads `0` rather than `0.0`
fn serialize_cost<S: Serializer>(cost: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if cost.fract() == 0.0 && cost.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*cost as i64)
    } else {
        serializer.serialize_f64(*cost)
    }
}

impl PendingCostItem {
    pub fn from_item(item: &Item) -> Self {
        PendingCostItem {
            plu: item.plu.clone(),
            description: item.description.clone(),
            cost: 0.0,
        }
    }
}

/// A derived reconciliation row, written once and never updated
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RekapRecord {
    pub id: String,
    pub date: String,
    pub operator: String,
    pub plu: String,
    pub description: String,
    pub category: String,
    pub tag: String,
    pub stock_quantity: i64,
    pub variance_quantity: i64,
    pub variance_value: f64,
    pub timestamp: String,
}

impl RekapRecord {
    /// Cell values for one sheet row; only the stock set carries the timestamp
    pub fn to_row(&self, set: RecordSet) -> Vec<Value> {
        let mut row = vec![
            Value::from(self.id.clone()),
            Value::from(self.date.clone()),
            Value::from(self.operator.clone()),
            Value::from(self.plu.clone()),
            Value::from(self.description.clone()),
            Value::from(self.category.clone()),
            Value::from(self.tag.clone()),
            Value::from(self.stock_quantity),
            Value::from(self.variance_quantity),
            Value::from(self.variance_value),
        ];
        if set == RecordSet::Stock {
            row.push(Value::from(self.timestamp.clone()));
        }
        row
    }
}

/// Record id: plu and date plus the submission time in milliseconds
pub fn record_id(plu: &str, date: &str, millis: i64) -> String {
    format!("REKAP_{}_{}_{}", plu, date, millis)
}

/// Outcome of appending one record set
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppendSummary {
    pub total_records: usize,
    /// Reply of the spreadsheet service
    pub result: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rekap_kind_parsing() {
        assert_eq!(RekapKind::parse("so"), Some(RekapKind::Stock));
        assert_eq!(
            RekapKind::parse("rekonsiliasi"),
            Some(RekapKind::Reconciliation)
        );
        assert_eq!(RekapKind::parse(" both "), Some(RekapKind::Both));
        assert_eq!(RekapKind::parse("weekly"), None);
        assert!(RekapKind::Both.includes_stock() && RekapKind::Both.includes_reconciliation());
        assert!(!RekapKind::Stock.includes_reconciliation());
    }

    #[test]
    fn request_accepts_numeric_and_string_costs() {
        let request: RekapRequest = serde_json::from_value(json!({
            "type": "so",
            "tanggal": "2024-01-01",
            "shift": "1",
            "operator": "Ana",
            "hppValues": { "A1": 5.5, "B2": "7", "C3": "abc", "D4": null }
        }))
        .unwrap();

        assert_eq!(request.kind.as_deref(), Some("so"));
        assert_eq!(request.supplied_costs.len(), 2);
        assert_eq!(request.supplied_costs["A1"], 5.5);
        assert_eq!(request.supplied_costs["B2"], 7.0);
    }

    #[test]
    fn request_fields_default_when_absent() {
        let request: RekapRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.kind.is_none());
        assert!(request.date.is_none());
        assert!(request.supplied_costs.is_empty());
    }

    #[test]
    fn stock_rows_carry_timestamp_reconciliation_rows_do_not() {
        let record = RekapRecord {
            id: record_id("A1", "2024-01-01", 1_704_067_200_000),
            date: "2024-01-01".into(),
            operator: "Ana".into(),
            plu: "A1".into(),
            description: "Widget".into(),
            category: "Tools".into(),
            tag: "T".into(),
            stock_quantity: 12,
            variance_quantity: -2,
            variance_value: -10.0,
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        };

        let stock = record.to_row(RecordSet::Stock);
        let recon = record.to_row(RecordSet::Reconciliation);
        assert_eq!(stock.len(), STOCK_HEADERS.len());
        assert_eq!(recon.len(), RECONCILIATION_HEADERS.len());
        assert_eq!(stock[0], json!("REKAP_A1_2024-01-01_1704067200000"));
        assert_eq!(stock[10], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(recon[9], json!(-10.0));
    }

    #[test]
    fn pending_item_serialises_with_wire_names() {
        let item = Item {
            plu: "A1".into(),
            description: "Widget".into(),
            category: String::new(),
            tag: String::new(),
            cost: 0.0,
        };
        let pending = serde_json::to_value(PendingCostItem::from_item(&item)).unwrap();
        assert_eq!(pending.to_string(), r#"{"descp":"Widget","hpp":0,"plu":"A1"}"#);

        let costed = PendingCostItem {
            cost: 12.5,
            ..PendingCostItem::from_item(&item)
        };
        assert_eq!(serde_json::to_value(costed).unwrap()["hpp"], json!(12.5));
    }
}
