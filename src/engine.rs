use std::sync::Arc;

use chrono::{NaiveDate, SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{RekapError, RekapResult};
use crate::model::{
    Item, PendingCostItem, RecordSet, RekapContext, RekapKind, RekapRecord, RekapRequest,
    record_id,
};
use crate::repository::ItemRepository;

/// Supplies per-item counts
///
/// There is no inventory integration yet, so the quantities are pluggable.
pub trait StockCounter: Send + Sync {
    /// Quantity on hand
    fn stock_quantity(&self, item: &Item) -> i64;

    /// Expected minus counted quantity
    fn variance_quantity(&self, item: &Item) -> i64;
}

/// Placeholder counter producing random quantities
///
/// Stock is drawn from 1..=100 and variance from -5..=4. Replace with a real
/// counter once stock movements are available.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCounter;

impl StockCounter for RandomCounter {
    fn stock_quantity(&self, _item: &Item) -> i64 {
        rand::thread_rng().gen_range(1..=100)
    }

    fn variance_quantity(&self, _item: &Item) -> i64 {
        rand::thread_rng().gen_range(-5..=4)
    }
}

/// Result of a submission
#[derive(Debug, Clone, PartialEq)]
pub enum RekapOutcome {
    /// Some items have no cost; nothing was appended
    Pending {
        items: Vec<PendingCostItem>,
        message: String,
    },
    /// Records were appended; `data` is keyed by record set
    Completed { message: String, data: Value },
}

/// Body returned for a submission, in either outcome
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RekapResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub need_hpp_input: Option<Vec<PendingCostItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RekapOutcome> for RekapResponse {
    fn from(outcome: RekapOutcome) -> Self {
        match outcome {
            RekapOutcome::Pending { items, message } => RekapResponse {
                success: false,
                message,
                need_hpp_input: Some(items),
                data: None,
            },
            RekapOutcome::Completed { message, data } => RekapResponse {
                success: true,
                message,
                need_hpp_input: None,
                data: Some(data),
            },
        }
    }
}

/// Validate the required fields of a submission
///
/// # Errors
/// * `RekapError::Validation` when date, shift or operator is blank, the type is
///   unknown, or the date is not `YYYY-MM-DD`
pub fn validate(request: &RekapRequest) -> RekapResult<RekapContext> {
    let present = |field: &Option<String>| {
        field
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let (date, shift, operator) = match (
        present(&request.date),
        present(&request.shift),
        present(&request.operator),
    ) {
        (Some(d), Some(s), Some(o)) => (d, s, o),
        _ => {
            return Err(RekapError::Validation(
                "Date, shift and operator are required".to_string(),
            ));
        }
    };

    let kind_text = present(&request.kind).unwrap_or_default();
    let kind = RekapKind::parse(&kind_text).ok_or_else(|| {
        RekapError::Validation(format!(
            "Unknown rekap type '{}', expected so, rekonsiliasi or both",
            kind_text
        ))
    })?;

    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
        RekapError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", date))
    })?;

    Ok(RekapContext {
        kind,
        date,
        shift,
        operator,
    })
}

/// A supplied cost must be a positive finite number to be used
pub fn usable_cost(cost: f64) -> bool {
    cost.is_finite() && cost > 0.0
}

/// Resolves costs, computes counts and writes rekap records
#[derive(Clone)]
pub struct ReconciliationEngine {
    repository: Arc<dyn ItemRepository>,
    counter: Arc<dyn StockCounter>,
}

impl ReconciliationEngine {
    pub fn new(repository: Arc<dyn ItemRepository>, counter: Arc<dyn StockCounter>) -> Self {
        Self {
            repository,
            counter,
        }
    }

    /// Items whose cost is still unknown
    pub async fn zero_cost_items(&self) -> RekapResult<Vec<PendingCostItem>> {
        let items = self.load_master().await?;
        Ok(items
            .iter()
            .filter(|item| !item.has_cost())
            .map(PendingCostItem::from_item)
            .collect())
    }

    async fn load_master(&self) -> RekapResult<Vec<Item>> {
        let items = self.repository.load_items().await?;
        if items.is_empty() {
            return Err(RekapError::DataUnavailable(
                "No items found in master sheet".to_string(),
            ));
        }
        Ok(items)
    }

    /// Process one rekap submission
    ///
    /// Supplied costs are written back per item as they are resolved, so they stay
    /// applied even when the call ends with pending items.
    pub async fn submit(&self, request: &RekapRequest) -> RekapResult<RekapOutcome> {
        let context = validate(request)?;
        let items = self.load_master().await?;

        let mut resolved: Vec<Item> = Vec::with_capacity(items.len());
        let mut pending: Vec<PendingCostItem> = Vec::new();

        for mut item in items {
            if item.plu.trim().is_empty() {
                continue;
            }
            if !item.has_cost() {
                match request.supplied_costs.get(&item.plu).copied() {
                    Some(cost) if usable_cost(cost) => {
                        if let Err(e) = self.repository.backfill_cost(&item.plu, cost).await {
                            tracing::warn!(plu = %item.plu, error = %e, "cost backfill failed");
                        }
                        item.cost = cost;
                    }
                    _ => {
                        pending.push(PendingCostItem::from_item(&item));
                        continue;
                    }
                }
            }
            resolved.push(item);
        }

        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "rekap waiting for manual costs");
            return Ok(RekapOutcome::Pending {
                message: format!("{} item(s) need manual HPP input", pending.len()),
                items: pending,
            });
        }

        let records = self.build_records(&context, &resolved);

        let mut data = Map::new();
        for set in sets_for(context.kind) {
            let summary = self.repository.append_records(set, &records).await?;
            data.insert(set.result_key().to_string(), serde_json::to_value(summary)?);
        }

        tracing::info!(
            kind = context.kind.as_str(),
            shift = %context.shift,
            records = records.len(),
            "rekap completed"
        );

        Ok(RekapOutcome::Completed {
            message: format!("Rekap {} created successfully", context.kind.as_str()),
            data: Value::Object(data),
        })
    }

    /// One record per resolved item; both record sets share the same counts
    pub fn build_records(&self, context: &RekapContext, items: &[Item]) -> Vec<RekapRecord> {
        let now = Utc::now();
        let millis = now.timestamp_millis();
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let date = context.date_string();

        items
            .iter()
            .map(|item| {
                let stock_quantity = self.counter.stock_quantity(item);
                let variance_quantity = self.counter.variance_quantity(item);
                RekapRecord {
                    id: record_id(&item.plu, &date, millis),
                    date: date.clone(),
                    operator: context.operator.clone(),
                    plu: item.plu.clone(),
                    description: item.description.clone(),
                    category: item.category.clone(),
                    tag: item.tag.clone(),
                    stock_quantity,
                    variance_quantity,
                    variance_value: variance_quantity as f64 * item.cost,
                    timestamp: timestamp.clone(),
                }
            })
            .collect()
    }
}

fn sets_for(kind: RekapKind) -> Vec<RecordSet> {
    let mut sets = Vec::with_capacity(2);
    if kind.includes_stock() {
        sets.push(RecordSet::Stock);
    }
    if kind.includes_reconciliation() {
        sets.push(RecordSet::Reconciliation);
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(kind: &str, date: &str, shift: &str, operator: &str) -> RekapRequest {
        RekapRequest {
            kind: Some(kind.to_string()),
            date: Some(date.to_string()),
            shift: Some(shift.to_string()),
            operator: Some(operator.to_string()),
            supplied_costs: HashMap::new(),
        }
    }

    #[test]
    fn validation_requires_date_shift_operator() {
        assert!(validate(&request("so", "2024-01-01", "1", "Ana")).is_ok());

        for bad in [
            request("so", "", "1", "Ana"),
            request("so", "2024-01-01", "  ", "Ana"),
            request("so", "2024-01-01", "1", ""),
            RekapRequest::default(),
        ] {
            assert!(matches!(validate(&bad), Err(RekapError::Validation(_))));
        }
    }

    #[test]
    fn validation_rejects_unknown_kind_and_bad_date() {
        assert!(matches!(
            validate(&request("weekly", "2024-01-01", "1", "Ana")),
            Err(RekapError::Validation(_))
        ));
        assert!(matches!(
            validate(&request("so", "01/02/2024", "1", "Ana")),
            Err(RekapError::Validation(_))
        ));
    }

    #[test]
    fn only_positive_costs_are_usable() {
        assert!(usable_cost(0.01));
        assert!(!usable_cost(0.0));
        assert!(!usable_cost(-3.0));
        assert!(!usable_cost(f64::NAN));
        assert!(!usable_cost(f64::INFINITY));
    }

    #[test]
    fn random_counter_stays_in_range() {
        let item = Item {
            plu: "A1".into(),
            description: String::new(),
            category: String::new(),
            tag: String::new(),
            cost: 1.0,
        };
        for _ in 0..200 {
            let stock = RandomCounter.stock_quantity(&item);
            let variance = RandomCounter.variance_quantity(&item);
            assert!((1..=100).contains(&stock));
            assert!((-5..=4).contains(&variance));
        }
    }

    #[test]
    fn sets_follow_kind() {
        assert_eq!(sets_for(RekapKind::Stock), vec![RecordSet::Stock]);
        assert_eq!(
            sets_for(RekapKind::Reconciliation),
            vec![RecordSet::Reconciliation]
        );
        assert_eq!(
            sets_for(RekapKind::Both),
            vec![RecordSet::Stock, RecordSet::Reconciliation]
        );
    }

    #[test]
    fn pending_outcome_renders_need_hpp_input() {
        let response = RekapResponse::from(RekapOutcome::Pending {
            items: vec![PendingCostItem {
                plu: "A1".into(),
                description: "Widget".into(),
                cost: 0.0,
            }],
            message: "1 item(s) need manual HPP input".into(),
        });
        let body = serde_json::to_value(response).unwrap();
        assert_eq!(body["success"], Value::Bool(false));
        assert_eq!(body["needHppInput"][0]["plu"], "A1");
        assert!(body.get("data").is_none());
    }
}
