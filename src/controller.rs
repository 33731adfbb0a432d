//! Client-side rekap workflow.
//!
//! The controller never touches a display. Every operation takes the current
//! [`UiState`] and returns the next state together with a list of [`Render`]
//! instructions; a front-end (the `rekap-cli` binary, for one) applies them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::ApiClient;
use crate::engine::usable_cost;
use crate::error::RekapResult;
use crate::model::PendingCostItem;
use crate::repository::MasterColumns;
use crate::storage::{self, HISTORY_KEY, ITEMS_KEY, LocalStore, SETTINGS_KEY};

const ITEMS_PATH: &str = "/api/sheets?sheetName=MS&range=A:H";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Dashboard,
    Rekap,
    Hpp,
    History,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// An item as the client caches it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedItem {
    pub plu: String,
    pub descp: String,
    pub hpp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Rekap date as entered on the form
    pub date: String,
    pub kind: String,
    pub shift: String,
    pub operator: String,
    pub message: String,
    pub submitted_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedCost {
    pub plu: String,
    pub description: String,
    pub cost: f64,
}

/// Instructions for the front-end
#[derive(Debug, Clone, PartialEq)]
pub enum Render {
    Toast { message: String, level: ToastLevel },
    /// Ask for one positive cost per item
    CostPrompt { items: Vec<PendingCostItem> },
    /// Highlight a cost input as accepted or rejected
    MarkCostInput { plu: String, valid: bool },
    HideModal,
    /// Costs held for the next submission
    CostConfirmation { entries: Vec<ConfirmedCost> },
    Dashboard {
        total_items: usize,
        zero_cost_items: usize,
        today_rekap: usize,
    },
    ConnectionStatus { online: bool },
    ResetForm,
    ActiveTab(Tab),
}

fn toast(message: impl Into<String>, level: ToastLevel) -> Render {
    Render::Toast {
        message: message.into(),
        level,
    }
}

/// Everything the client knows between interactions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub items: Vec<CachedItem>,
    pub history: Vec<HistoryEntry>,
    pub settings: BTreeMap<String, Value>,
    pub active_tab: Tab,
    /// Items from the last cost prompt
    pub pending: Vec<PendingCostItem>,
    /// Costs the operator confirmed, sent with the next submission
    pub confirmed_costs: BTreeMap<String, f64>,
}

pub type Step = (UiState, Vec<Render>);

/// The rekap form as filled in by the operator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RekapForm {
    pub date: String,
    pub shift: String,
    pub operator: String,
    /// `so`, `rekonsiliasi` or `both`
    pub kind: String,
}

/// Local gate run before any submission reaches the backend
pub fn validate_form(form: &RekapForm) -> Result<(), String> {
    if form.date.trim().is_empty() {
        return Err("Select a date first".to_string());
    }
    if form.shift.trim().is_empty() {
        return Err("Select a shift first".to_string());
    }
    if form.operator.trim().is_empty() {
        return Err("Enter the operator name first".to_string());
    }
    Ok(())
}

/// JSON body for `POST /api/rekap`
pub fn rekap_payload(form: &RekapForm, state: &UiState) -> Value {
    json!({
        "type": form.kind,
        "tanggal": form.date,
        "shift": form.shift,
        "operator": form.operator,
        "hppValues": state.confirmed_costs,
    })
}

pub fn switch_tab(mut state: UiState, tab: Tab) -> Step {
    state.active_tab = tab;
    (state, vec![Render::ActiveTab(tab)])
}

pub fn dashboard(state: &UiState, today: NaiveDate) -> Render {
    let today = today.format("%Y-%m-%d").to_string();
    Render::Dashboard {
        total_items: state.items.len(),
        zero_cost_items: state.items.iter().filter(|i| i.hpp == 0.0).count(),
        today_rekap: state.history.iter().filter(|h| h.date == today).count(),
    }
}

/// Decode master rows (header first) into cached items, dropping rows without a plu
pub fn items_from_rows(rows: &[Vec<String>]) -> RekapResult<Vec<CachedItem>> {
    let Some((header, data)) = rows.split_first() else {
        return Ok(Vec::new());
    };
    let columns = MasterColumns::locate(header, "MS")?;
    Ok(data
        .iter()
        .filter_map(|row| columns.item(row))
        .map(|item| CachedItem {
            plu: item.plu,
            descp: item.description,
            hpp: item.cost,
        })
        .collect())
}

/// Show the cost prompt for `items`
pub fn prompt_costs(mut state: UiState, items: Vec<PendingCostItem>) -> Step {
    state.pending = items.clone();
    (state, vec![Render::CostPrompt { items }])
}

/// Validate the cost prompt and keep the entered values for the next submission
///
/// `inputs` pairs each plu with the raw text typed for it. Nothing is resubmitted;
/// the operator triggers the rekap again.
pub fn save_cost_inputs(mut state: UiState, inputs: &[(String, String)]) -> Step {
    let mut renders = Vec::new();
    let mut accepted = BTreeMap::new();
    let mut all_valid = true;

    for (plu, raw) in inputs {
        match raw.trim().parse::<f64>().ok().filter(|v| usable_cost(*v)) {
            Some(cost) => {
                accepted.insert(plu.clone(), cost);
                renders.push(Render::MarkCostInput {
                    plu: plu.clone(),
                    valid: true,
                });
            }
            None => {
                all_valid = false;
                renders.push(Render::MarkCostInput {
                    plu: plu.clone(),
                    valid: false,
                });
            }
        }
    }

    let missing = state
        .pending
        .iter()
        .any(|p| !inputs.iter().any(|(plu, _)| plu == &p.plu));
    if !all_valid || missing {
        renders.push(toast(
            "Fill every HPP value with a positive number",
            ToastLevel::Warning,
        ));
        return (state, renders);
    }

    state.confirmed_costs.extend(accepted);
    let entries = state
        .confirmed_costs
        .iter()
        .map(|(plu, cost)| ConfirmedCost {
            plu: plu.clone(),
            description: describe(&state, plu),
            cost: *cost,
        })
        .collect();
    state.pending.clear();

    renders.push(Render::HideModal);
    renders.push(Render::CostConfirmation { entries });
    renders.push(toast("HPP saved", ToastLevel::Success));
    (state, renders)
}

fn describe(state: &UiState, plu: &str) -> String {
    state
        .items
        .iter()
        .find(|i| i.plu == plu)
        .map(|i| i.descp.clone())
        .or_else(|| {
            state
                .pending
                .iter()
                .find(|p| p.plu == plu)
                .map(|p| p.description.clone())
        })
        .unwrap_or_default()
}

/// Fold a `/api/rekap` reply into the state
pub fn apply_rekap_response(
    mut state: UiState,
    form: &RekapForm,
    response: &Value,
    now: chrono::DateTime<Utc>,
) -> Step {
    let message = response["message"].as_str().unwrap_or_default().to_string();

    if response["success"].as_bool() == Some(true) {
        state.history.push(HistoryEntry {
            date: form.date.clone(),
            kind: form.kind.clone(),
            shift: form.shift.clone(),
            operator: form.operator.clone(),
            message: message.clone(),
            submitted_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        state.confirmed_costs.clear();
        return (
            state,
            vec![toast(message, ToastLevel::Success), Render::ResetForm],
        );
    }

    if let Some(needed) = response.get("needHppInput") {
        match serde_json::from_value::<Vec<PendingCostItem>>(needed.clone()) {
            Ok(items) => return prompt_costs(state, items),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable needHppInput list");
            }
        }
    }

    let message = if message.is_empty() {
        "Rekap was not processed".to_string()
    } else {
        message
    };
    (state, vec![toast(message, ToastLevel::Warning)])
}

/// Drives the workflow against a backend and a local cache
pub struct Controller {
    api: Arc<dyn ApiClient>,
    store: Arc<dyn LocalStore>,
}

impl Controller {
    pub fn new(api: Arc<dyn ApiClient>, store: Arc<dyn LocalStore>) -> Self {
        Self { api, store }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Restore settings and history, load items and greet
    pub async fn init(&self, mut state: UiState) -> Step {
        state.settings = storage::load(self.store.as_ref(), SETTINGS_KEY).unwrap_or_default();
        if let Some(history) = storage::load(self.store.as_ref(), HISTORY_KEY) {
            state.history = history;
        }

        let (state, mut renders) = self.load_initial_data(state).await;
        renders.push(toast("App ready", ToastLevel::Success));
        (state, renders)
    }

    /// Reload items and refresh the dashboard
    pub async fn load_initial_data(&self, state: UiState) -> Step {
        let state = self.load_items(state).await;
        let renders = vec![dashboard(&state, Self::today())];
        (state, renders)
    }

    /// Fetch master items, caching them; on any failure fall back to the cache silently
    pub async fn load_items(&self, mut state: UiState) -> UiState {
        match self.fetch_items().await {
            Ok(items) => {
                storage::save(self.store.as_ref(), ITEMS_KEY, &items);
                state.items = items;
            }
            Err(e) => {
                tracing::warn!(error = %e, "loading items failed, using cache");
                if let Some(cached) = storage::load(self.store.as_ref(), ITEMS_KEY) {
                    state.items = cached;
                }
            }
        }
        state
    }

    async fn fetch_items(&self) -> RekapResult<Vec<CachedItem>> {
        let response = self.api.get(ITEMS_PATH).await?;
        if response["success"].as_bool() != Some(true) {
            return Err(crate::error::RekapError::DataUnavailable(
                "item listing was not successful".to_string(),
            ));
        }
        let rows: Vec<Vec<String>> = serde_json::from_value(response["data"].clone())?;
        items_from_rows(&rows)
    }

    /// Submit the form; the local gate runs first and may stop the call
    pub async fn submit(&self, state: UiState, form: &RekapForm) -> Step {
        if let Err(message) = validate_form(form) {
            return (state, vec![toast(message, ToastLevel::Warning)]);
        }

        let payload = rekap_payload(form, &state);
        let response = match self.api.post("/api/rekap", &payload).await {
            Ok(response) => response,
            Err(e) => return (state, vec![toast(e.to_string(), ToastLevel::Error)]),
        };

        let succeeded = response["success"].as_bool() == Some(true);
        let (state, mut renders) = apply_rekap_response(state, form, &response, Utc::now());
        if !succeeded {
            return (state, renders);
        }

        storage::save(self.store.as_ref(), HISTORY_KEY, &state.history);
        let (state, reload) = self.load_initial_data(state).await;
        renders.extend(reload);
        (state, renders)
    }

    /// Ask the backend for zero-cost items and prompt for them
    pub async fn check_costs(&self, state: UiState) -> Step {
        let response = match self.api.get("/api/check-hpp").await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "check-hpp failed");
                return (state, vec![toast("Failed to check HPP", ToastLevel::Error)]);
            }
        };

        let items: Vec<PendingCostItem> =
            serde_json::from_value(response["zeroHppItems"].clone()).unwrap_or_default();
        if response["success"].as_bool() == Some(true) && !items.is_empty() {
            return prompt_costs(state, items);
        }
        (
            state,
            vec![toast("All items already have HPP", ToastLevel::Success)],
        )
    }

    pub async fn test_connection(&self, state: UiState) -> Step {
        match self.api.get("/api/health").await {
            Ok(_) => (
                state,
                vec![
                    Render::ConnectionStatus { online: true },
                    toast("Connection OK", ToastLevel::Success),
                ],
            ),
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                (
                    state,
                    vec![
                        Render::ConnectionStatus { online: false },
                        toast("Connection failed", ToastLevel::Error),
                    ],
                )
            }
        }
    }

    pub async fn sync(&self, state: UiState) -> Step {
        let mut renders = vec![toast("Synchronising data...", ToastLevel::Info)];
        let (state, reload) = self.load_initial_data(state).await;
        renders.extend(reload);
        renders.push(toast("Data synchronised", ToastLevel::Success));
        (state, renders)
    }

    /// Drop every cached key, then reload
    pub async fn clear_cache(&self, state: UiState) -> Step {
        storage::clear_all(self.store.as_ref());
        let mut renders = vec![toast("Cache cleared", ToastLevel::Success)];
        let (state, reload) = self.load_initial_data(state).await;
        renders.extend(reload);
        (state, renders)
    }
}
