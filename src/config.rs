use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{RekapError, RekapResult};
use crate::token::ServiceAccount;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_PUBLIC_DIR: &str = "public";
const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Names of the sheets the backend reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetNames {
    /// Master item data (`PLU`, `DESCP`, `C1`, `TAG`, `HPP`, ...)
    pub master: String,
    /// Range read from the master sheet
    pub master_range: String,
    /// Stock rekap output, rows carry a timestamp column
    pub stock: String,
    /// Reconciliation output, no timestamp column
    pub reconciliation: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            master: "MS".to_string(),
            master_range: "A:H".to_string(),
            stock: "RekapSo".to_string(),
            reconciliation: "RekapRekonsiliasi".to_string(),
        }
    }
}

/// Backend configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub public_dir: PathBuf,
    /// Reported by `/api/health`
    pub version: String,
    pub spreadsheet_id: String,
    pub sheets_api_base: String,
    pub service_account: ServiceAccount,
    /// Pre-issued bearer token; skips the service-account exchange when set
    pub access_token: Option<String>,
    pub sheets: SheetNames,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> RekapResult<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build a configuration from an explicit variable map
    ///
    /// # Errors
    /// * `RekapError::Config` when `GOOGLE_SHEETS_ID` is missing
    pub fn from_vars(vars: HashMap<String, String>) -> RekapResult<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let spreadsheet_id = get("GOOGLE_SHEETS_ID")
            .ok_or_else(|| RekapError::Config("GOOGLE_SHEETS_ID is not set".to_string()))?;

        // Keys pasted into env files usually carry literal "\n" sequences
        let private_key = vars
            .get("GOOGLE_PRIVATE_KEY")
            .map(|k| k.replace("\\n", "\n"))
            .unwrap_or_default();

        let service_account = ServiceAccount {
            project_id: get("GOOGLE_PROJECT_ID").unwrap_or_default(),
            private_key_id: get("GOOGLE_PRIVATE_KEY_ID").unwrap_or_default(),
            private_key,
            client_email: get("GOOGLE_CLIENT_EMAIL").unwrap_or_default(),
            client_id: get("GOOGLE_CLIENT_ID").unwrap_or_default(),
            token_uri: get("GOOGLE_TOKEN_URI").unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        };

        Ok(Config {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            public_dir: PathBuf::from(
                get("PUBLIC_DIR").unwrap_or_else(|| DEFAULT_PUBLIC_DIR.to_string()),
            ),
            version: get("APP_VERSION").unwrap_or_else(|| crate::VERSION.to_string()),
            spreadsheet_id,
            sheets_api_base: get("SHEETS_API_BASE")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            service_account,
            access_token: get("GOOGLE_ACCESS_TOKEN"),
            sheets: SheetNames::default(),
        })
    }
}
