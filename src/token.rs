use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{RekapError, RekapResult};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: u64 = 3600;
/// Tokens are refreshed this long before the upstream expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer credentials for the spreadsheet service
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> RekapResult<String>;
}

/// Google service-account descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub token_uri: String,
}

impl ServiceAccount {
    /// Check that every field needed to sign an assertion is present
    pub fn validate(&self) -> RekapResult<()> {
        let required = [
            ("project_id", &self.project_id),
            ("private_key_id", &self.private_key_id),
            ("private_key", &self.private_key),
            ("client_email", &self.client_email),
            ("token_uri", &self.token_uri),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(RekapError::Auth(format!(
                "service account is missing {}",
                missing.join(", ")
            )));
        }
        if !self.client_email.contains('@') {
            return Err(RekapError::Auth(format!(
                "service account client_email '{}' is not an email address",
                self.client_email
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: SystemTime,
}

/// Exchanges a signed JWT assertion for an OAuth access token, caching it until near expiry
pub struct ServiceAccountTokenProvider {
    account: ServiceAccount,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenProvider {
    pub fn new(account: ServiceAccount, http: reqwest::Client) -> Self {
        Self {
            account,
            http,
            cached: Mutex::new(None),
        }
    }

    fn sign_assertion(&self, now: u64) -> RekapResult<String> {
        let claims = Claims {
            iss: &self.account.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.account.private_key_id.clone());

        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .map_err(|e| RekapError::Auth(format!("invalid private key: {}", e)))?;

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| RekapError::Auth(format!("failed to sign assertion: {}", e)))
    }

    async fn exchange(&self) -> RekapResult<CachedToken> {
        self.account.validate()?;

        let now = SystemTime::now();
        let epoch = now
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RekapError::Auth(e.to_string()))?
            .as_secs();
        let assertion = self.sign_assertion(epoch)?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| RekapError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RekapError::Auth(format!(
                "token exchange rejected (HTTP {}): {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let reply: TokenReply = response
            .json()
            .await
            .map_err(|e| RekapError::Auth(format!("unreadable token reply: {}", e)))?;

        let lifetime = Duration::from_secs(reply.expires_in.unwrap_or(ASSERTION_LIFETIME));
        tracing::debug!(expires_in = lifetime.as_secs(), "issued sheets access token");

        Ok(CachedToken {
            value: reply.access_token,
            refresh_at: now + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> RekapResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if SystemTime::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

/// Serves a token issued elsewhere
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> RekapResult<String> {
        if self.token.is_empty() {
            return Err(RekapError::Auth("access token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}
