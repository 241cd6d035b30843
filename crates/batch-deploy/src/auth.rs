//! Service Principal Authentication

use crate::payload::EnvironmentSetting;
use crate::BatchError;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Token audience for the Batch service
pub const BATCH_RESOURCE: &str = "https://batch.core.windows.net/";

const AUTHORITY: &str = "https://login.microsoftonline.com";
/// Tokens are refreshed this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Client credentials used both for API access and inside the containers
#[derive(Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl ServicePrincipal {
    /// Read `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and `AZURE_TENANT_ID`
    pub fn from_env() -> Result<Self, BatchError> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| BatchError::Config(format!("{} is not set", name)))
        };
        Ok(Self {
            client_id: var("AZURE_CLIENT_ID")?,
            client_secret: var("AZURE_CLIENT_SECRET")?,
            tenant_id: var("AZURE_TENANT_ID")?,
        })
    }

    /// Environment forwarded to every container task
    pub fn environment(&self) -> Vec<EnvironmentSetting> {
        [
            ("AZURE_CLIENT_ID", &self.client_id),
            ("AZURE_CLIENT_SECRET", &self.client_secret),
            ("AZURE_TENANT_ID", &self.tenant_id),
        ]
        .into_iter()
        .map(|(name, value)| EnvironmentSetting {
            name: name.to_string(),
            value: value.clone(),
        })
        .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds; the v1 endpoint sends it as a string
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn lifetime(&self) -> Duration {
        let secs = match &self.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        Duration::from_secs(secs.unwrap_or(3600))
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client-credentials token source with an in-memory cache
pub struct TokenProvider {
    client: reqwest::Client,
    principal: ServicePrincipal,
    authority: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(client: reqwest::Client, principal: ServicePrincipal) -> Self {
        Self {
            client,
            principal,
            authority: AUTHORITY.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Override the login endpoint
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    pub fn principal(&self) -> &ServicePrincipal {
        &self.principal
    }

    /// Bearer token for the Batch resource
    pub async fn token(&self) -> Result<String, BatchError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/{}/oauth2/token", self.authority, self.principal.tenant_id);
        debug!("Requesting token from {}", url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.principal.client_id.as_str()),
                ("client_secret", self.principal.client_secret.as_str()),
                ("resource", BATCH_RESOURCE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BatchError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BatchError::Auth(format!("Invalid token response: {}", e)))?;
        let lifetime = token.lifetime().saturating_sub(EXPIRY_MARGIN);
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }
}
