//! Google Sheets dataset sink: service-account JWT exchange plus the
//! spreadsheet REST calls behind the engine's `DatasetSink` seam.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use export_logging::export_info;
use exporter_core::TabularArtifact;
use exporter_engine::{DatasetSink, SinkError};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Refresh this long before the token actually expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
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
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: SystemTime,
}

/// Writes artifacts into tabs of one spreadsheet. Tabs are created on first
/// use, then cleared and rewritten whole, headers in row one.
pub struct SheetsSink {
    http: reqwest::Client,
    sheet_id: String,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl SheetsSink {
    pub fn new(sheet_id: &str, service_account_path: &Path) -> Result<Self, SinkError> {
        let text = std::fs::read_to_string(service_account_path).map_err(|e| {
            SinkError::new(format!(
                "could not read service account key {service_account_path:?}: {e}"
            ))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&text)
            .map_err(|e| SinkError::new(format!("invalid service account key: {e}")))?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SinkError::new(format!("invalid service account private key: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            sheet_id: sheet_id.to_string(),
            key,
            signing_key,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, SinkError> {
        let now = SystemTime::now();
        if let Some(cached) = self.token.lock().map_err(poisoned)?.as_ref() {
            if cached.expires_at > now + TOKEN_SLACK {
                return Ok(cached.value.clone());
            }
        }

        let iat = now
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SinkError::new(format!("system clock before epoch: {e}")))?
            .as_secs();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + TOKEN_LIFETIME.as_secs(),
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| SinkError::new(format!("could not sign token request: {e}")))?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SinkError::new(format!("token exchange failed: {e}")))?
            .error_for_status()
            .map_err(|e| SinkError::new(format!("token exchange rejected: {e}")))?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SinkError::new(format!("malformed token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(TOKEN_LIFETIME.as_secs()));
        *self.token.lock().map_err(poisoned)? = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + lifetime,
        });
        Ok(token.access_token)
    }

    async fn ensure_tab_exists(&self, token: &str, tab: &str) -> Result<(), SinkError> {
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}?fields=sheets.properties.title",
            self.sheet_id
        );
        let meta: serde_json::Value = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SinkError::new(format!("spreadsheet lookup failed: {e}")))?
            .error_for_status()
            .map_err(|e| SinkError::new(format!("spreadsheet lookup rejected: {e}")))?
            .json()
            .await
            .map_err(|e| SinkError::new(format!("malformed spreadsheet metadata: {e}")))?;

        let exists = meta["sheets"]
            .as_array()
            .into_iter()
            .flatten()
            .any(|sheet| sheet["properties"]["title"].as_str() == Some(tab));
        if exists {
            return Ok(());
        }

        export_info!("creating missing tab '{tab}'");
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}:batchUpdate",
            self.sheet_id
        );
        let body = serde_json::json!({
            "requests": [{ "addSheet": { "properties": { "title": tab } } }]
        });
        self.http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::new(format!("tab creation failed: {e}")))?
            .error_for_status()
            .map_err(|e| SinkError::new(format!("tab creation rejected: {e}")))?;
        Ok(())
    }

    async fn clear_tab(&self, token: &str, tab: &str) -> Result<(), SinkError> {
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}:clear",
            self.sheet_id,
            urlencode(&tab_range(tab))
        );
        self.http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| SinkError::new(format!("clearing '{tab}' failed: {e}")))?
            .error_for_status()
            .map_err(|e| SinkError::new(format!("clearing '{tab}' rejected: {e}")))?;
        Ok(())
    }

    async fn write_values(
        &self,
        token: &str,
        tab: &str,
        values: &[Vec<String>],
    ) -> Result<(), SinkError> {
        let range = format!("{}!A1", tab_range(tab));
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}?valueInputOption=RAW",
            self.sheet_id,
            urlencode(&range)
        );
        let body = serde_json::json!({ "range": range, "values": values });
        self.http
            .put(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::new(format!("writing '{tab}' failed: {e}")))?
            .error_for_status()
            .map_err(|e| SinkError::new(format!("writing '{tab}' rejected: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl DatasetSink for SheetsSink {
    async fn overwrite_tab(&self, tab: &str, artifact: &TabularArtifact) -> Result<(), SinkError> {
        let token = self.access_token().await?;
        self.ensure_tab_exists(&token, tab).await?;
        self.clear_tab(&token, tab).await?;
        self.write_values(&token, tab, &sheet_values(artifact)).await?;
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> SinkError {
    SinkError::new("token cache lock poisoned")
}

/// Headers first, then every row, exactly as the tab should read.
fn sheet_values(artifact: &TabularArtifact) -> Vec<Vec<String>> {
    let mut values = Vec::with_capacity(artifact.rows.len() + 1);
    values.push(artifact.headers.clone());
    values.extend(artifact.rows.iter().cloned());
    values
}

/// A1-notation tab reference; single quotes in tab names double up.
fn tab_range(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

/// Everything outside the RFC 3986 unreserved set escapes, which is what the
/// Sheets API expects for the range path segment.
const RANGE_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn urlencode(raw: &str) -> String {
    utf8_percent_encode(raw, RANGE_ESCAPES).to_string()
}
