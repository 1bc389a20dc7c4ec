//! Live contact directory backed by the CRM's HTTPS API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::CrmConfig;
use crate::directory::ContactDirectory;
use crate::error::{BridgeError, DirectoryError};
use crate::metrics::MetricsCollector;
use crate::models::{ActivityRecord, ActivityType, CallOutcome, Contact};

const API_KEY_HEADER: &str = "x-api-key";

/// Number or numeric string; any other shape counts as absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Informational text: strings pass through, scalars are rendered, the rest is dropped.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

/// Client record as the CRM returns it.
///
/// Only `id` drives processing; every other field is informational and never
/// fails the decode because of its JSON type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmClientRecord {
    /// Client id, which is also the opportunity id
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    /// First name
    #[serde(default, deserialize_with = "lenient_text")]
    pub first_name: Option<String>,
    /// Last name
    #[serde(default, deserialize_with = "lenient_text")]
    pub last_name: Option<String>,
    /// Email address
    #[serde(default, deserialize_with = "lenient_text")]
    pub email_address: Option<String>,
    /// Phone number as stored
    #[serde(default, deserialize_with = "lenient_text")]
    pub phone_number: Option<String>,
    /// Company name
    #[serde(default, deserialize_with = "lenient_text")]
    pub company_name: Option<String>,
    /// Street address
    #[serde(default, deserialize_with = "lenient_text")]
    pub address_line1: Option<String>,
    /// City
    #[serde(default, deserialize_with = "lenient_text")]
    pub city: Option<String>,
    /// State or province
    #[serde(default, deserialize_with = "lenient_text")]
    pub state: Option<String>,
    /// Postal code
    #[serde(default, deserialize_with = "lenient_text")]
    pub zip: Option<String>,
}

impl From<CrmClientRecord> for Contact {
    /// The CRM client id doubles as the opportunity id.
    fn from(record: CrmClientRecord) -> Self {
        Self {
            id: record.id.map(|id| id.to_string()).unwrap_or_default(),
            opportunity_id: record.id,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email_address,
            phone: record.phone_number,
            company: record.company_name,
            address: record.address_line1,
            city: record.city,
            state: record.state,
            zip: record.zip,
        }
    }
}

/// Lookup responses are either one client or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LookupBody {
    /// Array of clients, in CRM order
    Many(Vec<CrmClientRecord>),
    /// Single client object
    One(CrmClientRecord),
    /// `null` body
    Empty(Option<()>),
}

impl LookupBody {
    /// Flatten into contacts, preserving order
    pub fn into_contacts(self) -> Vec<Contact> {
        match self {
            Self::Many(records) => records.into_iter().map(Contact::from).collect(),
            Self::One(record) => vec![Contact::from(record)],
            Self::Empty(_) => Vec::new(),
        }
    }
}

/// Client-activity payload expected by the CRM
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientActivityRequest<'a> {
    /// Opportunity receiving the activity
    pub opportunity_id: u64,
    /// Milliseconds since the epoch
    pub activity_date_time: i64,
    /// Always `CALL`
    pub activity_type: ActivityType,
    /// CRM outcome enum value
    pub call_outcome: CallOutcome,
    /// Human-readable summary
    pub description: &'a str,
    /// Write token, passed through unmodified
    pub secret_key: &'a str,
}

impl<'a> From<&'a ActivityRecord> for ClientActivityRequest<'a> {
    fn from(record: &'a ActivityRecord) -> Self {
        Self {
            opportunity_id: record.opportunity_id,
            activity_date_time: record.occurred_at.timestamp_millis(),
            activity_type: record.activity_type,
            call_outcome: record.outcome,
            description: &record.description,
            secret_key: &record.auth_token,
        }
    }
}

/// Error text for a non-2xx body: `message`, then `error`, then the status line.
#[must_use]
pub fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"].iter().find_map(|field| {
                value
                    .get(field)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        })
}

/// CRM directory over HTTPS
pub struct CrmDirectory {
    client: Client,
    base_url: String,
    activity_url: String,
    metrics: MetricsCollector,
}

impl CrmDirectory {
    /// Build the HTTP client with the api key header and request timeout
    pub fn new(config: &CrmConfig) -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| BridgeError::InvalidConfig(format!("invalid CRM api key: {e}")))?;
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            activity_url: config.activity_url(),
            metrics: MetricsCollector::default(),
        })
    }

    async fn check(response: Response) -> Result<Response, DirectoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        warn!(status = status.as_u16(), %message, "CRM request failed");
        Err(DirectoryError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn query_clients(&self, phone: &str) -> Result<Vec<Contact>, DirectoryError> {
        let url = format!("{}/clients", self.base_url);
        let response = self.client.get(&url).query(&[("phone", phone)]).send().await?;
        let response = Self::check(response).await?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: LookupBody =
            serde_json::from_str(&body).map_err(|e| DirectoryError::Decode(e.to_string()))?;
        Ok(parsed.into_contacts())
    }

    fn record(&self, operation: &'static str, started: Instant, ok: bool) {
        self.metrics
            .record_directory_operation(operation, started.elapsed(), ok);
    }
}

#[async_trait]
impl ContactDirectory for CrmDirectory {
    #[instrument(name = "crm_find_by_phone", skip(self))]
    async fn find_by_phone(&self, e164: &str, last10: &str) -> Result<Vec<Contact>, DirectoryError> {
        let started = Instant::now();

        let mut result = self.query_clients(e164).await;
        if matches!(&result, Ok(contacts) if contacts.is_empty()) {
            debug!("No client for E.164 number, retrying with last 10 digits");
            result = self.query_clients(last10).await;
        }

        self.record("find_by_phone", started, result.is_ok());
        if let Ok(contacts) = &result {
            info!(matches = contacts.len(), "CRM client lookup finished");
        }
        result
    }

    #[instrument(name = "crm_create_activity", skip_all, fields(opportunity_id = record.opportunity_id))]
    async fn create_activity(&self, record: &ActivityRecord) -> Result<(), DirectoryError> {
        let started = Instant::now();
        let payload = ClientActivityRequest::from(record);

        let result = async {
            let response = self
                .client
                .post(&self.activity_url)
                .json(&payload)
                .send()
                .await?;
            Self::check(response).await.map(|_| ())
        }
        .await;

        self.record("create_activity", started, result.is_ok());
        result
    }
}
