//! HubSpot-style CRM REST client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

use crate::error::CrmError;

/// Page size for full-listing pagination.
const PAGE_LIMIT: u32 = 100;

/// CRM object types the client operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Contact records.
    Contacts,
    /// Company records.
    Companies,
}

impl ObjectKind {
    /// Path segment for this object type.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Companies => "companies",
        }
    }

    /// The property conventionally used for existence/search lookups.
    #[must_use]
    pub fn search_property(&self) -> &'static str {
        match self {
            Self::Contacts => "email",
            Self::Companies => "domain",
        }
    }
}

/// Configuration for the CRM client.
#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    /// Private-app access token.
    pub token: String,
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.hubapi.com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Deserialize)]
struct PageResponse {
    results: Vec<JsonValue>,
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    next: Option<PagingNext>,
}

#[derive(Deserialize)]
struct PagingNext {
    after: String,
}

#[derive(Deserialize)]
struct ResultsResponse {
    results: Vec<JsonValue>,
}

/// Thin client over the CRM objects API.
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
}

impl CrmClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `CrmError::Operation` if the HTTP client cannot be built.
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!(
            "Bearer {}",
            config.token
        ))
        .map_err(|e| CrmError::Operation {
            detail: format!("invalid token value: {e}"),
        })?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| CrmError::Operation {
                detail: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn objects_url(&self, kind: ObjectKind) -> String {
        format!("{}/crm/v3/objects/{}", self.base_url, kind.path())
    }

    /// Retrieves all records of a type, following pagination.
    pub async fn list_all(&self, kind: ObjectKind) -> Result<Vec<JsonValue>, CrmError> {
        let mut all = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.objects_url(kind))
                .query(&[("limit", PAGE_LIMIT.to_string())]);
            if let Some(cursor) = &after {
                request = request.query(&[("after", cursor.as_str())]);
            }

            let page: PageResponse = decode(request.send().await).await?;
            all.extend(page.results);

            match page.paging.and_then(|p| p.next) {
                Some(next) => after = Some(next.after),
                None => break,
            }
        }

        Ok(all)
    }

    /// Retrieves one record by id.
    pub async fn get(&self, kind: ObjectKind, id: &str) -> Result<JsonValue, CrmError> {
        let url = format!("{}/{}", self.objects_url(kind), id);
        decode(self.http.get(url).send().await).await
    }

    /// Creates a record from a property map.
    pub async fn create(
        &self,
        kind: ObjectKind,
        properties: JsonValue,
    ) -> Result<JsonValue, CrmError> {
        let body = json!({ "properties": properties });
        decode(self.http.post(self.objects_url(kind)).json(&body).send().await).await
    }

    /// Updates a record's properties.
    pub async fn update(
        &self,
        kind: ObjectKind,
        id: &str,
        properties: JsonValue,
    ) -> Result<JsonValue, CrmError> {
        let url = format!("{}/{}", self.objects_url(kind), id);
        let body = json!({ "properties": properties });
        decode(self.http.patch(url).json(&body).send().await).await
    }

    /// Archives (deletes) a record.
    pub async fn archive(&self, kind: ObjectKind, id: &str) -> Result<(), CrmError> {
        let url = format!("{}/{}", self.objects_url(kind), id);
        let response = self.http.delete(url).send().await.map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }

    /// Searches records where a property equals a value.
    pub async fn search(
        &self,
        kind: ObjectKind,
        property: &str,
        value: &str,
        limit: u32,
    ) -> Result<Vec<JsonValue>, CrmError> {
        let url = format!("{}/search", self.objects_url(kind));
        let body = search_body(property, value, limit);
        let found: ResultsResponse = decode(self.http.post(url).json(&body).send().await).await?;
        Ok(found.results)
    }

    /// Returns true if a record with the given lookup value exists.
    pub async fn exists(&self, kind: ObjectKind, value: &str) -> Result<bool, CrmError> {
        let results = self.search(kind, kind.search_property(), value, 1).await?;
        Ok(!results.is_empty())
    }

    /// Creates multiple records in one batch.
    pub async fn batch_create(
        &self,
        kind: ObjectKind,
        items: Vec<JsonValue>,
    ) -> Result<Vec<JsonValue>, CrmError> {
        let url = format!("{}/batch/create", self.objects_url(kind));
        let inputs: Vec<JsonValue> = items
            .into_iter()
            .map(|properties| json!({ "properties": properties }))
            .collect();
        let body = json!({ "inputs": inputs });
        let created: ResultsResponse = decode(self.http.post(url).json(&body).send().await).await?;
        Ok(created.results)
    }

    /// Updates multiple records in one batch.
    ///
    /// Each update pairs a record id with the properties to set.
    pub async fn batch_update(
        &self,
        kind: ObjectKind,
        updates: Vec<(String, JsonValue)>,
    ) -> Result<Vec<JsonValue>, CrmError> {
        let url = format!("{}/batch/update", self.objects_url(kind));
        let inputs: Vec<JsonValue> = updates
            .into_iter()
            .map(|(id, properties)| json!({ "id": id, "properties": properties }))
            .collect();
        let body = json!({ "inputs": inputs });
        let updated: ResultsResponse = decode(self.http.post(url).json(&body).send().await).await?;
        Ok(updated.results)
    }
}

/// Builds the equality-filter search request body.
fn search_body(property: &str, value: &str, limit: u32) -> JsonValue {
    json!({
        "filterGroups": [{
            "filters": [{
                "propertyName": property,
                "operator": "EQ",
                "value": value,
            }],
        }],
        "limit": limit,
    })
}

fn transport(e: reqwest::Error) -> CrmError {
    CrmError::Operation {
        detail: e.to_string(),
    }
}

/// Maps a response status to the two-kind error contract.
fn classify(status: StatusCode, detail: String) -> CrmError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        CrmError::Unauthorized { detail }
    } else {
        CrmError::Operation {
            detail: format!("{status}: {detail}"),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CrmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, "crm request rejected");
    Err(classify(status, detail))
}

async fn decode<T: serde::de::DeserializeOwned>(
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, CrmError> {
    let response = check_status(result.map_err(transport)?).await?;
    response.json().await.map_err(transport)
}
