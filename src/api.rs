//! Kitchen backend API client.
//!
//! The ledger talks to the backend through two narrow traits,
//! [`KitchenClient`] for submissions and [`PlacedItemsFetcher`] for
//! reconciliation. [`HttpKitchenApi`] implements both over HTTP, plus the
//! table-list calls the table screen needs.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::normalize_api_url;
use crate::error::ApiError;
use crate::menu::{parse_menu, MenuCategory};
use crate::models::{PlacedItem, SubmissionPayload, TableId};
use crate::tables::TableSummary;

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Submits new line items for a table to the kitchen.
#[async_trait]
pub trait KitchenClient: Send + Sync {
    async fn submit_new_items(&self, payload: &SubmissionPayload) -> Result<Value, ApiError>;
}

/// Fetches the authoritative placed items for a table.
#[async_trait]
pub trait PlacedItemsFetcher: Send + Sync {
    async fn fetch_placed_items(&self, table_id: TableId) -> Result<Vec<PlacedItem>, ApiError>;
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> ApiError {
    if err.is_connect() {
        return ApiError::Network(format!("Cannot reach kitchen backend at {url}"));
    }
    if err.is_timeout() {
        return ApiError::Network(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return ApiError::Network(format!("Invalid backend URL: {url}"));
    }
    ApiError::Network(format!("Network error communicating with {url}: {err}"))
}

/// Convert an HTTP status code into a user-friendly message.
fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired, please log in again".to_string(),
        403 => "Not allowed to act on this table".to_string(),
        404 => "Backend endpoint not found".to_string(),
        422 => "Order rejected by the backend".to_string(),
        s if s >= 500 => "Kitchen backend server error".to_string(),
        _ => "Unexpected response from kitchen backend".to_string(),
    }
}

/// Build the error for a non-success response, keeping the backend's own
/// message when the body carries one.
fn status_error(status: StatusCode, body_text: &str) -> ApiError {
    let message = serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| status_message(status));
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Extract placed items from a response that is either a bare array or an
/// object wrapping it (`items`, `placed_items`, `placedItems`, `data`).
pub(crate) fn parse_placed_items(body: Value) -> Result<Vec<PlacedItem>, ApiError> {
    let items = match body {
        Value::Array(_) => body,
        Value::Object(mut obj) => ["items", "placed_items", "placedItems", "data"]
            .iter()
            .find_map(|key| obj.remove(*key).filter(Value::is_array))
            .ok_or_else(|| {
                ApiError::InvalidResponse("placed items response has no item list".into())
            })?,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ApiError::InvalidResponse(format!(
                "expected an item list, got {other}"
            )))
        }
    };
    serde_json::from_value(items).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Extract the table list; non-array payloads are rejected.
pub(crate) fn parse_tables(body: Value) -> Result<Vec<TableSummary>, ApiError> {
    if !body.is_array() {
        return Err(ApiError::InvalidResponse(
            "tables response is not an array".into(),
        ));
    }
    serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// HTTP client for the kitchen backend, authenticated with the waiter's
/// bearer token.
pub struct HttpKitchenApi {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpKitchenApi {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_api_url(base_url),
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the bearer token (`None` after logout).
    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn current_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Perform an authenticated JSON request.
    ///
    /// `path` includes the leading slash, e.g. `/tables-status`.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let full_url = format!("{}{path}", self.base_url);
        debug!(method = %method, url = %full_url, "kitchen api request");

        let mut req = self
            .client
            .request(method, &full_url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");
        if let Some(token) = self.current_token() {
            req = req.bearer_auth(token);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let err = status_error(status, &body_text);
            warn!(url = %full_url, status = status.as_u16(), error = %err, "kitchen api error");
            return Err(err);
        }

        // Empty 204 responses become null.
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid JSON: {e}")))
    }

    /// `GET /tables-status`: every table with its status and assigned waiter.
    pub async fn fetch_tables(&self) -> Result<Vec<TableSummary>, ApiError> {
        let body = self.request(Method::GET, "/tables-status", None).await?;
        parse_tables(body)
    }

    /// `GET /menu`: orderable items grouped by category.
    pub async fn fetch_menu(&self) -> Result<Vec<MenuCategory>, ApiError> {
        let body = self.request(Method::GET, "/menu", None).await?;
        parse_menu(body)
    }

    /// `POST /tables/{id}/clear`: mark a table available again.
    pub async fn clear_table_status(&self, table_id: TableId) -> Result<Value, ApiError> {
        self.request(Method::POST, &format!("/tables/{table_id}/clear"), None)
            .await
    }
}

#[async_trait]
impl KitchenClient for HttpKitchenApi {
    async fn submit_new_items(&self, payload: &SubmissionPayload) -> Result<Value, ApiError> {
        let body =
            serde_json::to_value(payload).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.request(Method::POST, "/orders", Some(&body)).await
    }
}

#[async_trait]
impl PlacedItemsFetcher for HttpKitchenApi {
    async fn fetch_placed_items(&self, table_id: TableId) -> Result<Vec<PlacedItem>, ApiError> {
        let body = self
            .request(Method::GET, &format!("/tables/{table_id}/orders"), None)
            .await?;
        parse_placed_items(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_placed_items_accepts_wrapped_and_bare_lists() {
        let row = json!({"id": 1, "name": "Soup", "price": 4.5, "qty": 2, "remarks": null, "status": "ordered"});

        let bare = parse_placed_items(json!([row.clone()])).unwrap();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].status.as_deref(), Some("ordered"));

        let wrapped = parse_placed_items(json!({"placed_items": [row.clone()]})).unwrap();
        assert_eq!(wrapped, bare);

        let data = parse_placed_items(json!({"success": true, "data": [row]})).unwrap();
        assert_eq!(data, bare);

        assert!(parse_placed_items(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_parse_placed_items_rejects_unknown_shapes() {
        assert!(matches!(
            parse_placed_items(json!({"message": "ok"})),
            Err(ApiError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_placed_items(json!("nope")),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_tables_requires_array() {
        let tables = parse_tables(json!([
            {"id": 1, "table_name": "T1", "status": "available"},
            {"id": 2, "table_name": "T2", "status": "ordered", "waiter_id": 4, "waiter_name": "Sam"}
        ]))
        .unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].waiter_id, Some(4));
        assert!(parse_tables(json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_status_error_prefers_backend_message() {
        let err = status_error(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message":"Table is closed"}"#);
        assert_eq!(
            err,
            ApiError::Status {
                status: 422,
                message: "Table is closed".into()
            }
        );
        let err = status_error(StatusCode::UNAUTHORIZED, "");
        assert!(err.is_auth_failure());
        assert_eq!(err.to_string(), "Session expired, please log in again (HTTP 401)");
        let err = status_error(StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(err.to_string(), "Kitchen backend server error (HTTP 502)");
    }

    #[test]
    fn test_http_api_normalizes_base_and_tracks_token() {
        let api = HttpKitchenApi::new("192.168.1.76/restaurant/public/api/", None).unwrap();
        assert_eq!(api.base_url(), "http://192.168.1.76/restaurant/public/api");
        assert_eq!(api.current_token(), None);
        api.set_token(Some("abc".into()));
        assert_eq!(api.current_token().as_deref(), Some("abc"));
        api.set_token(None);
        assert_eq!(api.current_token(), None);
    }
}
