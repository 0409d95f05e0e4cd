//! HTTP surface: per-user settings and the Adobe Analytics endpoints.
//!
//! The owner of every request is resolved from the bearer token when auth is
//! enabled, or is the shared default user otherwise.

use askdata::auth::{resolve_user_id, IdentityError};
use askdata::credentials::{
    AdobeSettingsInput, AnalyticsPlatform, LlmProvider, SettingsStore, UserSettings,
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adobe::types::{ConnectionReport, ReportRequest, ReportResponse};
use crate::adobe::{AdobeConnector, SchemaCatalog};
use crate::error::AdobeError;


/// Shared application state
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SettingsStore>,
    pub connector: Arc<AdobeConnector>,
    pub auth_enabled: bool,
}

/// Settings as returned to clients: encrypted fields replaced by flags.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SettingsView {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub analytics_platform: Option<AnalyticsPlatform>,
    pub adobe_client_id: Option<String>,
    pub adobe_org_id: Option<String>,
    pub adobe_company_id: Option<String>,
    pub adobe_report_suite_id: Option<String>,
    pub adobe_token_expires_at: Option<i64>,
    pub selected_llm: Option<LlmProvider>,
    pub has_adobe_client_secret: bool,
    pub has_llm_api_key: bool,
}

impl From<UserSettings> for SettingsView {
    fn from(s: UserSettings) -> Self {
        Self {
            has_adobe_client_secret: s.adobe_client_secret_encrypted.is_some(),
            has_llm_api_key: s.llm_api_key_encrypted.is_some(),
            id: s.id,
            user_id: s.user_id,
            created_at: s.created_at,
            updated_at: s.updated_at,
            analytics_platform: s.analytics_platform,
            adobe_client_id: s.adobe_client_id,
            adobe_org_id: s.adobe_org_id,
            adobe_company_id: s.adobe_company_id,
            adobe_report_suite_id: s.adobe_report_suite_id,
            adobe_token_expires_at: s.adobe_token_expires_at,
            selected_llm: s.selected_llm,
        }
    }
}

/// Response for GET /api/settings
#[derive(Serialize)]
pub struct GetSettingsResponse {
    pub settings: Option<SettingsView>,
}

/// Request body for POST /api/settings
#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Adobe Analytics form fields
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct AdobeSettingsData {
    pub analytics_platform: String,
    pub adobe_client_id: String,
    pub adobe_client_secret: String,
    pub adobe_org_id: String,
    pub adobe_company_id: String,
    pub adobe_report_suite_id: String,
}

impl AdobeSettingsData {
    /// Check the form and convert it to store input.
    pub fn validate(self) -> Result<AdobeSettingsInput, String> {
        let required = [
            (&self.adobe_client_id, "Client ID is required"),
            (&self.adobe_client_secret, "Client Secret is required"),
            (&self.adobe_org_id, "Organization ID is required"),
            (&self.adobe_company_id, "Company ID is required"),
            (&self.adobe_report_suite_id, "Report Suite ID is required"),
        ];
        if let Some((_, message)) = required.iter().find(|(value, _)| value.trim().is_empty()) {
            return Err(message.to_string());
        }

        if !self.adobe_org_id.ends_with("@AdobeOrg") {
            return Err("Organization ID must end with @AdobeOrg".to_string());
        }

        Ok(AdobeSettingsInput {
            client_id: self.adobe_client_id,
            client_secret: self.adobe_client_secret,
            org_id: self.adobe_org_id,
            company_id: self.adobe_company_id,
            report_suite_id: self.adobe_report_suite_id,
        })
    }
}

/// LLM provider form fields
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LlmSettingsData {
    pub selected_llm: String,
    pub llm_api_key: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Response for GET /api/adobe/test
#[derive(Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub connection: String,
    #[serde(flatten)]
    pub report: ConnectionReport,
}

#[derive(Deserialize)]
pub struct SchemaQuery {
    pub rsid: Option<String>,
}

/// Request body for POST /api/adobe/report
#[derive(Deserialize)]
pub struct RunReportRequest {
    pub request: Option<ReportRequest>,
}

#[derive(Serialize)]
pub struct RunReportResponse {
    pub success: bool,
    pub data: ReportResponse,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/settings",
            get(get_settings).post(update_settings).delete(delete_settings),
        )
        .route("/api/adobe/test", get(test_connection))
        .route("/api/adobe/schema", get(get_schema))
        .route("/api/adobe/report", post(run_report))
        .with_state(Arc::new(state))
}

/// GET /api/settings - Current user's settings, secrets omitted
async fn get_settings(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<GetSettingsResponse>, AppError> {
    let user_id = resolve_user_id(&headers, state.auth_enabled)?;

    let settings = state.store.get(&user_id).map_err(|e| {
        error!(error = %e, "Failed to fetch settings");
        AppError::InternalServerError("Failed to fetch settings".to_string())
    })?;

    Ok(Json(GetSettingsResponse {
        settings: settings.map(SettingsView::from),
    }))
}

/// POST /api/settings - Save analytics or LLM settings
async fn update_settings(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = resolve_user_id(&headers, state.auth_enabled)?;

    debug!(user_id = %user_id, kind = %body.kind, "Updating settings");

    match body.kind.as_str() {
        "analytics" => {
            let data: AdobeSettingsData = parse_data(body.data)?;
            match AnalyticsPlatform::parse(&data.analytics_platform) {
                Some(AnalyticsPlatform::AdobeAnalytics) => {}
                Some(AnalyticsPlatform::GoogleAnalytics4) => {
                    return Err(AppError::BadRequest(
                        "Google Analytics 4 is not supported yet".to_string(),
                    ))
                }
                None => {
                    return Err(AppError::BadRequest(
                        "Invalid analytics platform".to_string(),
                    ))
                }
            }

            let input = data.validate().map_err(AppError::BadRequest)?;
            state.store.save_adobe(&user_id, &input).map_err(|e| {
                error!(error = %e, "Failed to save Adobe settings");
                AppError::InternalServerError("Failed to save settings".to_string())
            })?;

            info!(user_id = %user_id, company_id = %input.company_id, "Adobe settings saved");
        }
        "llm" => {
            let data: LlmSettingsData = parse_data(body.data)?;
            let provider = LlmProvider::parse(&data.selected_llm).ok_or_else(|| {
                AppError::BadRequest("Please select an LLM provider".to_string())
            })?;
            if data.llm_api_key.trim().is_empty() {
                return Err(AppError::BadRequest("API Key is required".to_string()));
            }

            state
                .store
                .save_llm(&user_id, provider, &data.llm_api_key)
                .map_err(|e| {
                    error!(error = %e, "Failed to save LLM settings");
                    AppError::InternalServerError("Failed to save settings".to_string())
                })?;

            info!(user_id = %user_id, provider = provider.as_str(), "LLM settings saved");
        }
        _ => return Err(AppError::BadRequest("Invalid settings type".to_string())),
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// DELETE /api/settings - Remove the user's settings row
async fn delete_settings(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = resolve_user_id(&headers, state.auth_enabled)?;

    let deleted = state.store.delete(&user_id).map_err(|e| {
        error!(error = %e, "Failed to delete settings");
        AppError::InternalServerError("Failed to delete settings".to_string())
    })?;

    info!(user_id = %user_id, deleted, "Settings cleared");

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/adobe/test - End-to-end connection check
async fn test_connection(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<TestConnectionResponse>, AppError> {
    let user_id = resolve_user_id(&headers, state.auth_enabled)?;

    let client = state.connector.initialize(&user_id).await?;
    let report = client.test_connection().await?;

    info!(
        user_id = %user_id,
        report_suites = report.report_suites,
        "Adobe connection test succeeded"
    );

    Ok(Json(TestConnectionResponse {
        success: true,
        connection: "Adobe Analytics connected successfully".to_string(),
        report,
    }))
}

/// GET /api/adobe/schema - Dimensions and metrics grouped by category
async fn get_schema(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<SchemaCatalog>, AppError> {
    let user_id = resolve_user_id(&headers, state.auth_enabled)?;

    let client = state.connector.initialize(&user_id).await?;
    let catalog = client.get_schema(query.rsid.as_deref()).await?;

    Ok(Json(catalog))
}

/// POST /api/adobe/report - Run a report and meter the call
async fn run_report(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<RunReportRequest>,
) -> Result<Json<RunReportResponse>, AppError> {
    let user_id = resolve_user_id(&headers, state.auth_enabled)?;

    let request = body
        .request
        .ok_or_else(|| AppError::BadRequest("Report request is required".to_string()))?;

    let client = state.connector.initialize(&user_id).await?;
    let data = client.run_report(&request).await?;

    if let Err(e) =
        state
            .store
            .record_usage(&user_id, AnalyticsPlatform::AdobeAnalytics, "none", 0, 1)
    {
        warn!(user_id = %user_id, error = %e, "Failed to record API usage");
    }

    Ok(Json(RunReportResponse {
        success: true,
        data,
    }))
}

fn parse_data<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(data)
        .map_err(|e| AppError::BadRequest(format!("Invalid settings data: {}", e)))
}

/// Application error types
#[derive(Debug)]
enum AppError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        AppError::Unauthorized(format!("Invalid token: {}", e))
    }
}

impl From<AdobeError> for AppError {
    fn from(e: AdobeError) -> Self {
        warn!(error = %e, "Adobe Analytics request failed");
        match e {
            AdobeError::Configuration(msg) => AppError::BadRequest(msg),
            AdobeError::NotFound(msg) => AppError::NotFound(msg),
            AdobeError::Storage(_) => {
                AppError::InternalServerError("Settings storage unavailable".to_string())
            }
            upstream @ (AdobeError::Auth(_)
            | AdobeError::Request { .. }
            | AdobeError::Transport(_)
            | AdobeError::InvalidResponse(_)) => AppError::BadGateway(upstream.to_string()),
        }
    }
}
