use askdata::credentials::AdobeCredentials;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::config::join_url;
use super::schema::SchemaCatalog;
use super::types::{
    Company, CompanySummary, ConnectionReport, ConnectionSamples, Dimension, DiscoveryResponse,
    Metric, ReportRequest, ReportResponse, ReportSuite, ReportSuitePage, SchemaSample,
};
use crate::error::AdobeError;

const API_KEY_HEADER: &str = "x-api-key";
const ORG_ID_HEADER: &str = "x-gw-ims-org-id";
const COMPANY_ID_HEADER: &str = "x-proxy-global-company-id";

/// Entries of each schema kind included in a connection report.
const SAMPLE_SIZE: usize = 5;

/// Authenticated client for the Adobe Analytics 2.0 API.
///
/// Built by [`super::AdobeConnector::initialize`] with credentials and a
/// valid token already in hand; every call carries the same fixed header set.
/// Each operation issues exactly one request and never retries.
#[derive(Clone)]
pub struct AdobeClient {
    http: Client,
    base_url: String,
    credentials: AdobeCredentials,
    headers: HeaderMap,
}

impl AdobeClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        credentials: AdobeCredentials,
        access_token: &str,
    ) -> Result<Self, AdobeError> {
        let headers = build_headers(&credentials, access_token)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
            headers,
        })
    }

    /// Company matching the configured company id.
    ///
    /// Only companies under the configured IMS organization are considered.
    /// Fails with `NotFound` when that organization is absent from discovery
    /// or does not list the company, even if another organization does.
    pub async fn get_company(&self) -> Result<Company, AdobeError> {
        let discovery: DiscoveryResponse = self.get("/discovery/me").await?;

        discovery
            .ims_orgs
            .into_iter()
            .filter(|org| org.ims_org_id.as_deref() == Some(self.credentials.org_id.as_str()))
            .flat_map(|org| org.companies)
            .find(|company| company.global_company_id == self.credentials.company_id)
            .ok_or_else(|| {
                warn!(
                    company_id = %self.credentials.company_id,
                    "Configured company not visible to this account"
                );
                AdobeError::NotFound(format!(
                    "Company not found: {}",
                    self.credentials.company_id
                ))
            })
    }

    /// Report suites of the configured company (first page only).
    pub async fn get_report_suites(&self) -> Result<Vec<ReportSuite>, AdobeError> {
        let page: ReportSuitePage = self.get(&self.company_path("reportsuites")).await?;
        Ok(page.content)
    }

    /// Dimensions of `rsid`, or of the configured report suite.
    pub async fn get_dimensions(&self, rsid: Option<&str>) -> Result<Vec<Dimension>, AdobeError> {
        self.get(&self.schema_path("dimensions", rsid)).await
    }

    /// Metrics of `rsid`, or of the configured report suite.
    pub async fn get_metrics(&self, rsid: Option<&str>) -> Result<Vec<Metric>, AdobeError> {
        self.get(&self.schema_path("metrics", rsid)).await
    }

    /// Run a ranked report. Identifiers are not validated locally.
    pub async fn run_report(&self, request: &ReportRequest) -> Result<ReportResponse, AdobeError> {
        debug!(
            rsid = %request.rsid,
            metrics = request.metric_container.metrics.len(),
            dimension = ?request.dimension,
            "Running Adobe report"
        );
        self.post(&self.company_path("reports"), request).await
    }

    /// Dimensions and metrics of a suite, fetched concurrently and grouped
    /// by category.
    pub async fn get_schema(&self, rsid: Option<&str>) -> Result<SchemaCatalog, AdobeError> {
        let (dimensions, metrics) =
            futures::try_join!(self.get_dimensions(rsid), self.get_metrics(rsid))?;
        Ok(SchemaCatalog::new(
            self.report_suite(rsid),
            &dimensions,
            &metrics,
        ))
    }

    /// Exercise every read operation once and summarize what was visible.
    pub async fn test_connection(&self) -> Result<ConnectionReport, AdobeError> {
        let company = self.get_company().await?;
        let report_suites = self.get_report_suites().await?;
        let (dimensions, metrics) =
            futures::try_join!(self.get_dimensions(None), self.get_metrics(None))?;

        Ok(ConnectionReport {
            company: CompanySummary {
                id: company.global_company_id,
                name: company.company_name,
            },
            report_suites: report_suites.len(),
            dimensions: dimensions.len(),
            metrics: metrics.len(),
            samples: ConnectionSamples {
                dimensions: dimensions
                    .iter()
                    .take(SAMPLE_SIZE)
                    .map(|d| SchemaSample {
                        id: d.id.clone(),
                        title: d.title.clone(),
                    })
                    .collect(),
                metrics: metrics
                    .iter()
                    .take(SAMPLE_SIZE)
                    .map(|m| SchemaSample {
                        id: m.id.clone(),
                        title: m.title.clone(),
                    })
                    .collect(),
            },
        })
    }

    fn report_suite<'a>(&'a self, rsid: Option<&'a str>) -> &'a str {
        rsid.filter(|r| !r.is_empty())
            .unwrap_or(&self.credentials.report_suite_id)
    }

    fn company_path(&self, resource: &str) -> String {
        format!(
            "/{}/{}",
            urlencoding::encode(&self.credentials.company_id),
            resource
        )
    }

    fn schema_path(&self, resource: &str, rsid: Option<&str>) -> String {
        format!(
            "{}?rsid={}",
            self.company_path(resource),
            urlencoding::encode(self.report_suite(rsid))
        )
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AdobeError> {
        let url = join_url(&self.base_url, path);
        self.send(self.http.get(&url)).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AdobeError> {
        let url = join_url(&self.base_url, path);
        self.send(self.http.post(&url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AdobeError> {
        let response = request
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(AdobeError::transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(AdobeError::transport)?;

        if !status.is_success() {
            let message = error_message(status, &body);
            warn!(status = %status, error = %message, "Adobe API request failed");
            return Err(AdobeError::Request {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| AdobeError::InvalidResponse(e.to_string()))
    }
}

/// Fixed header set sent with every API call.
fn build_headers(
    credentials: &AdobeCredentials,
    access_token: &str,
) -> Result<HeaderMap, AdobeError> {
    fn value(raw: &str, name: &str) -> Result<HeaderValue, AdobeError> {
        HeaderValue::from_str(raw)
            .map_err(|_| AdobeError::Configuration(format!("Invalid characters in {}", name)))
    }

    let mut headers = HeaderMap::new();
    let mut bearer = value(&format!("Bearer {}", access_token), "access token")?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);

    let mut api_key = value(access_token, "access token")?;
    api_key.set_sensitive(true);
    headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key);

    headers.insert(
        HeaderName::from_static(ORG_ID_HEADER),
        value(&credentials.org_id, "org_id")?,
    );
    headers.insert(
        HeaderName::from_static(COMPANY_ID_HEADER),
        value(&credentials.company_id, "company_id")?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Provider-supplied message of an error body, or the status text.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "errorDescription", "error_description"]
                .iter()
                .find_map(|key| json.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adobe::types::GlobalFilter;
    use chrono::NaiveDate;
    use mockito::{Matcher, Server};

    fn credentials() -> AdobeCredentials {
        AdobeCredentials {
            client_id: "client-123".to_string(),
            client_secret: "p8e-secret".to_string(),
            org_id: "ABC123@AdobeOrg".to_string(),
            company_id: "acme0".to_string(),
            report_suite_id: "acme.prod".to_string(),
        }
    }

    fn client(base_url: String) -> AdobeClient {
        AdobeClient::new(Client::new(), base_url, credentials(), "test-token").unwrap()
    }

    const DIMENSIONS: &str = r#"[
        {"id": "variables/page", "title": "Page", "name": "Page", "type": "string", "category": "Content", "pathable": true},
        {"id": "variables/browser", "title": "Browser", "name": "Browser", "type": "string", "category": "Technology"}
    ]"#;

    const METRICS: &str = r#"[
        {"id": "metrics/pageviews", "title": "Page Views", "name": "Page Views", "type": "int", "category": "Traffic", "segmentable": true},
        {"id": "metrics/visits", "title": "Visits", "name": "Visits", "type": "int", "category": "Traffic"}
    ]"#;

    #[tokio::test]
    async fn test_fixed_headers_on_every_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/acme0/reportsuites")
            .match_header("authorization", "Bearer test-token")
            .match_header("x-api-key", "test-token")
            .match_header("x-gw-ims-org-id", "ABC123@AdobeOrg")
            .match_header("x-proxy-global-company-id", "acme0")
            .match_header("content-type", "application/json")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content": [{"rsid": "acme.prod", "name": "ACME Production"}], "totalElements": 1}"#)
            .create_async()
            .await;

        let suites = client(server.url()).get_report_suites().await.unwrap();

        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].rsid, "acme.prod");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_company_matches_configured_id() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/discovery/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"imsOrgs": [{
                    "imsOrgId": "ABC123@AdobeOrg",
                    "companies": [
                        {"globalCompanyId": "other0", "companyName": "Other"},
                        {"globalCompanyId": "acme0", "companyName": "ACME", "apiRateLimitPolicy": "aa_api_tier10_tp"}
                    ]
                }]}"#,
            )
            .create_async()
            .await;

        let company = client(server.url()).get_company().await.unwrap();

        assert_eq!(company.global_company_id, "acme0");
        assert_eq!(company.company_name, "ACME");
        assert_eq!(company.api_rate_limit_policy.as_deref(), Some("aa_api_tier10_tp"));
    }

    #[tokio::test]
    async fn test_get_company_not_found_in_non_empty_list() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/discovery/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"imsOrgs": [{
                    "imsOrgId": "ABC123@AdobeOrg",
                    "companies": [{"globalCompanyId": "other0", "companyName": "Other"}]
                }]}"#,
            )
            .create_async()
            .await;

        let err = client(server.url()).get_company().await.unwrap_err();
        assert!(matches!(err, AdobeError::NotFound(_)));
        assert!(err.to_string().contains("acme0"));
    }

    #[tokio::test]
    async fn test_get_company_ignores_other_orgs() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/discovery/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"imsOrgs": [
                    {"imsOrgId": "ABC123@AdobeOrg", "companies": []},
                    {"imsOrgId": "XYZ@AdobeOrg", "companies": [{"globalCompanyId": "acme0", "companyName": "Wrong tenant"}]}
                ]}"#,
            )
            .create_async()
            .await;

        let err = client(server.url()).get_company().await.unwrap_err();
        assert!(matches!(err, AdobeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_company_rejects_company_of_foreign_org_only() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/discovery/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"imsOrgs": [
                    {"imsOrgId": "XYZ@AdobeOrg", "companies": [{"globalCompanyId": "acme0", "companyName": "Wrong tenant"}]}
                ]}"#,
            )
            .create_async()
            .await;

        let err = client(server.url()).get_company().await.unwrap_err();
        assert!(matches!(err, AdobeError::NotFound(_)));
        assert!(err.to_string().contains("acme0"));
    }

    #[tokio::test]
    async fn test_get_company_requires_org_id_on_discovery_entry() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/discovery/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"imsOrgs": [{"companies": [{"globalCompanyId": "acme0", "companyName": "ACME"}]}]}"#)
            .create_async()
            .await;

        let err = client(server.url()).get_company().await.unwrap_err();
        assert!(matches!(err, AdobeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_schema_calls_default_to_configured_suite() {
        let mut server = Server::new_async().await;
        let dims = server
            .mock("GET", "/acme0/dimensions")
            .match_query(Matcher::UrlEncoded("rsid".into(), "acme.prod".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DIMENSIONS)
            .create_async()
            .await;
        let metrics = server
            .mock("GET", "/acme0/metrics")
            .match_query(Matcher::UrlEncoded("rsid".into(), "acme.dev".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(METRICS)
            .create_async()
            .await;

        let client = client(server.url());
        let dimensions = client.get_dimensions(None).await.unwrap();
        let metric_list = client.get_metrics(Some("acme.dev")).await.unwrap();

        assert_eq!(dimensions.len(), 2);
        assert!(dimensions[0].pathable);
        assert_eq!(metric_list[0].id, "metrics/pageviews");
        dims.assert_async().await;
        metrics.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_schema_groups_by_category() {
        let mut server = Server::new_async().await;
        let _dims = server
            .mock("GET", "/acme0/dimensions")
            .match_query(Matcher::UrlEncoded("rsid".into(), "acme.prod".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DIMENSIONS)
            .create_async()
            .await;
        let _metrics = server
            .mock("GET", "/acme0/metrics")
            .match_query(Matcher::UrlEncoded("rsid".into(), "acme.prod".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(METRICS)
            .create_async()
            .await;

        let catalog = client(server.url()).get_schema(None).await.unwrap();

        assert_eq!(catalog.rsid, "acme.prod");
        assert_eq!(catalog.dimensions.total, 2);
        assert_eq!(catalog.dimensions.by_category.len(), 2);
        assert_eq!(catalog.metrics.by_category["Traffic"].len(), 2);
    }

    #[tokio::test]
    async fn test_run_report_rows_align_with_metrics() {
        let mut server = Server::new_async().await;
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let request = ReportRequest::new("acme.prod", GlobalFilter::date_range(start, end))
            .with_metric("metrics/pageviews")
            .with_metric("metrics/visits")
            .with_dimension("variables/page")
            .with_limit(10);

        let mock = server
            .mock("POST", "/acme0/reports")
            .match_body(Matcher::Json(serde_json::to_value(&request).unwrap()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "totalPages": 1, "firstPage": true, "lastPage": true,
                    "numberOfElements": 3, "number": 0, "totalElements": 3,
                    "columns": {"dimension": {"id": "variables/page", "type": "string"}, "columnIds": ["0", "1"]},
                    "rows": [
                        {"itemId": "1", "value": "Home", "data": [120, 80]},
                        {"itemId": "2", "value": "Pricing", "data": [45, 30]},
                        {"itemId": "3", "value": "Docs", "data": [12, 9]}
                    ],
                    "summaryData": {"totals": [177, 119]}
                }"#,
            )
            .create_async()
            .await;

        let response = client(server.url()).run_report(&request).await.unwrap();

        let metric_count = request.metric_container.metrics.len();
        assert!(response.rows.len() <= 10);
        assert!(response.rows.iter().all(|row| row.data.len() == metric_count));
        assert_eq!(response.rows[0].data, vec![120.0, 80.0]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_metric_is_request_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/acme0/reports")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"errorCode": "invalid_metric", "errorDescription": "Invalid metric: metrics/nope"}"#)
            .create_async()
            .await;

        let request = ReportRequest::new(
            "acme.prod",
            GlobalFilter::DateRange {
                date_range: "2024-01-01/2024-01-02".to_string(),
            },
        )
        .with_metric("metrics/nope");

        let err = client(server.url()).run_report(&request).await.unwrap_err();
        match err {
            AdobeError::Request { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid metric: metrics/nope");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_without_message_uses_status_text() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/acme0/reportsuites")
            .with_status(403)
            .with_body("<html>denied</html>")
            .create_async()
            .await;

        let err = client(server.url()).get_report_suites().await.unwrap_err();
        assert!(matches!(
            err,
            AdobeError::Request { status: 403, ref message } if message == "Forbidden"
        ));
    }

    #[tokio::test]
    async fn test_unexpected_success_body_is_invalid_response() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/acme0/dimensions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"not": "a list"}"#)
            .create_async()
            .await;

        let err = client(server.url()).get_dimensions(None).await.unwrap_err();
        assert!(matches!(err, AdobeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_report_samples() {
        let mut server = Server::new_async().await;
        let _discovery = server
            .mock("GET", "/discovery/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"imsOrgs": [{"imsOrgId": "ABC123@AdobeOrg", "companies": [{"globalCompanyId": "acme0", "companyName": "ACME"}]}]}"#)
            .create_async()
            .await;
        let _suites = server
            .mock("GET", "/acme0/reportsuites")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content": [{"rsid": "acme.prod", "name": "Prod"}, {"rsid": "acme.dev", "name": "Dev"}]}"#)
            .create_async()
            .await;
        let _dims = server
            .mock("GET", "/acme0/dimensions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DIMENSIONS)
            .create_async()
            .await;
        let _metrics = server
            .mock("GET", "/acme0/metrics")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(METRICS)
            .create_async()
            .await;

        let report = client(server.url()).test_connection().await.unwrap();

        assert_eq!(report.company.name, "ACME");
        assert_eq!(report.report_suites, 2);
        assert_eq!(report.dimensions, 2);
        assert_eq!(report.samples.metrics[1].title, "Visits");
    }

    #[test]
    fn test_headers_reject_control_characters() {
        let result = AdobeClient::new(
            Client::new(),
            "http://localhost",
            credentials(),
            "bad\ntoken",
        );
        assert!(matches!(result, Err(AdobeError::Configuration(_))));
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, br#"{"message": "Bad rsid"}"#),
            "Bad rsid"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, br#"{"message": ""}"#),
            "Bad Gateway"
        );
        assert_eq!(error_message(StatusCode::NOT_FOUND, b""), "Not Found");
    }
}
