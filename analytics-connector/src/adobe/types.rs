//! Adobe Analytics 2.0 API payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Company visible to the authenticated technical account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub global_company_id: String,
    pub company_name: String,
    #[serde(default)]
    pub api_rate_limit_policy: Option<String>,
}

/// IMS organization entry of the discovery response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscoveryOrg {
    #[serde(default)]
    pub ims_org_id: Option<String>,
    #[serde(default)]
    pub companies: Vec<Company>,
}

/// Response of `GET /discovery/me`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscoveryResponse {
    #[serde(default)]
    pub ims_orgs: Vec<DiscoveryOrg>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub anchor_date: Option<String>,
}

/// A report suite: the scope a report runs against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSuite {
    pub rsid: String,
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub calendar_type: Option<CalendarType>,
    #[serde(default)]
    pub timezone_zoneinfo: Option<String>,
}

/// Single page of report suites; only `content` is used.
#[derive(Debug, Deserialize)]
pub(crate) struct ReportSuitePage {
    #[serde(default)]
    pub content: Vec<ReportSuite>,
}

/// Breakdown field available in a report suite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub id: String,
    pub title: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Grouping label only; carries no API meaning
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub support: Vec<String>,
    #[serde(default)]
    pub pathable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_title_info: Option<String>,
}

/// Numeric measure available in a report suite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub title: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub support: Vec<String>,
    #[serde(default)]
    pub allocation: bool,
    #[serde(default)]
    pub precision: u32,
    #[serde(default)]
    pub calculated: bool,
    #[serde(default)]
    pub segmentable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_title_info: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Report-wide filter. Only date ranges are defined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GlobalFilter {
    #[serde(rename = "dateRange")]
    DateRange {
        /// `start/end`, both ISO 8601
        #[serde(rename = "dateRange")]
        date_range: String,
    },
}

impl GlobalFilter {
    /// Date range covering whole days, `start` and `end` inclusive.
    pub fn date_range(start: NaiveDate, end: NaiveDate) -> Self {
        GlobalFilter::DateRange {
            date_range: format!(
                "{}T00:00:00.000/{}T23:59:59.999",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetric {
    /// Position of this metric in each row's `data` array
    pub column_id: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricContainer {
    pub metrics: Vec<ReportMetric>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    pub count_repeat_instances: bool,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_sort: Option<SortOrder>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            count_repeat_instances: true,
            limit: 50,
            page: None,
            dimension_sort: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub functions: Vec<String>,
}

/// Declarative ranked report query.
///
/// Metric and dimension ids are passed through unchecked; Adobe rejects
/// unknown ids with an API error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub rsid: String,
    pub global_filters: Vec<GlobalFilter>,
    pub metric_container: MetricContainer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    pub settings: ReportSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
}

impl ReportRequest {
    pub fn new(rsid: impl Into<String>, date_range: GlobalFilter) -> Self {
        Self {
            rsid: rsid.into(),
            global_filters: vec![date_range],
            metric_container: MetricContainer::default(),
            dimension: None,
            settings: ReportSettings::default(),
            statistics: None,
        }
    }

    /// Append a metric bound to the next free column.
    pub fn with_metric(mut self, id: impl Into<String>) -> Self {
        let column_id = self.metric_container.metrics.len().to_string();
        self.metric_container.metrics.push(ReportMetric {
            column_id,
            id: id.into(),
            sort: None,
            filters: None,
        });
        self
    }

    pub fn with_dimension(mut self, id: impl Into<String>) -> Self {
        self.dimension = Some(id.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.settings.limit = limit;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportDimensionColumn {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Column manifest of a report response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportColumns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<ReportDimensionColumn>,
    #[serde(default)]
    pub column_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_errors: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub item_id: String,
    pub value: String,
    /// One value per requested metric, in column order
    pub data: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
    pub totals: Vec<f64>,
}

/// One page of report results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub total_pages: u32,
    pub first_page: bool,
    pub last_page: bool,
    /// Rows on this page
    pub number_of_elements: u32,
    /// Zero-based page number
    pub number: u32,
    /// Rows across all pages
    pub total_elements: u32,
    #[serde(default)]
    pub columns: ReportColumns,
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_data: Option<SummaryData>,
}

/// `{id, title}` pair used in connection samples.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SchemaSample {
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompanySummary {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionSamples {
    pub dimensions: Vec<SchemaSample>,
    pub metrics: Vec<SchemaSample>,
}

/// Summary of a successful end-to-end connection check.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub company: CompanySummary,
    pub report_suites: usize,
    pub dimensions: usize,
    pub metrics: usize,
    pub samples: ConnectionSamples,
}
