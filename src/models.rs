use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitorTotal {
    pub total_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Request metadata for one visit, before it is logged.
#[derive(Debug, Clone, Default)]
pub struct NewVisit {
    pub client_key: Option<String>,
    pub user_agent: Option<String>,
    pub page_url: String,
    pub referrer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitRecord {
    pub id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourlyCount {
    pub hour: u32,
    pub count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementRequest {
    #[serde(default)]
    pub page_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementResponse {
    pub count: u64,
    pub is_new_visitor: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub recent_visits: Vec<VisitRecord>,
    pub visitors_by_hour: Vec<HourlyCount>,
    #[serde(rename = "uniqueVisitors24h")]
    pub unique_visitors_24h: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
