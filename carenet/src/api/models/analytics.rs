//! API models for the analytics endpoint.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Which report to produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Overview,
    Users,
    Jobs,
    Payments,
    Disputes,
}

/// Reporting window, counted back from now.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum Period {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl Period {
    /// Window length in days.
    pub fn days(self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
            Period::Year => 365,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AnalyticsQuery {
    /// Report type: overview, users, jobs, payments, or disputes
    #[serde(rename = "type")]
    #[param(rename = "type")]
    pub report_type: ReportType,

    /// Window: 7d, 30d, 90d, or 1y (default 30d)
    #[serde(default)]
    pub period: Period,
}

/// A label with a count, used for group-by breakdowns.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct BucketCount {
    pub label: String,
    pub count: i64,
}

/// Per-day counts for time series.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: i64,
}

/// Per-day monetary volume.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct DayVolume {
    pub day: NaiveDate,
    #[schema(value_type = String)]
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverviewReport {
    pub total_users: i64,
    pub total_jobs: i64,
    pub active_jobs: i64,
    #[schema(value_type = String)]
    pub payment_volume: Decimal,
    #[schema(value_type = String)]
    pub held_in_escrow: Decimal,
    pub open_disputes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsersReport {
    pub new_users: i64,
    pub by_role: Vec<BucketCount>,
    pub by_kyc_status: Vec<BucketCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobsReport {
    pub created: i64,
    pub by_status: Vec<BucketCount>,
    pub per_day: Vec<DayCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentsReport {
    pub count: i64,
    #[schema(value_type = String)]
    pub volume: Decimal,
    pub by_method: Vec<BucketCount>,
    pub by_status: Vec<BucketCount>,
    pub volume_per_day: Vec<DayVolume>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisputesReport {
    pub opened: i64,
    pub resolved: i64,
    pub by_resolution: Vec<BucketCount>,
}

/// The analytics payload, discriminated by the requested report type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnalyticsReport {
    Overview(OverviewReport),
    Users(UsersReport),
    Jobs(JobsReport),
    Payments(PaymentsReport),
    Disputes(DisputesReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_days() {
        assert_eq!(Period::Week.days(), 7);
        assert_eq!(Period::Month.days(), 30);
        assert_eq!(Period::Quarter.days(), 90);
        assert_eq!(Period::Year.days(), 365);
    }

    #[test]
    fn test_period_deserializes_from_short_form() {
        let p: Period = serde_json::from_str("\"90d\"").unwrap();
        assert_eq!(p, Period::Quarter);
    }

    #[test]
    fn test_report_tagging() {
        let report = AnalyticsReport::Overview(OverviewReport {
            total_users: 10,
            total_jobs: 4,
            active_jobs: 2,
            payment_volume: Decimal::ZERO,
            held_in_escrow: Decimal::ZERO,
            open_disputes: 1,
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["type"], "overview");
        assert_eq!(json["total_users"], 10);
    }
}
