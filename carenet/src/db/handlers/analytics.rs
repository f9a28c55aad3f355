//! SQL-aggregated analytics reports.

use crate::api::models::analytics::{
    AnalyticsReport, BucketCount, DayCount, DayVolume, DisputesReport, JobsReport, OverviewReport, PaymentsReport,
    Period, ReportType, UsersReport,
};
use crate::db::errors::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::instrument;

pub struct Analytics<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Analytics<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(report = ?report_type, period = ?period), err)]
    pub async fn report(&mut self, report_type: ReportType, period: Period) -> Result<AnalyticsReport> {
        let since = Utc::now() - Duration::days(period.days());
        let report = match report_type {
            ReportType::Overview => AnalyticsReport::Overview(self.overview(since).await?),
            ReportType::Users => AnalyticsReport::Users(self.users(since).await?),
            ReportType::Jobs => AnalyticsReport::Jobs(self.jobs(since).await?),
            ReportType::Payments => AnalyticsReport::Payments(self.payments(since).await?),
            ReportType::Disputes => AnalyticsReport::Disputes(self.disputes(since).await?),
        };
        Ok(report)
    }

    async fn scalar_i64(&mut self, sql: &str, since: Option<DateTime<Utc>>) -> Result<i64> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        if let Some(since) = since {
            query = query.bind(since);
        }
        Ok(query.fetch_one(&mut *self.db).await?)
    }

    async fn scalar_decimal(&mut self, sql: &str, since: Option<DateTime<Utc>>) -> Result<Decimal> {
        let mut query = sqlx::query_scalar::<_, Decimal>(sql);
        if let Some(since) = since {
            query = query.bind(since);
        }
        Ok(query.fetch_one(&mut *self.db).await?)
    }

    async fn buckets(&mut self, sql: &str, since: Option<DateTime<Utc>>) -> Result<Vec<BucketCount>> {
        let mut query = sqlx::query_as::<_, BucketCount>(sql);
        if let Some(since) = since {
            query = query.bind(since);
        }
        Ok(query.fetch_all(&mut *self.db).await?)
    }

    async fn overview(&mut self, since: DateTime<Utc>) -> Result<OverviewReport> {
        let total_users = self.scalar_i64("SELECT COUNT(*) FROM users", None).await?;
        let total_jobs = self.scalar_i64("SELECT COUNT(*) FROM jobs", None).await?;
        let active_jobs = self
            .scalar_i64("SELECT COUNT(*) FROM jobs WHERE status = 'ACTIVE'", None)
            .await?;
        let payment_volume = self
            .scalar_decimal(
                "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status != 'FAILED' AND created_at >= $1",
                Some(since),
            )
            .await?;
        let held_in_escrow = self
            .scalar_decimal(
                "SELECT COALESCE(SUM(amount), 0) FROM escrow_transactions WHERE status IN ('HELD', 'DISPUTED')",
                None,
            )
            .await?;
        let open_disputes = self
            .scalar_i64("SELECT COUNT(*) FROM disputes WHERE status = 'OPEN'", None)
            .await?;

        Ok(OverviewReport {
            total_users,
            total_jobs,
            active_jobs,
            payment_volume,
            held_in_escrow,
            open_disputes,
        })
    }

    async fn users(&mut self, since: DateTime<Utc>) -> Result<UsersReport> {
        let new_users = self
            .scalar_i64("SELECT COUNT(*) FROM users WHERE created_at >= $1", Some(since))
            .await?;
        let by_role = self
            .buckets(
                r#"
                SELECT ur.role::text AS label, COUNT(*) AS count
                FROM user_roles ur
                JOIN users u ON u.id = ur.user_id
                WHERE u.created_at >= $1
                GROUP BY ur.role
                ORDER BY count DESC
                "#,
                Some(since),
            )
            .await?;
        let by_kyc_status = self
            .buckets(
                r#"
                SELECT kyc_status::text AS label, COUNT(*) AS count
                FROM users WHERE created_at >= $1
                GROUP BY kyc_status ORDER BY count DESC
                "#,
                Some(since),
            )
            .await?;

        Ok(UsersReport {
            new_users,
            by_role,
            by_kyc_status,
        })
    }

    async fn jobs(&mut self, since: DateTime<Utc>) -> Result<JobsReport> {
        let created = self
            .scalar_i64("SELECT COUNT(*) FROM jobs WHERE created_at >= $1", Some(since))
            .await?;
        let by_status = self
            .buckets(
                r#"
                SELECT status::text AS label, COUNT(*) AS count
                FROM jobs WHERE created_at >= $1
                GROUP BY status ORDER BY count DESC
                "#,
                Some(since),
            )
            .await?;
        let per_day = sqlx::query_as::<_, DayCount>(
            r#"
            SELECT created_at::date AS day, COUNT(*) AS count
            FROM jobs WHERE created_at >= $1
            GROUP BY day ORDER BY day
            "#,
        )
        .bind(since)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(JobsReport {
            created,
            by_status,
            per_day,
        })
    }

    async fn payments(&mut self, since: DateTime<Utc>) -> Result<PaymentsReport> {
        let count = self
            .scalar_i64("SELECT COUNT(*) FROM payments WHERE created_at >= $1", Some(since))
            .await?;
        let volume = self
            .scalar_decimal(
                "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status != 'FAILED' AND created_at >= $1",
                Some(since),
            )
            .await?;
        let by_method = self
            .buckets(
                r#"
                SELECT method::text AS label, COUNT(*) AS count
                FROM payments WHERE created_at >= $1
                GROUP BY method ORDER BY count DESC
                "#,
                Some(since),
            )
            .await?;
        let by_status = self
            .buckets(
                r#"
                SELECT status::text AS label, COUNT(*) AS count
                FROM payments WHERE created_at >= $1
                GROUP BY status ORDER BY count DESC
                "#,
                Some(since),
            )
            .await?;
        let volume_per_day = sqlx::query_as::<_, DayVolume>(
            r#"
            SELECT created_at::date AS day, COALESCE(SUM(amount), 0) AS volume
            FROM payments WHERE status != 'FAILED' AND created_at >= $1
            GROUP BY day ORDER BY day
            "#,
        )
        .bind(since)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(PaymentsReport {
            count,
            volume,
            by_method,
            by_status,
            volume_per_day,
        })
    }

    async fn disputes(&mut self, since: DateTime<Utc>) -> Result<DisputesReport> {
        let opened = self
            .scalar_i64("SELECT COUNT(*) FROM disputes WHERE created_at >= $1", Some(since))
            .await?;
        let resolved = self
            .scalar_i64(
                "SELECT COUNT(*) FROM disputes WHERE status = 'RESOLVED' AND resolved_at >= $1",
                Some(since),
            )
            .await?;
        let by_resolution = self
            .buckets(
                r#"
                SELECT resolution::text AS label, COUNT(*) AS count
                FROM disputes WHERE resolution IS NOT NULL AND resolved_at >= $1
                GROUP BY resolution ORDER BY count DESC
                "#,
                Some(since),
            )
            .await?;

        Ok(DisputesReport {
            opened,
            resolved,
            by_resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::jobs::JobStatus;
    use crate::db::handlers::{Escrows, Jobs};
    use crate::test_utils::{create_completed_payment, create_guardian};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_overview_counts(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "an_guardian1").await;
        let (payment, job) = create_completed_payment(&mut conn, &guardian).await;

        Jobs::new(&mut conn).set_status(job.id, JobStatus::Active).await.unwrap();
        Escrows::new(&mut conn).hold(payment.id, guardian.id).await.unwrap();

        let mut repo = Analytics::new(&mut conn);
        let report = repo.report(ReportType::Overview, Period::Month).await.unwrap();
        let AnalyticsReport::Overview(overview) = report else {
            panic!("expected overview report");
        };
        assert_eq!(overview.total_users, 1);
        assert_eq!(overview.total_jobs, 1);
        assert_eq!(overview.active_jobs, 1);
        assert_eq!(overview.held_in_escrow, payment.amount);
        assert_eq!(overview.open_disputes, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_payments_report_groups_by_method(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "an_guardian2").await;
        let (payment, _) = create_completed_payment(&mut conn, &guardian).await;

        let mut repo = Analytics::new(&mut conn);
        let report = repo.report(ReportType::Payments, Period::Week).await.unwrap();
        let AnalyticsReport::Payments(payments) = report else {
            panic!("expected payments report");
        };
        assert_eq!(payments.count, 1);
        assert_eq!(payments.volume, payment.amount);
        assert_eq!(payments.by_method.len(), 1);
        assert_eq!(payments.volume_per_day.len(), 1);
    }
}
