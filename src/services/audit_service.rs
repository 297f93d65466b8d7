//! AuditService: read-only reporting over `auditoria_arquivos_log`.

use crate::models::audit_log::{AuditLogEntry, OperationType, start_of_day};
use chrono::{Datelike, Days, NaiveDate};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Last year whose midnight still formats as a four-digit `tempo_modificacao`.
/// Later dates render with a sign and would compare out of order as text.
const LAST_STORABLE_YEAR: i32 = 9999;

#[derive(Debug, Error)]
pub enum AuditQueryError {
    #[error("invalid date `{value}` for `{param}`, expected YYYY-MM-DD")]
    InvalidDate { param: &'static str, value: String },
    #[error("unknown operation type `{0}`, expected INSERT, UPDATE or DELETE")]
    InvalidOperation(String),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

/// Optional filters, combined with AND. An empty filter matches every row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditLogFilter {
    /// Inclusive lower bound, from the start of this day (UTC).
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound, through the end of this day (UTC).
    pub end_date: Option<NaiveDate>,
    pub operation: Option<OperationType>,
    /// Exact match.
    pub requester_ip: Option<String>,
}

#[derive(Clone)]
pub struct AuditService {
    pub db: Arc<SqlitePool>,
}

impl AuditService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Matching entries, newest first.
    pub async fn list_entries(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogEntry>, AuditQueryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT log_id, tabela_modificada, operacao_tipo, dados_antigos, dados_novos, \
             requester_ip, usuario_db, tempo_modificacao \
             FROM auditoria_arquivos_log WHERE 1 = 1",
        );

        if let Some(start) = filter.start_date {
            if start.year() > LAST_STORABLE_YEAR {
                builder.push(" AND 0");
            } else {
                builder.push(" AND tempo_modificacao >= ");
                builder.push_bind(start_of_day(start));
            }
        }

        // Exclusive bound at the next midnight keeps the whole end day. Past
        // the last storable year every stored row is earlier, so no bound.
        if let Some(next_day) = filter
            .end_date
            .and_then(|end| end.checked_add_days(Days::new(1)))
            .filter(|next_day| next_day.year() <= LAST_STORABLE_YEAR)
        {
            builder.push(" AND tempo_modificacao < ");
            builder.push_bind(start_of_day(next_day));
        }

        if let Some(operation) = filter.operation {
            builder.push(" AND operacao_tipo = ");
            builder.push_bind(operation.as_str());
        }

        if let Some(ip) = &filter.requester_ip {
            builder.push(" AND requester_ip = ");
            builder.push_bind(ip.clone());
        }

        builder.push(" ORDER BY tempo_modificacao DESC, log_id DESC");

        let rows: Vec<AuditLogEntry> = builder.build_query_as().fetch_all(&*self.db).await?;
        debug!(count = rows.len(), ?filter, "queried audit log");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn seeded() -> AuditService {
        let pool = db::connect_in_memory().await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let rows = [
            ("INSERT", "10.0.0.1", "2023-12-31T23:59:59.999+00:00"),
            ("INSERT", "10.0.0.2", "2024-01-01T00:00:00.000+00:00"),
            ("UPDATE", "10.0.0.1", "2024-01-01T12:30:00.000+00:00"),
            ("DELETE", "10.0.0.10", "2024-01-01T23:59:59.999+00:00"),
            ("INSERT", "10.0.0.1", "2024-01-02T00:00:00.000+00:00"),
        ];
        for (op, ip, at) in rows {
            sqlx::query(
                "INSERT INTO auditoria_arquivos_log
                    (tabela_modificada, operacao_tipo, dados_antigos, dados_novos,
                     requester_ip, usuario_db, tempo_modificacao)
                 VALUES ('files', ?, NULL, '{\"filename\":\"x\"}', ?, 'tester', ?)",
            )
            .bind(op)
            .bind(ip)
            .bind(at)
            .execute(&pool)
            .await
            .unwrap();
        }

        AuditService::new(Arc::new(pool))
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn no_filter_returns_everything_newest_first() {
        let svc = seeded().await;
        let rows = svc.list_entries(&AuditLogFilter::default()).await.unwrap();

        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].modified_at >= w[1].modified_at));
        assert_eq!(rows[0].requester_ip, "10.0.0.1");
        assert_eq!(rows[0].new_data.as_ref().unwrap().0["filename"], "x");
    }

    #[tokio::test]
    async fn single_day_range_is_inclusive_on_both_ends() {
        let svc = seeded().await;
        let filter = AuditLogFilter {
            start_date: Some(day(2024, 1, 1)),
            end_date: Some(day(2024, 1, 1)),
            ..Default::default()
        };
        let rows = svc.list_entries(&filter).await.unwrap();

        let ips: Vec<_> = rows.iter().map(|r| r.requester_ip.as_str()).collect();
        assert_eq!(ips, ["10.0.0.10", "10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn operation_and_ip_filters_combine() {
        let svc = seeded().await;
        let filter = AuditLogFilter {
            operation: Some(OperationType::Insert),
            requester_ip: Some("10.0.0.1".into()),
            ..Default::default()
        };
        let rows = svc.list_entries(&filter).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.operation_type == OperationType::Insert));
        assert!(rows.iter().all(|r| r.requester_ip == "10.0.0.1"));
    }

    #[tokio::test]
    async fn ip_filter_is_exact() {
        let svc = seeded().await;
        let filter = AuditLogFilter {
            requester_ip: Some("10.0.0.1".into()),
            ..Default::default()
        };
        let rows = svc.list_entries(&filter).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.requester_ip == "10.0.0.1"));
    }

    #[tokio::test]
    async fn end_date_in_the_last_storable_year_keeps_every_row() {
        let svc = seeded().await;
        let filter = AuditLogFilter {
            end_date: Some(day(9999, 12, 31)),
            ..Default::default()
        };
        let rows = svc.list_entries(&filter).await.unwrap();
        assert_eq!(rows.len(), 5);

        let filter = AuditLogFilter {
            start_date: Some(day(2024, 1, 2)),
            end_date: Some(day(9999, 12, 31)),
            ..Default::default()
        };
        let rows = svc.list_entries(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].requester_ip, "10.0.0.1");
    }

    #[tokio::test]
    async fn dates_beyond_the_last_storable_year() {
        let svc = seeded().await;

        let filter = AuditLogFilter {
            end_date: Some(day(10000, 6, 1)),
            ..Default::default()
        };
        assert_eq!(svc.list_entries(&filter).await.unwrap().len(), 5);

        let filter = AuditLogFilter {
            start_date: Some(day(10000, 1, 1)),
            ..Default::default()
        };
        assert!(svc.list_entries(&filter).await.unwrap().is_empty());
    }
}
