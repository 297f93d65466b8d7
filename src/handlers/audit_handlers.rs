//! HTTP handler for the audit report over uploaded files.

use crate::{
    errors::AppError,
    models::audit_log::{AuditLogEntry, OperationType},
    services::audit_service::{AuditLogFilter, AuditQueryError},
    state::AppState,
};
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::error;

/// Query params accepted by the audit report. Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct AuditReportQuery {
    #[serde(rename = "dataInicio")]
    pub start_date: Option<String>,
    #[serde(rename = "dataFim")]
    pub end_date: Option<String>,
    #[serde(rename = "operacao_tipo")]
    pub operation_type: Option<String>,
    #[serde(rename = "ip")]
    pub requester_ip: Option<String>,
}

impl TryFrom<AuditReportQuery> for AuditLogFilter {
    type Error = AuditQueryError;

    fn try_from(q: AuditReportQuery) -> Result<Self, Self::Error> {
        let operation = present(q.operation_type)
            .map(|raw| {
                raw.parse::<OperationType>()
                    .map_err(|_| AuditQueryError::InvalidOperation(raw))
            })
            .transpose()?;

        Ok(Self {
            start_date: parse_date("dataInicio", q.start_date)?,
            end_date: parse_date("dataFim", q.end_date)?,
            operation,
            requester_ip: present(q.requester_ip),
        })
    }
}

/// GET `/api/relatorio-auditoria/arquivos`
pub async fn audit_report(
    State(state): State<AppState>,
    Query(query): Query<AuditReportQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    let filter = AuditLogFilter::try_from(query)?;
    let entries = state.audit.list_entries(&filter).await.map_err(|err| {
        error!(error = %err, "failed to generate audit report");
        AppError::from(err)
    })?;
    Ok(Json(entries))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_date(param: &'static str, value: Option<String>) -> Result<Option<NaiveDate>, AuditQueryError> {
    present(value)
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| AuditQueryError::InvalidDate { param, value: raw })
        })
        .transpose()
}
