//! Represents an entry of the `auditoria_arquivos_log` table.
//!
//! Rows are written by database triggers on the `files` table; the service
//! only reads them. Field names are serialized exactly as the columns are
//! named so the report keeps the table's vocabulary.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, types::Json};
use std::{fmt, str::FromStr};

/// Text layout used for `tempo_modificacao`, matching the triggers'
/// `strftime('%Y-%m-%dT%H:%M:%f+00:00')`. Lexicographic order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f+00:00";

/// Kind of mutation captured by an audit entry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "INSERT",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperation(pub String);

impl FromStr for OperationType {
    type Err = UnknownOperation;

    /// Case-insensitive; `insert`, `Insert` and `INSERT` are all accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(OperationType::Insert),
            "UPDATE" => Ok(OperationType::Update),
            "DELETE" => Ok(OperationType::Delete),
            _ => Err(UnknownOperation(s.to_string())),
        }
    }
}

/// One captured mutation of the upload ledger.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct AuditLogEntry {
    pub log_id: i64,

    /// Table whose row changed (always `files` today).
    #[serde(rename = "tabela_modificada")]
    #[sqlx(rename = "tabela_modificada")]
    pub table_modified: String,

    #[serde(rename = "operacao_tipo")]
    #[sqlx(rename = "operacao_tipo")]
    pub operation_type: OperationType,

    /// Row state before the change; `None` for inserts.
    #[serde(rename = "dados_antigos")]
    #[sqlx(rename = "dados_antigos")]
    pub old_data: Option<Json<Value>>,

    /// Row state after the change; `None` for deletes.
    #[serde(rename = "dados_novos")]
    #[sqlx(rename = "dados_novos")]
    pub new_data: Option<Json<Value>>,

    pub requester_ip: String,

    #[serde(rename = "usuario_db")]
    #[sqlx(rename = "usuario_db")]
    pub database_user: String,

    #[serde(rename = "tempo_modificacao")]
    #[sqlx(rename = "tempo_modificacao")]
    pub modified_at: DateTime<Utc>,
}

/// Format a timestamp the way the audit triggers store it.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Midnight UTC at the start of `date`, in stored timestamp form.
pub fn start_of_day(date: NaiveDate) -> String {
    format_timestamp(&date.and_time(NaiveTime::MIN).and_utc())
}
