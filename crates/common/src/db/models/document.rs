//! Document entity and its processing status

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing status of an uploaded document.
///
/// The gateway moves a document through `Uploading -> PendingProcessing`,
/// or to `WorkerCallFailed` when the worker cannot be reached. The worker
/// owns `Processing`, `Completed` and `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploading,
    PendingProcessing,
    WorkerCallFailed,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "UPLOADING",
            DocumentStatus::PendingProcessing => "PENDING_PROCESSING",
            DocumentStatus::WorkerCallFailed => "WORKER_CALL_FAILED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        }
    }

    /// No further transition happens without user action
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::WorkerCallFailed | DocumentStatus::Completed | DocumentStatus::Failed
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADING" => Ok(DocumentStatus::Uploading),
            "PENDING_PROCESSING" => Ok(DocumentStatus::PendingProcessing),
            "WORKER_CALL_FAILED" => Ok(DocumentStatus::WorkerCallFailed),
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "COMPLETED" => Ok(DocumentStatus::Completed),
            "FAILED" => Ok(DocumentStatus::Failed),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown document status '{}'", other),
            }),
        }
    }
}

impl From<DocumentStatus> for String {
    fn from(status: DocumentStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Original filename as uploaded
    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// Uppercased extension, e.g. PDF
    #[sea_orm(column_type = "Text")]
    pub file_type: String,

    /// Public blob URL; empty until the upload completes
    #[sea_orm(column_type = "Text")]
    pub url: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(indexed)]
    pub course_id: Uuid,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the status as an enum, `None` if the row holds an unknown value
    pub fn document_status(&self) -> Option<DocumentStatus> {
        self.status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id",
        on_delete = "Cascade"
    )]
    Course,
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Derive the stored file type from a filename: the text after the last
/// dot, uppercased, or `UNKNOWN` when there is none.
pub fn file_type_from_name(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_uppercase(),
        _ => "UNKNOWN".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            DocumentStatus::Uploading,
            DocumentStatus::PendingProcessing,
            DocumentStatus::WorkerCallFailed,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("processed".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&DocumentStatus::PendingProcessing).unwrap();
        assert_eq!(json, "\"PENDING_PROCESSING\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DocumentStatus::WorkerCallFailed.is_terminal());
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(!DocumentStatus::PendingProcessing.is_terminal());
        assert!(!DocumentStatus::Uploading.is_terminal());
    }

    #[test]
    fn test_file_type_from_name() {
        assert_eq!(file_type_from_name("lecture-01.pdf"), "PDF");
        assert_eq!(file_type_from_name("notes.v2.Md"), "MD");
        assert_eq!(file_type_from_name("README"), "UNKNOWN");
        assert_eq!(file_type_from_name("trailing."), "UNKNOWN");
    }
}
