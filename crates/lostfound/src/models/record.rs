//! Finalized reports and their stored form

use super::session::{Form, ReportKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the recorder
pub type RecordId = i64;

/// Completion state of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Unfinished,
    Completed,
}

impl RecordStatus {
    /// Value stored in the `status` column
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Unfinished => "未完成",
            RecordStatus::Completed => "已完成",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "未完成" => Ok(RecordStatus::Unfinished),
            "已完成" => Ok(RecordStatus::Completed),
            _ => Err(format!("Unknown record status: {}", s)),
        }
    }
}

/// A completed intake, handed to the recorder on commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub kind: ReportKind,
    pub reporter_id: String,
    pub city: String,
    pub item_name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub image_name: Option<String>,
    pub status: RecordStatus,
}

impl Report {
    pub fn from_form(kind: ReportKind, form: &Form) -> Self {
        Self {
            kind,
            reporter_id: form.reporter_id.clone(),
            city: form.city.clone(),
            item_name: form.item_name.clone(),
            description: form.description.clone(),
            tags: form.tags.iter().cloned().collect(),
            image_name: form.image_name.clone(),
            status: RecordStatus::Unfinished,
        }
    }
}

/// A report as read back from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: RecordId,
    pub kind: ReportKind,
    pub item_name: String,
    pub reporter: String,
    pub complete_user: Option<String>,
    pub tags: Vec<String>,
    pub city: String,
    pub description: String,
    pub img_name: Option<String>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

/// Which slice of the records a browse request wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    Status(RecordStatus),
    /// Records carrying every listed tag
    Tags(Vec<String>),
}

/// Browse query against one kind of record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub kind: ReportKind,
    pub filter: RecordFilter,
}

impl RecordQuery {
    pub fn new(kind: ReportKind, filter: RecordFilter) -> Self {
        Self { kind, filter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_record_status_round_trip() {
        assert_eq!(
            "未完成".parse::<RecordStatus>().unwrap(),
            RecordStatus::Unfinished
        );
        assert_eq!(RecordStatus::Completed.to_string(), "已完成");
        assert!("done".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_report_from_form_starts_unfinished() {
        let form = Form {
            reporter_id: "lisi".into(),
            city: "上海".into(),
            item_name: "钱包".into(),
            description: "黑色皮质".into(),
            tags: BTreeSet::from(["上海".to_string(), "钱包".to_string()]),
            tagged_text: None,
            image_ref: Some("http://p/1".into()),
            image_name: Some("m1.png".into()),
        };
        let report = Report::from_form(ReportKind::Found, &form);
        assert_eq!(report.status, RecordStatus::Unfinished);
        assert_eq!(report.tags, vec!["上海".to_string(), "钱包".to_string()]);
        assert_eq!(report.image_name.as_deref(), Some("m1.png"));
        assert_eq!(report.reporter_id, "lisi");
    }
}
