//! Per-user conversation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Major step of the intake dialog.
///
/// The numeric values are part of the user-visible protocol: the review stage's field
/// selector jumps to a stage by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Stage {
    ChooseKind = 0,
    ChooseOperation = 1,
    City = 2,
    ItemName = 3,
    Description = 4,
    Image = 5,
    Review = 6,
}

impl Stage {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Stage::ChooseKind),
            1 => Some(Stage::ChooseOperation),
            2 => Some(Stage::City),
            3 => Some(Stage::ItemName),
            4 => Some(Stage::Description),
            5 => Some(Stage::Image),
            6 => Some(Stage::Review),
            _ => None,
        }
    }

    /// Stage reached by a successful confirm in linear order.
    pub fn next(self) -> Self {
        Stage::from_number(self.number() + 1).unwrap_or(Stage::Review)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Sub-state within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    #[serde(rename = "")]
    Idle,
    WaitConfirm,
    WaitChoose,
    WaitTags,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, ""),
            Status::WaitConfirm => write!(f, "waitconfirm"),
            Status::WaitChoose => write!(f, "waitchoose"),
            Status::WaitTags => write!(f, "waittags"),
        }
    }
}

/// What the user is reporting. Set once at stage 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Lost,
    Found,
    Admin,
}

impl ReportKind {
    /// Storage discriminator, kept compatible with existing `item_records` rows.
    pub fn as_i64(self) -> i64 {
        match self {
            ReportKind::Lost => 1,
            ReportKind::Found => 2,
            ReportKind::Admin => 3,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(ReportKind::Lost),
            2 => Some(ReportKind::Found),
            3 => Some(ReportKind::Admin),
            _ => None,
        }
    }

    /// Kind of records this user browses: losers look at found items and vice versa.
    pub fn browse_target(self) -> Self {
        match self {
            ReportKind::Lost => ReportKind::Found,
            ReportKind::Found => ReportKind::Lost,
            ReportKind::Admin => ReportKind::Admin,
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Lost => write!(f, "lost"),
            ReportKind::Found => write!(f, "found"),
            ReportKind::Admin => write!(f, "admin"),
        }
    }
}

/// Operation chosen at stage 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    List,
}

/// Accumulator for one report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub reporter_id: String,
    pub city: String,
    pub item_name: String,
    pub description: String,
    /// Derived from city + item name + description, never entered by the user.
    pub tags: BTreeSet<String>,
    /// Text `tags` were extracted from; differs from `tag_source()` after an edit.
    #[serde(default)]
    pub tagged_text: Option<String>,
    /// Picture URL as delivered by the platform.
    pub image_ref: Option<String>,
    /// Local file name once the picture is confirmed.
    pub image_name: Option<String>,
}

impl Form {
    /// Text the tag extractor runs over.
    pub fn tag_source(&self) -> String {
        let mut text = String::with_capacity(
            self.city.len() + self.item_name.len() + self.description.len(),
        );
        text.push_str(&self.city);
        text.push_str(&self.item_name);
        text.push_str(&self.description);
        text
    }

    /// Whether `tags` still describe the current city, item name and description
    pub fn tags_current(&self) -> bool {
        self.tagged_text.as_deref() == Some(self.tag_source().as_str())
    }
}

/// One per user identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub stage: Stage,
    pub status: Status,
    pub report_kind: Option<ReportKind>,
    pub operation: Option<Operation>,
    pub form: Form,
    pub edited: bool,
    pub last_active_at: DateTime<Utc>,
    /// Set once the session has been removed from the store; a handler that was
    /// waiting on it must look the user up again.
    #[serde(skip)]
    pub(crate) closed: bool,
    /// True until the first message has been handled
    #[serde(skip)]
    pub(crate) fresh: bool,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            form: Form {
                reporter_id: user_id.clone(),
                ..Form::default()
            },
            user_id,
            stage: Stage::ChooseKind,
            status: Status::Idle,
            report_kind: None,
            operation: None,
            edited: false,
            last_active_at: Utc::now(),
            closed: false,
            fresh: true,
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Move to another stage; the status never survives a stage change.
    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.status = Status::Idle;
    }

    /// Report kind, defaulting to lost for sessions that skipped stage 0 (never in practice).
    pub fn kind(&self) -> ReportKind {
        self.report_kind.unwrap_or(ReportKind::Lost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_at_stage_zero() {
        let session = Session::new("zhangsan");
        assert_eq!(session.stage, Stage::ChooseKind);
        assert_eq!(session.status, Status::Idle);
        assert_eq!(session.form.reporter_id, "zhangsan");
        assert!(!session.edited);
        assert!(!session.is_closed());
    }

    #[test]
    fn test_stage_numbers() {
        for n in 0..=6 {
            assert_eq!(Stage::from_number(n).unwrap().number(), n);
        }
        assert!(Stage::from_number(7).is_none());
        assert_eq!(Stage::Image.next(), Stage::Review);
        assert_eq!(Stage::Review.next(), Stage::Review);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Idle.to_string(), "");
        assert_eq!(Status::WaitConfirm.to_string(), "waitconfirm");
        assert_eq!(Status::WaitTags.to_string(), "waittags");
    }

    #[test]
    fn test_browse_target_is_inverted() {
        assert_eq!(ReportKind::Lost.browse_target(), ReportKind::Found);
        assert_eq!(ReportKind::Found.browse_target(), ReportKind::Lost);
    }

    #[test]
    fn test_enter_clears_status() {
        let mut session = Session::new("u");
        session.status = Status::WaitConfirm;
        session.enter(Stage::ItemName);
        assert_eq!(session.status, Status::Idle);
        assert_eq!(session.stage, Stage::ItemName);
    }

    #[test]
    fn test_tags_go_stale_when_text_changes() {
        let mut form = Form {
            city: "北京".into(),
            item_name: "雨伞".into(),
            ..Form::default()
        };
        assert!(!form.tags_current());
        form.tagged_text = Some(form.tag_source());
        assert!(form.tags_current());

        form.city = "成都".into();
        assert!(!form.tags_current());
        form.city = "北京".into();
        assert!(form.tags_current());

        form.image_name = Some("m.png".into());
        assert!(form.tags_current());
    }
}
