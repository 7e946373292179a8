//! Conversation engine
//!
//! Every inbound message is routed through the [`StageDispatcher`], which locks the
//! sender's session, runs the handler for the current `(stage, status)` and returns an
//! [`Outcome`]: the synchronous reply plus the slow work ([`Effect`]s) to run once the
//! session lock has been released.

mod browse;
mod confirm;
mod dispatcher;
mod effects;
mod review;
mod store;

pub use dispatcher::StageDispatcher;
pub use effects::EffectRunner;
pub use store::{SessionGuard, SessionStore};

use crate::models::{Form, RecordQuery, Report};
use crate::services::TagExtractor;

/// Work deferred until after the reply has been produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PushText(String),
    PushMarkdown(String),
    /// Store the confirmed picture locally
    DownloadImage { url: String, file_name: String },
    /// Persist a finalized report and tell the user its id
    Commit(Report),
    /// Push every matching record, then the browse follow-up menu
    ShowRecords(RecordQuery),
}

/// Result of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub user_id: String,
    pub reply: String,
    pub effects: Vec<Effect>,
}

/// What a stage handler decided for the current message
#[derive(Debug, Default)]
pub(crate) struct Turn {
    pub reply: String,
    pub effects: Vec<Effect>,
    /// Remove the session before releasing it
    pub end_session: bool,
}

impl Turn {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            ..Default::default()
        }
    }

    pub fn end(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            end_session: true,
            ..Default::default()
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Input tokens accepted by every yes/no confirmation
pub(crate) fn is_yes(input: &str) -> bool {
    matches!(input, "1" | "yes")
}

/// Re-derive the form's tags unless they already match its text.
///
/// Returns whether the extractor ran; it runs at most once per distinct text.
pub(crate) fn refresh_tags(form: &mut Form, extractor: &dyn TagExtractor) -> bool {
    if form.tags_current() {
        return false;
    }
    let source = form.tag_source();
    form.tags = extractor.extract_tags(&source);
    form.tagged_text = Some(source);
    true
}

/// Two prompts shown as one message
pub(crate) fn join_lines(first: &str, second: &str) -> String {
    format!("{}\n{}", first, second)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fakes shared by the engine tests

    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::error::{LostFoundError, LostFoundResult};
    use crate::models::{ItemRecord, RecordFilter, RecordId, RecordQuery, Report, ReportKind};
    use crate::services::{ImageFetcher, Notifier, Recorder, TagExtractor};

    #[derive(Default)]
    pub struct MemoryRecorder {
        pub reports: Mutex<Vec<Report>>,
        pub records: Mutex<Vec<ItemRecord>>,
        pub tags: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Recorder for MemoryRecorder {
        async fn add_record(&self, report: &Report) -> LostFoundResult<RecordId> {
            if self.fail {
                return Err(LostFoundError::Database("disk full".into()));
            }
            let mut reports = self.reports.lock().unwrap();
            reports.push(report.clone());
            Ok(reports.len() as RecordId)
        }

        async fn find_records(&self, query: &RecordQuery) -> LostFoundResult<Vec<ItemRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.kind == query.kind)
                .filter(|r| match &query.filter {
                    RecordFilter::All => true,
                    RecordFilter::Status(s) => r.status == *s,
                    RecordFilter::Tags(tags) => tags.iter().all(|t| r.tags.contains(t)),
                })
                .cloned()
                .collect())
        }

        async fn list_tags(&self, _kind: ReportKind) -> LostFoundResult<Vec<String>> {
            Ok(self.tags.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    pub struct MemoryNotifier {
        pub texts: Mutex<Vec<(String, String)>>,
        pub markdowns: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for MemoryNotifier {
        async fn push_text(&self, user_id: &str, text: &str) -> LostFoundResult<()> {
            self.texts
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn push_markdown(&self, user_id: &str, markdown: &str) -> LostFoundResult<()> {
            self.markdowns
                .lock()
                .unwrap()
                .push((user_id.to_string(), markdown.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryFetcher {
        pub fetched: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ImageFetcher for MemoryFetcher {
        async fn fetch(&self, url: &str, file_name: &str) -> LostFoundResult<PathBuf> {
            self.fetched
                .lock()
                .unwrap()
                .push((url.to_string(), file_name.to_string()));
            Ok(PathBuf::from(file_name))
        }
    }

    /// Splits on whitespace and counts invocations
    #[derive(Default)]
    pub struct CountingTags {
        pub calls: Mutex<usize>,
    }

    impl TagExtractor for CountingTags {
        fn extract_tags(&self, text: &str) -> BTreeSet<String> {
            *self.calls.lock().unwrap() += 1;
            text.split_whitespace().map(str::to_string).collect()
        }
    }
}
