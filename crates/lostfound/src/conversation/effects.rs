//! Out-of-band execution of deferred work: pushes, persistence, image download

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::{Effect, Outcome};
use crate::config::DialogConfig;
use crate::error::LostFoundResult;
use crate::services::{record_markdown, ImageFetcher, Notifier, Recorder};

/// A lane worker exits after this long without work
const LANE_IDLE: Duration = Duration::from_secs(30);

type Lane = mpsc::UnboundedSender<Vec<Effect>>;

/// Runs an outcome's effects in order once its session has been released.
///
/// Each user has one lane: outcomes spawned for the same user run one after another
/// in spawn order, so pushes from consecutive messages never interleave. Different
/// users run concurrently. Failures are logged and never retried here; retries
/// belong to the notifier.
pub struct EffectRunner {
    notifier: Arc<dyn Notifier>,
    recorder: Arc<dyn Recorder>,
    images: Arc<dyn ImageFetcher>,
    config: Arc<DialogConfig>,
    lanes: Mutex<HashMap<String, Lane>>,
}

impl EffectRunner {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        recorder: Arc<dyn Recorder>,
        images: Arc<dyn ImageFetcher>,
        config: Arc<DialogConfig>,
    ) -> Self {
        Self {
            notifier,
            recorder,
            images,
            config,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Queue the outcome's effects on its user's lane, detached from the request
    pub async fn spawn(self: &Arc<Self>, outcome: Outcome) {
        if outcome.effects.is_empty() {
            return;
        }
        let Outcome { user_id, effects, .. } = outcome;

        let mut lanes = self.lanes.lock().await;
        let effects = match lanes.get(&user_id) {
            Some(lane) => match lane.send(effects) {
                Ok(()) => return,
                Err(mpsc::error::SendError(effects)) => effects,
            },
            None => effects,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // the receiver is alive until the worker below exits
        let _ = tx.send(effects);
        lanes.insert(user_id.clone(), tx);
        drop(lanes);

        let runner = self.clone();
        tokio::spawn(async move {
            runner.drain(user_id, rx).await;
        });
    }

    /// Lane worker: run queued batches until the lane has been idle for a while
    async fn drain(&self, user_id: String, mut rx: mpsc::UnboundedReceiver<Vec<Effect>>) {
        loop {
            let effects = match tokio::time::timeout(LANE_IDLE, rx.recv()).await {
                Ok(Some(effects)) => effects,
                Ok(None) => return,
                Err(_) => {
                    // senders only push while holding the map lock, so nothing can
                    // arrive between this check and the removal
                    let mut lanes = self.lanes.lock().await;
                    match rx.try_recv() {
                        Ok(effects) => effects,
                        Err(_) => {
                            lanes.remove(&user_id);
                            debug!(user_id = %user_id, "Effect lane closed");
                            return;
                        }
                    }
                }
            };
            self.run(&user_id, effects).await;
        }
    }

    pub async fn run(&self, user_id: &str, effects: Vec<Effect>) {
        for effect in effects {
            if let Err(e) = self.apply(user_id, effect).await {
                error!(user_id, error = %e, "Deferred effect failed");
            }
        }
    }

    async fn apply(&self, user_id: &str, effect: Effect) -> LostFoundResult<()> {
        let prompts = &self.config.prompts;
        match effect {
            Effect::PushText(text) => self.notifier.push_text(user_id, &text).await,
            Effect::PushMarkdown(markdown) => {
                self.notifier.push_markdown(user_id, &markdown).await
            }
            Effect::DownloadImage { url, file_name } => {
                self.images.fetch(&url, &file_name).await.map(|_| ())
            }
            Effect::Commit(report) => match self.recorder.add_record(&report).await {
                Ok(id) => {
                    info!(user_id, record_id = id, kind = %report.kind, "Report committed");
                    self.notifier
                        .push_text(user_id, &format!("{}{}", prompts.committed, id))
                        .await
                }
                Err(e) => {
                    error!(user_id, error = %e, "Failed to persist report");
                    self.notifier.push_text(user_id, &prompts.commit_failed).await
                }
            },
            Effect::ShowRecords(query) => {
                let records = self.recorder.find_records(&query).await?;
                info!(
                    user_id,
                    kind = %query.kind,
                    count = records.len(),
                    "Records queried"
                );
                if records.is_empty() {
                    self.notifier.push_text(user_id, &prompts.browse_empty).await?;
                }
                for record in &records {
                    let markdown = record_markdown(record, &self.config);
                    if let Err(e) = self.notifier.push_markdown(user_id, &markdown).await {
                        warn!(user_id, record_id = record.id, error = %e, "Failed to push record");
                    }
                }
                self.notifier.push_text(user_id, &prompts.browse_choose).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::testing::{MemoryFetcher, MemoryNotifier, MemoryRecorder};
    use async_trait::async_trait;
    use crate::models::{
        ItemRecord, RecordFilter, RecordQuery, RecordStatus, Report, ReportKind,
    };
    use chrono::Utc;

    struct Fixture {
        notifier: Arc<MemoryNotifier>,
        recorder: Arc<MemoryRecorder>,
        fetcher: Arc<MemoryFetcher>,
        runner: EffectRunner,
    }

    fn fixture(recorder: MemoryRecorder) -> Fixture {
        let notifier = Arc::new(MemoryNotifier::default());
        let recorder = Arc::new(recorder);
        let fetcher = Arc::new(MemoryFetcher::default());
        let runner = EffectRunner::new(
            notifier.clone(),
            recorder.clone(),
            fetcher.clone(),
            Arc::new(DialogConfig::default()),
        );
        Fixture {
            notifier,
            recorder,
            fetcher,
            runner,
        }
    }

    fn report() -> Report {
        Report {
            kind: ReportKind::Lost,
            reporter_id: "u1".into(),
            city: "杭州".into(),
            item_name: "钱包".into(),
            description: "黑色".into(),
            tags: vec!["钱包".into()],
            image_name: None,
            status: RecordStatus::Unfinished,
        }
    }

    #[tokio::test]
    async fn test_commit_pushes_record_id() {
        let f = fixture(MemoryRecorder::default());
        f.runner.run("u1", vec![Effect::Commit(report())]).await;
        assert_eq!(f.recorder.reports.lock().unwrap().len(), 1);
        assert_eq!(
            f.notifier.texts.lock().unwrap().clone(),
            vec![("u1".to_string(), "记录已保存,编号:1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_commit_failure_is_surfaced() {
        let f = fixture(MemoryRecorder {
            fail: true,
            ..Default::default()
        });
        f.runner.run("u1", vec![Effect::Commit(report())]).await;
        let texts = f.notifier.texts.lock().unwrap().clone();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1, DialogConfig::default().prompts.commit_failed);
    }

    #[tokio::test]
    async fn test_show_records_renders_each() {
        let recorder = MemoryRecorder::default();
        recorder.records.lock().unwrap().push(ItemRecord {
            id: 3,
            kind: ReportKind::Found,
            item_name: "雨伞".into(),
            reporter: "u2".into(),
            complete_user: None,
            tags: vec!["雨伞".into()],
            city: "上海".into(),
            description: "蓝色".into(),
            img_name: None,
            status: RecordStatus::Unfinished,
            created_at: Utc::now(),
        });
        let f = fixture(recorder);
        let query = RecordQuery::new(ReportKind::Found, RecordFilter::All);
        f.runner.run("u1", vec![Effect::ShowRecords(query)]).await;

        let markdowns = f.notifier.markdowns.lock().unwrap().clone();
        assert_eq!(markdowns.len(), 1);
        assert!(markdowns[0].1.starts_with("捡到物品记录 ID:3\n"));
        let texts = f.notifier.texts.lock().unwrap().clone();
        assert_eq!(texts.last().unwrap().1, DialogConfig::default().prompts.browse_choose);
    }

    #[tokio::test]
    async fn test_show_records_empty() {
        let f = fixture(MemoryRecorder::default());
        let query = RecordQuery::new(ReportKind::Lost, RecordFilter::All);
        f.runner.run("u1", vec![Effect::ShowRecords(query)]).await;
        let texts = f.notifier.texts.lock().unwrap().clone();
        let prompts = DialogConfig::default().prompts;
        assert_eq!(texts[0].1, prompts.browse_empty);
        assert_eq!(texts[1].1, prompts.browse_choose);
        assert!(f.notifier.markdowns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_and_push() {
        let f = fixture(MemoryRecorder::default());
        f.runner
            .run(
                "u1",
                vec![
                    Effect::DownloadImage {
                        url: "http://pic/1".into(),
                        file_name: "m.png".into(),
                    },
                    Effect::PushText("hi".into()),
                ],
            )
            .await;
        assert_eq!(
            f.fetcher.fetched.lock().unwrap().clone(),
            vec![("http://pic/1".to_string(), "m.png".to_string())]
        );
        assert_eq!(f.notifier.texts.lock().unwrap()[0].1, "hi");
    }

    /// Delays the pushes of the first batch so a racing batch would overtake it
    #[derive(Default)]
    struct SlowFirstNotifier {
        texts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for SlowFirstNotifier {
        async fn push_text(&self, _user_id: &str, text: &str) -> LostFoundResult<()> {
            if text.starts_with("first") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn push_markdown(&self, _user_id: &str, _markdown: &str) -> LostFoundResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_same_user_outcomes_run_in_spawn_order() {
        let notifier = Arc::new(SlowFirstNotifier::default());
        let runner = Arc::new(EffectRunner::new(
            notifier.clone(),
            Arc::new(MemoryRecorder::default()),
            Arc::new(MemoryFetcher::default()),
            Arc::new(DialogConfig::default()),
        ));
        let outcome = |user: &str, texts: &[&str]| Outcome {
            user_id: user.to_string(),
            reply: String::new(),
            effects: texts.iter().map(|t| Effect::PushText(t.to_string())).collect(),
        };

        runner.spawn(outcome("u1", &["first-1", "first-2"])).await;
        runner.spawn(outcome("u1", &["second-1"])).await;

        for _ in 0..100 {
            if notifier.texts.lock().unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            *notifier.texts.lock().unwrap(),
            vec!["first-1", "first-2", "second-1"]
        );
        assert_eq!(runner.lanes.lock().await.len(), 1);
    }
}
