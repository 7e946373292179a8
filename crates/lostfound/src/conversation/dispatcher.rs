//! Routes inbound messages to the handler for the session's current stage

use std::sync::Arc;
use tracing::{debug, info};

use super::browse::BrowseController;
use super::confirm::{field_prompt, ConfirmLoop};
use super::review::{enter_review, ReviewController};
use super::store::SessionStore;
use super::{join_lines, Outcome, Turn};
use crate::config::DialogConfig;
use crate::error::LostFoundResult;
use crate::message::InboundMessage;
use crate::models::{Operation, ReportKind, Session, Stage};
use crate::services::{Recorder, TagExtractor};

/// Stage dispatcher - owns the session store and the collaborators every handler needs
pub struct StageDispatcher {
    store: Arc<SessionStore>,
    config: Arc<DialogConfig>,
    recorder: Arc<dyn Recorder>,
    tags: Arc<dyn TagExtractor>,
}

impl StageDispatcher {
    pub fn new(
        store: Arc<SessionStore>,
        config: Arc<DialogConfig>,
        recorder: Arc<dyn Recorder>,
        tags: Arc<dyn TagExtractor>,
    ) -> Self {
        Self {
            store,
            config,
            recorder,
            tags,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<DialogConfig> {
        &self.config
    }

    /// Handle one inbound message.
    ///
    /// The session stays locked for the whole call, so redeliveries for the same user
    /// queue behind it. Returned effects must be run after this returns.
    pub async fn dispatch(&self, message: &InboundMessage) -> LostFoundResult<Outcome> {
        let user_id = message.user_id().to_string();
        let prompts = &self.config.prompts;

        if let InboundMessage::Unsupported(unsupported) = message {
            info!(user_id = %user_id, msg_type = %unsupported.msg_type, "Unsupported message type");
            return Ok(Outcome {
                user_id,
                reply: prompts.unsupported_message.clone(),
                effects: Vec::new(),
            });
        }

        let mut session = self.store.acquire(&user_id).await?;
        let is_new = session.is_new();
        session.touch();
        debug!(
            user_id = %user_id,
            stage = %session.stage,
            status = %session.status,
            is_new,
            "Dispatching message"
        );

        let turn = self.route(&mut session, message, is_new).await?;

        if turn.end_session {
            self.store.remove(&mut session).await;
        }
        info!(
            user_id = %user_id,
            stage = %session.stage,
            status = %session.status,
            edited = session.edited,
            ended = turn.end_session,
            effects = turn.effects.len(),
            "Message handled"
        );
        drop(session);

        Ok(Outcome {
            user_id,
            reply: turn.reply,
            effects: turn.effects,
        })
    }

    async fn route(
        &self,
        session: &mut Session,
        message: &InboundMessage,
        is_new: bool,
    ) -> LostFoundResult<Turn> {
        let prompts = &self.config.prompts;

        if matches!(message, InboundMessage::Image(_)) && session.stage != Stage::Image {
            return Ok(Turn::reply(prompts.image_wrong_stage.clone()));
        }
        let input = message.text().unwrap_or_default();

        let turn = match session.stage {
            Stage::ChooseKind => self.choose_kind(session, input, is_new),
            Stage::ChooseOperation => self.choose_operation(session, input),
            Stage::City if session.operation == Some(Operation::List) => {
                BrowseController::new(prompts, self.recorder.as_ref())
                    .handle(session, input)
                    .await?
            }
            Stage::City | Stage::ItemName | Stage::Description | Stage::Image => {
                ConfirmLoop::new(&self.config, self.tags.as_ref()).handle(session, message)
            }
            Stage::Review => {
                ReviewController::new(prompts, self.tags.as_ref()).handle(session, input)
            }
        };
        Ok(turn)
    }

    /// Stage 0: what happened to the user
    fn choose_kind(&self, session: &mut Session, input: &str, is_new: bool) -> Turn {
        let prompts = &self.config.prompts;
        let kind = match input {
            "1" | "我丢失了物品" | "丢失物品" => ReportKind::Lost,
            "2" | "我捡到了物品" | "捡到物品" => ReportKind::Found,
            "3" | "我是管理员" => {
                session.report_kind = Some(ReportKind::Admin);
                return Turn::reply(join_lines(&prompts.admin_notice, &prompts.welcome));
            }
            "4" | "结束会话" => return Turn::end(prompts.session_ended.clone()),
            _ if is_new => return Turn::reply(prompts.welcome.clone()),
            _ => return Turn::reply(join_lines(&prompts.general_invalid, &prompts.welcome)),
        };

        session.report_kind = Some(kind);
        session.enter(Stage::ChooseOperation);
        Turn::reply(prompts.operation(kind))
    }

    /// Stage 1: add a record or browse
    fn choose_operation(&self, session: &mut Session, input: &str) -> Turn {
        let prompts = &self.config.prompts;
        let kind = session.kind();
        match input {
            "1" | "添加丢失物品的记录" | "添加捡到物品的记录" => {
                session.operation = Some(Operation::Add);
                if session.edited {
                    session.edited = false;
                    return Turn::reply(enter_review(session, prompts));
                }
                session.enter(Stage::City);
                Turn::reply(field_prompt(prompts, Stage::City, kind))
            }
            "2" | "查看捡到的物品列表" | "查看失物记录列表" => {
                session.operation = Some(Operation::List);
                session.edited = false;
                session.enter(Stage::City);
                Turn::reply(prompts.browse_menu.clone())
            }
            "3" | "返回" => {
                session.edited = false;
                session.enter(Stage::ChooseKind);
                Turn::reply(prompts.welcome.clone())
            }
            _ => Turn::reply(join_lines(&prompts.general_invalid, prompts.operation(kind))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::testing::{CountingTags, MemoryRecorder};
    use crate::conversation::Effect;
    use crate::message::{Envelope, ImageMessage, TextMessage, UnsupportedMessage};
    use crate::models::Status;

    fn envelope(user: &str) -> Envelope {
        Envelope {
            from: user.into(),
            to: "corp".into(),
            created_at: 1,
            msg_id: None,
            agent_id: None,
        }
    }

    fn text(user: &str, content: &str) -> InboundMessage {
        InboundMessage::Text(TextMessage {
            envelope: envelope(user),
            content: content.into(),
        })
    }

    fn dispatcher() -> StageDispatcher {
        StageDispatcher::new(
            Arc::new(SessionStore::new()),
            Arc::new(DialogConfig::default()),
            Arc::new(MemoryRecorder::default()),
            Arc::new(CountingTags::default()),
        )
    }

    async fn send(d: &StageDispatcher, user: &str, content: &str) -> Outcome {
        d.dispatch(&text(user, content)).await.unwrap()
    }

    #[tokio::test]
    async fn test_new_user_gets_welcome() {
        let d = dispatcher();
        let outcome = send(&d, "u1", "你好").await;
        assert_eq!(outcome.reply, d.config().prompts.welcome);

        let outcome = send(&d, "u1", "你好").await;
        assert!(outcome.reply.starts_with(&d.config().prompts.general_invalid));
        assert!(outcome.reply.ends_with(&d.config().prompts.welcome));
    }

    #[tokio::test]
    async fn test_first_message_selects_kind() {
        let d = dispatcher();
        let outcome = send(&d, "u1", "我捡到了物品").await;
        assert_eq!(outcome.reply, d.config().prompts.found_operation);
        let session = d.store().snapshot("u1").await.unwrap();
        assert_eq!(session.stage, Stage::ChooseOperation);
        assert_eq!(session.report_kind, Some(ReportKind::Found));
    }

    #[tokio::test]
    async fn test_admin_is_inert() {
        let d = dispatcher();
        let outcome = send(&d, "u1", "3").await;
        assert!(outcome.reply.starts_with(&d.config().prompts.admin_notice));
        let session = d.store().snapshot("u1").await.unwrap();
        assert_eq!(session.stage, Stage::ChooseKind);
        assert_eq!(session.report_kind, Some(ReportKind::Admin));
    }

    #[tokio::test]
    async fn test_end_session_deletes() {
        let d = dispatcher();
        send(&d, "u1", "1").await;
        send(&d, "u1", "3").await;
        let outcome = send(&d, "u1", "结束会话").await;
        assert_eq!(outcome.reply, d.config().prompts.session_ended);
        assert!(d.store().snapshot("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_operation_reprompts() {
        let d = dispatcher();
        send(&d, "u1", "1").await;
        let outcome = send(&d, "u1", "9").await;
        assert_eq!(
            outcome.reply,
            format!(
                "{}\n{}",
                d.config().prompts.general_invalid,
                d.config().prompts.lost_operation
            )
        );
        assert_eq!(
            d.store().snapshot("u1").await.unwrap().stage,
            Stage::ChooseOperation
        );
    }

    #[tokio::test]
    async fn test_image_outside_image_stage() {
        let d = dispatcher();
        send(&d, "u1", "1").await;
        send(&d, "u1", "1").await;
        let before = d.store().snapshot("u1").await.unwrap();

        let outcome = d
            .dispatch(&InboundMessage::Image(ImageMessage {
                envelope: envelope("u1"),
                picture_url: "http://pic/1".into(),
                media_id: "m".into(),
            }))
            .await
            .unwrap();
        assert_eq!(outcome.reply, d.config().prompts.image_wrong_stage);
        let after = d.store().snapshot("u1").await.unwrap();
        assert_eq!(after.stage, before.stage);
        assert_eq!(after.status, before.status);
        assert_eq!(after.form, before.form);
    }

    #[tokio::test]
    async fn test_unsupported_does_not_touch_store() {
        let d = dispatcher();
        let outcome = d
            .dispatch(&InboundMessage::Unsupported(UnsupportedMessage {
                envelope: envelope("u9"),
                msg_type: "voice".into(),
            }))
            .await
            .unwrap();
        assert_eq!(outcome.reply, d.config().prompts.unsupported_message);
        assert!(d.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_list_enters_browse() {
        let d = dispatcher();
        send(&d, "u1", "2").await;
        let outcome = send(&d, "u1", "查看失物记录列表").await;
        assert_eq!(outcome.reply, d.config().prompts.browse_menu);

        let outcome = send(&d, "u1", "1").await;
        let session = d.store().snapshot("u1").await.unwrap();
        assert_eq!(session.status, Status::WaitChoose);
        assert!(matches!(outcome.effects[..], [Effect::ShowRecords(_)]));
    }

    #[tokio::test]
    async fn test_operation_edit_returns_to_review() {
        let d = dispatcher();
        for input in ["1", "1", "杭州", "yes", "钱包", "yes", "黑色", "yes", "无", "yes"] {
            send(&d, "u1", input).await;
        }
        assert_eq!(d.store().snapshot("u1").await.unwrap().stage, Stage::Review);

        let outcome = send(&d, "u1", "1").await;
        // "1" at the final confirmation commits
        assert!(matches!(outcome.effects[..], [Effect::Commit(_)]));
        assert!(d.store().snapshot("u1").await.is_none());

        for input in ["1", "1", "杭州", "yes", "钱包", "yes", "黑色", "yes", "无", "yes", "no"] {
            send(&d, "u1", input).await;
        }
        send(&d, "u1", "1").await;
        let session = d.store().snapshot("u1").await.unwrap();
        assert_eq!(session.stage, Stage::ChooseOperation);
        assert!(session.edited);

        let outcome = send(&d, "u1", "1").await;
        let session = d.store().snapshot("u1").await.unwrap();
        assert_eq!(session.stage, Stage::Review);
        assert_eq!(session.status, Status::WaitConfirm);
        assert!(!session.edited);
        assert!(outcome.reply.contains("物品名称:钱包"));
    }
}
