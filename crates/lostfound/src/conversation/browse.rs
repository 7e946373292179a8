//! Read-only browsing of the other side's records

use tracing::warn;

use super::{join_lines, Effect, Turn};
use crate::config::Prompts;
use crate::error::LostFoundResult;
use crate::models::{RecordFilter, RecordQuery, RecordStatus, Session, Stage, Status};
use crate::services::Recorder;

pub(crate) struct BrowseController<'a> {
    prompts: &'a Prompts,
    recorder: &'a dyn Recorder,
}

impl<'a> BrowseController<'a> {
    pub fn new(prompts: &'a Prompts, recorder: &'a dyn Recorder) -> Self {
        Self { prompts, recorder }
    }

    pub async fn handle(&self, session: &mut Session, input: &str) -> LostFoundResult<Turn> {
        match session.status {
            Status::Idle => self.menu(session, input).await,
            Status::WaitChoose => Ok(self.after_results(session, input)),
            Status::WaitTags => Ok(self.tags_entered(session, input)),
            Status::WaitConfirm => {
                warn!(user_id = %session.user_id, "Browse session in waitconfirm, resetting");
                session.status = Status::Idle;
                Ok(Turn::reply(self.prompts.browse_menu.clone()))
            }
        }
    }

    async fn menu(&self, session: &mut Session, input: &str) -> LostFoundResult<Turn> {
        let turn = match input {
            "1" | "查看全部记录" => self.show(session, RecordFilter::All),
            "2" | "查看未完成的记录" => {
                self.show(session, RecordFilter::Status(RecordStatus::Unfinished))
            }
            "3" | "查看已完成的记录" => {
                self.show(session, RecordFilter::Status(RecordStatus::Completed))
            }
            "4" | "按标签查找" => {
                let tags = self
                    .recorder
                    .list_tags(session.kind().browse_target())
                    .await?;
                if tags.is_empty() {
                    Turn::reply(join_lines(
                        &self.prompts.browse_no_tags,
                        &self.prompts.browse_menu,
                    ))
                } else {
                    session.status = Status::WaitTags;
                    Turn::reply(format!("{}{}", self.prompts.browse_ask_tags, tags.join(" ")))
                }
            }
            "5" | "返回" => {
                session.enter(Stage::ChooseOperation);
                Turn::reply(self.prompts.operation(session.kind()))
            }
            _ => Turn::reply(join_lines(
                &self.prompts.general_invalid,
                &self.prompts.browse_menu,
            )),
        };
        Ok(turn)
    }

    fn show(&self, session: &mut Session, filter: RecordFilter) -> Turn {
        session.status = Status::WaitChoose;
        let query = RecordQuery::new(session.kind().browse_target(), filter);
        Turn::reply(self.prompts.browse_querying.clone()).with_effect(Effect::ShowRecords(query))
    }

    fn after_results(&self, session: &mut Session, input: &str) -> Turn {
        match input {
            "1" | "返回" => {
                session.status = Status::Idle;
                Turn::reply(self.prompts.browse_menu.clone())
            }
            "2" | "结束会话" => Turn::end(self.prompts.session_ended.clone()),
            _ => Turn::reply(join_lines(
                &self.prompts.general_invalid,
                &self.prompts.browse_choose,
            )),
        }
    }

    fn tags_entered(&self, session: &mut Session, input: &str) -> Turn {
        let tags: Vec<String> = input.split_whitespace().map(str::to_string).collect();
        if tags.is_empty() {
            return Turn::reply(self.prompts.empty_input.clone());
        }
        self.show(session, RecordFilter::Tags(tags))
    }
}
