//! Final review: commit, or jump back to amend a single field

use super::confirm::field_prompt;
use super::{is_yes, refresh_tags, Effect, Turn};
use crate::config::Prompts;
use crate::models::{Report, ReportKind, Session, Stage, Status};
use crate::services::TagExtractor;
use tracing::debug;

/// Move to the review stage and render the summary awaiting the final yes
pub(crate) fn enter_review(session: &mut Session, prompts: &Prompts) -> String {
    session.enter(Stage::Review);
    session.status = Status::WaitConfirm;
    render_summary(session, prompts)
}

pub(crate) fn render_summary(session: &Session, prompts: &Prompts) -> String {
    let form = &session.form;
    let kind = match session.kind() {
        ReportKind::Found => "捡到物品",
        _ => "丢失物品",
    };
    let image = if form.image_name.is_some() {
        "已上传"
    } else {
        "无"
    };
    let tags = if form.tags_current() {
        form.tags.iter().cloned().collect::<Vec<_>>().join(",")
    } else {
        prompts.tags_pending.clone()
    };

    format!(
        "{}\n类型:{}\n城市:{}\n物品名称:{}\n物品描述:{}\n图片:{}\n标签:{}\n{}",
        prompts.review_header,
        kind,
        form.city,
        form.item_name,
        form.description,
        image,
        tags,
        prompts.review_choices
    )
}

pub(crate) struct ReviewController<'a> {
    prompts: &'a Prompts,
    tags: &'a dyn TagExtractor,
}

impl<'a> ReviewController<'a> {
    pub fn new(prompts: &'a Prompts, tags: &'a dyn TagExtractor) -> Self {
        Self { prompts, tags }
    }

    pub fn handle(&self, session: &mut Session, input: &str) -> Turn {
        match session.status {
            Status::WaitConfirm => {
                if is_yes(input) {
                    if refresh_tags(&mut session.form, self.tags) {
                        debug!(user_id = %session.user_id, "Tags re-derived from edited form");
                    }
                    let report = Report::from_form(session.kind(), &session.form);
                    return Turn::end(self.prompts.committing.clone())
                        .with_effect(Effect::Commit(report));
                }
                session.edited = true;
                session.status = Status::Idle;
                self.select_field(session, input)
            }
            _ if session.edited => self.select_field(session, input),
            _ => match input.parse::<u8>() {
                Ok(n @ 1..=5) => {
                    session.edited = true;
                    self.select_field(session, &n.to_string())
                }
                _ => Turn::reply(enter_review(session, self.prompts)),
            },
        }
    }

    /// Field selector while amending: 1-5 jump to a stage, 6 cancels, 7 abandons
    fn select_field(&self, session: &mut Session, input: &str) -> Turn {
        let kind = session.kind();
        match input {
            "1" => {
                session.enter(Stage::ChooseOperation);
                Turn::reply(self.prompts.operation(kind))
            }
            "2" | "3" | "4" | "5" => {
                let stage = input
                    .parse::<u8>()
                    .ok()
                    .and_then(Stage::from_number)
                    .unwrap_or(Stage::City);
                session.enter(stage);
                Turn::reply(field_prompt(self.prompts, stage, kind))
            }
            "6" => {
                session.edited = false;
                Turn::reply(enter_review(session, self.prompts))
            }
            "7" => Turn::end(self.prompts.session_ended.clone()),
            _ => Turn::reply(self.prompts.edit_menu.clone()),
        }
    }
}
