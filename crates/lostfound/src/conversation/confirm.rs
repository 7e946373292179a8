//! Validate-then-confirm loop shared by the data-entry stages (city, item, description, image)

use super::review::enter_review;
use super::{is_yes, refresh_tags, Effect, Turn};
use crate::config::{DialogConfig, Prompts};
use crate::message::InboundMessage;
use crate::models::{ReportKind, Session, Stage, Status};
use crate::services::{image_file_name, TagExtractor};

/// Question asked when a data-entry stage is entered or re-entered
pub(crate) fn field_prompt(prompts: &Prompts, stage: Stage, kind: ReportKind) -> String {
    match stage {
        Stage::City => prompts.city(kind).to_string(),
        Stage::ItemName => prompts.item(kind).to_string(),
        Stage::Description => prompts.description(kind).to_string(),
        Stage::Image => prompts.image.clone(),
        Stage::ChooseOperation => prompts.operation(kind).to_string(),
        Stage::ChooseKind | Stage::Review => prompts.welcome.clone(),
    }
}

pub(crate) struct ConfirmLoop<'a> {
    config: &'a DialogConfig,
    tags: &'a dyn TagExtractor,
}

impl<'a> ConfirmLoop<'a> {
    pub fn new(config: &'a DialogConfig, tags: &'a dyn TagExtractor) -> Self {
        Self { config, tags }
    }

    pub fn handle(&self, session: &mut Session, message: &InboundMessage) -> Turn {
        match session.status {
            Status::WaitConfirm => self.confirm(session, message),
            _ => self.collect(session, message),
        }
    }

    /// Store the candidate value and echo it back for confirmation
    fn collect(&self, session: &mut Session, message: &InboundMessage) -> Turn {
        let prompts = &self.config.prompts;

        if session.stage == Stage::Image {
            let echo = match message {
                InboundMessage::Image(image) => {
                    session.form.image_ref = Some(image.picture_url.clone());
                    session.form.image_name =
                        Some(image_file_name(&image.picture_url, &image.media_id));
                    &prompts.image_echo
                }
                _ => {
                    session.form.image_ref = None;
                    session.form.image_name = None;
                    &prompts.no_image_echo
                }
            };
            session.status = Status::WaitConfirm;
            return Turn::reply(prompts.confirm(echo, ""));
        }

        let value = message.text().unwrap_or_default();
        let label = match session.stage {
            Stage::City => {
                if !self.config.is_known_city(value) {
                    return Turn::reply(prompts.city_invalid.clone());
                }
                session.form.city = value.to_string();
                &prompts.city_echo
            }
            Stage::ItemName | Stage::Description if value.is_empty() => {
                return Turn::reply(prompts.empty_input.clone());
            }
            Stage::ItemName => {
                session.form.item_name = value.to_string();
                &prompts.item_echo
            }
            Stage::Description => {
                session.form.description = value.to_string();
                &prompts.description_echo
            }
            other => return Turn::reply(field_prompt(prompts, other, session.kind())),
        };
        session.status = Status::WaitConfirm;
        Turn::reply(prompts.confirm(label, value))
    }

    fn confirm(&self, session: &mut Session, message: &InboundMessage) -> Turn {
        let prompts = &self.config.prompts;
        session.status = Status::Idle;

        if !message.text().is_some_and(is_yes) {
            // candidate stays stored, the user is asked to resend it
            return Turn::reply(field_prompt(prompts, session.stage, session.kind()));
        }

        let mut effects = Vec::new();
        match session.stage {
            // an edit leaves the tags stale; the review commit re-derives them once
            Stage::Description if !session.edited => {
                refresh_tags(&mut session.form, self.tags);
                let preview = session.form.tags.iter().cloned().collect::<Vec<_>>().join(",");
                effects.push(Effect::PushText(format!("{}{}", prompts.tags_preview, preview)));
            }
            Stage::Image => {
                if let (Some(url), Some(file_name)) =
                    (&session.form.image_ref, &session.form.image_name)
                {
                    effects.push(Effect::DownloadImage {
                        url: url.clone(),
                        file_name: file_name.clone(),
                    });
                }
            }
            _ => {}
        }

        let reply = if session.edited {
            session.edited = false;
            enter_review(session, prompts)
        } else {
            match session.stage.next() {
                Stage::Review => enter_review(session, prompts),
                next => {
                    session.enter(next);
                    field_prompt(prompts, next, session.kind())
                }
            }
        };

        Turn {
            reply,
            effects,
            end_session: false,
        }
    }
}
