use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use tera::Context;

use crate::context::AppContext;
use crate::data::models::CoreError;
use crate::features::importexport::{self, ImportReport};
use crate::features::settings::{self, SettingsAction, SettingsField};
use crate::handlers::callback::CallbackAction;
use crate::handlers::webhook::{Document, Message, User};
use crate::handlers::{load_preferences, send_next_prompt, send_settings};
use crate::messaging::{Button, OutgoingDocument};

const MAX_UPLOAD_BYTES: u64 = 1024 * 1024;

lazy_static! {
    static ref COMMAND: Regex =
        Regex::new(r"^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+([\s\S]*))?$").unwrap();
}

/// A slash command. Names are matched exactly and case-sensitively;
/// commands that take no argument do not match when one is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Review,
    Cancel,
    Game,
    GetPair,
    Settings,
    Export,
    Clear,
    Help,
    Feedback(&'a str),
    SetPairs(&'a str),
    SetFrequency(&'a str),
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// `None` when the text is not a command at all.
    pub fn parse(text: &'a str) -> Option<Self> {
        let caps = COMMAND.captures(text.trim())?;
        let name = caps.get(1)?.as_str();
        let arg = caps.get(2).map_or("", |m| m.as_str().trim());

        let command = match (name, arg.is_empty()) {
            ("start", true) => Command::Start,
            ("review", true) => Command::Review,
            ("cancel", true) => Command::Cancel,
            ("game", true) => Command::Game,
            ("getpair", true) => Command::GetPair,
            ("settings", true) => Command::Settings,
            ("export", true) => Command::Export,
            ("clear", true) => Command::Clear,
            ("help", true) => Command::Help,
            ("feedback", _) => Command::Feedback(arg),
            ("setpairs", _) => Command::SetPairs(arg),
            ("setfrequency", _) => Command::SetFrequency(arg),
            _ => Command::Unknown(name),
        };
        Some(command)
    }
}

pub async fn handle_message(
    ctx: &AppContext,
    message: &Message,
    from: &User,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let chat_id = message.chat.id;

    if let Some(document) = &message.document {
        return import_document(ctx, chat_id, from.id, document, now).await;
    }
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };

    match Command::parse(text) {
        Some(command) => run_command(ctx, message, from, command, now).await,
        None => {
            let report = importexport::import_cards(ctx.store.as_ref(), from.id, text, now)?;
            send_import_report(ctx, chat_id, &report).await
        }
    }
}

async fn run_command(
    ctx: &AppContext,
    message: &Message,
    from: &User,
    command: Command<'_>,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let chat_id = message.chat.id;
    let owner_id = from.id;
    log::debug!("User {}: {:?}", owner_id, command);

    match command {
        Command::Start => start(ctx, chat_id, owner_id, now).await,
        Command::Review => {
            ctx.review.start(owner_id, now)?;
            send_next_prompt(ctx, chat_id, owner_id, now).await
        }
        Command::Cancel => {
            let text = if ctx.review.cancel(owner_id)? {
                "Review cancelled."
            } else {
                "No review in progress."
            };
            ctx.notify(chat_id, text).await
        }
        Command::Game => {
            let question = ctx.quiz.issue(owner_id, now)?;
            let mut context = Context::new();
            context.insert("prompt", &question.prompt);
            let keyboard = vec![vec![Button::new(
                "Show answer",
                CallbackAction::QuizReveal(question.token).encode(),
            )]];
            ctx.reply(chat_id, ctx.templates.render("quiz_question.html", &context), keyboard)
                .await
        }
        Command::GetPair => {
            let card = ctx.store.random_card(owner_id)?.ok_or(CoreError::NoCards)?;
            let mut context = Context::new();
            context.insert("card", &card);
            ctx.reply(chat_id, ctx.templates.render("pair.html", &context), Vec::new())
                .await
        }
        Command::Settings => {
            let prefs = load_preferences(ctx, owner_id, now)?;
            send_settings(ctx, chat_id, &prefs).await
        }
        Command::Export => {
            if !message.chat.is_private() {
                return ctx
                    .notify(chat_id, "The /export command works only in private chat.")
                    .await;
            }
            export(ctx, chat_id, owner_id, now).await
        }
        Command::Clear => {
            let removed = ctx.store.clear_owner(owner_id)?;
            ctx.quiz.clear_owner(owner_id);
            log::info!("User {}: cleared {} cards", owner_id, removed);
            ctx.notify(chat_id, "Your word pair list has been cleared.").await
        }
        Command::Help => {
            ctx.reply(chat_id, ctx.templates.render("help.html", &Context::new()), Vec::new())
                .await
        }
        Command::Feedback(text) => {
            if !message.chat.is_private() {
                return ctx
                    .notify(chat_id, "The /feedback command works only in private chat.")
                    .await;
            }
            feedback(ctx, chat_id, from, text, now).await
        }
        Command::SetPairs(arg) => {
            set_number(ctx, chat_id, owner_id, SettingsField::CardsPerSession, "/setpairs", arg, now)
                .await
        }
        Command::SetFrequency(arg) => {
            set_number(
                ctx,
                chat_id,
                owner_id,
                SettingsField::RemindersPerDay,
                "/setfrequency",
                arg,
                now,
            )
            .await
        }
        Command::Unknown(name) => {
            ctx.notify(chat_id, &format!("Unknown command /{name}.")).await?;
            ctx.reply(chat_id, ctx.templates.render("help.html", &Context::new()), Vec::new())
                .await
        }
    }
}

async fn start(
    ctx: &AppContext,
    chat_id: i64,
    owner_id: i64,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let returning = ctx.store.preferences(owner_id)?.is_some();
    let prefs = load_preferences(ctx, owner_id, now)?;
    let card_count = ctx.store.count_cards(owner_id)?;

    let mut context = Context::new();
    context.insert("returning", &returning);
    context.insert("card_count", &card_count);
    context.insert("reminders_per_day", &prefs.reminders_per_day);
    ctx.reply(chat_id, ctx.templates.render("welcome.html", &context), Vec::new())
        .await
}

async fn export(
    ctx: &AppContext,
    chat_id: i64,
    owner_id: i64,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let (count, content) = importexport::export_cards(ctx.store.as_ref(), owner_id)?;
    let document = OutgoingDocument {
        chat_id,
        filename: importexport::export_filename(now),
        caption: ctx
            .templates
            .notice(&format!("Your vocabulary export ({count} cards).")),
        content,
    };
    ctx.messenger.send_document(document).await?;
    log::info!("User {}: exported {} cards", owner_id, count);
    Ok(())
}

async fn feedback(
    ctx: &AppContext,
    chat_id: i64,
    from: &User,
    text: &str,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    if text.is_empty() {
        return Err(CoreError::Validation(
            "Please add your message after the command, e.g. /feedback the reminders come too early"
                .into(),
        ));
    }
    if ctx.config.admin_ids.is_empty() {
        log::error!("User {}: feedback is not configured", from.id);
        return ctx
            .notify(chat_id, "Feedback is not configured yet. Please try again later.")
            .await;
    }

    log::info!("User {}: feedback received", from.id);
    let mut context = Context::new();
    context.insert("display_name", &from.display_name());
    context.insert("owner_id", &from.id);
    context.insert("received_at", &now.format("%Y-%m-%d %H:%M").to_string());
    context.insert("text", text);
    let summary = ctx.templates.render("feedback.html", &context);

    for &admin_id in &ctx.config.admin_ids {
        if let Err(e) = ctx.reply(admin_id, summary.clone(), Vec::new()).await {
            log::error!("Failed to forward feedback to admin {}: {}", admin_id, e);
        }
    }
    ctx.notify(chat_id, "Thanks for your feedback!").await
}

async fn set_number(
    ctx: &AppContext,
    chat_id: i64,
    owner_id: i64,
    field: SettingsField,
    usage: &str,
    arg: &str,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let value = arg
        .parse()
        .map_err(|_| CoreError::Validation(format!("Please use the format: {usage} <number>")))?;
    let prefs = load_preferences(ctx, owner_id, now)?;
    let updated = settings::apply(&prefs, SettingsAction::Set { field, value }, now)?;
    ctx.store.save_preferences(&updated)?;
    send_settings(ctx, chat_id, &updated).await
}

async fn import_document(
    ctx: &AppContext,
    chat_id: i64,
    owner_id: i64,
    document: &Document,
    now: NaiveDateTime,
) -> Result<(), CoreError> {
    let file_name = document.file_name.as_deref().unwrap_or_default();
    log::info!("User {}: uploading {}", owner_id, file_name);

    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(CoreError::Validation(
            "The uploaded file is not a CSV. Please upload a valid CSV file.".into(),
        ));
    }
    if document.file_size.is_some_and(|size| size > MAX_UPLOAD_BYTES) {
        return Err(CoreError::Validation(
            "The file is too large. Please split it into files under 1 MB.".into(),
        ));
    }

    let bytes = ctx.messenger.download_file(&document.file_id).await?;
    let text = String::from_utf8(bytes).map_err(|_| {
        CoreError::Validation("The file must be UTF-8 encoded text.".into())
    })?;
    let report = importexport::import_cards(ctx.store.as_ref(), owner_id, &text, now)?;
    send_import_report(ctx, chat_id, &report).await
}

async fn send_import_report(
    ctx: &AppContext,
    chat_id: i64,
    report: &ImportReport,
) -> Result<(), CoreError> {
    let mut context = Context::new();
    context.insert("inserted", &report.inserted);
    context.insert("updated", &report.updated);
    context.insert("rejected", &report.rejected);
    ctx.reply(chat_id, ctx.templates.render("import_report.html", &context), Vec::new())
        .await
}
