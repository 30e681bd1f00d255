use tera::{Context, Tera};

const TEMPLATES: &[(&str, &str)] = &[
    ("help.html", include_str!("../../templates/help.html")),
    ("welcome.html", include_str!("../../templates/welcome.html")),
    ("notice.html", include_str!("../../templates/notice.html")),
    ("reminder.html", include_str!("../../templates/reminder.html")),
    ("overdue.html", include_str!("../../templates/overdue.html")),
    ("pair.html", include_str!("../../templates/pair.html")),
    ("review_prompt.html", include_str!("../../templates/review_prompt.html")),
    ("review_complete.html", include_str!("../../templates/review_complete.html")),
    ("quiz_question.html", include_str!("../../templates/quiz_question.html")),
    ("quiz_answer.html", include_str!("../../templates/quiz_answer.html")),
    ("settings.html", include_str!("../../templates/settings.html")),
    ("import_report.html", include_str!("../../templates/import_report.html")),
    ("feedback.html", include_str!("../../templates/feedback.html")),
];

/// Chat message templates. `.html` names turn on Tera's autoescaping,
/// which is what the chat API's HTML parse mode expects for user text.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn load() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.to_vec())?;
        Ok(Self { tera })
    }

    pub fn render(&self, template_name: &str, context: &Context) -> String {
        self.tera.render(template_name, context).unwrap_or_else(|e| {
            log::error!("Template {} failed to render: {}", template_name, e);
            format!("Error rendering template: {}", template_name)
        })
    }

    /// Escapes a plain line of text for the HTML parse mode.
    pub fn notice(&self, text: &str) -> String {
        let mut context = Context::new();
        context.insert("text", text);
        self.render("notice.html", &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_templates_parse() {
        assert!(Templates::load().is_ok());
    }

    #[test]
    fn user_text_is_escaped() {
        let templates = Templates::load().unwrap();
        let rendered = templates.notice("a <b> & c");
        assert_eq!(rendered.trim(), "a &lt;b&gt; &amp; c");
    }

    #[test]
    fn unknown_template_falls_back_to_error_line() {
        let templates = Templates::load().unwrap();
        let rendered = templates.render("missing.html", &Context::new());
        assert_eq!(rendered, "Error rendering template: missing.html");
    }
}
