//! Minijinja rendering for mail bodies and unsubscribe pages.
//!
//! Unlike ad-hoc template strings, everything here is a named template
//! registered once at construction; `.html` names get minijinja's
//! auto-escaping, `.txt` names do not.

use minijinja::Environment;
use serde::Serialize;

use crate::traits::NotifyError;

const DOC_CHANGE_SUBJECT: &str = "Updates to {{ doc_name }}";

const DOC_CHANGE_TEXT: &str = "\
{% if sender_author_name %}{{ sender_author_name }} made changes to {{ doc_name }}.{% else %}Several people made changes to {{ doc_name }}.{% endif %}

{% for a in authors %}- {{ a.user }} changed {{ a.tables_preview }}{% if a.extra_tables_count > 0 %} and {{ a.extra_tables_count }} more{% endif %} ({{ a.categories | join(\", \") }})
{% endfor %}
Open the document: {{ doc_url }}

Stop these emails for this document: {{ unsubscribe_url }}
";

const DOC_CHANGE_HTML: &str = "\
<html><body>
{% if sender_author_name %}<p><b>{{ sender_author_name }}</b> made changes to <a href=\"{{ doc_url }}\">{{ doc_name }}</a>.</p>{% else %}<p>Several people made changes to <a href=\"{{ doc_url }}\">{{ doc_name }}</a>.</p>{% endif %}
<ul>
{% for a in authors %}<li><b>{{ a.user }}</b> changed {{ a.tables_preview }}{% if a.extra_tables_count > 0 %} and {{ a.extra_tables_count }} more{% endif %} ({{ a.categories | join(\", \") }})</li>
{% endfor %}</ul>
<p><a href=\"{{ doc_url }}\">Open the document</a></p>
<p style=\"color:#888;font-size:12px\"><a href=\"{{ unsubscribe_url }}\">Stop these emails for this document</a></p>
</body></html>
";

const COMMENT_SUBJECT: &str = "\
{% if has_mentions %}You were mentioned in {{ doc_name }}{% else %}New comments in {{ doc_name }}{% endif %}";

const COMMENT_TEXT: &str = "\
{{ author_names | join(\", \") }}{% if extra_authors_count > 0 %} and {{ extra_authors_count }} more{% endif %} commented on {{ doc_name }}.

{% for c in comments %}{% if c.has_mention %}[mentioned you] {% endif %}{{ c.author }}: {{ c.text }}
{% endfor %}
Open the document: {{ doc_url }}

Only get comments that involve you: {{ unsubscribe_url }}
Stop all comment emails for this document: {{ unsubscribe_fully_url }}
";

const COMMENT_HTML: &str = "\
<html><body>
<p>{{ author_names | join(\", \") }}{% if extra_authors_count > 0 %} and {{ extra_authors_count }} more{% endif %} commented on <a href=\"{{ doc_url }}\">{{ doc_name }}</a>.</p>
<ul>
{% for c in comments %}<li>{% if c.has_mention %}<b>[mentioned you]</b> {% endif %}<b>{{ c.author }}</b>: {{ c.text }}</li>
{% endfor %}</ul>
<p><a href=\"{{ doc_url }}\">Open the document</a></p>
<p style=\"color:#888;font-size:12px\"><a href=\"{{ unsubscribe_url }}\">Only get comments that involve you</a> &middot; <a href=\"{{ unsubscribe_fully_url }}\">Stop all comment emails for this document</a></p>
</body></html>
";

const UNSUBSCRIBE_CONFIRMED: &str = "\
<html><body>
<h1>You're unsubscribed</h1>
<p>{{ change }}</p>
<p>Document: <a href=\"{{ doc_url }}\">{{ doc_name }}</a></p>
<p>You can fine-tune notifications any time from the document's settings.</p>
</body></html>
";

const UNSUBSCRIBE_FAILED: &str = "\
<html><body>
<h1>This link didn't work</h1>
<p>The unsubscribe link is invalid or has expired.</p>
<p>Sign in and open the document's notification settings to adjust
what you receive.</p>
</body></html>
";

/// Renders the pipeline's named templates.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("doc-change-subject.txt", DOC_CHANGE_SUBJECT),
            ("doc-change.txt", DOC_CHANGE_TEXT),
            ("doc-change.html", DOC_CHANGE_HTML),
            ("comment-subject.txt", COMMENT_SUBJECT),
            ("comment.txt", COMMENT_TEXT),
            ("comment.html", COMMENT_HTML),
            ("unsubscribe-confirmed.html", UNSUBSCRIBE_CONFIRMED),
            ("unsubscribe-failed.html", UNSUBSCRIBE_FAILED),
        ] {
            env.add_template(name, source)
                .expect("built-in template is valid");
        }
        Self { env }
    }

    /// Render a registered template with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] for unknown names or when
    /// rendering fails (type errors, undefined strict lookups).
    pub fn render(&self, name: &str, ctx: impl Serialize) -> Result<String, NotifyError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        template
            .render(ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
