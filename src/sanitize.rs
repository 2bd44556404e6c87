//! Markup-to-text cleaning for message bodies.
//!
//! Mail bodies arrive as HTML (sometimes plain text). [`clean_html`] renders
//! them with `html2text`, which parses with a real HTML5 tokenizer, and then
//! flattens the rendered lines: block-level boundaries become single `\n`
//! separators while inline runs (`<b>`, `<a>`, `<span>`) stay on one line.
//! The result is what downstream stages compare, validate and store, so it
//! must be deterministic.
//!
//! Cleaning never fails. If rendering errors the trimmed input is returned
//! as-is.

use html2text::render::TrivialDecorator;

/// Wide enough that ordinary paragraphs are never wrapped by the renderer.
const RENDER_WIDTH: usize = 4096;

/// Lines made only of these characters are horizontal rules drawn by the
/// renderer (`<hr>`), not message text.
fn is_rule_line(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '-' | '─' | '━' | '═'))
}

/// Strip markup from a message body, returning newline-joined plain text.
///
/// ```rust
/// use faq_harvester::sanitize::clean_html;
///
/// assert_eq!(clean_html("<p>Hi</p><br><p>Bye</p>"), "Hi\nBye");
/// assert_eq!(clean_html(""), "");
/// ```
pub fn clean_html(markup: &str) -> String {
    if markup.trim().is_empty() {
        return String::new();
    }

    let rendered = html2text::config::with_decorator(TrivialDecorator::new())
        .raw_mode(true)
        .string_from_read(markup.as_bytes(), RENDER_WIDTH)
        .unwrap_or_else(|_| markup.to_string());

    rendered
        .lines()
        .map(|line| line.replace('\u{a0}', " "))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !is_rule_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}
