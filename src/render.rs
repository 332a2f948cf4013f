//! Derived HTML for snippets: Markdown descriptions and highlighted code.
//!
//! Both functions are pure. Repositories call [`render_snippet`] inside the
//! same lock / transaction that writes the raw fields, so a stored snippet
//! never carries stale HTML.

use once_cell::sync::Lazy;
use pulldown_cmark::{html, Event, Options, Parser};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use thiserror::Error;

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const THEME_NAME: &str = "InspiredGitHub";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("highlight failed: {0}")]
    Highlight(#[from] syntect::Error),
    #[error("theme '{0}' not available")]
    MissingTheme(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSnippet {
    pub description_html: String,
    pub highlighted_code: String,
}

pub fn render_snippet(description: &str, code: &str, language_code: &str) -> Result<RenderedSnippet, RenderError> {
    Ok(RenderedSnippet {
        description_html: markdown_to_html(description),
        highlighted_code: highlight(code, language_code)?,
    })
}

/// Raw HTML blocks in the source are emitted as escaped text.
pub fn markdown_to_html(text: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, opts).map(|ev| match ev {
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Highlight `code` for the given language token and lay it out as a
/// two-column table: line numbers on the left, code on the right.
/// Unknown tokens fall back to plain text.
pub fn highlight(code: &str, language_code: &str) -> Result<String, RenderError> {
    let syntax = SYNTAXES
        .find_syntax_by_token(language_code)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());
    let theme: &Theme = THEMES.themes.get(THEME_NAME).ok_or(RenderError::MissingTheme(THEME_NAME))?;
    let mut hl = HighlightLines::new(syntax, theme);

    let mut linenos = String::new();
    let mut body = String::with_capacity(code.len() * 4);
    let mut count = 0usize;
    for line in LinesWithEndings::from(code) {
        count += 1;
        let ranges = hl.highlight_line(line, &SYNTAXES)?;
        body.push_str(&styled_line_to_highlighted_html(&ranges[..], IncludeBackground::No)?);
    }
    if !body.ends_with('\n') {
        body.push('\n');
    }
    for n in 1..=count.max(1) {
        linenos.push_str(&n.to_string());
        linenos.push('\n');
    }

    Ok(format!(
        "<table class=\"highlighttable\"><tr><td class=\"linenos\"><pre>{linenos}</pre></td>\
         <td class=\"code\"><div class=\"highlight\"><pre>{body}</pre></div></td></tr></table>"
    ))
}
