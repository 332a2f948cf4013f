use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Language a snippet is written in. `language_code` is the highlighter token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Language {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub language_code: String,
    pub file_extension: String,
    pub mime_type: String,
}

impl NewLanguage {
    /// The explicit slug when given, otherwise one derived from `name`.
    /// Empty when `name` has no characters a slug can keep.
    pub fn resolved_slug(&self) -> String {
        match self.slug.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => slugify(&self.name),
        }
    }
}

impl Language {
    pub fn absolute_url(&self) -> String {
        format!("/api/v1/languages/{}", self.slug)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewLanguage {
    pub name: String,
    /// Derived from `name` when omitted.
    pub slug: Option<String>,
    pub language_code: String,
    pub file_extension: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn absolute_url(&self) -> String {
        format!("/api/v1/users/{}", self.username)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Snippet {
    pub id: Id,
    pub title: String,
    pub language_id: Id,
    pub author_id: Id,
    pub description: String,
    pub description_html: String,
    pub code: String,
    pub highlighted_code: String,
    pub pub_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl Snippet {
    pub fn absolute_url(&self) -> String {
        snippet_url(self.id)
    }
}

pub fn snippet_url(id: Id) -> String {
    format!("/snippets/{id}/")
}

/// Author-editable fields. The HTML forms are derived by the repository on write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SnippetInput {
    pub title: String,
    pub language_id: Id,
    pub description: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct NewSnippet {
    pub author_id: Id,
    pub input: SnippetInput,
}

/// Query shape shared by list pages and feeds. Results are always newest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnippetFilter {
    pub author_id: Option<Id>,
    pub language_id: Option<Id>,
    pub limit: Option<usize>,
}

impl SnippetFilter {
    pub fn by_author(author_id: Id) -> Self {
        Self { author_id: Some(author_id), ..Self::default() }
    }
    pub fn by_language(language_id: Id) -> Self {
        Self { language_id: Some(language_id), ..Self::default() }
    }
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
    pub fn matches(&self, s: &Snippet) -> bool {
        self.author_id.map_or(true, |a| s.author_id == a)
            && self.language_id.map_or(true, |l| s.language_id == l)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum FlagKind {
    Spam = 1,
    Inappropriate = 2,
}

impl FlagKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spam" | "1" => Some(Self::Spam),
            "inappropriate" | "2" => Some(Self::Inappropriate),
            _ => None,
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagKind::Spam => f.write_str("Spam"),
            FlagKind::Inappropriate => f.write_str("Inappropriate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Flag {
    pub id: Id,
    pub snippet_id: Id,
    pub user_id: Id,
    pub flag: FlagKind,
}

#[derive(Debug, Clone)]
pub struct NewFlag {
    pub snippet_id: Id,
    pub user_id: Id,
    pub flag: FlagKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Bookmark {
    pub id: Id,
    pub snippet_id: Id,
    pub user_id: Id,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingValue {
    Up,
    Down,
}

impl RatingValue {
    /// Only the exact strings "1" and "-1" are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1" => Some(Self::Up),
            "-1" => Some(Self::Down),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            RatingValue::Up => 1,
            RatingValue::Down => -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Rating {
    pub id: Id,
    pub snippet_id: Id,
    pub user_id: Id,
    /// +1 (useful) or -1 (not useful).
    pub rating: i16,
    pub date: DateTime<Utc>,
}

// ---------------- ranking rows ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AuthorScore {
    pub user_id: Id,
    pub username: String,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct LanguageScore {
    pub language_id: Id,
    pub name: String,
    pub slug: String,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SnippetScore {
    pub snippet_id: Id,
    pub title: String,
    pub author_id: Id,
    pub score: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RemediationReport {
    pub snippets_removed: Vec<Id>,
    pub users_banned: Vec<Id>,
}

/// Lowercase ASCII slug: alphanumerics kept, runs of anything else become one `-`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if c == '+' {
            out.push('p');
        } else if c == '#' {
            out.push_str("sharp");
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
