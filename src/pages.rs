use serde_json::{json, Value};

use crate::models::{Language, Snippet, User};
use crate::repo::RepoResult;
use crate::template::{Context, SnippetRelations, Template, TemplateSyntaxError};

const SNIPPET_DETAIL: &str = include_str!("../templates/snippet_detail.html");

/// Built-in page templates, compiled once at startup.
#[derive(Debug, Clone)]
pub struct Pages {
    snippet_detail: Template,
}

pub struct SnippetPage<'a> {
    pub site_name: Option<&'a str>,
    pub snippet: &'a Snippet,
    pub language: &'a Language,
    pub author: &'a User,
    pub score: i64,
    /// Signed-in viewer, if any.
    pub viewer: Option<&'a User>,
}

impl Pages {
    pub fn load() -> Result<Self, TemplateSyntaxError> {
        Ok(Self { snippet_detail: Template::compile(SNIPPET_DETAIL)? })
    }

    pub async fn snippet_detail<L>(&self, page: SnippetPage<'_>, lookup: &L) -> RepoResult<String>
    where
        L: SnippetRelations + ?Sized,
    {
        let mut ctx = Context::new();
        ctx.insert("site_name".into(), page.site_name.map_or(Value::Null, Value::from));
        ctx.insert("snippet".into(), json!(page.snippet));
        ctx.insert(
            "language".into(),
            json!({ "name": page.language.name, "slug": page.language.slug, "url": page.language.absolute_url() }),
        );
        ctx.insert(
            "author".into(),
            json!({ "id": page.author.id, "username": page.author.username, "url": page.author.absolute_url() }),
        );
        ctx.insert("score".into(), Value::from(page.score));
        ctx.insert("user".into(), page.viewer.map_or(Value::Null, |u| json!({ "id": u.id, "username": u.username })));
        self.snippet_detail.render(&ctx, lookup).await
    }
}
