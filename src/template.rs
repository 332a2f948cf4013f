//! A small page template language with the snippet relation tags.
//!
//! Supported syntax:
//!
//! ```text
//! {{ snippet.title }}            escaped output
//! {{ snippet.highlighted_code|safe }}
//! {% if user %}...{% else %}...{% endif %}
//! {% if_bookmarked user snippet %}...{% else %}...{% endif_bookmarked %}
//! {% if_rated user snippet %}...{% else %}...{% endif_rated %}
//! {% get_rating user snippet as rating %}
//! ```
//!
//! Templates are validated completely by [`Template::compile`]; rendering
//! never fails on template shape. A relation tag whose user or snippet
//! variable does not resolve to an id renders nothing.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Id, Rating};
use crate::repo::{BookmarkRepo, RatingRepo, RepoResult};

pub type Context = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateSyntaxError {
    #[error("'{tag}' tag takes {expected} arguments")]
    WrongArgCount { tag: String, expected: usize },
    #[error("third argument to '{tag}' must be 'as'")]
    MissingAs { tag: String },
    #[error("unclosed tag '{tag}', expected '{expected}'")]
    Unclosed { tag: String, expected: String },
    #[error("unexpected '{0}'")]
    Unexpected(String),
    #[error("unknown tag '{0}'")]
    UnknownTag(String),
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
    #[error("unterminated '{0}'")]
    Unterminated(&'static str),
    #[error("empty tag")]
    Empty,
}

/// Relation lookups the tags need. Every repository provides them.
#[async_trait]
pub trait SnippetRelations: Send + Sync {
    async fn is_bookmarked(&self, user_id: Id, snippet_id: Id) -> RepoResult<bool>;
    async fn is_rated(&self, user_id: Id, snippet_id: Id) -> RepoResult<bool>;
    async fn rating_for(&self, user_id: Id, snippet_id: Id) -> RepoResult<Option<Rating>>;
}

#[async_trait]
impl<T> SnippetRelations for T
where
    T: BookmarkRepo + RatingRepo + ?Sized,
{
    async fn is_bookmarked(&self, user_id: Id, snippet_id: Id) -> RepoResult<bool> {
        self.bookmark_exists(user_id, snippet_id).await
    }
    async fn is_rated(&self, user_id: Id, snippet_id: Id) -> RepoResult<bool> {
        Ok(self.get_rating(user_id, snippet_id).await?.is_some())
    }
    async fn rating_for(&self, user_id: Id, snippet_id: Id) -> RepoResult<Option<Rating>> {
        self.get_rating(user_id, snippet_id).await
    }
}

type VarPath = Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelationKind {
    Bookmarked,
    Rated,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var { path: VarPath, escape: bool },
    If { cond: VarPath, then: Vec<Node>, otherwise: Vec<Node> },
    Relation { kind: RelationKind, user: VarPath, snippet: VarPath, then: Vec<Node>, otherwise: Vec<Node> },
    GetRating { user: VarPath, snippet: VarPath, bind: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Var(&'a str),
    Block(&'a str),
}

fn tokenize(src: &str) -> Result<Vec<Token<'_>>, TemplateSyntaxError> {
    let mut out = Vec::new();
    let mut rest = src;
    while !rest.is_empty() {
        let next = [rest.find("{{"), rest.find("{%")].into_iter().flatten().min();
        let Some(i) = next else {
            out.push(Token::Text(rest));
            break;
        };
        if i > 0 {
            out.push(Token::Text(&rest[..i]));
        }
        let is_var = rest[i..].starts_with("{{");
        let (open, close) = if is_var { ("{{", "}}") } else { ("{%", "%}") };
        let body = &rest[i + 2..];
        let end = body.find(close).ok_or(TemplateSyntaxError::Unterminated(open))?;
        let inner = body[..end].trim();
        out.push(if is_var { Token::Var(inner) } else { Token::Block(inner) });
        rest = &body[end + 2..];
    }
    Ok(out)
}

fn var_path(expr: &str) -> Result<VarPath, TemplateSyntaxError> {
    if expr.is_empty() {
        return Err(TemplateSyntaxError::Empty);
    }
    Ok(expr.split('.').map(str::to_string).collect())
}

struct Parser<'a> {
    tokens: std::vec::IntoIter<Token<'a>>,
}

impl<'a> Parser<'a> {
    /// Parse until one of `ends` is reached. At top level `opener` is `None`
    /// and running out of tokens is the normal exit.
    fn parse_until(&mut self, opener: Option<&str>, ends: &[&str]) -> Result<(Vec<Node>, Option<String>), TemplateSyntaxError> {
        let mut nodes = Vec::new();
        while let Some(tok) = self.tokens.next() {
            match tok {
                Token::Text(t) => nodes.push(Node::Text(t.to_string())),
                Token::Var(expr) => nodes.push(Self::parse_var(expr)?),
                Token::Block(body) => {
                    let bits: Vec<&str> = body.split_whitespace().collect();
                    let Some(&name) = bits.first() else { return Err(TemplateSyntaxError::Empty) };
                    if ends.contains(&name) {
                        if bits.len() != 1 {
                            return Err(TemplateSyntaxError::WrongArgCount { tag: name.to_string(), expected: 0 });
                        }
                        return Ok((nodes, Some(name.to_string())));
                    }
                    nodes.push(self.parse_block(name, &bits)?);
                }
            }
        }
        match opener {
            None => Ok((nodes, None)),
            Some(tag) => Err(TemplateSyntaxError::Unclosed {
                tag: tag.to_string(),
                expected: ends.last().copied().unwrap_or_default().to_string(),
            }),
        }
    }

    fn parse_var(expr: &str) -> Result<Node, TemplateSyntaxError> {
        let mut parts = expr.split('|').map(str::trim);
        let path = var_path(parts.next().unwrap_or_default())?;
        let mut escape = true;
        for filter in parts {
            match filter {
                "safe" => escape = false,
                other => return Err(TemplateSyntaxError::UnknownFilter(other.to_string())),
            }
        }
        Ok(Node::Var { path, escape })
    }

    /// Parses the `then` branch, an optional `else` branch, and the closing tag.
    fn parse_branches(&mut self, tag: &str, end: &str) -> Result<(Vec<Node>, Vec<Node>), TemplateSyntaxError> {
        let (then, reached) = self.parse_until(Some(tag), &["else", end])?;
        if reached.as_deref() == Some("else") {
            let (otherwise, _) = self.parse_until(Some(tag), &[end])?;
            Ok((then, otherwise))
        } else {
            Ok((then, Vec::new()))
        }
    }

    fn parse_block(&mut self, name: &str, bits: &[&str]) -> Result<Node, TemplateSyntaxError> {
        let arity = |expected: usize| {
            if bits.len() == expected + 1 {
                Ok(())
            } else {
                Err(TemplateSyntaxError::WrongArgCount { tag: name.to_string(), expected })
            }
        };
        match name {
            "if" => {
                arity(1)?;
                let cond = var_path(bits[1])?;
                let (then, otherwise) = self.parse_branches(name, "endif")?;
                Ok(Node::If { cond, then, otherwise })
            }
            "if_bookmarked" | "if_rated" => {
                arity(2)?;
                let (kind, end) = if name == "if_bookmarked" {
                    (RelationKind::Bookmarked, "endif_bookmarked")
                } else {
                    (RelationKind::Rated, "endif_rated")
                };
                let user = var_path(bits[1])?;
                let snippet = var_path(bits[2])?;
                let (then, otherwise) = self.parse_branches(name, end)?;
                Ok(Node::Relation { kind, user, snippet, then, otherwise })
            }
            "get_rating" => {
                arity(4)?;
                if bits[3] != "as" {
                    return Err(TemplateSyntaxError::MissingAs { tag: name.to_string() });
                }
                Ok(Node::GetRating { user: var_path(bits[1])?, snippet: var_path(bits[2])?, bind: bits[4].to_string() })
            }
            "else" | "endif" | "endif_bookmarked" | "endif_rated" => Err(TemplateSyntaxError::Unexpected(name.to_string())),
            other => Err(TemplateSyntaxError::UnknownTag(other.to_string())),
        }
    }
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, TemplateSyntaxError> {
        let mut parser = Parser { tokens: tokenize(source)?.into_iter() };
        let (nodes, _) = parser.parse_until(None, &[])?;
        Ok(Self { nodes })
    }

    /// Render against `ctx`. Bindings made by `get_rating` live only for this render.
    pub async fn render<L>(&self, ctx: &Context, lookup: &L) -> RepoResult<String>
    where
        L: SnippetRelations + ?Sized,
    {
        let mut scope = ctx.clone();
        let mut out = String::new();
        render_nodes(&self.nodes, &mut scope, lookup, &mut out).await?;
        Ok(out)
    }
}

fn render_nodes<'a, L>(
    nodes: &'a [Node],
    ctx: &'a mut Context,
    lookup: &'a L,
    out: &'a mut String,
) -> BoxFuture<'a, RepoResult<()>>
where
    L: SnippetRelations + ?Sized,
{
    Box::pin(async move {
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Var { path, escape } => {
                    let text = display(resolve(ctx, path));
                    if *escape {
                        push_escaped(out, &text);
                    } else {
                        out.push_str(&text);
                    }
                }
                Node::If { cond, then, otherwise } => {
                    let branch = if truthy(resolve(ctx, cond)) { then } else { otherwise };
                    render_nodes(branch, ctx, lookup, out).await?;
                }
                Node::Relation { kind, user, snippet, then, otherwise } => {
                    let (Some(u), Some(s)) = (resolve_id(ctx, user), resolve_id(ctx, snippet)) else { continue };
                    let hit = match kind {
                        RelationKind::Bookmarked => lookup.is_bookmarked(u, s).await?,
                        RelationKind::Rated => lookup.is_rated(u, s).await?,
                    };
                    render_nodes(if hit { then } else { otherwise }, ctx, lookup, out).await?;
                }
                Node::GetRating { user, snippet, bind } => {
                    let (Some(u), Some(s)) = (resolve_id(ctx, user), resolve_id(ctx, snippet)) else { continue };
                    let value = match lookup.rating_for(u, s).await? {
                        Some(r) => serde_json::to_value(r).unwrap_or(Value::Null),
                        None => Value::Null,
                    };
                    ctx.insert(bind.clone(), value);
                }
            }
        }
        Ok(())
    })
}

fn resolve<'c>(ctx: &'c Context, path: &[String]) -> Option<&'c Value> {
    let (first, rest) = path.split_first()?;
    let mut cur = ctx.get(first)?;
    for key in rest {
        cur = match cur {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// A user or snippet argument is either the id itself or an object carrying `id`.
fn resolve_id(ctx: &Context, path: &[String]) -> Option<Id> {
    match resolve(ctx, path)? {
        Value::Number(n) => n.as_i64(),
        Value::Object(map) => map.get("id")?.as_i64(),
        _ => None,
    }
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn display(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
}
