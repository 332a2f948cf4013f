//! Atom syndication of recent snippets.
//!
//! Feed titles depend on the configured site name, which is handed to
//! [`Feeds::new`] at startup rather than read from the environment here.

use atom_syndication::{Entry, Feed, FixedDateTime, Link, Person, Text};
use chrono::Utc;

use crate::config::Settings;
use crate::models::{Language, Snippet, SnippetFilter, User};
use crate::repo::{Repo, RepoResult};

/// Upper bound on entries in every feed.
pub const FEED_ITEM_LIMIT: usize = 15;

#[derive(Debug, Clone)]
pub enum FeedKind {
    Latest,
    ByAuthor(User),
    ByLanguage(Language),
}

#[derive(Debug, Clone)]
pub struct Feeds {
    site_name: Option<String>,
    base_url: String,
}

impl Feeds {
    pub fn new(settings: &Settings) -> Self {
        Self { site_name: settings.site_name.clone(), base_url: settings.base_url.clone() }
    }

    fn titled(&self, title: String) -> String {
        match &self.site_name {
            Some(site) => format!("{site}: {title}"),
            None => title,
        }
    }

    pub fn title(&self, kind: &FeedKind) -> String {
        match kind {
            FeedKind::Latest => self.titled("Latest snippets".into()),
            FeedKind::ByAuthor(u) => self.titled(format!("Latest snippets posted by {}", u.username)),
            FeedKind::ByLanguage(l) => self.titled(format!("Latest snippets written in {}", l.name)),
        }
    }

    pub fn link(&self, kind: &FeedKind) -> String {
        let path = match kind {
            FeedKind::Latest => "/api/v1/snippets".to_string(),
            FeedKind::ByAuthor(u) => u.absolute_url(),
            FeedKind::ByLanguage(l) => l.absolute_url(),
        };
        format!("{}{}", self.base_url, path)
    }

    fn feed_id(&self, kind: &FeedKind) -> String {
        let path = match kind {
            FeedKind::Latest => "/feeds/latest/".to_string(),
            FeedKind::ByAuthor(u) => format!("/feeds/author/{}/", u.username),
            FeedKind::ByLanguage(l) => format!("/feeds/language/{}/", l.slug),
        };
        format!("{}{}", self.base_url, path)
    }

    /// The newest snippets for the feed, at most [`FEED_ITEM_LIMIT`].
    pub async fn items(&self, repo: &dyn Repo, kind: &FeedKind) -> RepoResult<Vec<Snippet>> {
        let filter = match kind {
            FeedKind::Latest => SnippetFilter::default(),
            FeedKind::ByAuthor(u) => SnippetFilter::by_author(u.id),
            FeedKind::ByLanguage(l) => SnippetFilter::by_language(l.id),
        };
        repo.list_snippets(filter.limit(FEED_ITEM_LIMIT)).await
    }

    pub async fn build(&self, repo: &dyn Repo, kind: &FeedKind) -> RepoResult<Feed> {
        let items = self.items(repo, kind).await?;
        let mut entries = Vec::with_capacity(items.len());
        for snippet in &items {
            let author = repo.get_user(snippet.author_id).await?;
            entries.push(self.entry(snippet, &author));
        }

        let updated: FixedDateTime = items.iter().map(|s| s.updated_date).max().unwrap_or_else(Utc::now).into();
        let mut feed = Feed::default();
        feed.set_title(self.title(kind));
        feed.set_id(self.feed_id(kind));
        feed.set_updated(updated);
        feed.set_links(vec![alternate(self.link(kind))]);
        feed.set_authors(vec![person(match kind {
            FeedKind::ByAuthor(u) => u.username.clone(),
            _ => "Snippets submitters".into(),
        })]);
        if matches!(kind, FeedKind::Latest) {
            feed.set_subtitle(Some(Text::plain("Latest snippets")));
        }
        feed.set_entries(entries);
        Ok(feed)
    }

    fn entry(&self, snippet: &Snippet, author: &User) -> Entry {
        let url = format!("{}{}", self.base_url, snippet.absolute_url());
        let mut entry = Entry::default();
        entry.set_title(snippet.title.clone());
        entry.set_id(url.clone());
        entry.set_links(vec![alternate(url)]);
        entry.set_updated(FixedDateTime::from(snippet.updated_date));
        entry.set_published(Some(FixedDateTime::from(snippet.pub_date)));
        entry.set_authors(vec![person(author.username.clone())]);
        entry.set_summary(Some(Text::html(snippet.description_html.clone())));
        entry.set_rights(Some(Text::plain("Freely redistributable")));
        entry
    }
}

fn alternate(href: String) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel("alternate");
    link
}

fn person(name: String) -> Person {
    let mut p = Person::default();
    p.set_name(name);
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang() -> Language {
        Language {
            id: 1,
            name: "Python".into(),
            slug: "python".into(),
            language_code: "python".into(),
            file_extension: "py".into(),
            mime_type: "text/x-python".into(),
        }
    }

    #[test]
    fn titles_follow_site_name() {
        let plain = Feeds::new(&Settings::default());
        assert_eq!(plain.title(&FeedKind::Latest), "Latest snippets");

        let named = Feeds::new(&Settings::default().with_site_name("Cab"));
        assert_eq!(named.title(&FeedKind::Latest), "Cab: Latest snippets");
        assert_eq!(named.title(&FeedKind::ByLanguage(lang())), "Cab: Latest snippets written in Python");
    }

    #[test]
    fn language_link_points_at_language_page() {
        let feeds = Feeds::new(&Settings::default());
        assert_eq!(feeds.link(&FeedKind::ByLanguage(lang())), "http://localhost:8080/api/v1/languages/python");
    }
}
