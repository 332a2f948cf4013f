use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::*;
use crate::render::RenderError;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("invalid: {0}")] Invalid(String),
    #[error("internal: {0}")] Internal(String),
}

impl From<RenderError> for RepoError {
    fn from(e: RenderError) -> Self {
        RepoError::Internal(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    /// `None` hash means the password is unusable.
    async fn get_credentials(&self, username: &str) -> RepoResult<(User, Option<String>)>;
}

#[async_trait]
pub trait LanguageRepo: Send + Sync {
    async fn list_languages(&self) -> RepoResult<Vec<Language>>;
    async fn get_language(&self, id: Id) -> RepoResult<Language>;
    async fn get_language_by_slug(&self, slug: &str) -> RepoResult<Language>;
    async fn create_language(&self, new: NewLanguage) -> RepoResult<Language>;
}

#[async_trait]
pub trait SnippetRepo: Send + Sync {
    async fn list_snippets(&self, filter: SnippetFilter) -> RepoResult<Vec<Snippet>>;
    async fn get_snippet(&self, id: Id) -> RepoResult<Snippet>;
    /// Derives `description_html` / `highlighted_code` atomically with the insert.
    async fn create_snippet(&self, new: NewSnippet) -> RepoResult<Snippet>;
    /// Derives `description_html` / `highlighted_code` atomically with the update.
    async fn update_snippet(&self, id: Id, input: SnippetInput) -> RepoResult<Snippet>;
}

#[async_trait]
pub trait BookmarkRepo: Send + Sync {
    /// Returns the bookmark for the pair and whether it was newly created.
    async fn add_bookmark(&self, user_id: Id, snippet_id: Id) -> RepoResult<(Bookmark, bool)>;
    async fn remove_bookmark(&self, user_id: Id, snippet_id: Id) -> RepoResult<u64>;
    async fn bookmark_exists(&self, user_id: Id, snippet_id: Id) -> RepoResult<bool>;
    async fn list_bookmarks(&self, user_id: Id) -> RepoResult<Vec<Bookmark>>;
}

#[async_trait]
pub trait RatingRepo: Send + Sync {
    /// Insert or change the single rating for the pair.
    async fn rate_snippet(&self, user_id: Id, snippet_id: Id, value: RatingValue) -> RepoResult<Rating>;
    async fn get_rating(&self, user_id: Id, snippet_id: Id) -> RepoResult<Option<Rating>>;
    async fn snippet_score(&self, snippet_id: Id) -> RepoResult<i64>;
}

#[async_trait]
pub trait FlagRepo: Send + Sync {
    async fn create_flag(&self, new: NewFlag) -> RepoResult<Flag>;
    async fn get_flag(&self, id: Id) -> RepoResult<Flag>;
    async fn list_flags(&self) -> RepoResult<Vec<Flag>>;
    /// Disable every flagged author and delete every flagged snippet, all or nothing.
    async fn remove_and_ban(&self, flag_ids: &[Id]) -> RepoResult<RemediationReport>;
}

/// Aggregations. Entities without rows in the aggregated relation are left
/// out; ties are broken by ascending id.
#[async_trait]
pub trait RankingRepo: Send + Sync {
    async fn top_authors(&self) -> RepoResult<Vec<AuthorScore>>;
    async fn top_languages(&self) -> RepoResult<Vec<LanguageScore>>;
    async fn most_bookmarked(&self) -> RepoResult<Vec<SnippetScore>>;
    async fn top_rated(&self) -> RepoResult<Vec<SnippetScore>>;
}

pub trait Repo: UserRepo + LanguageRepo + SnippetRepo + BookmarkRepo + RatingRepo + FlagRepo + RankingRepo {}

impl<T> Repo for T where T: UserRepo + LanguageRepo + SnippetRepo + BookmarkRepo + RatingRepo + FlagRepo + RankingRepo {}

fn sort_ranking<T>(rows: &mut [T], key: impl Fn(&T) -> (i64, Id)) {
    rows.sort_by(|a, b| {
        let (sa, ia) = key(a);
        let (sb, ib) = key(b);
        sb.cmp(&sa).then(ia.cmp(&ib))
    });
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::render::render_snippet;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Clone, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        passwords: HashMap<Id, String>,
        languages: HashMap<Id, Language>,
        snippets: HashMap<Id, Snippet>,
        flags: HashMap<Id, Flag>,
        bookmarks: HashMap<Id, Bookmark>,
        ratings: HashMap<Id, Rating>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn delete_snippet(&mut self, id: Id) {
            self.snippets.remove(&id);
            self.flags.retain(|_, f| f.snippet_id != id);
            self.bookmarks.retain(|_, b| b.snippet_id != id);
            self.ratings.retain(|_, r| r.snippet_id != id);
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
        // serialises snapshot writers
        persist_lock: Arc<Mutex<()>>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("SNIPSHARE_DATA_DIR") {
                Ok(dir) => PathBuf::from(dir).join("state.json"),
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("[inmem] loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("[inmem] failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("[inmem] no snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        /// Repository backed by a JSON snapshot under `SNIPSHARE_DATA_DIR`.
        pub fn new() -> Self {
            let path = Self::snapshot_path();
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)), persist_lock: Arc::default() }
        }

        /// Repository that never touches the filesystem.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None, persist_lock: Arc::default() }
        }

        fn read(&self) -> RepoResult<std::sync::RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<std::sync::RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        /// Writes the snapshot to a sibling temp file and renames it into
        /// place, so readers never see a partial file.
        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_deref() else { return };
            let Ok(_guard) = self.persist_lock.lock() else { return };
            let bytes = match self.state.read() {
                Ok(s) => serde_json::to_vec_pretty(&*s),
                Err(_) => return,
            };
            let bytes = match bytes {
                Ok(b) => b,
                Err(e) => {
                    log::error!("[inmem] failed to serialise snapshot: {e}");
                    return;
                }
            };
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            let tmp = path.with_extension("json.tmp");
            let written = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path));
            if let Err(e) = written {
                log::error!("[inmem] failed to write snapshot '{}': {e}", path.display());
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let user = User {
                id,
                username: new.username,
                email: new.email,
                is_active: true,
                is_staff: new.is_staff,
                date_joined: Utc::now(),
            };
            s.users.insert(id, user.clone());
            s.passwords.insert(id, new.password_hash);
            drop(s);
            self.persist();
            Ok(user)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            self.read()?.users.values().find(|u| u.username == username).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_credentials(&self, username: &str) -> RepoResult<(User, Option<String>)> {
            let s = self.read()?;
            let user = s.users.values().find(|u| u.username == username).cloned().ok_or(RepoError::NotFound)?;
            let hash = s.passwords.get(&user.id).cloned();
            Ok((user, hash))
        }
    }

    #[async_trait]
    impl LanguageRepo for InMemRepo {
        async fn list_languages(&self) -> RepoResult<Vec<Language>> {
            let mut v: Vec<_> = self.read()?.languages.values().cloned().collect();
            v.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            Ok(v)
        }
        async fn get_language(&self, id: Id) -> RepoResult<Language> {
            self.read()?.languages.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_language_by_slug(&self, slug: &str) -> RepoResult<Language> {
            self.read()?.languages.values().find(|l| l.slug == slug).cloned().ok_or(RepoError::NotFound)
        }
        async fn create_language(&self, new: NewLanguage) -> RepoResult<Language> {
            let slug = new.resolved_slug();
            if slug.is_empty() {
                return Err(RepoError::Invalid("language slug is empty".into()));
            }
            let mut s = self.write()?;
            if s.languages.values().any(|l| l.slug == slug) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let lang = Language {
                id,
                name: new.name,
                slug,
                language_code: new.language_code,
                file_extension: new.file_extension,
                mime_type: new.mime_type,
            };
            s.languages.insert(id, lang.clone());
            drop(s);
            self.persist();
            Ok(lang)
        }
    }

    #[async_trait]
    impl SnippetRepo for InMemRepo {
        async fn list_snippets(&self, filter: SnippetFilter) -> RepoResult<Vec<Snippet>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.snippets.values().filter(|sn| filter.matches(sn)).cloned().collect();
            v.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
            if let Some(n) = filter.limit {
                v.truncate(n);
            }
            Ok(v)
        }
        async fn get_snippet(&self, id: Id) -> RepoResult<Snippet> {
            self.read()?.snippets.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn create_snippet(&self, new: NewSnippet) -> RepoResult<Snippet> {
            let mut s = self.write()?;
            if !s.users.contains_key(&new.author_id) {
                return Err(RepoError::NotFound);
            }
            let lang = s.languages.get(&new.input.language_id).cloned().ok_or(RepoError::NotFound)?;
            let rendered = render_snippet(&new.input.description, &new.input.code, &lang.language_code)?;
            let now = Utc::now();
            let id = s.next_id();
            let snippet = Snippet {
                id,
                title: new.input.title,
                language_id: lang.id,
                author_id: new.author_id,
                description: new.input.description,
                description_html: rendered.description_html,
                code: new.input.code,
                highlighted_code: rendered.highlighted_code,
                pub_date: now,
                updated_date: now,
            };
            s.snippets.insert(id, snippet.clone());
            drop(s);
            self.persist();
            Ok(snippet)
        }
        async fn update_snippet(&self, id: Id, input: SnippetInput) -> RepoResult<Snippet> {
            let mut s = self.write()?;
            let lang = s.languages.get(&input.language_id).cloned().ok_or(RepoError::NotFound)?;
            let rendered = render_snippet(&input.description, &input.code, &lang.language_code)?;
            let snippet = s.snippets.get_mut(&id).ok_or(RepoError::NotFound)?;
            snippet.title = input.title;
            snippet.language_id = lang.id;
            snippet.description = input.description;
            snippet.description_html = rendered.description_html;
            snippet.code = input.code;
            snippet.highlighted_code = rendered.highlighted_code;
            snippet.updated_date = Utc::now();
            let updated = snippet.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl BookmarkRepo for InMemRepo {
        async fn add_bookmark(&self, user_id: Id, snippet_id: Id) -> RepoResult<(Bookmark, bool)> {
            let mut s = self.write()?;
            if !s.snippets.contains_key(&snippet_id) || !s.users.contains_key(&user_id) {
                return Err(RepoError::NotFound);
            }
            // check and insert under the same write lock
            if let Some(b) = s.bookmarks.values().find(|b| b.user_id == user_id && b.snippet_id == snippet_id) {
                return Ok((b.clone(), false));
            }
            let id = s.next_id();
            let bookmark = Bookmark { id, snippet_id, user_id, date: Utc::now() };
            s.bookmarks.insert(id, bookmark.clone());
            drop(s);
            self.persist();
            Ok((bookmark, true))
        }
        async fn remove_bookmark(&self, user_id: Id, snippet_id: Id) -> RepoResult<u64> {
            let mut s = self.write()?;
            let before = s.bookmarks.len();
            s.bookmarks.retain(|_, b| !(b.user_id == user_id && b.snippet_id == snippet_id));
            let removed = (before - s.bookmarks.len()) as u64;
            drop(s);
            if removed > 0 {
                self.persist();
            }
            Ok(removed)
        }
        async fn bookmark_exists(&self, user_id: Id, snippet_id: Id) -> RepoResult<bool> {
            Ok(self.read()?.bookmarks.values().any(|b| b.user_id == user_id && b.snippet_id == snippet_id))
        }
        async fn list_bookmarks(&self, user_id: Id) -> RepoResult<Vec<Bookmark>> {
            let mut v: Vec<_> = self.read()?.bookmarks.values().filter(|b| b.user_id == user_id).cloned().collect();
            v.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
            Ok(v)
        }
    }

    #[async_trait]
    impl RatingRepo for InMemRepo {
        async fn rate_snippet(&self, user_id: Id, snippet_id: Id, value: RatingValue) -> RepoResult<Rating> {
            let mut s = self.write()?;
            if !s.snippets.contains_key(&snippet_id) || !s.users.contains_key(&user_id) {
                return Err(RepoError::NotFound);
            }
            let existing = s.ratings.values().find(|r| r.user_id == user_id && r.snippet_id == snippet_id).map(|r| r.id);
            let rating = match existing {
                Some(id) => {
                    let r = s.ratings.get_mut(&id).ok_or(RepoError::NotFound)?;
                    r.rating = value.as_i16();
                    r.clone()
                }
                None => {
                    let id = s.next_id();
                    let r = Rating { id, snippet_id, user_id, rating: value.as_i16(), date: Utc::now() };
                    s.ratings.insert(id, r.clone());
                    r
                }
            };
            drop(s);
            self.persist();
            Ok(rating)
        }
        async fn get_rating(&self, user_id: Id, snippet_id: Id) -> RepoResult<Option<Rating>> {
            Ok(self.read()?.ratings.values().find(|r| r.user_id == user_id && r.snippet_id == snippet_id).cloned())
        }
        async fn snippet_score(&self, snippet_id: Id) -> RepoResult<i64> {
            let s = self.read()?;
            if !s.snippets.contains_key(&snippet_id) {
                return Err(RepoError::NotFound);
            }
            Ok(s.ratings.values().filter(|r| r.snippet_id == snippet_id).map(|r| i64::from(r.rating)).sum())
        }
    }

    #[async_trait]
    impl FlagRepo for InMemRepo {
        async fn create_flag(&self, new: NewFlag) -> RepoResult<Flag> {
            let mut s = self.write()?;
            if !s.snippets.contains_key(&new.snippet_id) || !s.users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
            let id = s.next_id();
            let flag = Flag { id, snippet_id: new.snippet_id, user_id: new.user_id, flag: new.flag };
            s.flags.insert(id, flag.clone());
            drop(s);
            self.persist();
            Ok(flag)
        }
        async fn get_flag(&self, id: Id) -> RepoResult<Flag> {
            self.read()?.flags.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn list_flags(&self) -> RepoResult<Vec<Flag>> {
            let mut v: Vec<_> = self.read()?.flags.values().cloned().collect();
            v.sort_by_key(|f| f.id);
            Ok(v)
        }
        async fn remove_and_ban(&self, flag_ids: &[Id]) -> RepoResult<RemediationReport> {
            let mut s = self.write()?;
            // resolve everything first so a missing row aborts before any mutation
            let mut snippet_ids = BTreeSet::new();
            for id in flag_ids {
                let flag = s.flags.get(id).ok_or(RepoError::NotFound)?;
                snippet_ids.insert(flag.snippet_id);
            }
            let mut author_ids = BTreeSet::new();
            for sid in &snippet_ids {
                let snippet = s.snippets.get(sid).ok_or(RepoError::NotFound)?;
                author_ids.insert(snippet.author_id);
            }
            for uid in &author_ids {
                if let Some(u) = s.users.get_mut(uid) {
                    u.is_active = false;
                }
                s.passwords.remove(uid);
            }
            for sid in &snippet_ids {
                s.delete_snippet(*sid);
            }
            drop(s);
            self.persist();
            Ok(RemediationReport {
                snippets_removed: snippet_ids.into_iter().collect(),
                users_banned: author_ids.into_iter().collect(),
            })
        }
    }

    #[async_trait]
    impl RankingRepo for InMemRepo {
        async fn top_authors(&self) -> RepoResult<Vec<AuthorScore>> {
            let s = self.read()?;
            let mut counts: HashMap<Id, i64> = HashMap::new();
            for sn in s.snippets.values() {
                *counts.entry(sn.author_id).or_default() += 1;
            }
            let mut v: Vec<_> = counts
                .into_iter()
                .filter_map(|(uid, score)| {
                    s.users.get(&uid).map(|u| AuthorScore { user_id: uid, username: u.username.clone(), score })
                })
                .collect();
            sort_ranking(&mut v, |r| (r.score, r.user_id));
            Ok(v)
        }
        async fn top_languages(&self) -> RepoResult<Vec<LanguageScore>> {
            let s = self.read()?;
            let mut counts: HashMap<Id, i64> = HashMap::new();
            for sn in s.snippets.values() {
                *counts.entry(sn.language_id).or_default() += 1;
            }
            let mut v: Vec<_> = counts
                .into_iter()
                .filter_map(|(lid, score)| {
                    s.languages.get(&lid).map(|l| LanguageScore {
                        language_id: lid,
                        name: l.name.clone(),
                        slug: l.slug.clone(),
                        score,
                    })
                })
                .collect();
            sort_ranking(&mut v, |r| (r.score, r.language_id));
            Ok(v)
        }
        async fn most_bookmarked(&self) -> RepoResult<Vec<SnippetScore>> {
            let s = self.read()?;
            let mut counts: HashMap<Id, i64> = HashMap::new();
            for b in s.bookmarks.values() {
                *counts.entry(b.snippet_id).or_default() += 1;
            }
            let mut v = snippet_scores(&s, counts);
            sort_ranking(&mut v, |r| (r.score, r.snippet_id));
            Ok(v)
        }
        async fn top_rated(&self) -> RepoResult<Vec<SnippetScore>> {
            let s = self.read()?;
            let mut sums: HashMap<Id, i64> = HashMap::new();
            for r in s.ratings.values() {
                *sums.entry(r.snippet_id).or_default() += i64::from(r.rating);
            }
            let mut v = snippet_scores(&s, sums);
            sort_ranking(&mut v, |r| (r.score, r.snippet_id));
            Ok(v)
        }
    }

    fn snippet_scores(s: &State, scores: HashMap<Id, i64>) -> Vec<SnippetScore> {
        scores
            .into_iter()
            .filter_map(|(sid, score)| {
                s.snippets.get(&sid).map(|sn| SnippetScore {
                    snippet_id: sid,
                    title: sn.title.clone(),
                    author_id: sn.author_id,
                    score,
                })
            })
            .collect()
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::render::render_snippet;
    use sqlx::{Pool, Postgres};

    const SNIPPET_COLS: &str = "id, title, language_id, author_id, description, description_html, \
                                code, highlighted_code, pub_date, updated_date";
    const USER_COLS: &str = "id, username, email, is_active, is_staff, date_joined";
    const LANGUAGE_COLS: &str = "id, name, slug, language_code, file_extension, mime_type";

    /// Unique violations become `Conflict`, missing rows and dangling foreign
    /// keys become `NotFound`.
    fn db_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => RepoError::Conflict,
                Some("23503") => RepoError::NotFound,
                _ => RepoError::Internal(e.to_string()),
            },
            _ => RepoError::Internal(e.to_string()),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users (username, email, password_hash, is_staff) VALUES ($1,$2,$3,$4) RETURNING {USER_COLS}"
            ))
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.is_staff)
            .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn get_credentials(&self, username: &str) -> RepoResult<(User, Option<String>)> {
            let user = self.get_user_by_username(username).await?;
            let hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user.id)
                .fetch_one(&self.pool).await.map_err(db_err)?;
            Ok((user, hash))
        }
    }

    #[async_trait]
    impl LanguageRepo for PgRepo {
        async fn list_languages(&self) -> RepoResult<Vec<Language>> {
            sqlx::query_as::<_, Language>(&format!("SELECT {LANGUAGE_COLS} FROM languages ORDER BY name, id"))
                .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn get_language(&self, id: Id) -> RepoResult<Language> {
            sqlx::query_as::<_, Language>(&format!("SELECT {LANGUAGE_COLS} FROM languages WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn get_language_by_slug(&self, slug: &str) -> RepoResult<Language> {
            sqlx::query_as::<_, Language>(&format!("SELECT {LANGUAGE_COLS} FROM languages WHERE slug = $1"))
                .bind(slug)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn create_language(&self, new: NewLanguage) -> RepoResult<Language> {
            let slug = new.resolved_slug();
            if slug.is_empty() {
                return Err(RepoError::Invalid("language slug is empty".into()));
            }
            sqlx::query_as::<_, Language>(&format!(
                "INSERT INTO languages (name, slug, language_code, file_extension, mime_type) \
                 VALUES ($1,$2,$3,$4,$5) RETURNING {LANGUAGE_COLS}"
            ))
            .bind(&new.name)
            .bind(&slug)
            .bind(&new.language_code)
            .bind(&new.file_extension)
            .bind(&new.mime_type)
            .fetch_one(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl SnippetRepo for PgRepo {
        async fn list_snippets(&self, filter: SnippetFilter) -> RepoResult<Vec<Snippet>> {
            let limit = filter.limit.map(|n| n as i64);
            sqlx::query_as::<_, Snippet>(&format!(
                "SELECT {SNIPPET_COLS} FROM snippets \
                 WHERE ($1::BIGINT IS NULL OR author_id = $1) AND ($2::BIGINT IS NULL OR language_id = $2) \
                 ORDER BY pub_date DESC, id DESC LIMIT $3"
            ))
            .bind(filter.author_id)
            .bind(filter.language_id)
            .bind(limit)
            .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn get_snippet(&self, id: Id) -> RepoResult<Snippet> {
            sqlx::query_as::<_, Snippet>(&format!("SELECT {SNIPPET_COLS} FROM snippets WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn create_snippet(&self, new: NewSnippet) -> RepoResult<Snippet> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let code: String = sqlx::query_scalar("SELECT language_code FROM languages WHERE id = $1 FOR SHARE")
                .bind(new.input.language_id)
                .fetch_one(&mut *tx).await.map_err(db_err)?;
            let rendered = render_snippet(&new.input.description, &new.input.code, &code)?;
            let snippet = sqlx::query_as::<_, Snippet>(&format!(
                "INSERT INTO snippets (title, language_id, author_id, description, description_html, code, highlighted_code) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {SNIPPET_COLS}"
            ))
            .bind(&new.input.title)
            .bind(new.input.language_id)
            .bind(new.author_id)
            .bind(&new.input.description)
            .bind(&rendered.description_html)
            .bind(&new.input.code)
            .bind(&rendered.highlighted_code)
            .fetch_one(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(snippet)
        }
        async fn update_snippet(&self, id: Id, input: SnippetInput) -> RepoResult<Snippet> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            sqlx::query("SELECT id FROM snippets WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_one(&mut *tx).await.map_err(db_err)?;
            let code: String = sqlx::query_scalar("SELECT language_code FROM languages WHERE id = $1 FOR SHARE")
                .bind(input.language_id)
                .fetch_one(&mut *tx).await.map_err(db_err)?;
            let rendered = render_snippet(&input.description, &input.code, &code)?;
            let snippet = sqlx::query_as::<_, Snippet>(&format!(
                "UPDATE snippets SET title = $2, language_id = $3, description = $4, description_html = $5, \
                 code = $6, highlighted_code = $7, updated_date = now() WHERE id = $1 RETURNING {SNIPPET_COLS}"
            ))
            .bind(id)
            .bind(&input.title)
            .bind(input.language_id)
            .bind(&input.description)
            .bind(&rendered.description_html)
            .bind(&input.code)
            .bind(&rendered.highlighted_code)
            .fetch_one(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(snippet)
        }
    }

    #[async_trait]
    impl BookmarkRepo for PgRepo {
        async fn add_bookmark(&self, user_id: Id, snippet_id: Id) -> RepoResult<(Bookmark, bool)> {
            let inserted = sqlx::query_as::<_, Bookmark>(
                "INSERT INTO bookmarks (user_id, snippet_id) VALUES ($1,$2) \
                 ON CONFLICT (user_id, snippet_id) DO NOTHING RETURNING id, snippet_id, user_id, date"
            )
            .bind(user_id)
            .bind(snippet_id)
            .fetch_optional(&self.pool).await.map_err(db_err)?;
            if let Some(b) = inserted {
                return Ok((b, true));
            }
            let existing = sqlx::query_as::<_, Bookmark>(
                "SELECT id, snippet_id, user_id, date FROM bookmarks WHERE user_id = $1 AND snippet_id = $2"
            )
            .bind(user_id)
            .bind(snippet_id)
            .fetch_one(&self.pool).await.map_err(db_err)?;
            Ok((existing, false))
        }
        async fn remove_bookmark(&self, user_id: Id, snippet_id: Id) -> RepoResult<u64> {
            let res = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND snippet_id = $2")
                .bind(user_id)
                .bind(snippet_id)
                .execute(&self.pool).await.map_err(db_err)?;
            Ok(res.rows_affected())
        }
        async fn bookmark_exists(&self, user_id: Id, snippet_id: Id) -> RepoResult<bool> {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bookmarks WHERE user_id = $1 AND snippet_id = $2)")
                .bind(user_id)
                .bind(snippet_id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn list_bookmarks(&self, user_id: Id) -> RepoResult<Vec<Bookmark>> {
            sqlx::query_as::<_, Bookmark>(
                "SELECT id, snippet_id, user_id, date FROM bookmarks WHERE user_id = $1 ORDER BY date DESC, id DESC"
            )
            .bind(user_id)
            .fetch_all(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl RatingRepo for PgRepo {
        async fn rate_snippet(&self, user_id: Id, snippet_id: Id, value: RatingValue) -> RepoResult<Rating> {
            sqlx::query_as::<_, Rating>(
                "INSERT INTO ratings (user_id, snippet_id, rating) VALUES ($1,$2,$3) \
                 ON CONFLICT (user_id, snippet_id) DO UPDATE SET rating = EXCLUDED.rating \
                 RETURNING id, snippet_id, user_id, rating, date"
            )
            .bind(user_id)
            .bind(snippet_id)
            .bind(value.as_i16())
            .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn get_rating(&self, user_id: Id, snippet_id: Id) -> RepoResult<Option<Rating>> {
            sqlx::query_as::<_, Rating>(
                "SELECT id, snippet_id, user_id, rating, date FROM ratings WHERE user_id = $1 AND snippet_id = $2"
            )
            .bind(user_id)
            .bind(snippet_id)
            .fetch_optional(&self.pool).await.map_err(db_err)
        }
        async fn snippet_score(&self, snippet_id: Id) -> RepoResult<i64> {
            self.get_snippet(snippet_id).await?;
            sqlx::query_scalar("SELECT COALESCE(SUM(rating), 0)::BIGINT FROM ratings WHERE snippet_id = $1")
                .bind(snippet_id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl FlagRepo for PgRepo {
        async fn create_flag(&self, new: NewFlag) -> RepoResult<Flag> {
            sqlx::query_as::<_, Flag>(
                "INSERT INTO flags (snippet_id, user_id, flag) VALUES ($1,$2,$3) RETURNING id, snippet_id, user_id, flag"
            )
            .bind(new.snippet_id)
            .bind(new.user_id)
            .bind(new.flag)
            .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn get_flag(&self, id: Id) -> RepoResult<Flag> {
            sqlx::query_as::<_, Flag>("SELECT id, snippet_id, user_id, flag FROM flags WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool).await.map_err(db_err)
        }
        async fn list_flags(&self) -> RepoResult<Vec<Flag>> {
            sqlx::query_as::<_, Flag>("SELECT id, snippet_id, user_id, flag FROM flags ORDER BY id")
                .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn remove_and_ban(&self, flag_ids: &[Id]) -> RepoResult<RemediationReport> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let snippet_ids: Vec<Id> = sqlx::query_scalar(
                "SELECT DISTINCT snippet_id FROM flags WHERE id = ANY($1) ORDER BY snippet_id"
            )
            .bind(flag_ids)
            .fetch_all(&mut *tx).await.map_err(db_err)?;
            let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flags WHERE id = ANY($1)")
                .bind(flag_ids)
                .fetch_one(&mut *tx).await.map_err(db_err)?;
            let wanted: BTreeSet<Id> = flag_ids.iter().copied().collect();
            if found as usize != wanted.len() {
                return Err(RepoError::NotFound); // tx rolls back on drop
            }
            let author_ids: Vec<Id> = sqlx::query_scalar(
                "SELECT DISTINCT author_id FROM snippets WHERE id = ANY($1) ORDER BY author_id"
            )
            .bind(&snippet_ids)
            .fetch_all(&mut *tx).await.map_err(db_err)?;
            sqlx::query("UPDATE users SET is_active = FALSE, password_hash = NULL WHERE id = ANY($1)")
                .bind(&author_ids)
                .execute(&mut *tx).await.map_err(db_err)?;
            sqlx::query("DELETE FROM snippets WHERE id = ANY($1)")
                .bind(&snippet_ids)
                .execute(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(RemediationReport { snippets_removed: snippet_ids, users_banned: author_ids })
        }
    }

    #[async_trait]
    impl RankingRepo for PgRepo {
        async fn top_authors(&self) -> RepoResult<Vec<AuthorScore>> {
            sqlx::query_as::<_, AuthorScore>(
                "SELECT u.id AS user_id, u.username, COUNT(s.id) AS score \
                 FROM users u JOIN snippets s ON s.author_id = u.id \
                 GROUP BY u.id, u.username ORDER BY score DESC, u.id ASC"
            )
            .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn top_languages(&self) -> RepoResult<Vec<LanguageScore>> {
            sqlx::query_as::<_, LanguageScore>(
                "SELECT l.id AS language_id, l.name, l.slug, COUNT(s.id) AS score \
                 FROM languages l JOIN snippets s ON s.language_id = l.id \
                 GROUP BY l.id, l.name, l.slug ORDER BY score DESC, l.id ASC"
            )
            .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn most_bookmarked(&self) -> RepoResult<Vec<SnippetScore>> {
            sqlx::query_as::<_, SnippetScore>(
                "SELECT s.id AS snippet_id, s.title, s.author_id, COUNT(b.id) AS score \
                 FROM snippets s JOIN bookmarks b ON b.snippet_id = s.id \
                 GROUP BY s.id, s.title, s.author_id ORDER BY score DESC, s.id ASC"
            )
            .fetch_all(&self.pool).await.map_err(db_err)
        }
        async fn top_rated(&self) -> RepoResult<Vec<SnippetScore>> {
            sqlx::query_as::<_, SnippetScore>(
                "SELECT s.id AS snippet_id, s.title, s.author_id, SUM(r.rating)::BIGINT AS score \
                 FROM snippets s JOIN ratings r ON r.snippet_id = s.id \
                 GROUP BY s.id, s.title, s.author_id ORDER BY score DESC, s.id ASC"
            )
            .fetch_all(&self.pool).await.map_err(db_err)
        }
    }
}
