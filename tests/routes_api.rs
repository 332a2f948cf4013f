#![cfg(feature = "inmem-store")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{test, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use serial_test::serial;
use snipshare::auth::{create_jwt, hash_password, Role};
use snipshare::models::{Language, NewLanguage, NewUser, SnippetFilter, User};
use snipshare::notify::{AdminMessage, AdminNotifier};
use snipshare::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use snipshare::repo::inmem::InMemRepo;
use snipshare::repo::{BookmarkRepo, LanguageRepo, RatingRepo, SnippetRepo, UserRepo};
use snipshare::{config, AppState, SecurityHeaders, Settings};

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

fn token(user: &User, roles: Vec<Role>) -> String {
    create_jwt(user.id, &user.username, roles).unwrap()
}

fn bearer(tok: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {tok}"))
}

async fn add_user(repo: &InMemRepo, name: &str, is_staff: bool) -> User {
    repo.create_user(NewUser {
        username: name.into(),
        email: format!("{name}@example.com"),
        password_hash: hash_password("hunter2").unwrap(),
        is_staff,
    })
    .await
    .unwrap()
}

async fn python(repo: &InMemRepo) -> Language {
    repo.create_language(NewLanguage {
        name: "Python".into(),
        slug: None,
        language_code: "python".into(),
        file_extension: "py".into(),
        mime_type: "text/x-python".into(),
    })
    .await
    .unwrap()
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<AdminMessage>>,
}

#[async_trait]
impl AdminNotifier for RecordingNotifier {
    async fn notify(&self, msg: &AdminMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

fn state(repo: &InMemRepo) -> AppState {
    AppState::new(Arc::new(repo.clone()), Settings::default()).unwrap()
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(SecurityHeaders::from_env())
                .app_data(actix_web::web::Data::new($state))
                .configure(config),
        )
        .await
    };
}

fn snippet_body(language_id: i64) -> Value {
    json!({
        "title": "Fizzbuzz",
        "language_id": language_id,
        "description": "The *classic*.",
        "code": "for i in range(1, 16):\n    print(i)\n"
    })
}

#[actix_web::test]
#[serial]
async fn signup_validates_and_login_issues_usable_token() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let lang = python(&repo).await;
    let app = app!(state(&repo));

    let req = test::TestRequest::post()
        .uri("/api/v1/accounts/signup")
        .set_json(json!({"username": "alice", "email": "alice@example.com", "password1": "pw", "password2": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let user: Value = test::read_body_json(resp).await;
    assert_eq!(user["username"], "alice");
    assert!(user.get("password_hash").is_none());

    // taken username
    let req = test::TestRequest::post()
        .uri("/api/v1/accounts/signup")
        .set_json(json!({"username": "alice", "email": "other@example.com", "password1": "pw", "password2": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fields"]["username"][0]["message"], "This username has been taken.");

    // mismatched passwords
    let req = test::TestRequest::post()
        .uri("/api/v1/accounts/signup")
        .set_json(json!({"username": "bob", "email": "bob@example.com", "password1": "a", "password2": "b"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fields"]["password2"][0]["message"], "The two passwords are not same.");

    let req = test::TestRequest::post()
        .uri("/api/v1/accounts/login")
        .set_json(json!({"username": "alice", "password": "wrong"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/accounts/login")
        .set_json(json!({"username": "alice", "password": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    let tok = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&tok))
        .set_json(snippet_body(lang.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_web::test]
#[serial]
async fn snippet_form_errors_and_edit_is_author_only() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let other = add_user(&repo, "other", false).await;
    let lang = python(&repo).await;
    let app = app!(state(&repo));

    // unknown language is a field error
    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(snippet_body(9999))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["fields"].get("language_id").is_some());

    // empty title
    let mut bad = snippet_body(lang.id);
    bad["title"] = json!("");
    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(bad)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["fields"].get("title").is_some());

    // whitespace-only fields count as missing and nothing is stored
    let mut blank = snippet_body(lang.id);
    blank["title"] = json!("   ");
    blank["description"] = json!("  ");
    blank["code"] = json!(" \n ");
    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(blank)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    for field in ["title", "description", "code"] {
        assert!(body["fields"].get(field).is_some(), "missing error for {field}");
    }
    assert!(repo.list_snippets(SnippetFilter::default()).await.unwrap().is_empty());

    // anonymous add
    let req = test::TestRequest::post().uri("/api/v1/snippets").set_json(snippet_body(lang.id)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(snippet_body(lang.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().unwrap();
    assert!(created["description_html"].as_str().unwrap().contains("<em>classic</em>"));
    assert!(created["highlighted_code"].as_str().unwrap().contains("highlighttable"));

    let mut edit = snippet_body(lang.id);
    edit["title"] = json!("Fizzbuzz v2");
    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/snippets/{id}"))
        .insert_header(bearer(&token(&other, vec![Role::User])))
        .set_json(edit.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/snippets/{id}"))
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(edit)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["title"], "Fizzbuzz v2");

    let req = test::TestRequest::get().uri(&format!("/api/v1/snippets/{id}")).to_request();
    let detail: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(detail["author"], "author");
    assert_eq!(detail["language"]["slug"], "python");
    assert_eq!(detail["score"], 0);
}

#[actix_web::test]
#[serial]
async fn download_and_raw_headers() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let lang = python(&repo).await;
    let app = app!(state(&repo));

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(snippet_body(lang.id))
        .to_request();
    let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let id = created["id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri(&format!("/api/v1/snippets/{id}/download")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/x-python");
    assert_eq!(
        resp.headers().get("content-disposition").unwrap().to_str().unwrap(),
        format!("attachment; filename={id}.py")
    );
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"for i in range(1, 16):\n    print(i)\n");

    let req = test::TestRequest::get().uri(&format!("/api/v1/snippets/{id}/raw")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("content-type").unwrap().to_str().unwrap().starts_with("text/plain"));
    assert_eq!(resp.headers().get("content-disposition").unwrap(), "inline");

    let req = test::TestRequest::get().uri("/api/v1/snippets/4242/raw").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn rating_redirects_and_ignores_invalid_values() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let voter = add_user(&repo, "voter", false).await;
    let lang = python(&repo).await;
    let app = app!(state(&repo));

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(snippet_body(lang.id))
        .to_request();
    let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let id = created["id"].as_i64().unwrap();
    let tok = token(&voter, vec![Role::User]);

    for bad in ["2", "up", ""] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/snippets/{id}/rate?rating={bad}"))
            .insert_header(bearer(&tok))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 303);
        assert_eq!(resp.headers().get("location").unwrap().to_str().unwrap(), format!("/snippets/{id}/"));
    }
    assert!(repo.get_rating(voter.id, id).await.unwrap().is_none());

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/snippets/{id}/rate?rating=1"))
        .insert_header(bearer(&tok))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 303);
    assert_eq!(repo.get_rating(voter.id, id).await.unwrap().unwrap().rating, 1);

    // rating again replaces the value
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/snippets/{id}/rate?rating=-1"))
        .insert_header(bearer(&tok))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 303);
    assert_eq!(repo.get_rating(voter.id, id).await.unwrap().unwrap().rating, -1);
    assert_eq!(repo.snippet_score(id).await.unwrap(), -1);
}

#[actix_web::test]
#[serial]
async fn bookmark_add_is_idempotent() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let lang = python(&repo).await;
    let app = app!(state(&repo));
    let tok = token(&author, vec![Role::User]);

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&tok))
        .set_json(snippet_body(lang.id))
        .to_request();
    let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let id = created["id"].as_i64().unwrap();

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/bookmarks/{id}/add"))
            .insert_header(bearer(&tok))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 303);
    }
    assert_eq!(repo.list_bookmarks(author.id).await.unwrap().len(), 1);

    let req = test::TestRequest::get().uri("/api/v1/bookmarks").insert_header(bearer(&tok)).to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/bookmarks/{id}/delete"))
        .insert_header(bearer(&tok))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 303);
    assert!(!repo.bookmark_exists(author.id, id).await.unwrap());

    let req = test::TestRequest::post().uri("/api/v1/bookmarks/4242/add").insert_header(bearer(&tok)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn flag_records_and_notifies_admins() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let reporter = add_user(&repo, "reporter", false).await;
    let lang = python(&repo).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let app = app!(state(&repo).with_notifier(notifier.clone()));

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(snippet_body(lang.id))
        .to_request();
    let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let id = created["id"].as_i64().unwrap();
    let tok = token(&reporter, vec![Role::User]);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/snippets/{id}/flag"))
        .insert_header(bearer(&tok))
        .set_json(json!({"flag": "bogus"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["fields"].get("flag").is_some());

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/snippets/{id}/flag"))
        .insert_header(bearer(&tok))
        .set_json(json!({"flag": "spam"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 303);
    assert_eq!(resp.headers().get("location").unwrap().to_str().unwrap(), format!("/snippets/{id}/"));

    // delivery runs on a spawned task
    actix_web::rt::time::sleep(Duration::from_millis(50)).await;
    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Snippet flagged: \"Fizzbuzz\"");
    assert!(sent[0].body.starts_with("Fizzbuzz flagged as Spam by reporter"));
    assert!(sent[0].body.contains("http://localhost:8080/api/v1/admin/flags"));
}

#[actix_web::test]
#[serial]
async fn remove_and_ban_deletes_snippets_and_disables_authors() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let admin = add_user(&repo, "admin", true).await;
    let spammer = add_user(&repo, "spammer", false).await;
    let lang = python(&repo).await;
    let app = app!(state(&repo));
    let spam_tok = token(&spammer, vec![Role::User]);
    let admin_tok = token(&admin, vec![Role::User, Role::Admin]);

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&spam_tok))
        .set_json(snippet_body(lang.id))
        .to_request();
    let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let id = created["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/snippets/{id}/flag"))
        .insert_header(bearer(&admin_tok))
        .set_json(json!({"flag": "inappropriate"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 303);

    // non-admins cannot see the queue
    let req = test::TestRequest::get().uri("/api/v1/admin/flags").insert_header(bearer(&spam_tok)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::get().uri("/api/v1/admin/flags").insert_header(bearer(&admin_tok)).to_request();
    let flags: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let flag_id = flags[0]["id"].as_i64().unwrap();
    assert_eq!(flags[0]["flag"], "inappropriate");

    // one unknown id aborts the whole batch
    let req = test::TestRequest::post()
        .uri("/api/v1/admin/flags/remove-and-ban")
        .insert_header(bearer(&admin_tok))
        .set_json(json!({"flag_ids": [flag_id, 9999]}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    assert!(repo.get_user(spammer.id).await.unwrap().is_active);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/flags/remove-and-ban")
        .insert_header(bearer(&admin_tok))
        .set_json(json!({"flag_ids": []}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/flags/remove-and-ban")
        .insert_header(bearer(&admin_tok))
        .set_json(json!({"flag_ids": [flag_id]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["snippets_removed"], json!([id]));
    assert_eq!(report["users_banned"], json!([spammer.id]));

    let req = test::TestRequest::get().uri(&format!("/api/v1/snippets/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // the banned author's token is now useless and login is refused
    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&spam_tok))
        .set_json(snippet_body(lang.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    let req = test::TestRequest::post()
        .uri("/api/v1/accounts/login")
        .set_json(json!({"username": "spammer", "password": "hunter2"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn admin_creates_languages_with_generated_slug() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let admin = add_user(&repo, "admin", true).await;
    let user = add_user(&repo, "user", false).await;
    let app = app!(state(&repo));
    let body = json!({
        "name": "C++",
        "slug": null,
        "language_code": "cpp",
        "file_extension": "cpp",
        "mime_type": "text/x-c++src"
    });

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/languages")
        .insert_header(bearer(&token(&user, vec![Role::User])))
        .set_json(body.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/languages")
        .insert_header(bearer(&token(&admin, vec![Role::User, Role::Admin])))
        .set_json(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let lang: Value = test::read_body_json(resp).await;
    assert_eq!(lang["slug"], "cpp");

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/languages")
        .insert_header(bearer(&token(&admin, vec![Role::User, Role::Admin])))
        .set_json(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::get().uri("/api/v1/languages/cpp").to_request();
    let page: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(page["language"]["name"], "C++");
    assert_eq!(page["snippets"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
#[serial]
async fn language_without_sluggable_name_is_rejected() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let admin = add_user(&repo, "admin", true).await;
    let app = app!(state(&repo));
    let tok = token(&admin, vec![Role::User, Role::Admin]);

    for name in ["Русский", "日本語"] {
        let req = test::TestRequest::post()
            .uri("/api/v1/admin/languages")
            .insert_header(bearer(&tok))
            .set_json(json!({
                "name": name,
                "slug": null,
                "language_code": "text",
                "file_extension": "txt",
                "mime_type": "text/plain"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{name}");
        let body: Value = test::read_body_json(resp).await;
        assert!(body["fields"].get("slug").is_some());
    }
    assert!(repo.list_languages().await.unwrap().is_empty());

    // an explicit slug makes the same name acceptable
    let req = test::TestRequest::post()
        .uri("/api/v1/admin/languages")
        .insert_header(bearer(&tok))
        .set_json(json!({
            "name": "Русский",
            "slug": "russian",
            "language_code": "text",
            "file_extension": "txt",
            "mime_type": "text/plain"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_web::test]
#[serial]
async fn html_detail_page_reflects_viewer_relations() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let viewer = add_user(&repo, "viewer", false).await;
    let lang = python(&repo).await;
    let app = app!(state(&repo));

    let req = test::TestRequest::post()
        .uri("/api/v1/snippets")
        .insert_header(bearer(&token(&author, vec![Role::User])))
        .set_json(snippet_body(lang.id))
        .to_request();
    let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let id = created["id"].as_i64().unwrap();
    let page = |tok: Option<String>| {
        let mut req = test::TestRequest::get().uri(&format!("/snippets/{id}/"));
        if let Some(t) = tok {
            req = req.insert_header(bearer(&t));
        }
        req.to_request()
    };

    let resp = test::call_service(&app, page(None)).await;
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("content-type").unwrap().to_str().unwrap().starts_with("text/html"));
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("<h1>Fizzbuzz</h1>"));
    assert!(html.contains("<em>classic</em>"));
    assert!(!html.contains("Bookmark this snippet"));

    let tok = token(&viewer, vec![Role::User]);
    let html = String::from_utf8(test::read_body(test::call_service(&app, page(Some(tok.clone()))).await).await.to_vec()).unwrap();
    assert!(html.contains("Bookmark this snippet"));
    assert!(html.contains("rate?rating=-1"));

    repo.add_bookmark(viewer.id, id).await.unwrap();
    repo.rate_snippet(viewer.id, id, snipshare::models::RatingValue::Up).await.unwrap();
    let html = String::from_utf8(test::read_body(test::call_service(&app, page(Some(tok))).await).await.to_vec()).unwrap();
    assert!(html.contains("Remove bookmark"));
    assert!(html.contains("You rated this snippet 1."));
    assert!(html.contains("Score: 1"));
}

#[actix_web::test]
#[serial]
async fn snippet_creation_is_rate_limited() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let lang = python(&repo).await;
    let cfg = RateLimitConfig {
        flag_limit: 5,
        flag_window: Duration::from_secs(60),
        snippet_limit: 1,
        snippet_window: Duration::from_secs(60),
    };
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
    let app = app!(state(&repo).with_rate_limiter(limiter));
    let tok = token(&author, vec![Role::User]);

    let mut statuses = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/v1/snippets")
            .insert_header(bearer(&tok))
            .set_json(snippet_body(lang.id))
            .to_request();
        statuses.push(test::call_service(&app, req).await.status().as_u16());
    }
    assert_eq!(statuses, vec![201, 429]);
}

#[actix_web::test]
#[serial]
async fn listing_author_and_popular_routes() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let author = add_user(&repo, "author", false).await;
    let lang = python(&repo).await;
    let app = app!(state(&repo));
    let tok = token(&author, vec![Role::User]);

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/v1/snippets")
            .insert_header(bearer(&tok))
            .set_json(snippet_body(lang.id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get().uri("/api/v1/snippets").to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert!(list[0]["id"].as_i64().unwrap() > list[1]["id"].as_i64().unwrap());

    let req = test::TestRequest::get().uri("/api/v1/users/author").to_request();
    let page: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(page["author"]["username"], "author");
    assert_eq!(page["snippets"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::get().uri("/api/v1/popular/authors").to_request();
    let top: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(top[0]["username"], "author");
    assert_eq!(top[0]["score"], 2);

    let req = test::TestRequest::get().uri("/api/v1/popular/languages").to_request();
    let top: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(top[0]["slug"], "python");

    let req = test::TestRequest::get().uri("/api/v1/popular/bookmarks").to_request();
    let top: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert!(top.as_array().unwrap().is_empty());
}
