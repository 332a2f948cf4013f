use crate::models::{
    AuthorScore, Bookmark, Flag, FlagKind, Language, LanguageScore, NewLanguage, RemediationReport, Snippet, SnippetScore,
    User,
};
use crate::routes::{accounts, admin, bookmarks, languages, popular, snippets};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        accounts::signup,
        accounts::login,
        accounts::author_detail,
        snippets::snippet_list,
        snippets::snippet_add,
        snippets::snippet_detail,
        snippets::snippet_edit,
        snippets::snippet_flag,
        snippets::snippet_rate,
        bookmarks::user_bookmarks,
        bookmarks::add_bookmark,
        bookmarks::delete_bookmark,
        languages::language_list,
        languages::language_detail,
        popular::top_authors,
        popular::top_languages,
        popular::most_bookmarked,
        admin::list_flags,
        admin::remove_and_ban,
        admin::create_language,
    ),
    components(schemas(
        User, Language, NewLanguage, Snippet, Flag, FlagKind, Bookmark,
        AuthorScore, LanguageScore, SnippetScore, RemediationReport,
        accounts::SignupRequest, accounts::LoginRequest, accounts::TokenResponse, accounts::AuthorPage,
        snippets::SnippetForm, snippets::SnippetDetail, snippets::FlagRequest,
        languages::LanguagePage, admin::RemoveAndBanRequest,
    )),
    tags(
        (name = "snippets", description = "Snippet operations"),
        (name = "accounts", description = "Signup and login"),
        (name = "admin", description = "Moderation"),
    )
)]
pub struct ApiDoc;
