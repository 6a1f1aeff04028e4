//! Replit-specific knowledge: URLs, page layout, and the login flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::browser::{BrowserSession, FieldPath, LinkElement, LinkQuery, SessionError};
use crate::crawler::FolderLayout;
use crate::models::{FolderRef, ProjectRecord};

/// Platform origin.
pub const BASE_URL: &str = "https://replit.com";

const LOGIN_PATH: &str = "/login";
const EMAIL_FIELD: &str = r#"input[name="username"]"#;
const PASSWORD_FIELD: &str = r#"input[name="password"]"#;
const LOGIN_BUTTON: &str = r#"[data-cy="log-in-btn"]"#;

/// Profile page of `username`; the root of their project tree.
pub fn profile_url(username: &str) -> String {
    format!("{}/@{}", BASE_URL, username)
}

/// Root folder for a crawl of `username`'s projects.
pub fn root_folder(username: &str) -> FolderRef {
    FolderRef::root(profile_url(username))
}

/// Where project metadata sits below a project link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub last_modified_path: FieldPath,
    pub size_path: FieldPath,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            last_modified_path: FieldPath::new([("div", 1), ("div", 2), ("div", 1), ("span", 1)]),
            size_path: FieldPath::new([("div", 1), ("div", 2), ("div", 1), ("span", 2)]),
        }
    }
}

/// Layout of a user's project listing pages.
///
/// Project links look like `/@user/name` (never with `?path=`); folder links
/// look like `/@user?path=folder/...`.
#[derive(Debug, Clone)]
pub struct ReplitLayout {
    username: String,
    fields: LayoutConfig,
}

impl ReplitLayout {
    pub fn new(username: impl Into<String>, fields: LayoutConfig) -> Self {
        Self {
            username: username.into(),
            fields,
        }
    }
}

impl FolderLayout for ReplitLayout {
    fn project_query(&self) -> LinkQuery {
        LinkQuery::new(format!("/@{}/", self.username))
            .excluding("?path=")
            .with_fields(vec![
                self.fields.last_modified_path.clone(),
                self.fields.size_path.clone(),
            ])
    }

    fn folder_query(&self) -> LinkQuery {
        LinkQuery::new(format!("/@{}?path=folder", self.username))
    }

    fn parse_project(
        &self,
        link: &LinkElement,
        folder: &FolderRef,
    ) -> Result<ProjectRecord, String> {
        let field = |i: usize, what: &str| {
            link.fields
                .get(i)
                .cloned()
                .flatten()
                .ok_or_else(|| format!("missing {} field", what))
        };
        let last_modified = field(0, "last-modified")?;
        let size = field(1, "size")?;

        let project = ProjectRecord::new(link.href.clone(), folder.path.clone(), last_modified, size);
        if project.name.is_empty() {
            return Err("link has no project name".to_string());
        }
        Ok(project)
    }
}

/// Account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hands control to the user after the login form is submitted, so they
/// can solve a CAPTCHA. Resolves once they are done.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    async fn wait_for_user(&self);
}

/// Prompt that returns immediately.
pub struct NoPrompt;

#[async_trait]
impl LoginPrompt for NoPrompt {
    async fn wait_for_user(&self) {}
}

/// Fill in and submit the login form, then wait on `prompt`.
pub async fn login<S: BrowserSession + ?Sized>(
    session: &mut S,
    credentials: &Credentials,
    prompt: &dyn LoginPrompt,
) -> Result<(), SessionError> {
    info!("Logging in as {}", credentials.email);
    session
        .navigate(&format!("{}{}", BASE_URL, LOGIN_PATH))
        .await?;
    session.fill_field(EMAIL_FIELD, &credentials.email).await?;
    session
        .fill_field(PASSWORD_FIELD, &credentials.password)
        .await?;
    session.click(LOGIN_BUTTON).await?;
    prompt.wait_for_user().await;
    Ok(())
}
