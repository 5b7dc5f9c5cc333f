use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    #[serde(default)]
    pub assignees: Vec<GithubUser>,
    pub created_at: String,
    pub updated_at: String,
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepo {
    pub full_name: String,
    #[serde(default)]
    pub archived: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagureIssueList {
    #[serde(default)]
    pub issues: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagureIssue {
    pub id: u64,
    pub title: String,
    pub status: String,
    pub content: Option<String>,
    pub date_created: EpochSeconds,
    pub last_updated: EpochSeconds,
    #[serde(default)]
    pub tags: Vec<String>,
    pub assignee: Option<PagureUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagureUser {
    pub name: String,
}

/// Pagure reports epochs as strings; older instances used numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EpochSeconds {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitlabIssue {
    pub id: u64,
    pub title: String,
    pub web_url: String,
    pub state: String,
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<GitlabUser>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitlabUser {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BugzillaSearch {
    #[serde(default)]
    pub bugs: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BugzillaBug {
    pub id: u64,
    pub summary: String,
    pub status: String,
    pub component: ComponentField,
    pub creation_time: String,
    pub last_change_time: String,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ComponentField {
    One(String),
    Many(Vec<String>),
}

impl ComponentField {
    pub fn primary(&self) -> &str {
        match self {
            ComponentField::One(name) => name,
            ComponentField::Many(names) => names.first().map(String::as_str).unwrap_or(""),
        }
    }
}
