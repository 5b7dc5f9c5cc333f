use chrono::{DateTime, Utc};
use common::text::without_tag;
use thiserror::Error;

use crate::models::{Project, Ticket};
use crate::payloads::{BugzillaBug, EpochSeconds, GithubIssue, GitlabIssue, PagureIssue};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid timestamp in {field}: {value:?}")]
    Timestamp { field: &'static str, value: String },
    #[error("unexpected payload shape: {0}")]
    Shape(#[from] serde_json::Error),
}

fn iso8601(field: &'static str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::Timestamp {
            field,
            value: value.to_string(),
        })
}

fn epoch(field: &'static str, value: &EpochSeconds) -> Result<DateTime<Utc>, ParseError> {
    let invalid = |raw: String| ParseError::Timestamp { field, value: raw };
    let seconds = match value {
        EpochSeconds::Number(n) => *n,
        EpochSeconds::Text(s) => s.trim().parse::<i64>().map_err(|_| invalid(s.clone()))?,
    };
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| invalid(seconds.to_string()))
}

pub fn github_ticket(issue: GithubIssue, project: &Project) -> Result<Ticket, ParseError> {
    Ok(Ticket {
        id: issue.number,
        created_at: iso8601("created_at", &issue.created_at)?,
        updated_at: iso8601("updated_at", &issue.updated_at)?,
        url: issue.html_url,
        title: issue.title,
        status: issue.state,
        body: issue.body,
        labels: without_tag(issue.labels.into_iter().map(|l| l.name), &project.tag),
        assignees: issue.assignees.into_iter().map(|u| u.login).collect(),
        kind: if issue.pull_request.is_some() {
            "pull_request".to_string()
        } else {
            "issue".to_string()
        },
        component: String::new(),
    })
}

/// Pagure payloads carry no browse link; it is built from `base` and the project name.
pub fn pagure_ticket(
    issue: PagureIssue,
    project: &Project,
    base: &str,
) -> Result<Ticket, ParseError> {
    Ok(Ticket {
        id: issue.id,
        url: format!("{base}{}/issue/{}", project.name, issue.id),
        created_at: epoch("date_created", &issue.date_created)?,
        updated_at: epoch("last_updated", &issue.last_updated)?,
        title: issue.title,
        status: issue.status,
        body: issue.content,
        labels: without_tag(issue.tags, &project.tag),
        assignees: issue.assignee.map(|a| vec![a.name]).unwrap_or_default(),
        kind: String::new(),
        component: String::new(),
    })
}

pub fn gitlab_ticket(issue: GitlabIssue, project: &Project) -> Result<Ticket, ParseError> {
    Ok(Ticket {
        id: issue.id,
        created_at: iso8601("created_at", &issue.created_at)?,
        updated_at: iso8601("updated_at", &issue.updated_at)?,
        url: issue.web_url,
        title: issue.title,
        status: issue.state,
        body: issue.description,
        labels: without_tag(issue.labels, &project.tag),
        assignees: issue.assignees.into_iter().map(|u| u.username).collect(),
        kind: String::new(),
        component: String::new(),
    })
}

pub fn bugzilla_ticket(bug: BugzillaBug, base: &str) -> Result<Ticket, ParseError> {
    Ok(Ticket {
        id: bug.id,
        url: format!("{base}show_bug.cgi?id={}", bug.id),
        created_at: iso8601("creation_time", &bug.creation_time)?,
        updated_at: iso8601("last_change_time", &bug.last_change_time)?,
        component: bug.component.primary().to_string(),
        title: bug.summary,
        status: bug.status,
        body: None,
        labels: Vec::new(),
        assignees: bug.assigned_to.into_iter().collect(),
        kind: "bug".to_string(),
    })
}
