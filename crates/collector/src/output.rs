use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use normalizer::{BugzillaComponents, Project, ProjectGroups, Ticket};
use serde::Serialize;
use tracing::info;

use crate::service::RunOutput;

pub const SNAPSHOT_FILE: &str = "easyfix.json";
pub const DISPLAY_DATE_FORMAT: &str = "%a %b %d %Y %H:%M";

#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub is_old: bool,
    pub is_very_old: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    pub name: String,
    pub site: String,
    pub owner: String,
    pub tag: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub href: String,
    pub group: Option<String>,
    pub repo_name: String,
    pub tickets: Vec<TicketView>,
}

impl ProjectView {
    fn from_project(project: &Project, now: DateTime<Utc>) -> Self {
        Self {
            name: project.name.clone(),
            site: project.site.to_string(),
            owner: project.owner.clone(),
            tag: project.tag.clone(),
            description: project.description.clone(),
            url: project.url(),
            href: project.href(),
            group: project.group().map(str::to_string),
            repo_name: project.repo_name().to_string(),
            tickets: project
                .tickets
                .iter()
                .map(|ticket| TicketView {
                    is_old: ticket.is_old_at(now),
                    is_very_old: ticket.is_very_old_at(now),
                    ticket: ticket.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub key: Option<String>,
    pub projects: Vec<ProjectView>,
}

/// The gathered data in the shape the page renderer consumes.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub date: String,
    pub template: PathBuf,
    pub ticket_num: usize,
    pub bz_num: usize,
    pub project_groups: Vec<GroupView>,
    pub bz_components: BugzillaComponents,
}

impl Snapshot {
    pub fn assemble(output: RunOutput, template: &Path) -> Self {
        let generated_at = Utc::now();
        let date = generated_at
            .with_timezone(&Local)
            .format(DISPLAY_DATE_FORMAT)
            .to_string();
        Self::assemble_at(output, template, generated_at, date)
    }

    pub fn assemble_at(
        output: RunOutput,
        template: &Path,
        generated_at: DateTime<Utc>,
        date: String,
    ) -> Self {
        let RunOutput {
            project_groups,
            bz_components,
        } = output;
        Self {
            generated_at,
            date,
            template: template.to_path_buf(),
            ticket_num: project_groups.ticket_count(),
            bz_num: bz_components.ticket_count(),
            project_groups: group_views(&project_groups, generated_at),
            bz_components,
        }
    }
}

fn group_views(groups: &ProjectGroups, now: DateTime<Utc>) -> Vec<GroupView> {
    groups
        .iter()
        .map(|group| GroupView {
            key: group.key.clone(),
            projects: group
                .projects
                .iter()
                .map(|project| ProjectView::from_project(project, now))
                .collect(),
        })
        .collect()
}

#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Writes `easyfix.json` into the output directory for the external renderer.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }
}

#[async_trait]
impl OutputSink for JsonFileSink {
    async fn emit(&self, snapshot: &Snapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating output dir {}", self.dir.display()))?;

        let target = self.path();
        let tmp = target.with_extension("json.tmp");
        let encoded = serde_json::to_vec_pretty(snapshot).context("encoding snapshot")?;
        tokio::fs::write(&tmp, encoded)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .with_context(|| format!("moving snapshot into {}", target.display()))?;

        info!(
            path = %target.display(),
            tickets = snapshot.ticket_num,
            bugzilla = snapshot.bz_num,
            "wrote snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use normalizer::Site;

    fn ticket(id: u64, updated_at: DateTime<Utc>) -> Ticket {
        Ticket {
            id,
            url: format!("https://github.com/org/repo/issues/{id}"),
            title: "Typo".into(),
            status: "open".into(),
            created_at: updated_at,
            updated_at,
            body: None,
            labels: vec!["docs".into()],
            assignees: Vec::new(),
            kind: "issue".into(),
            component: String::new(),
        }
    }

    fn output(now: DateTime<Utc>) -> RunOutput {
        let project = Project::new("org/repo", Site::Github, "alice", "easyfix").with_tickets(vec![
            ticket(1, now - Duration::days(2)),
            ticket(2, now - Duration::days(500)),
        ]);
        RunOutput {
            project_groups: ProjectGroups::from_projects(vec![project]),
            bz_components: BugzillaComponents::default(),
        }
    }

    #[test]
    fn snapshot_carries_derived_fields() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let snapshot = Snapshot::assemble_at(
            output(now),
            Path::new("template.html"),
            now,
            now.format(DISPLAY_DATE_FORMAT).to_string(),
        );
        assert_eq!(snapshot.date, "Fri Mar 01 2024 12:30");
        assert_eq!(snapshot.ticket_num, 2);
        assert_eq!(snapshot.bz_num, 0);

        let project = &snapshot.project_groups[0].projects[0];
        assert_eq!(project.url.as_deref(), Some("https://github.com/org/repo/"));
        assert_eq!(project.href, "https://accounts.fedoraproject.org/user/alice/");
        assert_eq!(project.group.as_deref(), Some("org"));
        assert_eq!(project.repo_name, "repo");
        assert!(!project.tickets[0].is_old);
        assert!(project.tickets[1].is_old);
        assert!(!project.tickets[1].is_very_old);
    }

    #[tokio::test]
    async fn json_sink_writes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("build"));
        let snapshot = Snapshot::assemble(output(Utc::now()), Path::new("template.html"));
        sink.emit(&snapshot).await.unwrap();

        let raw = std::fs::read_to_string(sink.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["ticket_num"], 2);
        assert_eq!(value["project_groups"][0]["key"], "org");
        let first = &value["project_groups"][0]["projects"][0]["tickets"][0];
        assert_eq!(first["type"], "issue");
        assert_eq!(first["labels"][0], "docs");
        assert!(first.get("is_old").is_some());
    }
}
