use std::path::{Path, PathBuf};

use anyhow::Result;
use normalizer::{Project, Site};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::client::TrackerClient;

static FILE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^ ]*) ([^ ]*)( [^ ]*)?$").expect("valid subscription regex"));

static WIKI_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \* (\S+) (\S+)( \S+)?").expect("valid wiki regex"));

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("line {line}: {reason}: {content:?}")]
    Malformed {
        line: usize,
        reason: &'static str,
        content: String,
    },
    #[error("cannot read subscription list {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `<site>:<name>`, split on the first colon.
fn project_from_parts(
    line: usize,
    target: &str,
    tag: &str,
    owner: Option<&str>,
) -> Result<Project, SubscriptionError> {
    let (site, name) = target
        .split_once(':')
        .ok_or_else(|| SubscriptionError::Malformed {
            line,
            reason: "expected <site>:<name>",
            content: target.to_string(),
        })?;
    let owner = owner.map(str::trim).unwrap_or_default();
    Ok(Project::new(name, Site::parse(site), owner, tag))
}

pub fn parse_file_line(line: usize, raw: &str) -> Result<Project, SubscriptionError> {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    let captures = FILE_LINE
        .captures(trimmed)
        .ok_or_else(|| SubscriptionError::Malformed {
            line,
            reason: "expected \"<site>:<name> <tag> <owner>\"",
            content: trimmed.to_string(),
        })?;
    project_from_parts(
        line,
        &captures[1],
        &captures[2],
        captures.get(3).map(|m| m.as_str()),
    )
}

/// Every well-formed line of a subscription list. Blank lines are ignored, other bad lines logged.
pub fn parse_file(contents: &str) -> Vec<Project> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .filter_map(|(idx, raw)| match parse_file_line(idx + 1, raw) {
            Ok(project) => Some(project),
            Err(err) => {
                warn!(error = %err, "skipping subscription line");
                None
            }
        })
        .collect()
}

/// Bullet entries (` * <site>:<name> <tag> [owner]`) anywhere on a wiki page.
pub fn parse_wiki(page: &str) -> Vec<Project> {
    page.lines()
        .enumerate()
        .filter_map(|(idx, row)| {
            let captures = WIKI_LINE.captures(row)?;
            match project_from_parts(
                idx + 1,
                &captures[1],
                &captures[2],
                captures.get(3).map(|m| m.as_str()),
            ) {
                Ok(project) => Some(project),
                Err(err) => {
                    warn!(error = %err, "skipping wiki entry");
                    None
                }
            }
        })
        .collect()
}

#[instrument]
pub async fn load_file(path: &Path) -> Result<Vec<Project>, SubscriptionError> {
    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SubscriptionError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
    let projects = parse_file(&contents);
    info!(count = projects.len(), "loaded subscription list");
    Ok(projects)
}

/// Raw wikitext of `page`, read through the same cached client as the trackers.
pub fn wiki_raw_url(wiki_url: &str, page: &str) -> String {
    format!(
        "{}/index.php?title={}&action=raw",
        wiki_url.trim_end_matches('/'),
        page
    )
}

#[instrument(skip(client))]
pub async fn load_wiki(client: &dyn TrackerClient, wiki_url: &str, page: &str) -> Result<Vec<Project>> {
    let text = client.get_text(&wiki_raw_url(wiki_url, page)).await?;
    let projects = parse_wiki(&text);
    info!(count = projects.len(), "loaded wiki subscriptions");
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_line_yields_site_name_tag_owner() {
        let project = parse_file_line(1, "github:org/repoA easyfix alice\n").unwrap();
        assert_eq!(project.site, Site::Github);
        assert_eq!(project.name, "org/repoA");
        assert_eq!(project.tag, "easyfix");
        assert_eq!(project.owner, "alice");
        assert!(project.tickets.is_empty());
    }

    #[test]
    fn name_keeps_later_colons() {
        let project = parse_file_line(1, "pagure.io:fork:odd easyfix bob").unwrap();
        assert_eq!(project.site, Site::Pagure);
        assert_eq!(project.name, "fork:odd");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let contents = "\
github:org/repoA easyfix alice
this line has far too many words in it
nocolon easyfix alice

gitlab.com:group/proj bitesize carol@example.com
";
        let projects = parse_file(contents);
        let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["org/repoA", "group/proj"]);
        assert!(matches!(
            parse_file_line(3, "nocolon easyfix alice"),
            Err(SubscriptionError::Malformed { line: 3, .. })
        ));
    }

    #[test]
    fn owner_is_optional() {
        let project = parse_file_line(1, "pagure.io:sssd easyfix").unwrap();
        assert_eq!(project.owner, "");
    }

    #[test]
    fn wiki_bullets_are_extracted() {
        let page = "\
== Subscribed projects ==
 * github:fedora-infra easyfix pingou
 * pagure.io:fedora-docs/quick-docs easyfix
Some prose mentioning * not a bullet
 * badentry easyfix owner
";
        let projects = parse_wiki(page);
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name, "fedora-infra");
        assert!(projects[0].is_organization());
        assert_eq!(projects[0].owner, "pingou");
        assert_eq!(projects[1].site, Site::Pagure);
        assert_eq!(projects[1].owner, "");
    }

    #[test]
    fn wiki_raw_url_is_built_from_base() {
        assert_eq!(
            wiki_raw_url("https://fedoraproject.org/w/", "Easyfix"),
            "https://fedoraproject.org/w/index.php?title=Easyfix&action=raw"
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("absent.txt")).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn file_is_loaded_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "github:org/repoA easyfix alice").unwrap();
        writeln!(file, "pagure.io:myproj easyfix bob@example.com").unwrap();
        let projects = load_file(file.path()).await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].href(), "mailto:bob@example.com");
    }
}
