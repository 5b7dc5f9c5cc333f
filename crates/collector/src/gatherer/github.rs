use std::sync::Arc;

use anyhow::Result;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use normalizer::payloads::{GithubIssue, GithubRepo};
use normalizer::{github_ticket, Project, Site, Ticket};
use tracing::{debug, warn};

use super::{
    encoded_url, failed, paginate, to_ticket, with_trailing_slash, Gatherer, OrgEnumerator,
    OrgRepo,
};
use crate::client::TrackerClient;

pub struct GithubGatherer {
    client: Arc<dyn TrackerClient>,
    api: String,
}

impl GithubGatherer {
    pub fn new(client: Arc<dyn TrackerClient>, api: &str) -> Self {
        Self {
            client,
            api: with_trailing_slash(api),
        }
    }

    // GitHub reads `+` in a query as a space, so the tag keeps it.
    fn issues_url(&self, project: &Project) -> Result<String> {
        encoded_url(&format!(
            "{}repos/{}/issues?labels={}&state=open",
            self.api, project.name, project.tag
        ))
    }

    fn org_repos_url(&self, org: &str) -> Result<String> {
        encoded_url(&format!("{}orgs/{}/repos?sort=full_name", self.api, org))
    }
}

impl Gatherer for GithubGatherer {
    fn site(&self) -> Site {
        Site::Github
    }

    fn fetch_tickets<'a>(&'a self, project: &'a Project) -> BoxStream<'a, Result<Ticket>> {
        let url = match self.issues_url(project) {
            Ok(url) => url,
            Err(err) => return failed(err),
        };
        paginate(self.client.as_ref(), url)
            .try_filter_map(move |value| {
                let ticket = to_ticket::<GithubIssue, _>(value, &project.name, |issue| {
                    github_ticket(issue, project)
                });
                futures::future::ready(Ok(ticket))
            })
            .boxed()
    }
}

impl OrgEnumerator for GithubGatherer {
    fn enumerate_org_repos<'a>(&'a self, org: &'a str) -> BoxStream<'a, Result<OrgRepo>> {
        let url = match self.org_repos_url(org) {
            Ok(url) => url,
            Err(err) => return failed(err),
        };
        paginate(self.client.as_ref(), url)
            .try_filter_map(move |value| {
                let repo = match serde_json::from_value::<GithubRepo>(value) {
                    Ok(repo) if repo.archived => {
                        debug!(org, repo = %repo.full_name, "skipping archived repository");
                        None
                    }
                    Ok(repo) => Some(OrgRepo {
                        full_name: repo.full_name,
                        description: repo.description,
                    }),
                    Err(err) => {
                        warn!(org, error = %err, "skipping unparsable repository");
                        None
                    }
                };
                futures::future::ready(Ok(repo))
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Page;
    use anyhow::bail;
    use async_trait::async_trait;

    struct NoNetwork;

    #[async_trait]
    impl TrackerClient for NoNetwork {
        async fn get_json(&self, _url: &str) -> Result<Page> {
            bail!("offline")
        }

        async fn get_text(&self, _url: &str) -> Result<String> {
            bail!("offline")
        }
    }

    fn gatherer() -> GithubGatherer {
        GithubGatherer::new(Arc::new(NoNetwork), "https://api.github.com")
    }

    #[test]
    fn non_ascii_tag_is_percent_encoded() {
        let project = Project::new("org/repo", Site::Github, "o", "débutant");
        assert_eq!(
            gatherer().issues_url(&project).unwrap(),
            "https://api.github.com/repos/org/repo/issues?labels=d%C3%A9butant&state=open"
        );
    }

    #[test]
    fn plus_in_tag_is_kept() {
        let project = Project::new("org/repo", Site::Github, "o", "good+first+issue");
        assert_eq!(
            gatherer().issues_url(&project).unwrap(),
            "https://api.github.com/repos/org/repo/issues?labels=good+first+issue&state=open"
        );
    }
}
