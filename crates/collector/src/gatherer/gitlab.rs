use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use normalizer::payloads::GitlabIssue;
use normalizer::{gitlab_ticket, Project, Site, Ticket};
use url::form_urlencoded;

use super::{encoded_url, json_items, to_ticket, with_trailing_slash, Gatherer};
use crate::client::TrackerClient;

pub struct GitlabGatherer {
    client: Arc<dyn TrackerClient>,
    base: String,
}

impl GitlabGatherer {
    pub fn new(client: Arc<dyn TrackerClient>, base: &str) -> Self {
        Self {
            client,
            base: with_trailing_slash(base),
        }
    }

    /// Projects are addressed by their url-encoded `namespace/project` path.
    fn issues_url(&self, project: &Project) -> Result<String> {
        let encoded: String = form_urlencoded::byte_serialize(project.name.as_bytes()).collect();
        encoded_url(&format!(
            "{}api/v4/projects/{}/issues?state=opened&labels={}",
            self.base, encoded, project.tag
        ))
    }

    async fn tickets(&self, project: &Project) -> Result<Vec<Ticket>> {
        let url = self.issues_url(project)?;
        let items = json_items(self.client.get_json(&url).await?.value, &url)?;
        Ok(items
            .into_iter()
            .filter_map(|value| {
                to_ticket::<GitlabIssue, _>(value, &project.name, |issue| {
                    gitlab_ticket(issue, project)
                })
            })
            .collect())
    }
}

impl Gatherer for GitlabGatherer {
    fn site(&self) -> Site {
        Site::Gitlab
    }

    fn fetch_tickets<'a>(&'a self, project: &'a Project) -> BoxStream<'a, Result<Ticket>> {
        stream::once(self.tickets(project))
            .map_ok(|tickets| stream::iter(tickets.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}
