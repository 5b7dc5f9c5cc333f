use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use normalizer::payloads::{PagureIssue, PagureIssueList};
use normalizer::{pagure_ticket, Project, Site, Ticket};

use super::{encoded_url, to_ticket, with_trailing_slash, Gatherer};
use crate::client::TrackerClient;

/// Pagure answers the filtered issue list in a single response.
pub struct PagureGatherer {
    client: Arc<dyn TrackerClient>,
    base: String,
}

impl PagureGatherer {
    pub fn new(client: Arc<dyn TrackerClient>, base: &str) -> Self {
        Self {
            client,
            base: with_trailing_slash(base),
        }
    }

    fn issues_url(&self, project: &Project) -> Result<String> {
        encoded_url(&format!(
            "{}api/0/{}/issues?status=Open&tags={}",
            self.base, project.name, project.tag
        ))
    }

    async fn tickets(&self, project: &Project) -> Result<Vec<Ticket>> {
        let page = self.client.get_json(&self.issues_url(project)?).await?;
        let list: PagureIssueList = serde_json::from_value(page.value)?;
        Ok(list
            .issues
            .into_iter()
            .filter_map(|value| {
                to_ticket::<PagureIssue, _>(value, &project.name, |issue| {
                    pagure_ticket(issue, project, &self.base)
                })
            })
            .collect())
    }
}

impl Gatherer for PagureGatherer {
    fn site(&self) -> Site {
        Site::Pagure
    }

    fn fetch_tickets<'a>(&'a self, project: &'a Project) -> BoxStream<'a, Result<Ticket>> {
        stream::once(self.tickets(project))
            .map_ok(|tickets| stream::iter(tickets.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}
