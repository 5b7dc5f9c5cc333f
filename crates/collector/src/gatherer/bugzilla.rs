use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use normalizer::payloads::{BugzillaBug, BugzillaSearch};
use normalizer::{bugzilla_ticket, BugzillaComponents, Ticket};
use tracing::{info, instrument};
use url::Url;

use super::{to_ticket, with_trailing_slash};
use crate::client::TrackerClient;

const INCLUDE_FIELDS: &str = "id,summary,status,component,creation_time,last_change_time,assigned_to";

/// Fedora bugs flagged for newcomers: the `easyfix` keyword, or `trivial` on the whiteboard.
fn queries() -> [Vec<(&'static str, &'static str)>; 2] {
    [
        vec![
            ("f1", "keywords"),
            ("o1", "allwords"),
            ("v1", "easyfix"),
            ("query_format", "advanced"),
            ("bug_status", "NEW"),
            ("classification", "Fedora"),
        ],
        vec![
            ("status_whiteboard", "trivial"),
            ("status_whiteboard_type", "anywords"),
            ("query_format", "advanced"),
            ("bug_status", "NEW"),
            ("classification", "Fedora"),
        ],
    ]
}

pub struct BugzillaGatherer {
    client: Arc<dyn TrackerClient>,
    base: String,
}

impl BugzillaGatherer {
    pub fn new(client: Arc<dyn TrackerClient>, base: &str) -> Self {
        Self {
            client,
            base: with_trailing_slash(base),
        }
    }

    fn search_url(&self, query: &[(&str, &str)]) -> Result<String> {
        let mut url = Url::parse(&self.base)
            .and_then(|base| base.join("rest/bug"))
            .with_context(|| format!("invalid bugzilla url {}", self.base))?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().copied())
            .append_pair("include_fields", INCLUDE_FIELDS);
        Ok(url.into())
    }

    async fn search(&self, query: &[(&str, &str)]) -> Result<Vec<Ticket>> {
        let url = self.search_url(query)?;
        let page = self.client.get_json(&url).await?;
        let search: BugzillaSearch = serde_json::from_value(page.value)?;
        Ok(search
            .bugs
            .into_iter()
            .filter_map(|value| {
                to_ticket::<BugzillaBug, _>(value, "bugzilla", |bug| {
                    bugzilla_ticket(bug, &self.base)
                })
            })
            .collect())
    }

    /// Union of both queries without duplicates, ordered by the string `"<component>--<id>"`.
    #[instrument(skip(self))]
    pub async fn get_tickets(&self) -> Result<Vec<Ticket>> {
        let mut seen = HashSet::new();
        let mut tickets = Vec::new();
        for query in queries() {
            for ticket in self.search(&query).await? {
                if seen.insert(ticket.id) {
                    tickets.push(ticket);
                }
            }
        }
        tickets.sort_by_cached_key(Ticket::component_sort_key);
        info!(count = tickets.len(), "gathered bugzilla tickets");
        Ok(tickets)
    }

    pub async fn get_components(&self) -> Result<BugzillaComponents> {
        Ok(BugzillaComponents::from_sorted(self.get_tickets().await?))
    }
}
