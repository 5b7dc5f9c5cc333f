use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use normalizer::{ParseError, Project, Site, Ticket};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::client::TrackerClient;

pub mod bugzilla;
pub mod github;
pub mod gitlab;
pub mod pagure;

pub use bugzilla::BugzillaGatherer;
pub use github::GithubGatherer;
pub use gitlab::GitlabGatherer;
pub use pagure::PagureGatherer;

/// Open tickets of one project on one tracker.
///
/// The stream is lazy: nothing is requested until it is polled, and a
/// consumer that stops early issues no further calls.
pub trait Gatherer: Send + Sync {
    fn site(&self) -> Site;

    fn fetch_tickets<'a>(&'a self, project: &'a Project) -> BoxStream<'a, Result<Ticket>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrgRepo {
    pub full_name: String,
    pub description: Option<String>,
}

/// Lists the live (non-archived) repositories of an organization.
pub trait OrgEnumerator: Send + Sync {
    fn enumerate_org_repos<'a>(&'a self, org: &'a str) -> BoxStream<'a, Result<OrgRepo>>;
}

pub type SharedGatherer = Arc<dyn Gatherer>;

/// Follows `Link: rel="next"` from `first` until the server stops advertising one.
pub(crate) fn paginate<'a>(
    client: &'a dyn TrackerClient,
    first: String,
) -> BoxStream<'a, Result<Value>> {
    stream::try_unfold(Some(first), move |cursor| async move {
        let Some(url) = cursor else {
            return Ok::<_, anyhow::Error>(None);
        };
        let page = client.get_json(&url).await?;
        let items = json_items(page.value, &url)?;
        Ok(Some((items, page.next)))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}

/// A list endpoint answers with an array; `null` stands for no items.
pub(crate) fn json_items(value: Value, url: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        _ => bail!("expected a json array from {url}"),
    }
}

/// Percent-encodes whatever `raw` carries outside the URI grammar (non-ASCII
/// tags and names mostly). `+` is left alone so trackers still read it as a space.
pub(crate) fn encoded_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).with_context(|| format!("invalid tracker url {raw}"))?;
    Ok(url.into())
}

/// A stream that fails once with `err`, for requests that cannot even be built.
pub(crate) fn failed<'a, T: Send + 'a>(err: anyhow::Error) -> BoxStream<'a, Result<T>> {
    stream::once(futures::future::ready(Err(err))).boxed()
}

/// Decodes and maps a single tracker item; shape or timestamp problems skip the item.
pub(crate) fn to_ticket<T, F>(value: Value, project: &str, map: F) -> Option<Ticket>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Result<Ticket, ParseError>,
{
    let mapped = serde_json::from_value::<T>(value)
        .map_err(ParseError::from)
        .and_then(map);
    match mapped {
        Ok(ticket) => Some(ticket),
        Err(err) => {
            warn!(project, error = %err, "skipping unparsable ticket");
            None
        }
    }
}

/// Base URLs are joined by concatenation and must end in `/`.
pub(crate) fn with_trailing_slash(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}
