use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use collector::gatherer::{BugzillaGatherer, GithubGatherer, GitlabGatherer, PagureGatherer};
use collector::{
    metrics, subscription, BrokerTrackerClient, Collector, JsonFileSink, OutputSink, Snapshot,
};
use common::config::{AppConfig, RepoSource};
use common::logging;
use tracing::{info, warn};
use tracker_broker::{ResponseCache, RetryPolicy, TrackerBroker, TrackerBrokerBuilder};

#[derive(Debug, Parser)]
#[command(
    name = "gather-easyfix",
    version,
    about = "Gather easyfix tickets from Fedora's trackers"
)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "EASYFIX_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_logging(&config.logging);
    config.validate()?;

    let cache = match ResponseCache::from_config(&config.cache) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(error = %err, "cache backend unavailable, falling back to memory");
            ResponseCache::memory(
                config.cache.capacity,
                config.cache.ttl_secs.map(Duration::from_secs),
            )
        }
    };
    info!(backend = cache.backend_label(), "response cache ready");

    let user_agent = config.github.user_agent.as_str();
    let client =
        |broker: Arc<dyn TrackerBroker>| Arc::new(BrokerTrackerClient::new(broker, user_agent));

    let github = Arc::new(GithubGatherer::new(
        Arc::new(BrokerTrackerClient::github(
            broker(&config, &cache, config.github.credentials())?,
            user_agent,
        )),
        &config.endpoints.github_api,
    ));
    let pagure = Arc::new(PagureGatherer::new(
        client(broker(&config, &cache, None)?),
        &config.endpoints.pagure,
    ));
    let gitlab = Arc::new(GitlabGatherer::new(
        client(broker(&config, &cache, None)?),
        &config.endpoints.gitlab,
    ));
    let bugzilla = Arc::new(BugzillaGatherer::new(
        client(broker(&config, &cache, None)?),
        &config.endpoints.bugzilla,
    ));

    let subscriptions = match config.repo_source {
        RepoSource::File => {
            let path = config.repo_list.as_ref().context("repo_list not set")?;
            subscription::load_file(path).await?
        }
        RepoSource::Wiki => {
            let wiki_url = config.wiki_url.as_deref().context("wiki_url not set")?;
            let wiki = client(broker(&config, &cache, None)?);
            subscription::load_wiki(wiki.as_ref(), wiki_url, &config.wiki_page).await?
        }
    };

    let collector = Collector::new(config.collector.clone())
        .with_gatherer(github.clone())
        .with_org_enumerator(github)
        .with_gatherer(pagure)
        .with_gatherer(gitlab)
        .with_bugzilla(bugzilla);

    let output = collector.run(subscriptions).await;
    let snapshot = Snapshot::assemble(output, &config.template);
    JsonFileSink::new(&config.output).emit(&snapshot).await?;

    let metrics_path = config.output.join("metrics.prom");
    if let Err(err) = metrics::write_textfile(&metrics_path) {
        warn!(error = ?err, "failed to write metrics");
    }

    info!(
        tickets = snapshot.ticket_num,
        bugzilla = snapshot.bz_num,
        groups = snapshot.project_groups.len(),
        "run complete"
    );
    Ok(())
}

/// One broker per tracker session, all sharing the response cache.
fn broker(
    config: &AppConfig,
    cache: &ResponseCache,
    credentials: Option<(String, String)>,
) -> Result<Arc<dyn TrackerBroker>> {
    let http = &config.http;
    let mut builder = TrackerBrokerBuilder::new(cache.clone())
        .user_agent(config.github.user_agent.clone())
        .timeout(Duration::from_secs(http.timeout_secs))
        .max_inflight(http.max_inflight)
        .retry(RetryPolicy {
            max_attempts: http.max_attempts,
            base: Duration::from_millis(http.backoff_base_ms),
            max: Duration::from_millis(http.backoff_max_ms),
            jitter_frac: http.jitter_frac,
        });
    if let Some((username, api_key)) = credentials {
        builder = builder.basic_auth(&username, &api_key)?;
    }
    builder.build()
}
