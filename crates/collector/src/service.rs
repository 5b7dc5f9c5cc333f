use std::sync::Arc;

use anyhow::Result;
use common::config::CollectorConfig;
use futures::stream::{self, StreamExt, TryStreamExt};
use normalizer::{BugzillaComponents, Project, ProjectGroups, Site, Ticket};
use tracing::{info, instrument, warn};
use tracker_broker::RemoteFetchError;

use crate::gatherer::{BugzillaGatherer, OrgEnumerator, SharedGatherer};
use crate::metrics::{self, ActiveProjectGuard};

/// Everything one run hands to the output boundary.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub project_groups: ProjectGroups,
    pub bz_components: BugzillaComponents,
}

/// Turns subscriptions into grouped, ticket-bearing projects.
///
/// Holds no state between runs. Projects are gathered concurrently but
/// come back in subscription order, so grouping never depends on which
/// tracker answered first.
pub struct Collector {
    config: CollectorConfig,
    gatherers: Vec<SharedGatherer>,
    organizations: Option<Arc<dyn OrgEnumerator>>,
    bugzilla: Option<Arc<BugzillaGatherer>>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            gatherers: Vec::new(),
            organizations: None,
            bugzilla: None,
        }
    }

    pub fn with_gatherer(mut self, gatherer: SharedGatherer) -> Self {
        self.gatherers.push(gatherer);
        self
    }

    pub fn with_org_enumerator(mut self, organizations: Arc<dyn OrgEnumerator>) -> Self {
        self.organizations = Some(organizations);
        self
    }

    pub fn with_bugzilla(mut self, bugzilla: Arc<BugzillaGatherer>) -> Self {
        self.bugzilla = Some(bugzilla);
        self
    }

    fn gatherer_for(&self, site: &Site) -> Option<&SharedGatherer> {
        self.gatherers.iter().find(|g| &g.site() == site)
    }

    #[instrument(skip_all, fields(subscriptions = subscriptions.len()))]
    pub async fn run(&self, subscriptions: Vec<Project>) -> RunOutput {
        let _timer = metrics::RUN_DURATION.start_timer();
        let project_groups = self.project_groups(subscriptions).await;
        let bz_components = self.bugzilla_components().await;
        RunOutput {
            project_groups,
            bz_components,
        }
    }

    pub async fn project_groups(&self, subscriptions: Vec<Project>) -> ProjectGroups {
        let projects = self.expand(subscriptions).await;
        let resolved = self.resolve(projects).await;

        let mut groups = ProjectGroups::from_projects(resolved);
        let before = groups.len();
        groups.retain_non_empty();
        info!(
            groups = groups.len(),
            dropped = before - groups.len(),
            tickets = groups.ticket_count(),
            "grouped projects"
        );
        groups
    }

    /// Replaces every GitHub organization entry with one project per live repository.
    pub async fn expand(&self, subscriptions: Vec<Project>) -> Vec<Project> {
        let mut projects = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            if !subscription.is_organization() {
                projects.push(subscription);
                continue;
            }
            let Some(organizations) = &self.organizations else {
                warn!(org = %subscription.name, "no organization lookup configured, skipping");
                continue;
            };

            info!(org = %subscription.name, "expanding organization");
            let mut repos = organizations.enumerate_org_repos(&subscription.name);
            while let Some(next) = repos.next().await {
                match next {
                    Ok(repo) => {
                        metrics::ORG_REPOS_TOTAL
                            .with_label_values(&["expanded"])
                            .inc();
                        projects.push(
                            Project::new(
                                repo.full_name,
                                subscription.site.clone(),
                                subscription.owner.clone(),
                                subscription.tag.clone(),
                            )
                            .with_description(repo.description),
                        );
                    }
                    Err(err) => {
                        metrics::ORG_REPOS_TOTAL.with_label_values(&["error"]).inc();
                        warn!(
                            org = %subscription.name,
                            error = ?err,
                            "failed to enumerate organization"
                        );
                        break;
                    }
                }
            }
        }
        projects
    }

    /// Gathers tickets for each project, at most `max_concurrent_projects` at a time.
    pub async fn resolve(&self, projects: Vec<Project>) -> Vec<Project> {
        stream::iter(projects)
            .map(|project| self.resolve_project(project))
            .buffered(self.config.max_concurrent_projects.max(1))
            .collect()
            .await
    }

    #[instrument(skip_all, fields(project = %project.name, site = %project.site))]
    async fn resolve_project(&self, project: Project) -> Project {
        let site = project.site.as_str().to_string();
        let Some(gatherer) = self.gatherer_for(&project.site) else {
            warn!("unsupported site, no tickets gathered");
            metrics::PROJECTS_RESOLVED_TOTAL
                .with_label_values(&[&site, "unsupported"])
                .inc();
            return project;
        };

        let _active = ActiveProjectGuard::new();
        let timer = metrics::PROJECT_DURATION
            .with_label_values(&[&site])
            .start_timer();
        info!("gathering tickets");
        let result: Result<Vec<Ticket>> = gatherer.fetch_tickets(&project).try_collect().await;
        timer.observe_duration();

        match result {
            Ok(tickets) => {
                metrics::PROJECTS_RESOLVED_TOTAL
                    .with_label_values(&[&site, "success"])
                    .inc();
                metrics::TICKETS_GATHERED_TOTAL
                    .with_label_values(&[&site])
                    .inc_by(tickets.len() as u64);
                project.with_tickets(tickets)
            }
            Err(err) => {
                metrics::PROJECTS_RESOLVED_TOTAL
                    .with_label_values(&[&site, "error"])
                    .inc();
                let status = err
                    .downcast_ref::<RemoteFetchError>()
                    .and_then(RemoteFetchError::status_code)
                    .map(|s| s.as_u16());
                warn!(status, error = %err, "failed to gather project, continuing without it");
                project
            }
        }
    }

    /// A Bugzilla failure only empties the Bugzilla section.
    pub async fn bugzilla_components(&self) -> BugzillaComponents {
        let Some(bugzilla) = &self.bugzilla else {
            return BugzillaComponents::default();
        };
        match bugzilla.get_components().await {
            Ok(components) => {
                metrics::BUGZILLA_TICKETS.set(components.ticket_count() as i64);
                components
            }
            Err(err) => {
                warn!(error = ?err, "failed to gather bugzilla tickets");
                BugzillaComponents::default()
            }
        }
    }
}
