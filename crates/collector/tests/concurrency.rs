use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use collector::{Collector, Gatherer};
use common::config::CollectorConfig;
use futures::stream::{self, BoxStream, StreamExt};
use normalizer::{Project, Site, Ticket};

/// Answers later projects faster than earlier ones and records peak parallelism.
struct SleepyGatherer {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SleepyGatherer {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    async fn tickets(&self, project: &Project) -> Result<Vec<Ticket>> {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);

        let index: u64 = project.repo_name().parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(60 - index * 5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let now = chrono::Utc::now();
        Ok(vec![Ticket {
            id: index,
            url: format!("https://pagure.io/{}/issue/{index}", project.name),
            title: "t".into(),
            status: "Open".into(),
            created_at: now,
            updated_at: now,
            body: None,
            labels: Vec::new(),
            assignees: Vec::new(),
            kind: String::new(),
            component: String::new(),
        }])
    }
}

impl Gatherer for SleepyGatherer {
    fn site(&self) -> Site {
        Site::Pagure
    }

    fn fetch_tickets<'a>(&'a self, project: &'a Project) -> BoxStream<'a, Result<Ticket>> {
        stream::once(self.tickets(project))
            .flat_map(|result| {
                stream::iter(match result {
                    Ok(tickets) => tickets.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(err) => vec![Err(err)],
                })
            })
            .boxed()
    }
}

#[tokio::test]
async fn fan_out_is_bounded_and_order_is_kept() {
    let gatherer = Arc::new(SleepyGatherer::new());
    let collector = Collector::new(CollectorConfig {
        max_concurrent_projects: 3,
    })
    .with_gatherer(gatherer.clone());

    let projects: Vec<Project> = (0..8)
        .map(|i| Project::new(format!("fam/{i}"), Site::Pagure, "owner", "easyfix"))
        .collect();
    let resolved = collector.resolve(projects).await;

    let names: Vec<_> = resolved.iter().map(|p| p.name.clone()).collect();
    let expected: Vec<_> = (0..8).map(|i| format!("fam/{i}")).collect();
    assert_eq!(names, expected);
    assert!(resolved.iter().all(|p| p.tickets.len() == 1));

    let peak = gatherer.max_active.load(Ordering::SeqCst);
    assert!(peak > 1, "projects should be gathered concurrently");
    assert!(peak <= 3, "at most three projects in flight, saw {peak}");
}
