use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

pub static PROJECTS_RESOLVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "easyfix_projects_resolved_total",
        "Projects resolved grouped by site and outcome",
        &["site", "outcome"]
    )
    .expect("projects resolved")
});

pub static TICKETS_GATHERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "easyfix_tickets_gathered_total",
        "Tickets gathered per site",
        &["site"]
    )
    .expect("tickets gathered")
});

pub static ORG_REPOS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "easyfix_org_repositories_total",
        "Repositories discovered while expanding organizations, by outcome",
        &["outcome"]
    )
    .expect("org repositories")
});

pub static ACTIVE_PROJECTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "easyfix_active_projects",
        "Projects currently being gathered"
    )
    .expect("active projects gauge")
});

pub static PROJECT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "easyfix_project_duration_seconds",
        "Time spent gathering one project grouped by site",
        &["site"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("project duration histogram")
});

pub static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "easyfix_run_duration_seconds",
        "Duration of a full gathering run",
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    )
    .expect("run duration histogram")
});

pub static BUGZILLA_TICKETS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "easyfix_bugzilla_tickets",
        "Bugzilla tickets in the most recent run"
    )
    .expect("bugzilla tickets gauge")
});

pub struct ActiveProjectGuard;

impl Default for ActiveProjectGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveProjectGuard {
    pub fn new() -> Self {
        ACTIVE_PROJECTS.inc();
        Self
    }
}

impl Drop for ActiveProjectGuard {
    fn drop(&mut self) {
        ACTIVE_PROJECTS.dec();
    }
}

/// Dumps the default registry in text exposition format.
pub fn write_textfile(path: &Path) -> Result<()> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .context("encoding metrics")?;
    std::fs::write(path, buffer).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
