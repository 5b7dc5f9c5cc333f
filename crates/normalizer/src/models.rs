use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

pub const OLD_AFTER_DAYS: i64 = 365;
pub const VERY_OLD_AFTER_DAYS: i64 = 365 * 3;

/// Tracker hosting a subscribed project, as written before the `:` in a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Site {
    Github,
    Pagure,
    Gitlab,
    Other(String),
}

impl Site {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "github" => Site::Github,
            "pagure.io" => Site::Pagure,
            "gitlab.com" => Site::Gitlab,
            other => Site::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Site::Github => "github",
            Site::Pagure => "pagure.io",
            Site::Gitlab => "gitlab.com",
            Site::Other(name) => name,
        }
    }

    fn browse_base(&self) -> Option<&'static str> {
        match self {
            Site::Github => Some("https://github.com/"),
            Site::Pagure => Some("https://pagure.io/"),
            Site::Gitlab => Some("https://gitlab.com/"),
            Site::Other(_) => None,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Site {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub id: u64,
    pub url: String,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub component: String,
}

impl Ticket {
    pub fn is_old_at(&self, now: DateTime<Utc>) -> bool {
        self.updated_at < now - Duration::days(OLD_AFTER_DAYS)
    }

    pub fn is_very_old_at(&self, now: DateTime<Utc>) -> bool {
        self.updated_at < now - Duration::days(VERY_OLD_AFTER_DAYS)
    }

    pub fn is_old(&self) -> bool {
        self.is_old_at(Utc::now())
    }

    pub fn is_very_old(&self) -> bool {
        self.is_very_old_at(Utc::now())
    }

    /// Key the Bugzilla listing is ordered by. Compared as a plain string.
    pub fn component_sort_key(&self) -> String {
        format!("{}--{}", self.component, self.id)
    }
}

/// One subscription entry, or one repository discovered inside a subscribed organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub name: String,
    pub site: Site,
    pub owner: String,
    pub tag: String,
    pub tickets: Vec<Ticket>,
    pub description: Option<String>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        site: Site,
        owner: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            site,
            owner: owner.into(),
            tag: tag.into(),
            tickets: Vec::new(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_tickets(mut self, tickets: Vec<Ticket>) -> Self {
        self.tickets = tickets;
        self
    }

    pub fn url(&self) -> Option<String> {
        self.site
            .browse_base()
            .map(|base| format!("{base}{}/", self.name))
    }

    /// Contact link for the owner: mail when it looks like an address, account page otherwise.
    pub fn href(&self) -> String {
        if self.owner.contains('@') {
            format!("mailto:{}", self.owner)
        } else {
            format!("https://accounts.fedoraproject.org/user/{}/", self.owner)
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.name.split_once('/').map(|(group, _)| group)
    }

    pub fn repo_name(&self) -> &str {
        self.name
            .split_once('/')
            .map(|(_, repo)| repo)
            .unwrap_or(&self.name)
    }

    /// A GitHub entry without a `/` names a whole organization.
    pub fn is_organization(&self) -> bool {
        self.site == Site::Github && !self.name.contains('/')
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectGroup {
    pub key: Option<String>,
    pub projects: Vec<Project>,
}

impl ProjectGroup {
    pub fn ticket_count(&self) -> usize {
        self.projects.iter().map(Project::ticket_count).sum()
    }
}

/// Projects partitioned by [`Project::group`], groups and members kept in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProjectGroups(Vec<ProjectGroup>);

impl ProjectGroups {
    pub fn from_projects<I>(projects: I) -> Self
    where
        I: IntoIterator<Item = Project>,
    {
        let mut groups: Vec<ProjectGroup> = Vec::new();
        for project in projects {
            let key = project.group().map(str::to_string);
            match groups.iter_mut().find(|group| group.key == key) {
                Some(group) => group.projects.push(project),
                None => groups.push(ProjectGroup {
                    key,
                    projects: vec![project],
                }),
            }
        }
        Self(groups)
    }

    /// Drops groups without a single ticket. Surviving groups keep every member.
    pub fn retain_non_empty(&mut self) {
        self.0.retain(|group| group.ticket_count() > 0);
    }

    pub fn get(&self, key: Option<&str>) -> Option<&ProjectGroup> {
        self.0.iter().find(|group| group.key.as_deref() == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectGroup> {
        self.0.iter()
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.0.iter().flat_map(|group| group.projects.iter())
    }

    pub fn ticket_count(&self) -> usize {
        self.0.iter().map(ProjectGroup::ticket_count).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BugzillaComponent {
    pub name: String,
    pub tickets: Vec<Ticket>,
}

/// Bugzilla tickets partitioned by component, in the order of the sorted listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BugzillaComponents(Vec<BugzillaComponent>);

impl BugzillaComponents {
    pub fn from_sorted(tickets: Vec<Ticket>) -> Self {
        let mut components: Vec<BugzillaComponent> = Vec::new();
        for ticket in tickets {
            match components
                .iter_mut()
                .find(|component| component.name == ticket.component)
            {
                Some(component) => component.tickets.push(ticket),
                None => components.push(BugzillaComponent {
                    name: ticket.component.clone(),
                    tickets: vec![ticket],
                }),
            }
        }
        Self(components)
    }

    pub fn get(&self, name: &str) -> Option<&[Ticket]> {
        self.0
            .iter()
            .find(|component| component.name == name)
            .map(|component| component.tickets.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BugzillaComponent> {
        self.0.iter()
    }

    pub fn ticket_count(&self) -> usize {
        self.0.iter().map(|component| component.tickets.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ticket(id: u64, component: &str, updated_at: DateTime<Utc>) -> Ticket {
        Ticket {
            id,
            url: format!("https://example.org/{id}"),
            title: "t".into(),
            status: "open".into(),
            created_at: updated_at,
            updated_at,
            body: None,
            labels: Vec::new(),
            assignees: Vec::new(),
            kind: String::new(),
            component: component.into(),
        }
    }

    fn project(name: &str, tickets: usize) -> Project {
        let now = Utc::now();
        Project::new(name, Site::Github, "alice", "easyfix")
            .with_tickets((0..tickets as u64).map(|id| ticket(id, "", now)).collect())
    }

    #[test]
    fn group_and_repo_name_split_on_first_slash() {
        for name in ["org/repo", "group/sub/repo", "a/", "/b"] {
            let p = Project::new(name, Site::Gitlab, "o", "t");
            let group = p.group().expect("has slash");
            assert_eq!(format!("{}/{}", group, p.repo_name()), name);
        }
        let p = Project::new("group/sub/repo", Site::Gitlab, "o", "t");
        assert_eq!(p.group(), Some("group"));
        assert_eq!(p.repo_name(), "sub/repo");
    }

    #[test]
    fn flat_name_has_no_group() {
        let p = Project::new("sssd", Site::Pagure, "o", "t");
        assert_eq!(p.group(), None);
        assert_eq!(p.repo_name(), "sssd");
    }

    #[test]
    fn site_specific_urls() {
        let gh = Project::new("org/repo", Site::Github, "o", "t");
        assert_eq!(gh.url().as_deref(), Some("https://github.com/org/repo/"));
        let pg = Project::new("sssd", Site::Pagure, "o", "t");
        assert_eq!(pg.url().as_deref(), Some("https://pagure.io/sssd/"));
        let gl = Project::new("a/b", Site::Gitlab, "o", "t");
        assert_eq!(gl.url().as_deref(), Some("https://gitlab.com/a/b/"));
        let other = Project::new("x", Site::parse("sourcehut"), "o", "t");
        assert_eq!(other.url(), None);
    }

    #[test]
    fn href_depends_on_owner_shape() {
        let mail = Project::new("p", Site::Pagure, "bob@example.com", "t");
        assert_eq!(mail.href(), "mailto:bob@example.com");
        let user = Project::new("p", Site::Pagure, "bob", "t");
        assert_eq!(user.href(), "https://accounts.fedoraproject.org/user/bob/");
    }

    #[test]
    fn site_names_round_trip() {
        for raw in ["github", "pagure.io", "gitlab.com", "launchpad"] {
            assert_eq!(Site::parse(raw).as_str(), raw);
        }
        assert_eq!(Site::parse("launchpad"), Site::Other("launchpad".into()));
    }

    #[test]
    fn age_predicates_use_updated_at() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let fresh = ticket(1, "", now - Duration::days(10));
        let old = ticket(2, "", now - Duration::days(400));
        let ancient = ticket(3, "", now - Duration::days(1200));
        assert!(!fresh.is_old_at(now));
        assert!(old.is_old_at(now) && !old.is_very_old_at(now));
        assert!(ancient.is_very_old_at(now));
    }

    #[test]
    fn groups_preserve_discovery_order() {
        let groups = ProjectGroups::from_projects(vec![
            project("b/one", 0),
            project("a/two", 1),
            project("b/three", 0),
            project("flat", 2),
        ]);
        let keys: Vec<_> = groups.iter().map(|g| g.key.as_deref()).collect();
        assert_eq!(keys, vec![Some("b"), Some("a"), None]);
        let b: Vec<_> = groups
            .get(Some("b"))
            .unwrap()
            .projects
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(b, vec!["b/one", "b/three"]);
    }

    #[test]
    fn empty_groups_are_dropped_but_members_kept() {
        let mut groups = ProjectGroups::from_projects(vec![
            project("quiet/one", 0),
            project("busy/one", 0),
            project("busy/two", 3),
        ]);
        groups.retain_non_empty();
        assert!(groups.get(Some("quiet")).is_none());
        let busy = groups.get(Some("busy")).unwrap();
        assert_eq!(busy.projects.len(), 2);
        assert_eq!(groups.ticket_count(), 3);
    }

    #[test]
    fn components_partition_in_listing_order() {
        let now = Utc::now();
        let components = BugzillaComponents::from_sorted(vec![
            ticket(5, "anaconda", now),
            ticket(9, "anaconda", now),
            ticket(2, "dnf", now),
        ]);
        let names: Vec<_> = components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["anaconda", "dnf"]);
        assert_eq!(components.get("anaconda").unwrap().len(), 2);
        assert_eq!(components.ticket_count(), 3);
    }
}
