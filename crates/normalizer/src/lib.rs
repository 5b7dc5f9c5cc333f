pub mod models;
pub mod payloads;
pub mod transform;

pub use models::{
    BugzillaComponent, BugzillaComponents, Project, ProjectGroup, ProjectGroups, Site, Ticket,
};
pub use transform::{
    bugzilla_ticket, github_ticket, gitlab_ticket, pagure_ticket, ParseError,
};
