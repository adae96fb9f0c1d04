//! nginx server-block generation and site management.

mod sites;
mod template;

pub use sites::{DomainInfo, SiteManager, SiteSpec};
pub use template::{render, RedirectStatus, SiteParams, TemplateKind, TemplateSettings};
