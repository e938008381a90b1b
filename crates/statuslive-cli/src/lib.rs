//! Status page views over the shared live-update connection.
//!
//! The REST collaborator and the four views that attach to a
//! [`LiveHandle`](statuslive_client::LiveHandle): dashboard, incidents list,
//! services list, and the public status page.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod api;
pub mod model;
pub mod views;

pub use api::{ApiClient, ApiError};
pub use model::{
    Incident, IncidentStatus, Member, Organization, PublicStatus, Service, ServiceStatus,
    active_incidents, overall_status,
};
pub use views::{AttachedView, View, ViewData, ViewState};
