//! Status page domain model, as served by the REST collaborator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Health of a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Working normally
    Operational,
    /// Slower or flakier than usual
    DegradedPerformance,
    /// Some functionality unavailable
    PartialOutage,
    /// Unavailable
    MajorOutage,
    /// Planned downtime
    Maintenance,
}

impl ServiceStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::DegradedPerformance => "degraded_performance",
            Self::PartialOutage => "partial_outage",
            Self::MajorOutage => "major_outage",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Cause unknown
    Investigating,
    /// Cause found
    Identified,
    /// Fix deployed, watching
    Monitoring,
    /// Over
    Resolved,
}

/// A monitored service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service ID
    pub id: String,
    /// Owning organization
    #[serde(default)]
    pub organization_id: String,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Current health
    pub status: ServiceStatus,
    /// Public URL, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Creation timestamp (RFC 3339)
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    #[serde(default)]
    pub updated_at: String,
}

/// An incident affecting one or more services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Incident ID
    pub id: String,
    /// Owning organization
    #[serde(default)]
    pub organization_id: String,
    /// Headline
    pub title: String,
    /// Details
    #[serde(default)]
    pub description: String,
    /// Lifecycle stage
    pub status: IncidentStatus,
    /// Incident category (wire field `type`)
    #[serde(rename = "type", default)]
    pub kind: String,
    /// IDs of affected services
    #[serde(default)]
    pub affected_services: Vec<String>,
    /// Creation timestamp (RFC 3339)
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    #[serde(default)]
    pub updated_at: String,
    /// Reporting user
    #[serde(default)]
    pub created_by: String,
}

impl Incident {
    /// True until resolved.
    pub fn is_active(&self) -> bool {
        self.status != IncidentStatus::Resolved
    }
}

/// Organization membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// User ID
    pub user_id: String,
    /// Role within the organization
    pub role: String,
    /// Contact email
    #[serde(default)]
    pub email: String,
}

/// An organization owning services and incidents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Public status page slug
    pub slug: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Creation timestamp (RFC 3339)
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    #[serde(default)]
    pub updated_at: String,
    /// Members
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Public status page payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicStatus {
    /// Organization the page belongs to
    pub organization: Organization,
    /// Its services
    #[serde(default)]
    pub services: Vec<Service>,
    /// Its incidents
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

/// Worst status across `services`.
///
/// Major outage beats partial outage beats degraded performance; anything
/// else, including maintenance and no services at all, is operational.
pub fn overall_status(services: &[Service]) -> ServiceStatus {
    [ServiceStatus::MajorOutage, ServiceStatus::PartialOutage, ServiceStatus::DegradedPerformance]
        .into_iter()
        .find(|status| services.iter().any(|s| s.status == *status))
        .unwrap_or(ServiceStatus::Operational)
}

/// Incidents that are not resolved yet.
pub fn active_incidents(incidents: &[Incident]) -> impl Iterator<Item = &Incident> {
    incidents.iter().filter(|i| i.is_active())
}
