//! Views attached to the shared live-update connection.
//!
//! Every view loads its data once on attach, then registers a reload callback
//! for all trigger kinds. The callback re-fetches and republishes the view
//! state; a failed fetch keeps the previous data and records the error.

use std::{fmt, sync::Arc};

use statuslive_client::{LiveError, LiveHandle, Subscription};
use statuslive_core::TriggerSet;
use tokio::sync::watch;

use crate::{
    api::{ApiClient, ApiError},
    model::{Incident, Organization, Service, ServiceStatus, active_incidents, overall_status},
};

/// What a view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Overview of services and incidents
    Dashboard,
    /// Incident list
    Incidents,
    /// Service list
    Services,
    /// Public status page of one organization
    PublicStatus {
        /// Organization slug
        slug: String,
    },
}

impl View {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Incidents => "incidents",
            Self::Services => "services",
            Self::PublicStatus { .. } => "public status",
        }
    }

    /// Fetch this view's data.
    ///
    /// # Errors
    ///
    /// Propagates the first failed request.
    pub async fn load(&self, api: &ApiClient) -> Result<ViewData, ApiError> {
        match self {
            Self::Dashboard | Self::Incidents => {
                let (services, incidents) = tokio::try_join!(api.services(), api.incidents())?;
                Ok(ViewData { organization: None, services, incidents })
            },
            Self::Services => {
                let services = api.services().await?;
                Ok(ViewData { organization: None, services, incidents: vec![] })
            },
            Self::PublicStatus { slug } => {
                let status = api.public_status(slug).await?;
                Ok(ViewData {
                    organization: Some(status.organization),
                    services: status.services,
                    incidents: status.incidents,
                })
            },
        }
    }

    /// Load once, then keep the view fresh over `live`.
    ///
    /// A failed initial load is recorded in the state rather than returned,
    /// so the view still recovers on the next live update or fallback
    /// refresh.
    ///
    /// # Errors
    ///
    /// - `LiveError::Closed` if the live-update runtime has shut down
    pub async fn attach(self, live: &LiveHandle, api: ApiClient) -> Result<AttachedView, LiveError> {
        let (state_tx, state) = watch::channel(ViewState::new(self.clone()));
        let state_tx = Arc::new(state_tx);

        refresh_state(&self, &api, &state_tx).await;

        let reload = {
            let state_tx = Arc::clone(&state_tx);
            move || {
                let view = self.clone();
                let api = api.clone();
                let state_tx = Arc::clone(&state_tx);
                async move { refresh_state(&view, &api, &state_tx).await }
            }
        };

        let subscription = live.subscribe(TriggerSet::all(), reload).await?;
        Ok(AttachedView { state, subscription })
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicStatus { slug } => write!(f, "public status ({slug})"),
            other => f.write_str(other.name()),
        }
    }
}

async fn refresh_state(view: &View, api: &ApiClient, state: &watch::Sender<ViewState>) {
    let result = view.load(api).await;

    // Detached while the fetch was in flight
    if state.is_closed() {
        tracing::debug!(view = %view, "dropping reload result for detached view");
        return;
    }

    match result {
        Ok(data) => state.send_modify(|s| {
            s.data = data;
            s.loaded = true;
            s.error = None;
            s.loads += 1;
        }),
        Err(e) => {
            tracing::warn!(view = %view, error = %e, "failed to load view data");
            state.send_modify(|s| s.error = Some(e));
        },
    }
}

/// Data behind a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewData {
    /// Organization, for the public page
    pub organization: Option<Organization>,
    /// Services
    pub services: Vec<Service>,
    /// Incidents
    pub incidents: Vec<Incident>,
}

/// Published state of an attached view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    /// Which view
    pub view: View,
    /// Most recently loaded data
    pub data: ViewData,
    /// True once any load succeeded
    pub loaded: bool,
    /// Error of the most recent load, cleared by the next success
    pub error: Option<ApiError>,
    /// Successful loads so far
    pub loads: u64,
}

impl ViewState {
    fn new(view: View) -> Self {
        Self { view, data: ViewData::default(), loaded: false, error: None, loads: 0 }
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        if let Some(ApiError::OrganizationNotFound(slug)) = &self.error {
            return format!("{}: no status page for {slug:?}", self.view);
        }
        if !self.loaded {
            return format!("{}: loading", self.view);
        }

        let services = &self.data.services;
        let operational =
            services.iter().filter(|s| s.status == ServiceStatus::Operational).count();
        let active = active_incidents(&self.data.incidents).count();
        let stale = if self.error.is_some() { " (stale)" } else { "" };

        match &self.view {
            View::Dashboard => format!(
                "dashboard: {}, {} services ({operational} operational), {active} active incidents{stale}",
                overall_status(services),
                services.len(),
            ),
            View::Incidents => format!(
                "incidents: {active} active, {} resolved{stale}",
                self.data.incidents.len() - active,
            ),
            View::Services => format!(
                "services: {} total, {operational} operational{stale}",
                services.len(),
            ),
            View::PublicStatus { .. } => format!(
                "{}: {}, {active} active incidents{stale}",
                self.data.organization.as_ref().map_or("unknown organization", |o| o.name.as_str()),
                overall_status(services),
            ),
        }
    }
}

/// A view kept fresh by live updates. Dropping it detaches the view.
pub struct AttachedView {
    state: watch::Receiver<ViewState>,
    subscription: Subscription,
}

impl AttachedView {
    /// Current view state.
    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every reload.
    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Wall-clock seconds of the most recent reload.
    pub fn last_updated(&self) -> Option<u64> {
        self.subscription.last_updated()
    }

    /// Manual refresh: reload now, and reconnect if not connected.
    pub fn refresh(&self) -> Result<(), LiveError> {
        self.subscription.refresh()
    }
}
