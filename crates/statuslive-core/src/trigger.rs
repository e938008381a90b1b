//! Update-trigger policy.
//!
//! Decides, per inbound message, whether views must reload their data, and
//! when. A trigger message schedules one debounced reload per interested
//! subscriber: the debounce gives the write that caused the message time to
//! commit before the view re-reads. Bursts are not coalesced, every trigger
//! message yields its own reload.
//!
//! Independently of live traffic, each subscriber gets a fallback reload once
//! [`PolicyConfig::fallback_interval`] has passed since its last reload, so a
//! missed push never leaves a view stale for long.

use std::{collections::BTreeMap, fmt, time::Duration};

use crate::{env::Timepoint, message::InboundMessage};

/// Delay between a trigger message and the reload it causes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Maximum time a subscriber goes without a reload.
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Message kinds that make dependent views reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriggerKind {
    /// A service changed status
    StatusUpdate,
    /// A service was added
    ServiceCreated,
    /// A service was removed
    ServiceDeleted,
    /// An incident was opened
    IncidentCreated,
    /// An incident changed
    IncidentUpdated,
    /// Older spelling of [`TriggerKind::IncidentUpdated`], still sent by some
    /// servers
    IncidentUpdate,
}

impl TriggerKind {
    /// Every trigger kind.
    pub const ALL: [Self; 6] = [
        Self::StatusUpdate,
        Self::ServiceCreated,
        Self::ServiceDeleted,
        Self::IncidentCreated,
        Self::IncidentUpdated,
        Self::IncidentUpdate,
    ];

    /// Match a wire `type` value, case-sensitively.
    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusUpdate => "status_update",
            Self::ServiceCreated => "service_created",
            Self::ServiceDeleted => "service_deleted",
            Self::IncidentCreated => "incident_created",
            Self::IncidentUpdated => "incident_updated",
            Self::IncidentUpdate => "incident_update",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of trigger kinds a subscriber reacts to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TriggerSet(u8);

impl TriggerSet {
    /// No kinds; the subscriber only gets fallback and manual reloads.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every trigger kind. What all current views subscribe to.
    pub fn all() -> Self {
        Self::ALL_KINDS
    }

    const ALL_KINDS: Self = Self(0b0011_1111);

    /// This set plus `kind`.
    #[must_use]
    pub fn with(self, kind: TriggerKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// True if `kind` is in the set.
    pub fn contains(self, kind: TriggerKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// True if no kind is in the set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Kinds in the set, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = TriggerKind> {
        TriggerKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<TriggerKind> for TriggerSet {
    fn from_iter<T: IntoIterator<Item = TriggerKind>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Debug for TriggerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Policy timing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Delay between a trigger message and its reload
    pub debounce: Duration,
    /// Maximum time between reloads of one subscriber
    pub fallback_interval: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { debounce: DEFAULT_DEBOUNCE, fallback_interval: DEFAULT_FALLBACK_INTERVAL }
    }
}

/// Identifies a subscriber registered with [`UpdateTrigger::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

/// Why a reload fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// A trigger message arrived one debounce window earlier
    Trigger(TriggerKind),
    /// No reload for a whole fallback interval
    Fallback,
    /// Requested explicitly by the subscriber
    Manual,
}

/// Actions returned by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Invoke this subscriber's reload callback
    Reload {
        /// Subscriber to reload
        subscriber: SubscriberId,
        /// What caused the reload
        reason: ReloadReason,
    },
}

#[derive(Debug, Clone)]
struct Subscriber<I> {
    interest: TriggerSet,
    last_updated: Option<I>,
    fallback_at: I,
}

#[derive(Debug, Clone)]
struct PendingReload<I> {
    due: I,
    subscriber: SubscriberId,
    reason: ReloadReason,
}

/// Update-trigger policy state machine.
///
/// Pure state machine: time is passed in, reloads come out as
/// [`TriggerAction`]s. Invoking the callback is the driver's job and is fire
/// and forget from the policy's view.
#[derive(Debug, Clone)]
pub struct UpdateTrigger<I: Timepoint> {
    config: PolicyConfig,
    subscribers: BTreeMap<SubscriberId, Subscriber<I>>,
    /// Debounced reloads, ordered by due time (ties keep arrival order)
    pending: Vec<PendingReload<I>>,
    next_id: u64,
}

impl<I: Timepoint> UpdateTrigger<I> {
    /// Create a policy with no subscribers.
    pub fn new(config: PolicyConfig) -> Self {
        Self { config, subscribers: BTreeMap::new(), pending: Vec::new(), next_id: 1 }
    }

    /// Configuration.
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Register a subscriber interested in `interest`.
    ///
    /// Its fallback clock starts now.
    pub fn subscribe(&mut self, interest: TriggerSet, now: I) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(id, Subscriber {
            interest,
            last_updated: None,
            fallback_at: now + self.config.fallback_interval,
        });
        id
    }

    /// Deregister a subscriber and cancel its pending reloads.
    ///
    /// Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.pending.retain(|p| p.subscriber != id);
        self.subscribers.remove(&id).is_some()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of debounced reloads waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// When `id` last reloaded. `None` if never or unknown.
    pub fn last_updated(&self, id: SubscriberId) -> Option<I> {
        self.subscribers.get(&id).and_then(|s| s.last_updated)
    }

    /// Observe an inbound message.
    ///
    /// Schedules a debounced reload for every subscriber interested in the
    /// message's kind. Returns how many reloads were scheduled; zero for kinds
    /// outside the trigger set.
    pub fn observe(&mut self, message: &InboundMessage, now: I) -> usize {
        let Some(kind) = TriggerKind::from_wire(&message.kind) else {
            tracing::debug!(kind = %message.kind, "ignoring non-trigger message");
            return 0;
        };

        let due = now + self.config.debounce;
        let mut scheduled = 0;
        for (id, subscriber) in &self.subscribers {
            if subscriber.interest.contains(kind) {
                self.pending.push(PendingReload {
                    due,
                    subscriber: *id,
                    reason: ReloadReason::Trigger(kind),
                });
                scheduled += 1;
            }
        }

        // Stable sort keeps arrival order among equal deadlines
        self.pending.sort_by_key(|p| p.due);

        tracing::debug!(%kind, scheduled, "reloads scheduled");
        scheduled
    }

    /// Reload `id` right away, bypassing the debounce.
    ///
    /// Returns the reload action, or `None` if `id` is not registered.
    pub fn request_reload(&mut self, id: SubscriberId, now: I) -> Option<TriggerAction> {
        let fallback_interval = self.config.fallback_interval;
        let subscriber = self.subscribers.get_mut(&id)?;
        subscriber.last_updated = Some(now);
        subscriber.fallback_at = now + fallback_interval;
        Some(TriggerAction::Reload { subscriber: id, reason: ReloadReason::Manual })
    }

    /// Emit every reload that is due at `now`.
    ///
    /// Debounced trigger reloads come first, in due order, followed by
    /// fallback reloads. Each emitted reload records `now` as the
    /// subscriber's last update and pushes its fallback out.
    pub fn tick(&mut self, now: I) -> Vec<TriggerAction> {
        let due_count = self.pending.iter().take_while(|p| p.due <= now).count();
        let mut actions = Vec::with_capacity(due_count);

        for pending in self.pending.drain(..due_count) {
            actions.push(TriggerAction::Reload {
                subscriber: pending.subscriber,
                reason: pending.reason,
            });
        }

        for (id, subscriber) in &mut self.subscribers {
            if subscriber.fallback_at <= now
                && !actions.iter().any(|a| matches!(a, TriggerAction::Reload { subscriber: s, .. } if s == id))
            {
                actions.push(TriggerAction::Reload {
                    subscriber: *id,
                    reason: ReloadReason::Fallback,
                });
            }
        }

        let fallback_interval = self.config.fallback_interval;
        for action in &actions {
            let TriggerAction::Reload { subscriber, .. } = action;
            if let Some(s) = self.subscribers.get_mut(subscriber) {
                s.last_updated = Some(now);
                s.fallback_at = now + fallback_interval;
            }
        }

        actions
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        let next_pending = self.pending.first().map(|p| p.due);
        let next_fallback = self.subscribers.values().map(|s| s.fallback_at).min();

        match (next_pending, next_fallback) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
