//! Client-side reconciliation of live user events
//!
//! A [`Reconciler`] holds the list of users a viewer is looking at. The list is
//! seeded from a snapshot and then folded forward with relay events:
//!
//! - `new_user` prepends a record, or coalesces into the existing record when
//!   the id is already present
//! - `sync_status_update` sets `synced_at` on an existing record and never
//!   inserts
//! - any other event type is ignored
//!
//! Events that arrive before the snapshot are buffered (bounded) and replayed
//! once it lands, unless the reconciler is built with [`PendingPolicy::Drop`].

mod listeners;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::realtime::UserEvent;
use crate::types::{User, UserId};

pub use listeners::{Listener, Subscription};
use listeners::ListenerRegistry;

/// Most events held while waiting for the snapshot
pub const MAX_PENDING_EVENTS: usize = 1024;

/// What to do with events that arrive before [`Reconciler::initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPolicy {
    /// Hold them and replay after the snapshot
    #[default]
    Buffer,
    /// Discard them
    Drop,
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new record was prepended
    Inserted,
    /// A repeated `new_user` was folded into the existing record
    Coalesced,
    /// `synced_at` was set on an existing record
    Updated,
    /// The event matched a record but changed nothing
    Unchanged,
    /// A `sync_status_update` named an id that is not in the list
    UnknownUser,
    /// Held until the snapshot arrives
    Buffered,
    /// Unknown event type, or the reconciler is not accepting events
    Ignored,
    /// The payload was malformed
    Discarded,
}

impl ApplyOutcome {
    /// Whether the list changed (and listeners were notified)
    pub fn changed(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Inserted | ApplyOutcome::Coalesced | ApplyOutcome::Updated
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingSnapshot,
    Ready,
    TornDown,
}

struct State {
    phase: Phase,
    users: Vec<User>,
    /// Bumped on every change; orders notifications
    version: u64,
    pending: VecDeque<UserEvent>,
}

struct Inner {
    state: RwLock<State>,
    listeners: ListenerRegistry,
    policy: PendingPolicy,
}

/// Local, display-ready list of users kept in step with relay events.
///
/// Cloning is cheap and shares the same list.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Create a reconciler that buffers events until the snapshot
    pub fn new() -> Self {
        Self::with_policy(PendingPolicy::default())
    }

    /// Create a reconciler with an explicit pre-snapshot policy
    pub fn with_policy(policy: PendingPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State {
                    phase: Phase::AwaitingSnapshot,
                    users: Vec::new(),
                    version: 0,
                    pending: VecDeque::new(),
                }),
                listeners: ListenerRegistry::default(),
                policy,
            }),
        }
    }

    /// Register a listener called with the full list after every change
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[User]) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Replace the list wholesale with `snapshot`.
    ///
    /// Buffered events are replayed on top of it, with `new_user` events for
    /// ids already in the snapshot coalesced rather than duplicated.
    pub fn initialize(&self, snapshot: Vec<User>) {
        let (version, users) = {
            let mut state = self.inner.state.write();
            state.users = snapshot;
            state.phase = Phase::Ready;

            let pending = std::mem::take(&mut state.pending);
            if !pending.is_empty() {
                tracing::debug!("Replaying {} events received before the snapshot", pending.len());
            }
            for event in pending {
                apply_to(&mut state.users, event);
            }
            state.version += 1;
            (state.version, state.users.clone())
        };
        self.inner.listeners.notify(version, &users);
    }

    /// Apply one event
    pub fn apply(&self, event: UserEvent) -> ApplyOutcome {
        let (outcome, version, users) = {
            let mut state = self.inner.state.write();
            match state.phase {
                Phase::Ready => {}
                Phase::TornDown => return ApplyOutcome::Ignored,
                Phase::AwaitingSnapshot => return self.hold(&mut state, event),
            }

            let outcome = apply_to(&mut state.users, event);
            if !outcome.changed() {
                return outcome;
            }
            state.version += 1;
            (outcome, state.version, state.users.clone())
        };

        self.inner.listeners.notify(version, &users);
        outcome
    }

    /// Decode and apply a raw event payload.
    ///
    /// Undecodable payloads are logged and discarded.
    pub fn apply_json(&self, payload: &str) -> ApplyOutcome {
        match UserEvent::decode(payload) {
            Ok(event) => self.apply(event),
            Err(e) => {
                tracing::warn!("Discarding undecodable event: {}", e);
                ApplyOutcome::Discarded
            }
        }
    }

    fn hold(&self, state: &mut State, event: UserEvent) -> ApplyOutcome {
        match self.inner.policy {
            PendingPolicy::Drop => {
                tracing::debug!("Dropping {} event received before the snapshot", event.type_name());
                ApplyOutcome::Ignored
            }
            PendingPolicy::Buffer => {
                if state.pending.len() >= MAX_PENDING_EVENTS {
                    state.pending.pop_front();
                    tracing::warn!("Pending event buffer full; oldest event dropped");
                }
                state.pending.push_back(event);
                ApplyOutcome::Buffered
            }
        }
    }

    /// Release listeners and pending events.
    ///
    /// Idempotent; events applied afterwards are ignored until the next
    /// [`initialize`](Self::initialize).
    pub fn teardown(&self) {
        {
            let mut state = self.inner.state.write();
            if state.phase == Phase::TornDown {
                return;
            }
            state.phase = Phase::TornDown;
            state.pending.clear();
        }
        self.inner.listeners.clear();
        tracing::debug!("Reconciler torn down");
    }

    /// Copy of the current list
    pub fn users(&self) -> Vec<User> {
        self.inner.state.read().users.clone()
    }

    /// Look up one record
    pub fn get(&self, id: UserId) -> Option<User> {
        self.inner
            .state
            .read()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a snapshot has been applied (and no teardown since)
    pub fn is_initialized(&self) -> bool {
        self.inner.state.read().phase == Phase::Ready
    }

    /// Events waiting for the snapshot
    pub fn pending_len(&self) -> usize {
        self.inner.state.read().pending.len()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

fn apply_to(users: &mut Vec<User>, event: UserEvent) -> ApplyOutcome {
    match event {
        UserEvent::NewUser(payload) => {
            let user = match payload.into_user() {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!("Discarding new_user event: {}", e);
                    return ApplyOutcome::Discarded;
                }
            };
            match users.iter_mut().find(|u| u.id == user.id) {
                Some(existing) => {
                    if existing.coalesce(user) {
                        ApplyOutcome::Coalesced
                    } else {
                        ApplyOutcome::Unchanged
                    }
                }
                None => {
                    users.insert(0, user);
                    ApplyOutcome::Inserted
                }
            }
        }
        UserEvent::SyncStatusUpdate(payload) => {
            let Some(id) = payload.id else {
                tracing::warn!("Discarding sync_status_update without an id");
                return ApplyOutcome::Discarded;
            };
            match users.iter_mut().find(|u| u.id == id) {
                Some(user) => {
                    if user.record_sync(payload.synced_at.as_deref()) {
                        ApplyOutcome::Updated
                    } else {
                        ApplyOutcome::Unchanged
                    }
                }
                None => {
                    tracing::debug!("sync_status_update for unknown user {}", id);
                    ApplyOutcome::UnknownUser
                }
            }
        }
        UserEvent::Other(kind) => {
            tracing::debug!("Ignoring event type {:?}", kind);
            ApplyOutcome::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    fn user(id: UserId) -> User {
        User {
            id,
            first_name: format!("First{}", id),
            last_name: format!("Last{}", id),
            email: format!("user{}@example.com", id),
            date_of_birth: "2000-01-01".to_string(),
            synced_at: None,
        }
    }

    #[test]
    fn test_sync_update_touches_only_synced_at() {
        let reconciler = Reconciler::new();
        reconciler.initialize(vec![user(1), user(2)]);

        let outcome = reconciler.apply(UserEvent::sync_status(2, "2024-01-01T00:00:00Z"));
        assert_eq!(outcome, ApplyOutcome::Updated);

        let users = reconciler.users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0], user(1));
        assert_eq!(users[1].synced_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(users[1].email, user(2).email);
    }

    #[test]
    fn test_new_user_into_empty_list() {
        let reconciler = Reconciler::new();
        reconciler.initialize(Vec::new());

        assert_eq!(reconciler.apply(UserEvent::new_user(user(5))), ApplyOutcome::Inserted);
        assert_eq!(reconciler.users(), vec![user(5)]);
    }

    #[test]
    fn test_new_user_is_prepended() {
        let reconciler = Reconciler::new();
        reconciler.initialize(vec![user(1)]);
        reconciler.apply(UserEvent::new_user(user(2)));

        let ids: Vec<UserId> = reconciler.users().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_duplicate_new_user_is_coalesced() {
        let reconciler = Reconciler::new();
        let mut synced = user(1);
        synced.synced_at = Some("2024-01-01T00:00:00Z".to_string());
        reconciler.initialize(vec![user(2), synced.clone()]);

        assert_eq!(reconciler.apply(UserEvent::new_user(user(1))), ApplyOutcome::Unchanged);

        let mut renamed = user(1);
        renamed.first_name = "Renamed".to_string();
        assert_eq!(reconciler.apply(UserEvent::new_user(renamed)), ApplyOutcome::Coalesced);

        let users = reconciler.users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].first_name, "Renamed");
        assert_eq!(users[1].synced_at, synced.synced_at);
    }

    #[test]
    fn test_unknown_id_and_unknown_type_leave_list_alone() {
        let reconciler = Reconciler::new();
        reconciler.initialize(vec![user(1)]);

        assert_eq!(
            reconciler.apply(UserEvent::sync_status(99, "2024-01-01T00:00:00Z")),
            ApplyOutcome::UnknownUser
        );
        assert_eq!(
            reconciler.apply(UserEvent::Other("user_deleted".to_string())),
            ApplyOutcome::Ignored
        );
        assert_eq!(reconciler.users(), vec![user(1)]);
    }

    #[test]
    fn test_malformed_payloads_are_discarded() {
        let reconciler = Reconciler::new();
        reconciler.initialize(vec![user(1)]);

        assert_eq!(
            reconciler.apply_json(r#"{"type":"new_user","user":{"id":3,"first_name":"A"}}"#),
            ApplyOutcome::Discarded
        );
        assert_eq!(reconciler.apply_json("[1, 2"), ApplyOutcome::Discarded);
        assert_eq!(
            reconciler.apply_json(r#"{"type":"sync_status_update","user":{"synced_at":"x"}}"#),
            ApplyOutcome::Discarded
        );
        assert_eq!(reconciler.len(), 1);
    }

    #[test]
    fn test_events_before_snapshot_are_replayed() {
        let reconciler = Reconciler::new();
        assert_eq!(reconciler.apply(UserEvent::new_user(user(3))), ApplyOutcome::Buffered);
        assert_eq!(
            reconciler.apply(UserEvent::new_user(user(1))),
            ApplyOutcome::Buffered
        );
        assert_eq!(reconciler.pending_len(), 2);

        // The snapshot already contains user 1
        reconciler.initialize(vec![user(1), user(2)]);

        let ids: Vec<UserId> = reconciler.users().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(reconciler.pending_len(), 0);
    }

    #[test]
    fn test_drop_policy_ignores_early_events() {
        let reconciler = Reconciler::with_policy(PendingPolicy::Drop);
        assert_eq!(reconciler.apply(UserEvent::new_user(user(3))), ApplyOutcome::Ignored);

        reconciler.initialize(vec![user(1)]);
        assert_eq!(reconciler.users(), vec![user(1)]);
    }

    #[test]
    fn test_pending_buffer_is_bounded() {
        let reconciler = Reconciler::new();
        for id in 0..(MAX_PENDING_EVENTS as i64 + 10) {
            reconciler.apply(UserEvent::new_user(user(id)));
        }
        assert_eq!(reconciler.pending_len(), MAX_PENDING_EVENTS);

        reconciler.initialize(Vec::new());
        assert_eq!(reconciler.len(), MAX_PENDING_EVENTS);
        assert!(reconciler.get(0).is_none());
    }

    #[test]
    fn test_listeners_see_each_change() {
        let reconciler = Reconciler::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let subscription = reconciler.subscribe(move |users| {
            counter.store(users.len(), Ordering::SeqCst);
        });

        reconciler.initialize(vec![user(1)]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        reconciler.apply(UserEvent::new_user(user(2)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        subscription.unsubscribe();
        reconciler.apply(UserEvent::new_user(user(3)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_read_the_reconciler() {
        let reconciler = Reconciler::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let view = reconciler.clone();
        let counter = seen.clone();
        let _subscription = reconciler.subscribe(move |_| {
            counter.store(view.len(), Ordering::SeqCst);
        });

        reconciler.initialize(vec![user(1), user(2)]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_slow_listener_never_ends_on_a_stale_list() {
        let reconciler = Reconciler::new();
        let last_seen: Arc<parking_lot::Mutex<Vec<UserId>>> = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let seen = last_seen.clone();
        let counter = calls.clone();
        let _subscription = reconciler.subscribe(move |users| {
            // Stall on the snapshot so the concurrent apply finishes first
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            *seen.lock() = users.iter().map(|u| u.id).collect();
        });

        let writer = reconciler.clone();
        let concurrent = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            writer.apply(UserEvent::new_user(user(2)))
        });

        reconciler.initialize(vec![user(1)]);
        assert_eq!(concurrent.join().unwrap(), ApplyOutcome::Inserted);

        let ids: Vec<UserId> = reconciler.users().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(*last_seen.lock(), ids);
    }

    #[test]
    fn test_listener_may_apply_events() {
        let reconciler = Reconciler::new();
        let last_seen: Arc<parking_lot::Mutex<Vec<UserId>>> = Arc::default();

        let writer = reconciler.clone();
        let _echo = reconciler.subscribe(move |users| {
            if users.len() == 1 {
                writer.apply(UserEvent::new_user(user(9)));
            }
        });
        let seen = last_seen.clone();
        let _record = reconciler.subscribe(move |users| {
            *seen.lock() = users.iter().map(|u| u.id).collect();
        });

        reconciler.initialize(vec![user(1)]);
        assert_eq!(*last_seen.lock(), vec![9, 1]);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let never_initialized = Reconciler::new();
        never_initialized.teardown();
        never_initialized.teardown();

        let reconciler = Reconciler::new();
        let _subscription = reconciler.subscribe(|_| {});
        reconciler.initialize(vec![user(1)]);
        reconciler.teardown();
        reconciler.teardown();

        assert_eq!(reconciler.listener_count(), 0);
        assert!(!reconciler.is_initialized());
        assert_eq!(reconciler.apply(UserEvent::new_user(user(2))), ApplyOutcome::Ignored);

        reconciler.initialize(vec![user(4)]);
        assert_eq!(reconciler.users(), vec![user(4)]);
    }
}
