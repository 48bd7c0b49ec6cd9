//! Profile aggregation
//!
//! `ProfileAggregator` fans a refresh out into one fetch per requested facet,
//! fans the outcomes back in, and resolves the cycle exactly once:
//!
//! ```text
//! Idle --refresh--> Refreshing --all settled--> Settled(snapshot)
//!                       |                   \-> Failed(CoreProfileUnavailable)
//!                       \--cancel / newer refresh--> Idle
//! ```
//!
//! Every cycle carries a `CycleToken`. Only the cycle holding the current
//! token may publish, so results from a cancelled or superseded cycle are
//! dropped instead of merged.

mod snapshot;

pub use snapshot::{Facet, FacetSet, FieldStatus, ProfileSnapshot};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, info_span, Instrument};

use crate::config::{AggregatorConfig, ServiceConfig};
use crate::core::DirectoryClient;
use crate::error::{RefreshError, Result};
use crate::resilience::FetchPolicy;
use snapshot::{FacetOutcome, SnapshotBuilder};

/// Identifies one refresh invocation's in-flight work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleToken(pub(crate) u64);

impl CycleToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CycleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a consumer polling or subscribing to the aggregator sees
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorState {
    Idle,
    Refreshing {
        cycle: CycleToken,
        user_id: String,
    },
    Settled {
        cycle: CycleToken,
        snapshot: Arc<ProfileSnapshot>,
    },
    Failed {
        cycle: CycleToken,
        error: RefreshError,
    },
}

impl AggregatorState {
    pub fn is_refreshing(&self) -> bool {
        matches!(self, AggregatorState::Refreshing { .. })
    }

    pub fn snapshot(&self) -> Option<&Arc<ProfileSnapshot>> {
        match self {
            AggregatorState::Settled { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn cycle(&self) -> Option<CycleToken> {
        match self {
            AggregatorState::Idle => None,
            AggregatorState::Refreshing { cycle, .. }
            | AggregatorState::Settled { cycle, .. }
            | AggregatorState::Failed { cycle, .. } => Some(*cycle),
        }
    }
}

/// Bookkeeping for the one cycle allowed to publish
struct ActiveCycle {
    cycle: CycleToken,
    cancel: oneshot::Sender<()>,
}

/// Gathers the facets of a user profile into one `ProfileSnapshot`
///
/// A new `refresh` while another is in flight cancels the older one: the
/// newest request wins. Share the aggregator behind an `Arc` to refresh or
/// cancel from several tasks.
pub struct ProfileAggregator<C> {
    client: C,
    policy: FetchPolicy,
    next_cycle: AtomicU64,
    active: Mutex<Option<ActiveCycle>>,
    state: watch::Sender<AggregatorState>,
}

impl<C: DirectoryClient> ProfileAggregator<C> {
    /// Aggregator with no retries and no per-facet deadline
    pub fn new(client: C) -> Self {
        Self::with_policy(client, FetchPolicy::passthrough())
    }

    pub fn with_policy(client: C, policy: FetchPolicy) -> Self {
        let (state, _) = watch::channel(AggregatorState::Idle);
        Self {
            client,
            policy,
            next_cycle: AtomicU64::new(0),
            active: Mutex::new(None),
            state,
        }
    }

    pub fn from_config(client: C, config: &AggregatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_policy(client, FetchPolicy::from_config(config)))
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Current state
    pub fn state(&self) -> AggregatorState {
        self.state.borrow().clone()
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> watch::Receiver<AggregatorState> {
        self.state.subscribe()
    }

    /// Token of the in-flight cycle, if any
    pub fn current_cycle(&self) -> Option<CycleToken> {
        self.lock_active().as_ref().map(|active| active.cycle)
    }

    /// Fetch every facet for `user_id` and merge them into a snapshot
    pub async fn refresh(&self, user_id: &str) -> std::result::Result<ProfileSnapshot, RefreshError> {
        self.refresh_with(user_id, FacetSet::all()).await
    }

    /// Like `refresh`, fetching only the `requested` facets
    ///
    /// Facets outside `requested` are reported as `NotRequested`.
    pub async fn refresh_with(
        &self,
        user_id: &str,
        requested: FacetSet,
    ) -> std::result::Result<ProfileSnapshot, RefreshError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(RefreshError::InvalidUserId);
        }

        let (cycle, cancelled) = self.begin_cycle(user_id);
        let mut guard = CycleGuard { aggregator: self, cycle, armed: true };

        let span = info_span!("profile_refresh", cycle = %cycle, user_id = %user_id);
        let result = self
            .run_cycle(cycle, user_id, requested, cancelled)
            .instrument(span)
            .await;

        guard.armed = false;
        self.complete_cycle(cycle, result)
    }

    /// Abort the in-flight refresh, if any
    ///
    /// Returns `false` when nothing was refreshing. The cancelled `refresh`
    /// call resolves to `RefreshError::Cancelled` and publishes nothing.
    pub fn cancel(&self) -> bool {
        let mut active = self.lock_active();
        match active.take() {
            Some(previous) => {
                let _ = previous.cancel.send(());
                self.state.send_replace(AggregatorState::Idle);
                info!(cycle = %previous.cycle, "profile refresh cancelled");
                true
            }
            None => false,
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveCycle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, cycle: CycleToken) -> bool {
        self.lock_active()
            .as_ref()
            .map_or(false, |active| active.cycle == cycle)
    }

    /// Claim the active slot, cancelling whichever cycle held it
    fn begin_cycle(&self, user_id: &str) -> (CycleToken, oneshot::Receiver<()>) {
        let (cancel, cancelled) = oneshot::channel();
        let mut active = self.lock_active();

        let cycle = CycleToken(self.next_cycle.fetch_add(1, Ordering::SeqCst) + 1);
        if let Some(previous) = active.replace(ActiveCycle { cycle, cancel }) {
            let _ = previous.cancel.send(());
            info!(superseded = %previous.cycle, cycle = %cycle, "newer profile refresh supersedes in-flight cycle");
        }

        self.state.send_replace(AggregatorState::Refreshing {
            cycle,
            user_id: user_id.to_string(),
        });
        (cycle, cancelled)
    }

    async fn run_cycle(
        &self,
        cycle: CycleToken,
        user_id: &str,
        requested: FacetSet,
        mut cancelled: oneshot::Receiver<()>,
    ) -> std::result::Result<ProfileSnapshot, RefreshError> {
        let mut builder = SnapshotBuilder::new(cycle, user_id, requested);
        let mut pending: FuturesUnordered<BoxFuture<'_, FacetOutcome>> = requested
            .iter()
            .map(|facet| self.fetch(facet, user_id))
            .collect();

        debug!(facets = ?requested, "fetching profile facets");

        while !builder.is_settled() {
            tokio::select! {
                biased;

                _ = &mut cancelled => {
                    debug!(discarded = requested.len() - builder.remaining(), "dropping settled facets of cancelled cycle");
                    return Err(RefreshError::Cancelled { cycle });
                }
                next = pending.next() => {
                    let Some(outcome) = next else { break };
                    if !self.is_current(cycle) {
                        return Err(RefreshError::Cancelled { cycle });
                    }

                    let facet = outcome.facet();
                    if let Err(stale) = builder.record(cycle, outcome) {
                        debug!(from = %stale.from, owner = %stale.owner, "refused stale facet write");
                        continue;
                    }
                    debug!(facet = %facet, remaining = builder.remaining(), "facet settled");
                }
            }
        }

        builder.finish()
    }

    fn fetch<'a>(&'a self, facet: Facet, user_id: &'a str) -> BoxFuture<'a, FacetOutcome> {
        let client = &self.client;
        let policy = &self.policy;
        let label = facet.as_str();

        match facet {
            Facet::User => async move {
                FacetOutcome::User(policy.execute(label, || client.get_user(user_id)).await)
            }
            .boxed(),
            Facet::Photo => async move {
                FacetOutcome::Photo(policy.execute(label, || client.get_photo(user_id)).await)
            }
            .boxed(),
            Facet::Manager => async move {
                FacetOutcome::Manager(policy.execute(label, || client.get_manager(user_id)).await)
            }
            .boxed(),
            Facet::DirectReports => async move {
                FacetOutcome::DirectReports(policy.execute(label, || client.get_direct_reports(user_id)).await)
            }
            .boxed(),
            Facet::MembershipGroups => async move {
                FacetOutcome::MembershipGroups(policy.execute(label, || client.get_group_memberships(user_id)).await)
            }
            .boxed(),
            Facet::Files => async move {
                FacetOutcome::Files(policy.execute(label, || client.get_files(user_id)).await)
            }
            .boxed(),
        }
    }

    /// Publish the cycle's result if it still owns the active slot
    fn complete_cycle(
        &self,
        cycle: CycleToken,
        result: std::result::Result<ProfileSnapshot, RefreshError>,
    ) -> std::result::Result<ProfileSnapshot, RefreshError> {
        let mut active = self.lock_active();
        let owns_slot = active.as_ref().map_or(false, |current| current.cycle == cycle);
        if !owns_slot {
            // Cancelled or superseded after the last facet settled
            return Err(RefreshError::Cancelled { cycle });
        }

        let next_state = match result {
            Ok(ref snapshot) => {
                info!(cycle = %cycle, degraded = snapshot.is_degraded(), "profile snapshot published");
                AggregatorState::Settled { cycle, snapshot: Arc::new(snapshot.clone()) }
            }
            Err(RefreshError::Cancelled { .. }) => AggregatorState::Idle,
            Err(ref error) => {
                info!(cycle = %cycle, error = %error, "profile refresh failed");
                AggregatorState::Failed { cycle, error: error.clone() }
            }
        };

        active.take();
        self.state.send_replace(next_state);
        result
    }

    /// Release the active slot of a refresh future dropped mid-flight
    fn abandon(&self, cycle: CycleToken) {
        let mut active = self.lock_active();
        if active.as_ref().map_or(false, |current| current.cycle == cycle) {
            active.take();
            self.state.send_replace(AggregatorState::Idle);
            debug!(cycle = %cycle, "in-flight refresh dropped by caller");
        }
    }
}

/// Returns the aggregator to `Idle` if a refresh future is dropped before
/// it resolves
struct CycleGuard<'a, C: DirectoryClient> {
    aggregator: &'a ProfileAggregator<C>,
    cycle: CycleToken,
    armed: bool,
}

impl<C: DirectoryClient> Drop for CycleGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.aggregator.abandon(self.cycle);
        }
    }
}

impl<C> fmt::Debug for ProfileAggregator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileAggregator")
            .field("policy", &self.policy)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
