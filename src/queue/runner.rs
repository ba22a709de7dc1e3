//! The queue runner
//!
//! One control loop advanced by periodic ticks. The runner carries at most
//! one "work in progress" chain between ticks, identified by its ordered
//! change IDs rather than by reference, because the chain set is rebuilt on
//! every refresh and the remote may change arbitrarily in between.

use crate::queue::policy;
use crate::review::ReviewService;
use crate::types::Chain;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Lifecycle stage of the carried chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WipStage {
    /// Rebased this tick; the post-rebase CI verdict is not in yet
    RebasingDone,
    /// Rebased earlier; still waiting for CI feedback
    WaitingCi,
    /// All checks passed; submission is underway within the current tick
    ReadyToSubmit,
}

/// The chain currently carried between ticks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WipChain {
    /// Ordered change IDs identifying the chain across refreshes
    pub change_ids: Vec<String>,
    /// Where the chain is in its lifecycle
    pub stage: WipStage,
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was in flight; this trigger was dropped, not queued
    Busy,
    /// Fetch-only tick: the cached view was refreshed, nothing was planned
    Fetched,
    /// The tick ran to completion
    Completed,
    /// The tick aborted on an error (already logged); state is kept for
    /// the next trigger
    Failed,
}

/// Monitor record shared between the tick and status readers
struct RunnerState {
    running: bool,
    wip: Option<WipChain>,
    head: String,
    chains: Vec<Chain>,
    last_tick: Option<DateTime<Utc>>,
}

/// Clears the `running` flag when the tick body finishes or is dropped
struct RunningGuard<'a> {
    state: &'a Mutex<RunnerState>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running = false;
    }
}

/// The queue runner
///
/// Holds the review service behind an async lock (acquired once per tick;
/// uncontended because ticks are single-flight) and a monitor record that
/// status readers may inspect at any time. The monitor lock is only ever
/// held for field access, never across I/O.
pub struct Runner {
    state: Mutex<RunnerState>,
    service: tokio::sync::Mutex<Box<dyn ReviewService>>,
}

impl Runner {
    /// Create a runner around a review service
    ///
    /// The status snapshot is seeded from whatever the service has cached,
    /// so a pre-warmed client is visible before the first tick.
    #[must_use]
    pub fn new(service: Box<dyn ReviewService>) -> Self {
        let state = RunnerState {
            running: false,
            wip: None,
            head: service.head().to_string(),
            chains: service.chains().to_vec(),
            last_tick: None,
        };
        Self {
            state: Mutex::new(state),
            service: tokio::sync::Mutex::new(service),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunnerState> {
        // the monitor lock is never held across await points; if a reader
        // panicked mid-access the record is still just plain fields, so
        // recover the guard rather than poisoning every later read
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a tick is executing
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    /// The carried chain, if any
    #[must_use]
    pub fn current_wip(&self) -> Option<WipChain> {
        self.lock_state().wip.clone()
    }

    /// Branch HEAD at the last refresh
    #[must_use]
    pub fn head(&self) -> String {
        self.lock_state().head.clone()
    }

    /// Sorted chain list at the last refresh
    #[must_use]
    pub fn chains(&self) -> Vec<Chain> {
        self.lock_state().chains.clone()
    }

    /// When the last tick refreshed the view
    #[must_use]
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_tick
    }

    /// Run one tick of the control loop
    ///
    /// Single-flight: if another tick is in progress the call returns
    /// [`TickOutcome::Busy`] immediately; overlapping triggers are dropped,
    /// never queued. Errors are logged here and reported as
    /// [`TickOutcome::Failed`]; the trigger is fire-and-forget.
    pub async fn tick(&self, fetch_only: bool) -> TickOutcome {
        {
            let mut state = self.lock_state();
            if state.running {
                debug!("tick already in flight, dropping trigger");
                return TickOutcome::Busy;
            }
            state.running = true;
        }
        let _guard = RunningGuard { state: &self.state };

        let mut service = self.service.lock().await;
        match self.run(&mut service, fetch_only).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "tick aborted");
                TickOutcome::Failed
            }
        }
    }

    async fn run(
        &self,
        service: &mut Box<dyn ReviewService>,
        fetch_only: bool,
    ) -> crate::error::Result<TickOutcome> {
        service.refresh().await?;
        self.publish_view(service.as_ref());

        if fetch_only {
            debug!("fetch-only tick, skipping planning");
            return Ok(TickOutcome::Fetched);
        }

        let mut wip = self.rebind_wip(service.as_ref());
        // the cached view is only rebuilt on the next refresh, so a chain
        // submitted this tick must not be picked up again
        let mut submitted_ids: Option<Vec<String>> = None;

        loop {
            if let Some(chain) = wip.take() {
                let head = service.head().to_string();

                if !policy::rebased_on(&chain, &head) {
                    warn!(chain = %chain, head = %head,
                        "branch tip moved while carrying chain, discarding");
                    self.clear_wip();
                    continue;
                }
                if policy::failed_ci(&chain) {
                    warn!(chain = %chain, "carried chain failed CI, discarding");
                    self.clear_wip();
                    continue;
                }
                if policy::awaiting_ci(&chain) {
                    info!(chain = %chain, "still waiting for CI feedback, going back to sleep");
                    self.store_wip(&chain, WipStage::WaitingCi);
                    return Ok(TickOutcome::Completed);
                }
                if policy::auto_submittable(&chain) {
                    self.store_wip(&chain, WipStage::ReadyToSubmit);
                    info!(chain = %chain, "submitting chain");
                    for changeset in chain.changesets() {
                        if let Err(err) = service.submit(changeset).await {
                            error!(change = %changeset, error = %err,
                                "submit failed mid-chain, re-planning on next tick");
                            self.clear_wip();
                            return Err(err);
                        }
                    }
                    info!(chain = %chain, head = service.head(), "chain submitted");
                    submitted_ids = Some(chain.change_ids());
                    self.clear_wip();
                    continue;
                }
                // author revoked the opt-in or a reviewer downgraded
                warn!(chain = %chain, "carried chain is no longer auto-submittable, discarding");
                self.clear_wip();
                continue;
            }

            let head = service.head().to_string();
            let not_submitted = |chain: &Chain| {
                submitted_ids
                    .as_ref()
                    .is_none_or(|ids| !chain.matches_change_ids(ids))
            };

            if let Some(chain) = service
                .find_first_chain(&|chain| not_submitted(chain) && policy::ready(chain, &head))
                .cloned()
            {
                info!(chain = %chain, "found chain ready to submit without a rebase");
                self.store_wip(&chain, WipStage::ReadyToSubmit);
                wip = Some(chain);
                continue;
            }

            let Some(chain) = service
                .find_first_chain(&|chain| {
                    not_submitted(chain)
                        && policy::auto_submittable(chain)
                        && !policy::failed_ci(chain)
                })
                .cloned()
            else {
                info!("no submittable chain found, going back to sleep");
                break;
            };

            info!(chain = %chain, head = %head, "found chain needing a rebase");
            let mut base = head;
            let mut rebased = true;
            for changeset in chain.changesets() {
                match service.rebase(changeset, &base).await {
                    // the next changeset goes on top of the new commit
                    Ok(fresh) => base = fresh.commit_id,
                    Err(err) if err.is_rebase_conflict() => {
                        warn!(change = %changeset, error = %err,
                            "rebase conflict, leaving chain alone until the next tick");
                        self.clear_wip();
                        rebased = false;
                        break;
                    }
                    Err(err) => {
                        warn!(change = %changeset, error = %err,
                            "rebase failed, re-planning on next tick");
                        self.clear_wip();
                        rebased = false;
                        break;
                    }
                }
            }
            if rebased {
                // submission needs the post-rebase CI verdict, which only a
                // later tick can observe
                self.store_wip(&chain, WipStage::RebasingDone);
            }
            break;
        }

        Ok(TickOutcome::Completed)
    }

    /// Copy the service's refreshed view into the monitor record
    fn publish_view(&self, service: &dyn ReviewService) {
        let mut state = self.lock_state();
        state.head = service.head().to_string();
        state.chains = service.chains().to_vec();
        state.last_tick = Some(Utc::now());
    }

    /// Re-locate the carried chain in the freshly refreshed chain list
    ///
    /// A chain matches only when it has the same number of changesets with
    /// the same change IDs in the same order; a partial match never
    /// re-binds. Returns the fresh chain, clearing the carry when it has
    /// disappeared from the remote.
    fn rebind_wip(&self, service: &dyn ReviewService) -> Option<Chain> {
        let carried = self.lock_state().wip.clone()?;
        match service.find_first_chain(&|chain| chain.matches_change_ids(&carried.change_ids)) {
            Some(chain) => Some(chain.clone()),
            None => {
                warn!(change_ids = ?carried.change_ids, "carried chain has disappeared");
                self.clear_wip();
                None
            }
        }
    }

    fn store_wip(&self, chain: &Chain, stage: WipStage) {
        self.lock_state().wip = Some(WipChain {
            change_ids: chain.change_ids(),
            stage,
        });
    }

    fn clear_wip(&self) {
        self.lock_state().wip = None;
    }
}
