//! Scripted review service for testing
//!
//! A hand-written fake rather than a mocking framework: the runner owns its
//! service, so call records are shared out through an [`Arc`] handle that
//! the test keeps.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use submit_queue::assemble::{assemble_chains, sort_chains};
use submit_queue::error::{Error, Result};
use submit_queue::review::ReviewService;
use submit_queue::types::{Chain, Changeset};

/// One canned remote state, consumed by a single refresh
pub struct RemoteState {
    pub head: String,
    pub changesets: Vec<Changeset>,
}

/// What a scripted refresh does
enum ScriptedRefresh {
    State(RemoteState),
    Error(String),
}

/// Call record for `submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCall {
    pub change_id: String,
    pub head_after: String,
}

/// Call record for `rebase`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseCall {
    pub change_id: String,
    pub base: String,
}

/// Shared view of everything the mock was asked to do
#[derive(Default)]
pub struct CallLog {
    refreshes: Mutex<u32>,
    submits: Mutex<Vec<SubmitCall>>,
    rebases: Mutex<Vec<RebaseCall>>,
}

impl CallLog {
    pub fn refresh_count(&self) -> u32 {
        *self.refreshes.lock().unwrap()
    }

    /// Change IDs passed to `submit`, in call order
    pub fn submitted_ids(&self) -> Vec<String> {
        self.submits
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.change_id.clone())
            .collect()
    }

    pub fn submit_calls(&self) -> Vec<SubmitCall> {
        self.submits.lock().unwrap().clone()
    }

    pub fn rebase_calls(&self) -> Vec<RebaseCall> {
        self.rebases.lock().unwrap().clone()
    }

    pub fn assert_nothing_submitted(&self) {
        let calls = self.submit_calls();
        assert!(calls.is_empty(), "expected no submits but got: {calls:?}");
    }

    pub fn assert_nothing_rebased(&self) {
        let calls = self.rebase_calls();
        assert!(calls.is_empty(), "expected no rebases but got: {calls:?}");
    }
}

/// Scripted [`ReviewService`]
///
/// Each `refresh` consumes the next [`RemoteState`] from the script and
/// assembles it exactly like the production adapter does; when the script
/// runs dry the cached view is simply kept. `rebase` answers with the old
/// commit id plus a `'` suffix, so tests can assert the advancing base of
/// a chain rebase. Error injection covers the failure paths.
pub struct MockReviewService {
    script: VecDeque<ScriptedRefresh>,
    head: String,
    chains: Vec<Chain>,
    log: Arc<CallLog>,
    refresh_delay: Option<Duration>,
    fail_submit_of: Option<String>,
    conflict_rebase_of: Option<String>,
}

impl MockReviewService {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            head: String::new(),
            chains: Vec::new(),
            log: Arc::new(CallLog::default()),
            refresh_delay: None,
            fail_submit_of: None,
            conflict_rebase_of: None,
        }
    }

    /// Handle for inspecting calls after the runner takes ownership
    pub fn log_handle(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }

    /// Queue the remote state served by the next scripted refresh
    pub fn push_state(&mut self, head: &str, changesets: Vec<Changeset>) {
        self.script.push_back(ScriptedRefresh::State(RemoteState {
            head: head.to_string(),
            changesets,
        }));
    }

    /// Queue a refresh failure; the cached view stays intact
    pub fn push_refresh_error(&mut self, message: &str) {
        self.script
            .push_back(ScriptedRefresh::Error(message.to_string()));
    }

    /// Make every refresh take this long (for overlap tests)
    pub fn set_refresh_delay(&mut self, delay: Duration) {
        self.refresh_delay = Some(delay);
    }

    /// Make `submit` fail for one specific change
    pub fn fail_submit_of(&mut self, change_id: &str) {
        self.fail_submit_of = Some(change_id.to_string());
    }

    /// Make `rebase` report a conflict for one specific change
    pub fn conflict_rebase_of(&mut self, change_id: &str) {
        self.conflict_rebase_of = Some(change_id.to_string());
    }
}

impl Default for MockReviewService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewService for MockReviewService {
    async fn refresh(&mut self) -> Result<()> {
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        *self.log.refreshes.lock().unwrap() += 1;

        match self.script.pop_front() {
            Some(ScriptedRefresh::State(state)) => {
                self.head = state.head;
                self.chains = sort_chains(assemble_chains(state.changesets));
                Ok(())
            }
            Some(ScriptedRefresh::Error(message)) => Err(Error::Gerrit(message)),
            // script ran dry: keep serving the cached view
            None => Ok(()),
        }
    }

    fn head(&self) -> &str {
        &self.head
    }

    fn chains(&self) -> &[Chain] {
        &self.chains
    }

    async fn submit(&mut self, changeset: &Changeset) -> Result<Changeset> {
        if self.fail_submit_of.as_deref() == Some(changeset.change_id.as_str()) {
            self.log.submits.lock().unwrap().push(SubmitCall {
                change_id: changeset.change_id.clone(),
                head_after: self.head.clone(),
            });
            return Err(Error::Gerrit(format!(
                "scripted submit failure for {}",
                changeset.change_id
            )));
        }

        self.head = changeset.commit_id.clone();
        self.log.submits.lock().unwrap().push(SubmitCall {
            change_id: changeset.change_id.clone(),
            head_after: self.head.clone(),
        });
        Ok(changeset.clone())
    }

    async fn rebase(&mut self, changeset: &Changeset, base: &str) -> Result<Changeset> {
        self.log.rebases.lock().unwrap().push(RebaseCall {
            change_id: changeset.change_id.clone(),
            base: base.to_string(),
        });

        if self.conflict_rebase_of.as_deref() == Some(changeset.change_id.as_str()) {
            return Err(Error::RebaseConflict {
                change_id: changeset.change_id.clone(),
                message: "scripted conflict".to_string(),
            });
        }

        let mut rebased = changeset.clone();
        rebased.commit_id = format!("{}'", changeset.commit_id);
        rebased.parent_commit_ids = vec![base.to_string()];
        // a new revision voids the previous CI verdict
        rebased.verified = 0;
        Ok(rebased)
    }
}
