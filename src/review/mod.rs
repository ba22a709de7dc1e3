//! Review-service boundary
//!
//! Provides the capability set the runner needs from the upstream review
//! service, so the control loop is testable without a network.

mod gerrit;

pub use gerrit::{GerritConfig, GerritService};

use crate::error::Result;
use crate::types::{Chain, Changeset};
use async_trait::async_trait;

/// The operations the queue runner needs from a review service
///
/// Production uses [`GerritService`]; tests use a scripted fake that
/// returns canned chain sets per refresh. Implementors cache the branch
/// HEAD and assembled chains of the last successful [`refresh`], and all
/// "updates" to changesets are observed only through a later refresh.
///
/// [`refresh`]: ReviewService::refresh
#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Re-fetch the branch HEAD and all open changes, assemble them into
    /// sorted chains, and replace the cached view atomically
    ///
    /// On error the previously cached view is left intact.
    async fn refresh(&mut self) -> Result<()>;

    /// Branch commit ID at the last successful refresh
    fn head(&self) -> &str;

    /// Cached chains, sorted longest first
    fn chains(&self) -> &[Chain];

    /// Submit one changeset; the remote merges it and its ancestors
    ///
    /// Returns the refreshed changeset and advances the cached HEAD to the
    /// new branch tip. On error nothing is changed; the caller must refresh
    /// before planning again.
    async fn submit(&mut self, changeset: &Changeset) -> Result<Changeset>;

    /// Rebase one changeset onto `base`
    ///
    /// Returns the refreshed changeset bearing its new commit ID. A
    /// conflict surfaces as [`Error::RebaseConflict`] and leaves the
    /// changeset untouched.
    ///
    /// [`Error::RebaseConflict`]: crate::error::Error::RebaseConflict
    async fn rebase(&mut self, changeset: &Changeset, base: &str) -> Result<Changeset>;

    /// True iff the chain's head has exactly one parent equal to the
    /// cached HEAD
    fn chain_is_rebased_on_head(&self, chain: &Chain) -> bool {
        crate::queue::rebased_on(chain, self.head())
    }

    /// First cached chain passing the filter, in sorted order
    fn find_first_chain(&self, filter: &dyn Fn(&Chain) -> bool) -> Option<&Chain> {
        self.chains().iter().find(|chain| filter(chain))
    }

    /// All cached chains passing the filter, preserving sorted order
    fn filter_chains(&self, filter: &dyn Fn(&Chain) -> bool) -> Vec<&Chain> {
        self.chains().iter().filter(|chain| filter(chain)).collect()
    }
}
