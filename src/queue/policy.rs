//! Eligibility policy
//!
//! Pure predicates over chains. No I/O happens here, which keeps the
//! policy trivially unit-testable; the runner composes these against the
//! client's cached view.

use crate::types::Chain;

/// True if every changeset may be submitted automatically
///
/// Requires both the service's `submittable` verdict and the owner's +1 on
/// the Autosubmit label, for every changeset in the chain. Does not check
/// whether the chain is rebased on HEAD.
#[must_use]
pub fn auto_submittable(chain: &Chain) -> bool {
    chain
        .changesets()
        .iter()
        .all(|changeset| changeset.submittable && changeset.is_autosubmit())
}

/// True if some changeset failed CI (negative Verified)
#[must_use]
pub fn failed_ci(chain: &Chain) -> bool {
    chain.changesets().iter().any(|changeset| changeset.verified < 0)
}

/// True if some changeset still has no CI verdict (Verified = 0)
#[must_use]
pub fn awaiting_ci(chain: &Chain) -> bool {
    chain.changesets().iter().any(|changeset| changeset.verified == 0)
}

/// True if the chain's head has exactly one parent equal to `head`
#[must_use]
pub fn rebased_on(chain: &Chain, head: &str) -> bool {
    matches!(chain.parent_commit_ids(), [parent] if parent == head)
}

/// True if the chain can be submitted right now: auto-submittable, rebased
/// on `head`, and carrying a clean CI verdict on every changeset
#[must_use]
pub fn ready(chain: &Chain, head: &str) -> bool {
    auto_submittable(chain) && rebased_on(chain, head) && !awaiting_ci(chain) && !failed_ci(chain)
}
