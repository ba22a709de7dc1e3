//! Shared test fixtures

#![allow(dead_code)]

pub mod mock_review;

use chrono::{TimeZone, Utc};
use submit_queue::types::Changeset;

/// A changeset that passes every eligibility check: Verified +1,
/// Code-Review +2, Autosubmit +1, submittable
pub fn ready_changeset(change_id: &str, commit: &str, parent: &str) -> Changeset {
    Changeset {
        change_id: change_id.to_string(),
        number: 1000,
        commit_id: commit.to_string(),
        parent_commit_ids: vec![parent.to_string()],
        owner_name: "dev".to_string(),
        subject: format!("change {change_id}"),
        verified: 1,
        code_reviewed: 2,
        autosubmit: 1,
        submittable: true,
        updated: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    }
}

/// Same as [`ready_changeset`] with an explicit Verified score
pub fn changeset_with_verified(
    change_id: &str,
    commit: &str,
    parent: &str,
    verified: i32,
) -> Changeset {
    Changeset {
        verified,
        ..ready_changeset(change_id, commit, parent)
    }
}

/// Same as [`ready_changeset`] with the owner's Autosubmit opt-in removed
pub fn revoked_changeset(change_id: &str, commit: &str, parent: &str) -> Changeset {
    Changeset {
        autosubmit: 0,
        ..ready_changeset(change_id, commit, parent)
    }
}
