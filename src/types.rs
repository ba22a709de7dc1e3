//! Core types for submit-queue

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single open change under review on the configured branch
///
/// Immutable snapshot of what the review service reported at the last
/// refresh. Relationships between changesets are expressed by [`Chain`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Changeset {
    /// Stable opaque change identifier (survives rebases)
    pub change_id: String,
    /// Display number
    pub number: u64,
    /// Commit ID (hex) of the current revision
    pub commit_id: String,
    /// Parent commit IDs of the current revision; more than one denotes a
    /// merge commit
    pub parent_commit_ids: Vec<String>,
    /// Owner display name
    pub owner_name: String,
    /// First line of the commit message
    pub subject: String,
    /// CI signal: +1 passed, 0 pending, negative failed
    pub verified: i32,
    /// Human approval: +2 approved
    pub code_reviewed: i32,
    /// Owner opt-in: +1 means "submit this automatically once green"
    pub autosubmit: i32,
    /// The review service's summary permission
    pub submittable: bool,
    /// When the change was last touched upstream
    pub updated: DateTime<Utc>,
}

impl Changeset {
    /// True if the owner opted in to automatic submission (+1 on the
    /// "Autosubmit" label)
    #[must_use]
    pub const fn is_autosubmit(&self) -> bool {
        self.autosubmit == 1
    }

    /// True if CI passed (+1 on the "Verified" label)
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified == 1
    }

    /// True if a human approved (+2 on the "Code-Review" label)
    #[must_use]
    pub const fn is_code_reviewed(&self) -> bool {
        self.code_reviewed == 2
    }
}

impl std::fmt::Display for Changeset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Changeset(commit: {:.7}, owner: {}, subject: {}, submittable: {})",
            self.commit_id, self.owner_name, self.subject, self.submittable
        )
    }
}

/// An ordered run of changesets with an unbroken parent→child link
///
/// The first element may be a merge commit; interior elements never are.
/// Chains are built by the assembler, owned by the client for one refresh
/// cycle, and replaced wholesale on the next refresh.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Chain {
    changesets: Vec<Changeset>,
}

impl Chain {
    /// Build a chain from an ordered, non-empty list of changesets
    ///
    /// # Errors
    /// Returns [`Error::EmptyChain`] when `changesets` is empty.
    pub fn new(changesets: Vec<Changeset>) -> Result<Self> {
        if changesets.is_empty() {
            return Err(Error::EmptyChain);
        }
        Ok(Self { changesets })
    }

    /// The changesets, parent first
    #[must_use]
    pub fn changesets(&self) -> &[Changeset] {
        &self.changesets
    }

    /// Number of changesets in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    /// Always false; present for the len/is_empty convention
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Parent commit IDs of the chain head
    #[must_use]
    pub fn parent_commit_ids(&self) -> &[String] {
        &self.changesets[0].parent_commit_ids
    }

    /// Commit ID of the last changeset
    #[must_use]
    pub fn leaf_commit_id(&self) -> &str {
        &self.changesets[self.changesets.len() - 1].commit_id
    }

    /// The ordered change IDs, the chain's identity across refreshes
    #[must_use]
    pub fn change_ids(&self) -> Vec<String> {
        self.changesets.iter().map(|c| c.change_id.clone()).collect()
    }

    /// True if this chain's changesets carry exactly `change_ids`, in order
    #[must_use]
    pub fn matches_change_ids(&self, change_ids: &[String]) -> bool {
        self.changesets.len() == change_ids.len()
            && self
                .changesets
                .iter()
                .zip(change_ids)
                .all(|(changeset, id)| changeset.change_id == *id)
    }

    /// Check that the chain is properly ordered and connected
    ///
    /// The head's parents are not checked (it may be a merge); every later
    /// changeset must have exactly one parent equal to the previous commit.
    ///
    /// # Errors
    /// Returns [`Error::InvalidChain`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let mut previous: Option<&str> = None;
        for (idx, changeset) in self.changesets.iter().enumerate() {
            let parents = &changeset.parent_commit_ids;
            if parents.is_empty() {
                return Err(Error::InvalidChain(format!(
                    "change {} has no parent commit",
                    changeset.change_id
                )));
            }
            if idx > 0 {
                if parents.len() != 1 {
                    return Err(Error::InvalidChain(format!(
                        "merge commit {} in the middle of a chain",
                        changeset.change_id
                    )));
                }
                if previous != Some(parents[0].as_str()) {
                    return Err(Error::InvalidChain(format!(
                        "parent of change {} does not match the previous commit",
                        changeset.change_id
                    )));
                }
            }
            previous = Some(&changeset.commit_id);
        }
        Ok(())
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chain[{}]", self.changesets.len())?;
        match self.parent_commit_ids() {
            [parent] => write!(f, "(parent: {parent:.7})")?,
            parents => {
                write!(f, "(merge:")?;
                for parent in parents {
                    write!(f, " {parent:.7}")?;
                }
                write!(f, ")")?;
            }
        }
        write!(
            f,
            "({:.7}..{:.7})",
            self.changesets[0].commit_id,
            self.leaf_commit_id()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn changeset(change_id: &str, commit: &str, parents: &[&str]) -> Changeset {
        Changeset {
            change_id: change_id.to_string(),
            number: 1,
            commit_id: commit.to_string(),
            parent_commit_ids: parents.iter().map(ToString::to_string).collect(),
            owner_name: "dev".to_string(),
            subject: format!("subject for {change_id}"),
            verified: 1,
            code_reviewed: 2,
            autosubmit: 1,
            submittable: true,
            updated: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(matches!(Chain::new(vec![]), Err(Error::EmptyChain)));
    }

    #[test]
    fn test_validate_linear_chain() {
        let chain = Chain::new(vec![
            changeset("Ia", "aaaa", &["base"]),
            changeset("Ib", "bbbb", &["aaaa"]),
            changeset("Ic", "cccc", &["bbbb"]),
        ])
        .unwrap();
        assert!(chain.validate().is_ok());
        assert_eq!(chain.parent_commit_ids(), ["base".to_string()]);
        assert_eq!(chain.leaf_commit_id(), "cccc");
    }

    #[test]
    fn test_validate_merge_head_allowed() {
        let chain = Chain::new(vec![
            changeset("Ia", "aaaa", &["base1", "base2"]),
            changeset("Ib", "bbbb", &["aaaa"]),
        ])
        .unwrap();
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_validate_merge_in_middle_rejected() {
        let chain = Chain::new(vec![
            changeset("Ia", "aaaa", &["base"]),
            changeset("Ib", "bbbb", &["aaaa", "elsewhere"]),
        ])
        .unwrap();
        assert!(matches!(chain.validate(), Err(Error::InvalidChain(_))));
    }

    #[test]
    fn test_validate_broken_link_rejected() {
        let chain = Chain::new(vec![
            changeset("Ia", "aaaa", &["base"]),
            changeset("Ib", "bbbb", &["not-aaaa"]),
        ])
        .unwrap();
        assert!(matches!(chain.validate(), Err(Error::InvalidChain(_))));
    }

    #[test]
    fn test_validate_parentless_rejected() {
        let chain = Chain::new(vec![changeset("Ia", "aaaa", &[])]).unwrap();
        assert!(matches!(chain.validate(), Err(Error::InvalidChain(_))));
    }

    #[test]
    fn test_matches_change_ids_requires_full_equality() {
        let chain = Chain::new(vec![
            changeset("Ia", "aaaa", &["base"]),
            changeset("Ib", "bbbb", &["aaaa"]),
        ])
        .unwrap();

        assert!(chain.matches_change_ids(&["Ia".to_string(), "Ib".to_string()]));
        // partial prefix never matches
        assert!(!chain.matches_change_ids(&["Ia".to_string()]));
        assert!(!chain.matches_change_ids(&[
            "Ia".to_string(),
            "Ib".to_string(),
            "Ic".to_string()
        ]));
        assert!(!chain.matches_change_ids(&["Ib".to_string(), "Ia".to_string()]));
    }

    #[test]
    fn test_label_helpers() {
        let mut changeset = changeset("Ia", "aaaa", &["base"]);
        assert!(changeset.is_verified());
        assert!(changeset.is_code_reviewed());
        assert!(changeset.is_autosubmit());

        changeset.verified = 0;
        changeset.code_reviewed = 1;
        changeset.autosubmit = -1;
        assert!(!changeset.is_verified());
        assert!(!changeset.is_code_reviewed());
        assert!(!changeset.is_autosubmit());
    }

    #[test]
    fn test_chain_display_short_commits() {
        let chain = Chain::new(vec![changeset("Ia", "aaaabbbbcccc", &["1234567890ab"])]).unwrap();
        assert_eq!(chain.to_string(), "Chain[1](parent: 1234567)(aaaabbb..aaaabbb)");
    }
}
