//! Chain assembly
//!
//! Pure functions that group an unordered list of changesets into maximal
//! parent→child chains. No I/O happens here; the client calls this after
//! every fetch and the tests drive it directly with literal data.

use crate::types::{Chain, Changeset};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Hard cap on fixpoint sweeps. Assembly converges in O(n) passes; the cap
/// only guards against a malformed remote view.
const MAX_ASSEMBLY_PASSES: usize = 100;

/// Group changesets into maximal parent→child chains
///
/// Every input changeset ends up in exactly one output chain. Starts with
/// one singleton chain per changeset and a `leaf commit → chain` lookup,
/// then repeatedly splices any chain whose single parent is another chain's
/// leaf onto that chain, until a sweep makes no change. Appending is the
/// only move; the arbitrary arrival order makes a fixpoint simpler than
/// bidirectional indexing.
///
/// Merge-headed chains (more than one parent) are never appended to another
/// chain, though other chains may be appended to them.
///
/// Chains that fail the integrity check are logged and kept; the remote may
/// legitimately present a transient inconsistency, and the eligibility
/// predicates reject misshapen chains downstream.
#[must_use]
pub fn assemble_chains(changesets: Vec<Changeset>) -> Vec<Chain> {
    let mut slots: Vec<Vec<Changeset>> = changesets.into_iter().map(|c| vec![c]).collect();
    let mut leaf_to_slot: HashMap<String, usize> = slots
        .iter()
        .enumerate()
        .map(|(idx, slot)| (slot[0].commit_id.clone(), idx))
        .collect();

    for pass in 1..=MAX_ASSEMBLY_PASSES {
        let mut did_update = false;

        for idx in 0..slots.len() {
            let (parent, leaf) = match (slots[idx].first(), slots[idx].last()) {
                (Some(first), Some(last)) => match first.parent_commit_ids.as_slice() {
                    [parent] => (parent.clone(), last.commit_id.clone()),
                    // merge-headed chains cannot be appended to another chain
                    _ => continue,
                },
                // emptied by an earlier splice in this pass
                _ => continue,
            };

            let Some(&target) = leaf_to_slot.get(&parent) else {
                continue;
            };
            if target == idx {
                continue;
            }

            let absorbed = std::mem::take(&mut slots[idx]);
            slots[target].extend(absorbed);
            leaf_to_slot.remove(&parent);
            // the combined chain now ends in our leaf and stays extendable
            leaf_to_slot.insert(leaf, target);
            did_update = true;
        }

        if !did_update {
            debug!(passes = pass, "chain assembly converged");
            break;
        }
    }

    let mut chains = Vec::new();
    for slot in slots {
        let Ok(chain) = Chain::new(slot) else {
            continue;
        };
        if let Err(err) = chain.validate() {
            warn!(chain = %chain, error = %err, "assembled chain failed integrity check");
        }
        chains.push(chain);
    }
    chains
}

/// Sort chains by descending length
///
/// The sort is stable, so equal-length chains keep their order of first
/// appearance. Longest-first expresses the policy that large stacks should
/// not starve behind trivial ones.
#[must_use]
pub fn sort_chains(mut chains: Vec<Chain>) -> Vec<Chain> {
    chains.sort_by_key(|chain| Reverse(chain.len()));
    chains
}
