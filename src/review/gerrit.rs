//! Gerrit review-service adapter
//!
//! Talks to Gerrit's REST API over authenticated `/a/` endpoints and maps
//! its wire types onto [`Changeset`]. Only the handful of calls the queue
//! needs are implemented.

use crate::assemble::{assemble_chains, sort_chains};
use crate::error::{Error, Result};
use crate::review::ReviewService;
use crate::types::{Chain, Changeset};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Detail options requested with every change query
const CHANGE_OPTIONS: [&str; 5] = [
    "LABELS",
    "CURRENT_REVISION",
    "CURRENT_COMMIT",
    "DETAILED_ACCOUNTS",
    "SUBMITTABLE",
];

/// Gerrit connection parameters
#[derive(Debug, Clone)]
pub struct GerritConfig {
    /// Base URL of the Gerrit instance, e.g. `https://review.example.org`
    pub url: String,
    /// HTTP username
    pub username: String,
    /// HTTP password
    pub password: String,
    /// Project to watch
    pub project: String,
    /// Destination branch
    pub branch: String,
}

/// Gerrit adapter caching the last-refreshed HEAD and chain set
pub struct GerritService {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    project: String,
    branch: String,
    head: String,
    chains: Vec<Chain>,
}

// Wire types. Gerrit only returns what is explicitly asked for, so most
// fields are optional or defaulted.

#[derive(Debug, Default, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct LabelInfo {
    approved: Option<AccountInfo>,
    recommended: Option<AccountInfo>,
    disliked: Option<AccountInfo>,
    rejected: Option<AccountInfo>,
}

#[derive(Debug, Deserialize)]
struct CommitParent {
    commit: String,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    #[serde(default)]
    parents: Vec<CommitParent>,
}

#[derive(Debug, Deserialize)]
struct RevisionInfo {
    commit: Option<CommitInfo>,
}

#[derive(Debug, Deserialize)]
struct ChangeInfo {
    change_id: String,
    #[serde(rename = "_number")]
    number: u64,
    subject: String,
    #[serde(default)]
    owner: AccountInfo,
    #[serde(default)]
    submittable: bool,
    #[serde(default)]
    labels: HashMap<String, LabelInfo>,
    current_revision: Option<String>,
    #[serde(default)]
    revisions: HashMap<String, RevisionInfo>,
    #[serde(deserialize_with = "gerrit_timestamp")]
    updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BranchInfo {
    revision: String,
}

#[derive(Debug, serde::Serialize)]
struct RebaseInput<'a> {
    base: &'a str,
}

/// Strip Gerrit's `)]}'` cross-site-scripting guard from a response body
fn strip_xssi(body: &str) -> &str {
    body.trim_start_matches(")]}'").trim_start()
}

/// Map a label to its integer score
///
/// Buckets, checked in this order: Recommended=+2, Approved=+1,
/// Disliked=−1, Rejected=−2, default 0.
fn label_score(label: Option<&LabelInfo>) -> i32 {
    let Some(label) = label else { return 0 };
    if label.recommended.is_some() {
        return 2;
    }
    if label.approved.is_some() {
        return 1;
    }
    if label.disliked.is_some() {
        return -1;
    }
    if label.rejected.is_some() {
        return -2;
    }
    0
}

/// Parse Gerrit's `2013-02-21 11:16:36.775000000` timestamps (always UTC)
fn gerrit_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl TryFrom<ChangeInfo> for Changeset {
    type Error = Error;

    fn try_from(change: ChangeInfo) -> Result<Self> {
        let Some(commit_id) = change.current_revision else {
            return Err(Error::Gerrit(format!(
                "change {} has no current revision",
                change.number
            )));
        };
        let parent_commit_ids = change
            .revisions
            .get(&commit_id)
            .and_then(|revision| revision.commit.as_ref())
            .map(|commit| commit.parents.iter().map(|p| p.commit.clone()).collect())
            .unwrap_or_default();

        Ok(Self {
            change_id: change.change_id,
            number: change.number,
            commit_id,
            parent_commit_ids,
            owner_name: change.owner.name,
            subject: change.subject,
            verified: label_score(change.labels.get("Verified")),
            code_reviewed: label_score(change.labels.get("Code-Review")),
            autosubmit: label_score(change.labels.get("Autosubmit")),
            submittable: change.submittable,
            updated: change.updated,
        })
    }
}

impl GerritService {
    /// Create a new Gerrit adapter
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(config: GerritConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent("submit-queue")
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username,
            password: config.password,
            project: config.project,
            branch: config.branch,
            head: String::new(),
            chains: Vec::new(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/a{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Gerrit(format!(
                "GET {url} returned {status}: {}",
                body.trim()
            )));
        }
        serde_json::from_str(strip_xssi(&body))
            .map_err(|e| Error::Gerrit(format!("unparseable response from {url}: {e}")))
    }

    async fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Gerrit(format!(
                "POST {url} returned {status}: {}",
                text.trim()
            )));
        }
        serde_json::from_str(strip_xssi(&text))
            .map_err(|e| Error::Gerrit(format!("unparseable response from {url}: {e}")))
    }

    async fn fetch_branch_head(&self) -> Result<String> {
        let url = self.api_url(&format!(
            "/projects/{}/branches/{}",
            urlencoding::encode(&self.project),
            urlencoding::encode(&self.branch)
        ));
        let branch: BranchInfo = self.get_json(&url, &[]).await?;
        Ok(branch.revision)
    }

    async fn fetch_open_changesets(&self) -> Result<Vec<Changeset>> {
        let query = format!(
            "status:open project:{} branch:{}",
            self.project, self.branch
        );
        debug!(query = %query, "fetching open changes");

        let mut params: Vec<(&str, &str)> = vec![("q", &query)];
        params.extend(CHANGE_OPTIONS.iter().map(|option| ("o", *option)));

        let changes: Vec<ChangeInfo> =
            self.get_json(&self.api_url("/changes/"), &params).await?;

        let mut changesets = Vec::with_capacity(changes.len());
        for change in changes {
            let number = change.number;
            match Changeset::try_from(change) {
                Ok(changeset) => changesets.push(changeset),
                Err(err) => {
                    warn!(change = number, error = %err, "skipping undecodable change");
                }
            }
        }
        Ok(changesets)
    }

    /// Re-download a single change with full detail
    async fn fetch_changeset(&self, change_id: &str) -> Result<Changeset> {
        let url = self.api_url(&format!("/changes/{}/", urlencoding::encode(change_id)));
        let params: Vec<(&str, &str)> =
            CHANGE_OPTIONS.iter().map(|option| ("o", *option)).collect();
        let change: ChangeInfo = self.get_json(&url, &params).await?;
        Changeset::try_from(change)
    }
}

#[async_trait]
impl ReviewService for GerritService {
    async fn refresh(&mut self) -> Result<()> {
        debug!("refreshing view of gerrit");
        let head = self.fetch_branch_head().await?;
        let changesets = self.fetch_open_changesets().await?;
        let chains = sort_chains(assemble_chains(changesets));

        info!(head = %head, chains = chains.len(), "assembled chain view");
        self.head = head;
        self.chains = chains;
        Ok(())
    }

    fn head(&self) -> &str {
        &self.head
    }

    fn chains(&self) -> &[Chain] {
        &self.chains
    }

    async fn submit(&mut self, changeset: &Changeset) -> Result<Changeset> {
        debug!(change = changeset.number, "submitting change");
        let url = self.api_url(&format!(
            "/changes/{}/submit",
            urlencoding::encode(&changeset.change_id)
        ));
        let _: ChangeInfo = self.post_json(&url, &serde_json::json!({})).await?;

        // the submit response is sparse; re-fetch for the merged revision
        let submitted = self.fetch_changeset(&changeset.change_id).await?;
        self.head = submitted.commit_id.clone();
        debug!(change = submitted.number, head = %self.head, "change submitted");
        Ok(submitted)
    }

    async fn rebase(&mut self, changeset: &Changeset, base: &str) -> Result<Changeset> {
        debug!(change = changeset.number, base, "rebasing change");
        let url = self.api_url(&format!(
            "/changes/{}/rebase",
            urlencoding::encode(&changeset.change_id)
        ));

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&RebaseInput { base })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::CONFLICT {
            return Err(Error::RebaseConflict {
                change_id: changeset.change_id.clone(),
                message: body.trim().to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::Gerrit(format!(
                "POST {url} returned {status}: {}",
                body.trim()
            )));
        }

        let rebased = self.fetch_changeset(&changeset.change_id).await?;
        debug!(change = rebased.number, commit = %rebased.commit_id, "change rebased");
        Ok(rebased)
    }
}
