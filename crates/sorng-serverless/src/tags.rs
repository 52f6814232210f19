//! Tag reconciliation by diff.
//!
//! Tags are never overwritten wholesale. The remote set is read, compared to
//! the desired set, and only the difference is sent: keys to remove and
//! entries to add or change.

use crate::error::AwsResult;
use crate::lambda::ComputeApi;
use std::collections::{BTreeSet, HashMap};

pub type TagSet = HashMap<String, String>;

/// The mutations that turn a remote tag set into the desired one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagDiff {
    /// Remote keys that are not desired.
    pub remove: BTreeSet<String>,
    /// Desired entries missing remotely or carrying a different value.
    pub upsert: TagSet,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.upsert.is_empty()
    }
}

pub fn reconcile(desired: &TagSet, remote: &TagSet) -> TagDiff {
    let remove = remote
        .keys()
        .filter(|key| !desired.contains_key(*key))
        .cloned()
        .collect();
    let upsert = desired
        .iter()
        .filter(|(key, value)| remote.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    TagDiff { remove, upsert }
}

/// Bring the tags on `arn` to exactly `desired`. Untag and tag calls are only
/// issued when there is something to send.
pub async fn apply(compute: &dyn ComputeApi, arn: &str, desired: &TagSet) -> AwsResult<TagDiff> {
    let remote = compute.list_tags(arn).await?;
    let diff = reconcile(desired, &remote);
    if !diff.remove.is_empty() {
        let keys: Vec<String> = diff.remove.iter().cloned().collect();
        log::debug!("Removing tags {:?} from {}", keys, arn);
        compute.untag_resource(arn, &keys).await?;
    }
    if !diff.upsert.is_empty() {
        log::debug!("Setting {} tag(s) on {}", diff.upsert.len(), arn);
        compute.tag_resource(arn, &diff.upsert).await?;
    }
    if diff.is_empty() {
        log::info!("Tags on {} already up to date", arn);
    }
    Ok(diff)
}
