//! Structural digest of a changeset
//!
//! Client ids depend on traversal order, so they are replaced by a label
//! derived from each entry's content before hashing. Entries are sorted by
//! their canonical JSON, which makes the digest independent of id order.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{ChangeSetEntry, EntityOperation};
use crate::errors::Result;
use crate::model::{EntityAction, Values};

#[derive(Serialize)]
struct NormalEntry<'a> {
    label: String,
    operation: EntityOperation,
    original_values: &'a Option<Values>,
    has_member_changes: bool,
    entity_actions: &'a [EntityAction],
    associations: BTreeMap<String, Vec<String>>,
    original_associations: BTreeMap<String, Vec<String>>,
}

/// Compute the id-independent SHA-256 digest of `entries`
///
/// ## Returns
///
/// Hex-encoded SHA256 digest (64 characters)
///
/// ## Errors
///
/// Returns `GraphSyncError::Serialization` if JSON serialization fails.
pub fn compute_structural_digest(entries: &[ChangeSetEntry]) -> Result<String> {
    let mut labels: BTreeMap<u32, String> = BTreeMap::new();
    for entry in entries {
        let label = format!(
            "{}:{}",
            entry.entity_type,
            serde_json::to_string(&entry.values)?
        );
        labels.insert(entry.id, label);
    }
    let relabel = |map: &BTreeMap<String, Vec<u32>>| -> BTreeMap<String, Vec<String>> {
        map.iter()
            .map(|(member, ids)| {
                let mut names: Vec<String> = ids
                    .iter()
                    .map(|id| labels.get(id).cloned().unwrap_or_default())
                    .collect();
                names.sort();
                (member.clone(), names)
            })
            .collect()
    };

    let mut canonical: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        let normal = NormalEntry {
            label: labels.get(&entry.id).cloned().unwrap_or_default(),
            operation: entry.operation,
            original_values: &entry.original_values,
            has_member_changes: entry.has_member_changes,
            entity_actions: &entry.entity_actions,
            associations: relabel(&entry.associations),
            original_associations: relabel(&entry.original_associations),
        };
        canonical.push(serde_json::to_string(&normal)?);
    }
    canonical.sort();

    Ok(hash_string(&serde_json::to_string(&canonical)?))
}

/// Hash a string using SHA256.
fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
