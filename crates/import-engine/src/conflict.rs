//! Conflict detection for candidate manifests.

use std::collections::HashSet;

use entitlement_store::{ConflictCode, Owner};
use manifest_reader::Manifest;

use crate::error::ImportError;

/// Forcible conflict classes. `IN_USE` is deliberately absent: the global
/// exclusivity rule cannot be overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForceFlag {
    ManifestSame,
    DistributorConflict,
}

pub type ForceSet = HashSet<ForceFlag>;

impl ForceFlag {
    /// Parses the caller-supplied flag list against the strict whitelist.
    pub fn parse_set<S: AsRef<str>>(flags: &[S]) -> Result<ForceSet, ImportError> {
        let mut set = ForceSet::new();
        for flag in flags {
            let parsed = match flag.as_ref() {
                "MANIFEST_SAME" => Self::ManifestSame,
                "DISTRIBUTOR_CONFLICT" => Self::DistributorConflict,
                other => return Err(ImportError::UnknownForceFlag(other.to_string())),
            };
            set.insert(parsed);
        }
        Ok(set)
    }
}

/// Evaluates every conflict rule independently and returns the full set, so
/// the caller sees all applicable conflicts in one round trip.
///
/// `holder` is the owner currently bound to the manifest's upstream uuid, as
/// read from the store's uuid map. When that holder is a different owner the
/// result is `[IN_USE]` alone: the exclusivity violation trumps everything
/// and no force flag applies.
#[must_use]
pub fn detect(
    owner: &Owner,
    manifest: &Manifest,
    force: &ForceSet,
    holder: Option<&str>,
) -> Vec<ConflictCode> {
    if let Some(holder) = holder {
        if holder != owner.key {
            return vec![ConflictCode::InUse];
        }
    }

    let mut conflicts = Vec::new();
    if let Some(upstream) = &owner.upstream {
        let same_fingerprint =
            owner.last_imported_fingerprint.as_deref() == Some(manifest.fingerprint.as_str());
        if same_fingerprint && !force.contains(&ForceFlag::ManifestSame) {
            conflicts.push(ConflictCode::ManifestSame);
        }
        if upstream.uuid != manifest.upstream.uuid
            && !force.contains(&ForceFlag::DistributorConflict)
        {
            conflicts.push(ConflictCode::DistributorConflict);
        }
    }
    conflicts
}
