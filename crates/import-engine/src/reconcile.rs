//! Pool delta computation between an owner's current state and a manifest.

use std::collections::HashMap;

use entitlement_store::{Pool, PoolBranding};
use manifest_reader::{ExportedPool, Manifest};
use uuid::Uuid;

/// Delta that moves an owner's pool set to mirror the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolDelta {
    pub create: Vec<Pool>,
    pub update: Vec<Pool>,
    pub retire: Vec<Uuid>,
}

impl PoolDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.retire.is_empty()
    }
}

/// Computes creates, updates, and retirements for `owner_key`.
///
/// Matching is by upstream pool id within the manifest's upstream identity.
/// Matched pools keep their id and take the manifest's derived-product,
/// derived-provided, branding, cdn, and quantity fields verbatim — the
/// manifest is authoritative for its own product graph, so nothing merges.
/// Pools from any prior import that the manifest no longer carries retire;
/// manually created pools (no source attribution) are never touched.
#[must_use]
pub fn reconcile(owner_key: &str, existing: &[Pool], manifest: &Manifest) -> PoolDelta {
    let mut unmatched: HashMap<&str, &Pool> = existing
        .iter()
        .filter(|pool| pool.source_upstream == Some(manifest.upstream.uuid))
        .filter_map(|pool| {
            pool.upstream_pool_id
                .as_deref()
                .map(|upstream_id| (upstream_id, pool))
        })
        .collect();

    let mut delta = PoolDelta::default();
    let mut matched = Vec::new();
    for exported in &manifest.pools {
        match unmatched.remove(exported.id.as_str()) {
            Some(current) => {
                matched.push(current.id);
                let updated = materialize(current.id, owner_key, exported, manifest);
                if updated != *current {
                    delta.update.push(updated);
                }
            }
            None => {
                delta
                    .create
                    .push(materialize(Uuid::new_v4(), owner_key, exported, manifest));
            }
        }
    }

    // Everything imported that the manifest no longer accounts for retires,
    // including pools left over from a prior upstream identity.
    delta.retire = existing
        .iter()
        .filter(|pool| pool.source_upstream.is_some())
        .filter(|pool| !matched.contains(&pool.id))
        .map(|pool| pool.id)
        .collect();

    tracing::debug!(
        owner = owner_key,
        create = delta.create.len(),
        update = delta.update.len(),
        retire = delta.retire.len(),
        "computed pool delta"
    );
    delta
}

fn materialize(id: Uuid, owner_key: &str, exported: &ExportedPool, manifest: &Manifest) -> Pool {
    Pool {
        id,
        owner_key: owner_key.to_string(),
        product_id: exported.product_id.clone(),
        quantity: exported.quantity,
        derived_product_id: exported.derived_product_id.clone(),
        derived_provided_product_ids: exported.derived_provided_product_ids.clone(),
        branding: exported
            .branding
            .iter()
            .map(|branding| PoolBranding {
                product_id: branding.product_id.clone(),
                name: branding.name.clone(),
            })
            .collect(),
        cdn_label: exported
            .cdn_label
            .clone()
            .or_else(|| manifest.cdn_label.clone()),
        source_upstream: Some(manifest.upstream.uuid),
        upstream_pool_id: Some(exported.id.clone()),
    }
}
