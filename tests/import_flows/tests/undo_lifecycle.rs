//! Undo flows: resetting an owner and releasing its upstream binding.

mod common;

use std::time::Duration;

use common::{api, simple_archive};
use entitlement_store::{EntitlementStore, ImportStatus, Pool};
use uuid::Uuid;

#[tokio::test]
async fn undo_resets_the_owner_and_frees_the_uuid() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    store.create_owner("other").expect("owner exists");
    let uuid = Uuid::new_v4();
    let bytes = simple_archive(uuid);
    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect("import succeeds");

    // While bound, the other owner cannot take the uuid.
    api.import_sync_bytes("other", "export.tar", &bytes, &[])
        .expect_err("uuid is held");

    let handle = api.undo_import("acme").await.expect("undo submits");
    handle
        .wait_terminal(Duration::from_secs(5))
        .await
        .expect("undo terminates");

    let owner = store.owner("acme").expect("owner loads");
    assert!(owner.upstream.is_none());
    assert!(owner.last_imported_fingerprint.is_none());
    assert!(store.pools_for_owner("acme").is_empty());

    let history = api.get_imports("acme").expect("history loads");
    let last = history.last().expect("undo recorded");
    assert_eq!(last.status, ImportStatus::Delete);
    assert_eq!(last.message, "acme import undone.");

    // The released uuid imports cleanly elsewhere, no force needed.
    api.import_sync_bytes("other", "export.tar", &bytes, &[])
        .expect("released uuid imports elsewhere");
}

#[tokio::test]
async fn undo_then_reimport_by_the_same_owner_needs_no_force() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let bytes = simple_archive(Uuid::new_v4());
    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect("import succeeds");

    let handle = api.undo_import("acme").await.expect("undo submits");
    handle
        .wait_terminal(Duration::from_secs(5))
        .await
        .expect("undo terminates");

    // The fingerprint was cleared with the binding, so the same bytes
    // no longer read as a re-import.
    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect("re-import after undo succeeds");
    assert_eq!(store.pools_for_owner("acme").len(), 1);
}

#[tokio::test]
async fn undo_spares_manual_pools() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let manual_id = Uuid::new_v4();
    store
        .upsert_pool(Pool {
            id: manual_id,
            owner_key: "acme".to_string(),
            product_id: "local-product".to_string(),
            quantity: 2,
            derived_product_id: None,
            derived_provided_product_ids: Vec::new(),
            branding: Vec::new(),
            cdn_label: None,
            source_upstream: None,
            upstream_pool_id: None,
        })
        .expect("manual pool inserts");
    api.import_sync_bytes("acme", "export.tar", &simple_archive(Uuid::new_v4()), &[])
        .expect("import succeeds");
    assert_eq!(store.pools_for_owner("acme").len(), 2);

    let handle = api.undo_import("acme").await.expect("undo submits");
    handle
        .wait_terminal(Duration::from_secs(5))
        .await
        .expect("undo terminates");

    let pools = store.pools_for_owner("acme");
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].id, manual_id);
}

#[tokio::test]
async fn undo_without_a_prior_import_is_a_quiet_no_op() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");

    let handle = api.undo_import("acme").await.expect("undo submits");
    let state = handle
        .wait_terminal(Duration::from_secs(5))
        .await
        .expect("undo terminates");
    assert_eq!(state.name(), "FINISHED");

    // Nothing to undo, nothing recorded.
    assert!(api.get_imports("acme").expect("history loads").is_empty());
}
