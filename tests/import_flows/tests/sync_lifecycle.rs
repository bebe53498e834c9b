//! End-to-end synchronous import lifecycle.

mod common;

use common::{api, branded_pool, plain_pool, simple_archive};
use entitlement_store::{EntitlementStore, ImportStatus, Pool};
use import_engine::MANIFEST_SAME_MESSAGE;
use manifest_reader::ManifestArchiveBuilder;
use uuid::Uuid;

#[test]
fn first_import_binds_upstream_and_creates_pools() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let uuid = Uuid::new_v4();

    let record = api
        .import_sync_bytes("acme", "export.tar", &simple_archive(uuid), &[])
        .expect("import succeeds");
    assert_eq!(record.status, ImportStatus::Success);
    assert_eq!(record.message, "acme file imported successfully.");
    assert_eq!(record.upstream_uuid, Some(uuid));
    assert_eq!(record.file_name, "export.tar");
    assert_eq!(record.generated_by, "admin");

    let owner = store.owner("acme").expect("owner loads");
    let upstream = owner.upstream.expect("upstream recorded");
    assert_eq!(upstream.uuid, uuid);
    assert_eq!(upstream.name, "distributor");
    assert_eq!(upstream.api_url, "api1");
    assert_eq!(upstream.web_url, "webapp1");
    assert!(owner.last_imported_fingerprint.is_some());

    let pools = store.pools_for_owner("acme");
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].product_id, "product-1");
    assert_eq!(pools[0].quantity, 10);
    assert_eq!(pools[0].source_upstream, Some(uuid));
    assert_eq!(pools[0].upstream_pool_id.as_deref(), Some("up-1"));
}

#[test]
fn identical_reimport_conflicts_and_changes_nothing() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let bytes = simple_archive(Uuid::new_v4());
    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect("first import succeeds");
    let pools_before = store.pools_for_owner("acme");
    let fingerprint_before = store
        .owner("acme")
        .expect("owner loads")
        .last_imported_fingerprint;

    let err = api
        .import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect_err("same manifest conflicts");
    assert_eq!(err.status_code(), 409);
    assert_eq!(err.body()["conflicts"][0], "MANIFEST_SAME");

    assert_eq!(store.pools_for_owner("acme"), pools_before);
    let owner = store.owner("acme").expect("owner loads");
    assert_eq!(owner.last_imported_fingerprint, fingerprint_before);
}

#[test]
fn forced_reimport_of_the_same_manifest_succeeds() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let bytes = simple_archive(Uuid::new_v4());
    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect("first import succeeds");

    let record = api
        .import_sync_bytes(
            "acme",
            "export.tar",
            &bytes,
            &["MANIFEST_SAME".to_string()],
        )
        .expect("forced re-import succeeds");
    assert_eq!(record.status, ImportStatus::Success);
    assert_eq!(store.pools_for_owner("acme").len(), 1);
}

#[test]
fn updated_manifest_reconciles_pools_in_place() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let uuid = Uuid::new_v4();
    let identity = ManifestArchiveBuilder::identity(uuid, "distributor");

    let first = ManifestArchiveBuilder::new(identity.clone())
        .product("product-1", "Product One")
        .product("product-2", "Product Two")
        .pool(plain_pool("up-1", "product-1", 10))
        .pool(plain_pool("up-2", "product-2", 4))
        .build();
    api.import_sync_bytes("acme", "export.tar", &first, &[])
        .expect("first import succeeds");
    let kept_id = store
        .pools_for_owner("acme")
        .iter()
        .find(|p| p.upstream_pool_id.as_deref() == Some("up-1"))
        .expect("pool materialized")
        .id;

    // up-1 changes quantity, up-2 disappears, up-3 is new.
    let second = ManifestArchiveBuilder::new(identity)
        .product("product-1", "Product One")
        .product("product-3", "Product Three")
        .pool(plain_pool("up-1", "product-1", 50))
        .pool(plain_pool("up-3", "product-3", 7))
        .build();
    api.import_sync_bytes("acme", "export.tar", &second, &[])
        .expect("second import succeeds");

    let pools = store.pools_for_owner("acme");
    assert_eq!(pools.len(), 2);
    let kept = pools
        .iter()
        .find(|p| p.upstream_pool_id.as_deref() == Some("up-1"))
        .expect("matched pool survives");
    assert_eq!(kept.id, kept_id, "matched pools keep their local identity");
    assert_eq!(kept.quantity, 50);
    assert!(pools
        .iter()
        .all(|p| p.upstream_pool_id.as_deref() != Some("up-2")));
    assert!(pools
        .iter()
        .any(|p| p.upstream_pool_id.as_deref() == Some("up-3")));
}

#[test]
fn branding_and_derived_data_are_materialized_verbatim() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let uuid = Uuid::new_v4();
    let bytes = ManifestArchiveBuilder::new(ManifestArchiveBuilder::identity(uuid, "distributor"))
        .product("product-1", "Product One")
        .pool(branded_pool("up-1", "product-1"))
        .cdn_label("cdn-east")
        .build();

    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect("import succeeds");

    let pools = store.pools_for_owner("acme");
    let pool = pools.first().expect("pool materialized");
    assert_eq!(pool.derived_product_id.as_deref(), Some("derived-1"));
    assert_eq!(pool.derived_provided_product_ids, vec!["dp-a", "dp-b"]);
    assert_eq!(pool.branding.len(), 1);
    assert_eq!(pool.branding[0].product_id, "eng-1");
    assert_eq!(pool.branding[0].name, "Branded Product");
    // Pool carries no label of its own, so the manifest-level label applies.
    assert_eq!(pool.cdn_label.as_deref(), Some("cdn-east"));
}

#[test]
fn manual_pools_survive_every_import() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let manual_id = Uuid::new_v4();
    store
        .upsert_pool(Pool {
            id: manual_id,
            owner_key: "acme".to_string(),
            product_id: "local-product".to_string(),
            quantity: 3,
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

    let pools = store.pools_for_owner("acme");
    assert_eq!(pools.len(), 2);
    assert!(pools.iter().any(|p| p.id == manual_id));
}

#[test]
fn history_records_every_attempt_in_order() {
    let (store, api) = api();
    store.create_owner("acme").expect("owner exists");
    let bytes = simple_archive(Uuid::new_v4());

    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect("first import succeeds");
    api.import_sync_bytes("acme", "export.tar", &bytes, &[])
        .expect_err("same manifest conflicts");

    let history = api.get_imports("acme").expect("history loads");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, ImportStatus::Success);
    assert_eq!(history[1].status, ImportStatus::Conflict);
    assert_eq!(history[1].message, MANIFEST_SAME_MESSAGE);
    assert_eq!(
        history[1].conflicts,
        vec![entitlement_store::ConflictCode::ManifestSame]
    );
}

#[test]
fn history_for_unknown_owner_is_not_found() {
    let (_, api) = api();
    let err = api.get_imports("ghost").expect_err("unknown owner fails");
    assert_eq!(err.status_code(), 404);
}
