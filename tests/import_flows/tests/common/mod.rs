//! Shared fixtures for the import flow tests.
#![allow(dead_code)]

use std::sync::Arc;

use entitlement_store::MemoryStore;
use import_engine::ImportConfig;
use manifest_reader::{Branding, ExportedPool, ManifestArchiveBuilder};
use runtime_api::ImportApi;
use runtime_jobs::{SharedScheduler, TokioScheduler};
use uuid::Uuid;

pub fn plain_pool(id: &str, product: &str, quantity: i64) -> ExportedPool {
    ExportedPool {
        id: id.to_string(),
        product_id: product.to_string(),
        quantity,
        derived_product_id: None,
        derived_provided_product_ids: Vec::new(),
        branding: Vec::new(),
        cdn_label: None,
    }
}

pub fn branded_pool(id: &str, product: &str) -> ExportedPool {
    ExportedPool {
        derived_product_id: Some("derived-1".to_string()),
        derived_provided_product_ids: vec!["dp-a".to_string(), "dp-b".to_string()],
        branding: vec![Branding {
            product_id: "eng-1".to_string(),
            name: "Branded Product".to_string(),
        }],
        ..plain_pool(id, product, 25)
    }
}

/// Archive with one plain pool for the given upstream uuid.
pub fn simple_archive(uuid: Uuid) -> Vec<u8> {
    ManifestArchiveBuilder::new(ManifestArchiveBuilder::identity(uuid, "distributor"))
        .product("product-1", "Product One")
        .pool(plain_pool("up-1", "product-1", 10))
        .build()
}

pub fn api() -> (Arc<MemoryStore>, ImportApi) {
    api_with_config(ImportConfig::default())
}

pub fn api_with_config(config: ImportConfig) -> (Arc<MemoryStore>, ImportApi) {
    let store = Arc::new(MemoryStore::new());
    let scheduler: SharedScheduler = Arc::new(TokioScheduler);
    let api = ImportApi::new(store.clone(), config, scheduler).expect("api constructs");
    (store, api)
}
