//! Manifest fixture builder binary.
//!
//! Emits deterministic signed export archives so integration test runs can
//! import a known upstream identity, product set, and pool set.
//! With a fixed `--uuid` the emitted archive is byte-stable across rebuilds.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use manifest_reader::{
    Branding, ExportedPool, ManifestArchiveBuilder, ManifestReader, ReaderConfig,
};
use uuid::Uuid;

#[derive(Debug, Clone, ValueEnum)]
enum Scenario {
    /// One product, one plain pool.
    Simple,
    /// Derived products and a branded engineering product on every pool.
    Branded,
    /// Same content as `simple` but a second pool, for delta scenarios.
    Extended,
    /// No signature entry; exercises reader rejection paths.
    Unsigned,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Deterministic manifest fixture builder")]
struct Args {
    /// Scenario to emit.
    #[arg(long)]
    scenario: Scenario,

    /// Output path for the archive.
    #[arg(long)]
    output: PathBuf,

    /// Upstream consumer uuid; random when omitted.
    #[arg(long)]
    uuid: Option<Uuid>,

    /// Upstream distributor name embedded in the identity.
    #[arg(long, default_value = "fixture-distributor")]
    name: String,
}

fn pool(id: &str, product: &str) -> ExportedPool {
    ExportedPool {
        id: id.to_string(),
        product_id: product.to_string(),
        quantity: 10,
        derived_product_id: None,
        derived_provided_product_ids: Vec::new(),
        branding: Vec::new(),
        cdn_label: None,
    }
}

fn branded_pool(id: &str, product: &str) -> ExportedPool {
    ExportedPool {
        derived_product_id: Some("derived-product-1".to_string()),
        derived_provided_product_ids: vec!["derived-provided-1".to_string()],
        branding: vec![Branding {
            product_id: "eng-product-1".to_string(),
            name: "Branded Eng Product".to_string(),
        }],
        ..pool(id, product)
    }
}

fn build(scenario: &Scenario, uuid: Uuid, name: &str) -> Vec<u8> {
    let identity = ManifestArchiveBuilder::identity(uuid, name);
    match scenario {
        Scenario::Simple => ManifestArchiveBuilder::new(identity)
            .product("product-1", "Product One")
            .pool(pool("upstream-pool-1", "product-1"))
            .cdn_label("fixture-cdn")
            .build(),
        Scenario::Branded => ManifestArchiveBuilder::new(identity)
            .product("product-1", "Product One")
            .product("derived-product-1", "Derived Product")
            .pool(branded_pool("upstream-pool-1", "product-1"))
            .cdn_label("fixture-cdn")
            .build(),
        Scenario::Extended => ManifestArchiveBuilder::new(identity)
            .product("product-1", "Product One")
            .product("product-2", "Product Two")
            .pool(pool("upstream-pool-1", "product-1"))
            .pool(pool("upstream-pool-2", "product-2"))
            .cdn_label("fixture-cdn")
            .build(),
        Scenario::Unsigned => ManifestArchiveBuilder::new(identity)
            .product("product-1", "Product One")
            .pool(pool("upstream-pool-1", "product-1"))
            .unsigned()
            .build(),
    }
}

fn run(args: Args) -> Result<()> {
    let uuid = args.uuid.unwrap_or_else(Uuid::new_v4);
    let archive = build(&args.scenario, uuid, &args.name);
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    fs::write(&args.output, &archive)
        .with_context(|| format!("writing archive to {}", args.output.display()))?;

    // Echo the fingerprint so fixture consumers can pin expectations.
    let reader = ManifestReader::new(ReaderConfig {
        require_signature: false,
        ..ReaderConfig::default()
    })
    .context("constructing reader")?;
    let manifest = reader
        .read_bytes("fixture", &archive)
        .context("re-parsing emitted archive")?;
    println!("{} {}", uuid, manifest.fingerprint);
    Ok(())
}

fn main() -> Result<()> {
    run(Args::parse())
}
