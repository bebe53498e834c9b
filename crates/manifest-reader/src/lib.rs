//! Signed export archive parsing and lightweight fixture-building utilities.
//!
//! A manifest archive is an outer tar holding a `signature` entry and a
//! zstd-compressed inner tar (`consumer_export.tar.zst`). The inner tar
//! carries the upstream identity, exported products, and exported pools as
//! JSON documents. The reader validates archive shape and identity metadata;
//! signature *trust* is established upstream and is not re-verified here.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const SIGNATURE_ENTRY: &str = "signature";
const PAYLOAD_ENTRY: &str = "consumer_export.tar.zst";
const META_ENTRY: &str = "export/meta.json";
const CONSUMER_ENTRY: &str = "export/consumer.json";
const CDN_ENTRY: &str = "export/cdn.json";
const PRODUCT_PREFIX: &str = "export/products/";
const POOL_PREFIX: &str = "export/pools/";

/// Upstream consumer identity embedded in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamIdentity {
    pub uuid: Uuid,
    pub name: String,
    pub api_url: String,
    pub web_url: String,
    /// Identity certificate, base64 (url-safe, unpadded).
    pub ident_cert: String,
}

/// Product definition exported alongside the pools that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedProduct {
    pub id: String,
    pub name: String,
}

/// Branded engineering product attached to a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    pub product_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvidedProductRef {
    product_id: String,
}

/// Entitlement pool as exported by the upstream application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPool {
    pub id: String,
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub derived_product_id: Option<String>,
    /// Ordered; the sequence is authoritative and preserved verbatim.
    #[serde(default)]
    pub derived_provided_product_ids: Vec<String>,
    #[serde(default)]
    pub branding: Vec<Branding>,
    #[serde(default)]
    pub cdn_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaDocument {
    version: u32,
    created: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdnDocument {
    label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolDocument {
    id: String,
    product_id: String,
    quantity: i64,
    #[serde(default)]
    derived_product_id: Option<String>,
    #[serde(default)]
    derived_provided_products: Vec<ProvidedProductRef>,
    #[serde(default)]
    branding: Vec<Branding>,
    #[serde(default)]
    cdn_label: Option<String>,
}

/// Fully parsed manifest, ready for conflict detection and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub upstream: UpstreamIdentity,
    /// blake3 hex digest of the decompressed inner payload.
    pub fingerprint: String,
    pub products: Vec<ExportedProduct>,
    pub pools: Vec<ExportedPool>,
    pub cdn_label: Option<String>,
    /// Origin file name recorded in import history.
    pub file_name: String,
}

/// Errors raised while validating and parsing a manifest archive.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unreadable manifest archive: {0}")]
    Unreadable(String),
    #[error("manifest archive exceeds {limit} bytes ({bytes})")]
    TooLarge { bytes: u64, limit: u64 },
    #[error("manifest archive is not signed")]
    MissingSignature,
    #[error("manifest archive is missing entry '{0}'")]
    MissingEntry(String),
    #[error("malformed manifest entry '{entry}': {detail}")]
    Malformed { entry: String, detail: String },
    #[error("upstream identity field '{0}' is missing or empty")]
    MissingIdentityField(&'static str),
    #[error("reader misconfigured: {0}")]
    Misconfigured(String),
}

/// Reader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Reject archives without a `signature` entry.
    pub require_signature: bool,
    /// Upper bound on the outer archive size, enforced before decompression.
    pub max_archive_bytes: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            require_signature: true,
            max_archive_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ReaderConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_archive_bytes == 0 {
            return Err(ValidationError::Misconfigured(
                "max_archive_bytes cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

/// Parses manifest archives into [`Manifest`] values. No side effects.
#[derive(Debug, Clone, Default)]
pub struct ManifestReader {
    config: ReaderConfig,
}

impl ManifestReader {
    pub fn new(config: ReaderConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Result<Manifest, ValidationError> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).map_err(|err| ValidationError::Unreadable(err.to_string()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "manifest".to_string());
        self.read_bytes(&file_name, &bytes)
    }

    pub fn read_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<Manifest, ValidationError> {
        if bytes.len() as u64 > self.config.max_archive_bytes {
            return Err(ValidationError::TooLarge {
                bytes: bytes.len() as u64,
                limit: self.config.max_archive_bytes,
            });
        }

        let outer = read_entries(bytes)
            .map_err(|err| ValidationError::Unreadable(err.to_string()))?;
        if self.config.require_signature && !outer.contains_key(SIGNATURE_ENTRY) {
            return Err(ValidationError::MissingSignature);
        }
        let compressed = outer
            .get(PAYLOAD_ENTRY)
            .ok_or_else(|| ValidationError::MissingEntry(PAYLOAD_ENTRY.into()))?;
        let payload = zstd::decode_all(Cursor::new(compressed)).map_err(|err| {
            ValidationError::Malformed {
                entry: PAYLOAD_ENTRY.into(),
                detail: err.to_string(),
            }
        })?;
        let fingerprint = blake3::hash(&payload).to_hex().to_string();

        let inner = read_entries(&payload)
            .map_err(|err| ValidationError::Unreadable(err.to_string()))?;
        let _meta: MetaDocument = parse_entry(&inner, META_ENTRY)?;
        let upstream = parse_identity(&inner)?;

        let mut products = Vec::new();
        let mut pools = Vec::new();
        for (name, content) in &inner {
            if name.starts_with(PRODUCT_PREFIX) {
                products.push(parse_json::<ExportedProduct>(name, content)?);
            } else if name.starts_with(POOL_PREFIX) {
                let doc = parse_json::<PoolDocument>(name, content)?;
                pools.push(ExportedPool {
                    id: doc.id,
                    product_id: doc.product_id,
                    quantity: doc.quantity,
                    derived_product_id: doc.derived_product_id,
                    derived_provided_product_ids: doc
                        .derived_provided_products
                        .into_iter()
                        .map(|provided| provided.product_id)
                        .collect(),
                    branding: doc.branding,
                    cdn_label: doc.cdn_label,
                });
            }
        }

        let cdn_label = match inner.get(CDN_ENTRY) {
            Some(content) => Some(parse_json::<CdnDocument>(CDN_ENTRY, content)?.label),
            None => None,
        };

        Ok(Manifest {
            upstream,
            fingerprint,
            products,
            pools,
            cdn_label,
            file_name: file_name.to_string(),
        })
    }
}

fn parse_identity(
    entries: &BTreeMap<String, Vec<u8>>,
) -> Result<UpstreamIdentity, ValidationError> {
    let identity: UpstreamIdentity = parse_entry(entries, CONSUMER_ENTRY)?;
    if identity.name.is_empty() {
        return Err(ValidationError::MissingIdentityField("name"));
    }
    if identity.api_url.is_empty() {
        return Err(ValidationError::MissingIdentityField("apiUrl"));
    }
    if identity.web_url.is_empty() {
        return Err(ValidationError::MissingIdentityField("webUrl"));
    }
    if identity.ident_cert.is_empty() || URL_SAFE_NO_PAD.decode(&identity.ident_cert).is_err() {
        return Err(ValidationError::MissingIdentityField("idCert"));
    }
    Ok(identity)
}

fn parse_entry<T: serde::de::DeserializeOwned>(
    entries: &BTreeMap<String, Vec<u8>>,
    name: &str,
) -> Result<T, ValidationError> {
    let content = entries
        .get(name)
        .ok_or_else(|| ValidationError::MissingEntry(name.into()))?;
    parse_json(name, content)
}

fn parse_json<T: serde::de::DeserializeOwned>(
    name: &str,
    content: &[u8],
) -> Result<T, ValidationError> {
    serde_json::from_slice(content).map_err(|err| ValidationError::Malformed {
        entry: name.into(),
        detail: err.to_string(),
    })
}

fn read_entries(bytes: &[u8]) -> std::io::Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = tar::Archive::new(Cursor::new(bytes));
    let mut entries = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content)?;
        entries.insert(name, content);
    }
    Ok(entries)
}

/// In-memory builder for manifest archives.
///
/// Primarily a fixture utility: the fixture binary and the integration tests
/// assemble deterministic archives through it, and the reader's own tests use
/// it to produce both well-formed and deliberately broken inputs.
#[derive(Debug, Clone)]
pub struct ManifestArchiveBuilder {
    upstream: UpstreamIdentity,
    products: Vec<ExportedProduct>,
    pools: Vec<ExportedPool>,
    cdn_label: Option<String>,
    signed: bool,
}

impl ManifestArchiveBuilder {
    pub fn new(upstream: UpstreamIdentity) -> Self {
        Self {
            upstream,
            products: Vec::new(),
            pools: Vec::new(),
            cdn_label: None,
            signed: true,
        }
    }

    /// Identity with deterministic urls and a syntactically valid cert.
    pub fn identity(uuid: Uuid, name: &str) -> UpstreamIdentity {
        UpstreamIdentity {
            uuid,
            name: name.to_string(),
            api_url: "api1".into(),
            web_url: "webapp1".into(),
            ident_cert: URL_SAFE_NO_PAD.encode(format!("ident-cert:{uuid}")),
        }
    }

    pub fn product(mut self, id: &str, name: &str) -> Self {
        self.products.push(ExportedProduct {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn pool(mut self, pool: ExportedPool) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn cdn_label(mut self, label: &str) -> Self {
        self.cdn_label = Some(label.into());
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut inner = tar::Builder::new(Vec::new());
        append(
            &mut inner,
            META_ENTRY,
            &serde_json::to_vec(&MetaDocument {
                version: 1,
                created: "2024-02-10T00:00:00Z".into(),
            })
            .expect("meta serializes"),
        );
        append(
            &mut inner,
            CONSUMER_ENTRY,
            &serde_json::to_vec(&self.upstream).expect("identity serializes"),
        );
        for product in &self.products {
            append(
                &mut inner,
                &format!("{PRODUCT_PREFIX}{}.json", product.id),
                &serde_json::to_vec(product).expect("product serializes"),
            );
        }
        for pool in &self.pools {
            let doc = PoolDocument {
                id: pool.id.clone(),
                product_id: pool.product_id.clone(),
                quantity: pool.quantity,
                derived_product_id: pool.derived_product_id.clone(),
                derived_provided_products: pool
                    .derived_provided_product_ids
                    .iter()
                    .map(|id| ProvidedProductRef {
                        product_id: id.clone(),
                    })
                    .collect(),
                branding: pool.branding.clone(),
                cdn_label: pool.cdn_label.clone(),
            };
            append(
                &mut inner,
                &format!("{POOL_PREFIX}{}.json", pool.id),
                &serde_json::to_vec(&doc).expect("pool serializes"),
            );
        }
        if let Some(label) = &self.cdn_label {
            append(
                &mut inner,
                CDN_ENTRY,
                &serde_json::to_vec(&CdnDocument {
                    label: label.clone(),
                })
                .expect("cdn serializes"),
            );
        }
        let payload = inner.into_inner().expect("inner archive finalizes");
        let compressed = zstd::encode_all(Cursor::new(&payload[..]), 0).expect("payload compresses");

        let mut outer = tar::Builder::new(Vec::new());
        if self.signed {
            let signature = blake3::hash(&payload);
            append(&mut outer, SIGNATURE_ENTRY, signature.as_bytes());
        }
        append(&mut outer, PAYLOAD_ENTRY, &compressed);
        outer.into_inner().expect("outer archive finalizes")
    }
}

fn append(builder: &mut tar::Builder<Vec<u8>>, name: &str, content: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    // Fixed mtime keeps fixture archives byte-stable across rebuilds.
    header.set_mtime(1_704_889_600);
    header.set_cksum();
    builder
        .append_data(&mut header, name, content)
        .expect("tar entry appends");
}
