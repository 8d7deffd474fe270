//! Catalog acquisition: backend API first, local snapshot file next, baked-in
//! seed data last. The seed source never fails, so callers always get a
//! catalog to filter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use tukangin_core::{Category, Provider, ServiceListing};
use tukangin_filter::{FilterPreset, LocationFilter, PresetFilters};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tukangin-catalog";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub backend_url: Option<String>,
    pub catalog_path: PathBuf,
    pub presets_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        Self {
            backend_url: std::env::var("TUKANGIN_BACKEND_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            catalog_path: std::env::var("TUKANGIN_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./fixtures/catalog.json")),
            presets_path: std::env::var("TUKANGIN_PRESETS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./presets.yaml")),
            user_agent: std::env::var("TUKANGIN_USER_AGENT")
                .unwrap_or_else(|_| "tukangin-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("TUKANGIN_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogOrigin {
    Backend,
    File,
    Seed,
}

impl CatalogOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogOrigin::Backend => "backend",
            CatalogOrigin::File => "file",
            CatalogOrigin::Seed => "seed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub origin: CatalogOrigin,
    pub listings: Vec<ServiceListing>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn origin(&self) -> CatalogOrigin;
    async fn load(&self) -> Result<Vec<ServiceListing>, CatalogError>;
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..attempt_index {
            delay = delay.saturating_mul(2);
            if delay >= self.max_delay {
                return self.max_delay;
            }
        }
        delay.min(self.max_delay)
    }
}

/// Fetches the marketplace catalog from the backend listing API.
#[derive(Debug)]
pub struct BackendCatalogSource {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl BackendCatalogSource {
    pub fn new(
        base_url: String,
        timeout: Duration,
        user_agent: &str,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    async fn fetch_listings(&self) -> Result<Vec<ServiceListing>, CatalogError> {
        let url = format!("{}/services/search", self.base_url.trim_end_matches('/'));
        let request_id = Uuid::new_v4();
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.retry.max_retries {
            debug!(%request_id, url = %url, attempt, "fetching catalog from backend");

            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let listings = resp.json::<Vec<ServiceListing>>().await?;
                        debug!(%request_id, count = listings.len(), "backend catalog fetched");
                        return Ok(listings);
                    }

                    if should_retry_status(status) && attempt < self.retry.max_retries {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(CatalogError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if should_retry_error(&err) && attempt < self.retry.max_retries {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(CatalogError::Request(err));
                }
            }
        }

        Err(CatalogError::Request(
            last_request_error.expect("retry loop always captures the request error"),
        ))
    }
}

#[async_trait]
impl CatalogSource for BackendCatalogSource {
    fn origin(&self) -> CatalogOrigin {
        CatalogOrigin::Backend
    }

    async fn load(&self) -> Result<Vec<ServiceListing>, CatalogError> {
        self.fetch_listings().await
    }
}

/// On-disk catalog snapshot format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub version: u32,
    pub listings: Vec<ServiceListing>,
}

#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    fn origin(&self) -> CatalogOrigin {
        CatalogOrigin::File
    }

    async fn load(&self) -> Result<Vec<ServiceListing>, CatalogError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let file: CatalogFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        debug!(
            version = file.version,
            count = file.listings.len(),
            path = %self.path.display(),
            "catalog file loaded"
        );
        Ok(file.listings)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeedCatalogSource;

#[async_trait]
impl CatalogSource for SeedCatalogSource {
    fn origin(&self) -> CatalogOrigin {
        CatalogOrigin::Seed
    }

    async fn load(&self) -> Result<Vec<ServiceListing>, CatalogError> {
        Ok(seed_listings())
    }
}

fn configured_sources(config: &CatalogConfig) -> Vec<Box<dyn CatalogSource>> {
    let mut sources: Vec<Box<dyn CatalogSource>> = Vec::new();
    if let Some(base_url) = &config.backend_url {
        match BackendCatalogSource::new(
            base_url.clone(),
            config.http_timeout(),
            &config.user_agent,
            RetryPolicy::default(),
        ) {
            Ok(source) => sources.push(Box::new(source)),
            Err(err) => warn!(error = %err, "backend catalog source unavailable"),
        }
    }
    sources.push(Box::new(FileCatalogSource::new(config.catalog_path.clone())));
    sources.push(Box::new(SeedCatalogSource));
    sources
}

/// Load the catalog from the first source that yields listings. Sources are
/// tried in priority order; a failing or empty source logs and falls through.
pub async fn load_catalog(config: &CatalogConfig) -> CatalogSnapshot {
    for source in configured_sources(config) {
        match source.load().await {
            Ok(listings) if !listings.is_empty() => {
                info!(
                    origin = source.origin().as_str(),
                    count = listings.len(),
                    "catalog loaded"
                );
                return CatalogSnapshot {
                    origin: source.origin(),
                    listings,
                    loaded_at: Utc::now(),
                };
            }
            Ok(_) => warn!(origin = source.origin().as_str(), "catalog source returned no listings"),
            Err(err) => {
                warn!(origin = source.origin().as_str(), error = %err, "catalog source failed")
            }
        }
    }

    // The seed source is last in the chain and infallible, so the loop always
    // returns before reaching here.
    CatalogSnapshot {
        origin: CatalogOrigin::Seed,
        listings: seed_listings(),
        loaded_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PresetsFile {
    version: u32,
    #[serde(default)]
    presets: Vec<FilterPreset>,
}

pub fn load_presets(path: &Path) -> anyhow::Result<Vec<FilterPreset>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: PresetsFile =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    debug!(
        version = file.version,
        count = file.presets.len(),
        path = %path.display(),
        "presets loaded"
    );
    Ok(file.presets)
}

/// Presets from the configured file, or the built-in set when the file is
/// missing, unparseable, or empty.
pub fn load_presets_or_default(path: &Path) -> Vec<FilterPreset> {
    match load_presets(path) {
        Ok(presets) if !presets.is_empty() => presets,
        Ok(_) => {
            warn!(path = %path.display(), "presets file is empty, using built-in presets");
            default_presets()
        }
        Err(err) => {
            warn!(error = %err, "could not load presets, using built-in presets");
            default_presets()
        }
    }
}

pub fn default_presets() -> Vec<FilterPreset> {
    vec![
        FilterPreset {
            id: "termurah".to_string(),
            name: "Termurah".to_string(),
            filters: PresetFilters {
                price_max: Some(200_000),
                ..PresetFilters::default()
            },
        },
        FilterPreset {
            id: "terdekat".to_string(),
            name: "Terdekat".to_string(),
            filters: PresetFilters {
                location: Some(LocationFilter::In("Jakarta Selatan".to_string())),
                ..PresetFilters::default()
            },
        },
        FilterPreset {
            id: "rating-tinggi".to_string(),
            name: "Rating Tinggi".to_string(),
            filters: PresetFilters {
                min_rating: Some(4.5),
                ..PresetFilters::default()
            },
        },
    ]
}

fn seed(
    id: &str,
    title: &str,
    category: Category,
    provider: &str,
    location: &str,
    available: bool,
    price: u64,
    rating: f64,
) -> ServiceListing {
    ServiceListing {
        id: id.to_string(),
        title: title.to_string(),
        category,
        provider: Provider {
            name: provider.to_string(),
            rating,
            location: location.to_string(),
            available,
        },
        price,
        rating,
    }
}

/// Built-in demo catalog. Covers every category and sits mostly inside the
/// price slider's domain, with one listing above it.
pub fn seed_listings() -> Vec<ServiceListing> {
    vec![
        seed(
            "svc-001",
            "Service AC Rumah & Kantor",
            Category::Cooling,
            "Pak Budi Teknik",
            "Jakarta Selatan",
            true,
            150_000,
            4.8,
        ),
        seed(
            "svc-002",
            "Instalasi Listrik Rumah Baru",
            Category::Electrical,
            "Bengkel Listrik Ahmad",
            "Jakarta Timur",
            true,
            350_000,
            4.9,
        ),
        seed(
            "svc-003",
            "Perbaikan Pipa Bocor",
            Category::Plumbing,
            "CV Ledeng Jaya",
            "Depok",
            true,
            120_000,
            4.5,
        ),
        seed(
            "svc-004",
            "Pembersihan Rumah Menyeluruh",
            Category::Cleaning,
            "Bu Sari Bersih",
            "Tangerang",
            true,
            200_000,
            4.2,
        ),
        seed(
            "svc-005",
            "Renovasi Dapur Komplit",
            Category::Renovation,
            "CV Bangun Karya",
            "Bekasi",
            true,
            2_500_000,
            4.7,
        ),
        seed(
            "svc-006",
            "Perbaikan Atap Bocor",
            Category::Home,
            "Pak Joko Renov",
            "Jakarta Selatan",
            true,
            450_000,
            4.4,
        ),
        seed(
            "svc-007",
            "Cuci AC Split",
            Category::Cooling,
            "Adi Jaya Teknik",
            "Bandung",
            true,
            85_000,
            4.6,
        ),
        seed(
            "svc-008",
            "Pasang Saklar & Stop Kontak",
            Category::Electrical,
            "Pak Darto Listrik",
            "Jakarta Selatan",
            true,
            95_000,
            4.3,
        ),
        seed(
            "svc-009",
            "Sedot WC & Saluran Mampet",
            Category::Plumbing,
            "Sedot WC Express",
            "Jakarta Timur",
            false,
            300_000,
            4.1,
        ),
        seed(
            "svc-010",
            "Deep Cleaning Kamar Mandi",
            Category::Cleaning,
            "KlinKlin Home",
            "Depok",
            true,
            175_000,
            4.9,
        ),
        seed(
            "svc-011",
            "Pengecatan Dinding Interior",
            Category::Renovation,
            "Warna Karya",
            "Tangerang",
            true,
            600_000,
            4.5,
        ),
        seed(
            "svc-012",
            "Servis Kulkas & Mesin Cuci",
            Category::Home,
            "Pak Budi Teknik",
            "Jakarta Selatan",
            true,
            180_000,
            4.8,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tukangin_filter::{FilterState, PRICE_RANGE_CEILING};

    #[test]
    fn seed_covers_every_category() {
        let listings = seed_listings();
        for category in Category::ALL {
            assert!(
                listings.iter().any(|l| l.category == category),
                "no seed listing for {}",
                category.slug()
            );
        }
    }

    #[test]
    fn seed_includes_a_listing_above_the_price_slider() {
        assert!(seed_listings()
            .iter()
            .any(|l| l.price > PRICE_RANGE_CEILING));
    }

    #[test]
    fn seed_ids_are_unique() {
        let listings = seed_listings();
        for (i, a) in listings.iter().enumerate() {
            for b in &listings[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }

    #[test]
    fn default_presets_all_change_the_default_state() {
        let presets = default_presets();
        assert_eq!(presets.len(), 3);
        for preset in &presets {
            let state = FilterState::default().apply_preset(preset);
            assert!(!state.is_default(), "preset {} is a no-op", preset.id);
        }
        let ids: Vec<&str> = presets.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["termurah", "terdekat", "rating-tinggi"]);
    }

    #[test]
    fn retry_delays_double_and_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn file_source_parses_a_catalog_snapshot() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        let file = CatalogFile {
            version: 1,
            listings: seed_listings(),
        };
        std::fs::write(&path, serde_json::to_vec_pretty(&file).expect("serialize"))
            .expect("write catalog");

        let listings = FileCatalogSource::new(&path).load().await.expect("load");
        assert_eq!(listings.len(), seed_listings().len());
        assert_eq!(listings[0].id, "svc-001");
    }

    #[tokio::test]
    async fn missing_file_and_no_backend_fall_back_to_seed() {
        let dir = tempdir().expect("tempdir");
        let config = CatalogConfig {
            backend_url: None,
            catalog_path: dir.path().join("no-such-catalog.json"),
            presets_path: dir.path().join("no-such-presets.yaml"),
            user_agent: "test".to_string(),
            http_timeout_secs: 1,
        };
        let snapshot = load_catalog(&config).await;
        assert_eq!(snapshot.origin, CatalogOrigin::Seed);
        assert!(!snapshot.listings.is_empty());
    }

    #[tokio::test]
    async fn present_file_wins_over_seed() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        let file = CatalogFile {
            version: 1,
            listings: vec![seed(
                "only-one",
                "Pasang Keran Dapur",
                Category::Plumbing,
                "Pak Tono",
                "Bogor",
                true,
                60_000,
                4.0,
            )],
        };
        std::fs::write(&path, serde_json::to_vec(&file).expect("serialize")).expect("write");

        let config = CatalogConfig {
            backend_url: None,
            catalog_path: path,
            presets_path: dir.path().join("presets.yaml"),
            user_agent: "test".to_string(),
            http_timeout_secs: 1,
        };
        let snapshot = load_catalog(&config).await;
        assert_eq!(snapshot.origin, CatalogOrigin::File);
        assert_eq!(snapshot.listings.len(), 1);
        assert_eq!(snapshot.listings[0].id, "only-one");
    }

    #[tokio::test]
    async fn empty_file_falls_through_to_seed() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{"version":1,"listings":[]}"#).expect("write");

        let config = CatalogConfig {
            backend_url: None,
            catalog_path: path,
            presets_path: dir.path().join("presets.yaml"),
            user_agent: "test".to_string(),
            http_timeout_secs: 1,
        };
        let snapshot = load_catalog(&config).await;
        assert_eq!(snapshot.origin, CatalogOrigin::Seed);
    }

    #[test]
    fn presets_file_parses_and_falls_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("presets.yaml");
        std::fs::write(
            &path,
            r#"
version: 1
presets:
  - id: murah-meriah
    name: Murah Meriah
    filters:
      price_max: 150000
"#,
        )
        .expect("write presets");

        let presets = load_presets(&path).expect("load");
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].id, "murah-meriah");
        assert_eq!(presets[0].filters.price_max, Some(150_000));

        let fallback = load_presets_or_default(&dir.path().join("missing.yaml"));
        assert_eq!(fallback.len(), default_presets().len());
    }
}
