//! Axum + Askama marketplace UI: filter panel, chip row, faceted sidebar,
//! and a JSON search API, all driven by the same filter engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;
use tukangin_catalog::{
    load_catalog, load_presets_or_default, CatalogConfig, CatalogOrigin, CatalogSnapshot,
};
use tukangin_core::{format_rupiah, Category, ServiceListing};
use tukangin_filter::{
    CategoryFilter, FilterChip, FilterPreset, FilterRequest, FilterState, LocationFilter,
    Predicate, PredicateKind, SortKey,
};

pub const CRATE_NAME: &str = "tukangin-web";

#[derive(Clone)]
pub struct AppState {
    pub workspace_root: PathBuf,
    pub catalog: CatalogConfig,
}

impl AppState {
    pub fn new(workspace_root: impl Into<PathBuf>, catalog: CatalogConfig) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            catalog,
        }
    }
}

/// Raw marketplace query string. Filter fields stay strings so that garbled
/// values degrade to "no constraint" instead of a 400.
#[derive(Debug, Clone, Default, Deserialize)]
struct MarketplaceQuery {
    preset: Option<String>,
    category: Option<String>,
    location: Option<String>,
    price_min: Option<String>,
    price_max: Option<String>,
    min_rating: Option<String>,
    q: Option<String>,
    sort: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

impl MarketplaceQuery {
    fn filter_request(&self) -> FilterRequest {
        FilterRequest {
            preset: self.preset.clone(),
            category: self.category.clone(),
            location: self.location.clone(),
            price_min: self.price_min.clone(),
            price_max: self.price_max.clone(),
            min_rating: self.min_rating.clone(),
            query: self.q.clone(),
            sort: self.sort.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct ListingCard {
    href: String,
    title: String,
    category_label: String,
    provider_name: String,
    location: String,
    available: bool,
    price_text: String,
    rating_text: String,
}

#[derive(Debug, Clone)]
struct ChipView {
    label: String,
    remove_href: String,
}

#[derive(Debug, Clone)]
struct FacetRow {
    label: String,
    count: usize,
    selected: bool,
    href: String,
}

#[derive(Debug, Clone)]
struct PresetRow {
    id: String,
    name: String,
    active: bool,
    href: String,
}

#[derive(Debug, Clone)]
struct SortOptionRow {
    label: String,
    selected: bool,
    href: String,
}

#[derive(Debug, Clone)]
struct CategoryOptionRow {
    slug: String,
    label: String,
    selected: bool,
}

/// Prefill values for the filter panel form.
#[derive(Debug, Clone)]
struct FormView {
    category_options: Vec<CategoryOptionRow>,
    location: String,
    price_min: String,
    price_max: String,
    min_rating: String,
    q: String,
    sort: String,
}

/// Everything the marketplace page and its partials render, derived in one
/// pass from the filter state so chips, facets, and results always agree.
#[derive(Debug, Clone)]
struct MarketplaceView {
    form: FormView,
    chips: Vec<ChipView>,
    has_filters: bool,
    presets: Vec<PresetRow>,
    category_facets: Vec<FacetRow>,
    location_facets: Vec<FacetRow>,
    sort_options: Vec<SortOptionRow>,
    listings: Vec<ListingCard>,
    count_line: String,
    page: usize,
    total_pages: usize,
    has_prev: bool,
    prev_href: String,
    has_next: bool,
    next_href: String,
    reset_href: String,
    catalog_origin: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total_listings: usize,
    categories: Vec<FacetRow>,
    presets: Vec<PresetRow>,
}

#[derive(Template)]
#[template(path = "marketplace.html")]
struct MarketplaceTemplate {
    view: MarketplaceView,
}

#[derive(Template)]
#[template(path = "marketplace_results_partial.html")]
struct MarketplaceResultsPartialTemplate {
    view: MarketplaceView,
}

#[derive(Template)]
#[template(path = "marketplace_facets_partial.html")]
struct MarketplaceFacetsPartialTemplate {
    view: MarketplaceView,
}

#[derive(Template)]
#[template(path = "listing_detail.html")]
struct ListingDetailTemplate {
    listing: ListingCard,
    category_href: String,
    provider_rating_text: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    total: usize,
    sort: String,
    origin: CatalogOrigin,
    filters: Vec<FilterChip>,
    listings: Vec<ServiceListing>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/marketplace", get(marketplace_page_handler))
        .route("/marketplace/results", get(marketplace_results_handler))
        .route("/marketplace/facets", get(marketplace_facets_handler))
        .route("/marketplace/{id}", get(listing_detail_handler))
        .route("/api/search", get(api_search_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("TUKANGIN_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let state = AppState::new(".", CatalogConfig::from_env());
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "marketplace web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = load_catalog(&state.catalog).await;
    let presets = load_presets_or_default(&state.catalog.presets_path);

    let everything = FilterState::default();
    let categories = Category::ALL
        .iter()
        .map(|&category| {
            let with =
                everything.set_predicate(Predicate::Category(CategoryFilter::Only(category)));
            FacetRow {
                label: category.label().to_string(),
                count: with.evaluate(&snapshot.listings).count(),
                selected: false,
                href: marketplace_href(&with, SortKey::Recommended),
            }
        })
        .collect();

    render_html(IndexTemplate {
        total_listings: snapshot.listings.len(),
        categories,
        presets: preset_rows(&presets, &everything, SortKey::Recommended),
    })
}

async fn marketplace_page_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Response {
    let snapshot = load_catalog(&state.catalog).await;
    let presets = load_presets_or_default(&state.catalog.presets_path);
    let view = build_marketplace_view(&snapshot, &presets, &query);
    render_html(MarketplaceTemplate { view })
}

async fn marketplace_results_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Response {
    let snapshot = load_catalog(&state.catalog).await;
    let presets = load_presets_or_default(&state.catalog.presets_path);
    let view = build_marketplace_view(&snapshot, &presets, &query);
    let mut resp = render_html(MarketplaceResultsPartialTemplate { view });
    resp.headers_mut().insert(
        header::HeaderName::from_static("hx-trigger"),
        header::HeaderValue::from_static("marketplaceResultsLoaded"),
    );
    resp
}

async fn marketplace_facets_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Response {
    let snapshot = load_catalog(&state.catalog).await;
    let presets = load_presets_or_default(&state.catalog.presets_path);
    let view = build_marketplace_view(&snapshot, &presets, &query);
    render_html(MarketplaceFacetsPartialTemplate { view })
}

async fn listing_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let snapshot = load_catalog(&state.catalog).await;
    match snapshot.listings.iter().find(|l| l.id == id) {
        Some(listing) => {
            let category_state = FilterState::default()
                .set_predicate(Predicate::Category(CategoryFilter::Only(listing.category)));
            render_html(ListingDetailTemplate {
                category_href: marketplace_href(&category_state, SortKey::Recommended),
                provider_rating_text: format!("{:.1}", listing.provider.rating),
                listing: listing_card(listing),
            })
        }
        None => (
            StatusCode::NOT_FOUND,
            Html("Layanan tidak ditemukan".to_string()),
        )
            .into_response(),
    }
}

async fn api_search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Response {
    let snapshot = load_catalog(&state.catalog).await;
    let presets = load_presets_or_default(&state.catalog.presets_path);
    let (filter, sort) = query.filter_request().resolve(&presets);

    let mut rows: Vec<&ServiceListing> = filter.evaluate(&snapshot.listings).collect();
    sort.apply(&mut rows);
    let listings: Vec<ServiceListing> = rows.into_iter().cloned().collect();

    Json(SearchResponse {
        total: listings.len(),
        sort: sort.as_str().to_string(),
        origin: snapshot.origin,
        filters: filter.chips(),
        listings,
    })
    .into_response()
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Html("/* missing app.css */".to_string()),
        )
            .into_response(),
    }
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

fn listing_card(listing: &ServiceListing) -> ListingCard {
    ListingCard {
        href: format!("/marketplace/{}", listing.id),
        title: listing.title.clone(),
        category_label: listing.category.label().to_string(),
        provider_name: listing.provider.name.clone(),
        location: listing.provider.location.clone(),
        available: listing.provider.available,
        price_text: format_rupiah(listing.price),
        rating_text: format!("{:.1}", listing.rating),
    }
}

fn query_pairs(state: &FilterState, sort: SortKey) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(category) = state.category() {
        pairs.push(("category", category.slug().to_string()));
    }
    if let Some(location) = state.location() {
        pairs.push(("location", location.to_string()));
    }
    if let Some(range) = state.price() {
        pairs.push(("price_min", range.min.to_string()));
        pairs.push(("price_max", range.max.to_string()));
    }
    if let Some(rating) = state.min_rating() {
        pairs.push(("min_rating", rating.to_string()));
    }
    if let Some(q) = state.query() {
        pairs.push(("q", q.to_string()));
    }
    if sort != SortKey::Recommended {
        pairs.push(("sort", sort.as_str().to_string()));
    }
    pairs
}

fn marketplace_href_paged(state: &FilterState, sort: SortKey, page: usize) -> String {
    let mut pairs = query_pairs(state, sort);
    if page > 1 {
        pairs.push(("page", page.to_string()));
    }
    if pairs.is_empty() {
        return "/marketplace".to_string();
    }
    let encoded = serde_urlencoded::to_string(&pairs).expect("query pairs always serialize");
    format!("/marketplace?{encoded}")
}

fn marketplace_href(state: &FilterState, sort: SortKey) -> String {
    marketplace_href_paged(state, sort, 1)
}

fn preset_rows(presets: &[FilterPreset], state: &FilterState, sort: SortKey) -> Vec<PresetRow> {
    presets
        .iter()
        .map(|preset| {
            let next = state.apply_preset(preset);
            PresetRow {
                id: preset.id.clone(),
                name: preset.name.clone(),
                active: next == *state,
                href: marketplace_href(&next, sort),
            }
        })
        .collect()
}

/// Facet counts are computed with the facet's own dimension removed, so each
/// row answers "what would I get if I picked this" under the other filters.
fn category_facets(
    listings: &[ServiceListing],
    state: &FilterState,
    sort: SortKey,
) -> Vec<FacetRow> {
    let base = state.remove_predicate(PredicateKind::Category);
    let mut rows = Vec::with_capacity(Category::ALL.len() + 1);
    rows.push(FacetRow {
        label: "Semua".to_string(),
        count: base.evaluate(listings).count(),
        selected: state.category().is_none(),
        href: marketplace_href(&base, sort),
    });
    for category in Category::ALL {
        let with = base.set_predicate(Predicate::Category(CategoryFilter::Only(category)));
        rows.push(FacetRow {
            label: category.label().to_string(),
            count: with.evaluate(listings).count(),
            selected: state.category() == Some(category),
            href: marketplace_href(&with, sort),
        });
    }
    rows
}

fn location_facets(
    listings: &[ServiceListing],
    state: &FilterState,
    sort: SortKey,
) -> Vec<FacetRow> {
    let base = state.remove_predicate(PredicateKind::Location);
    let mut counts = BTreeMap::<String, usize>::new();
    for listing in base.evaluate(listings) {
        *counts.entry(listing.provider.location.clone()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| {
            let with = base.set_predicate(Predicate::Location(LocationFilter::In(name.clone())));
            FacetRow {
                selected: state.location() == Some(name.as_str()),
                href: marketplace_href(&with, sort),
                label: name,
                count,
            }
        })
        .collect()
}

fn build_marketplace_view(
    snapshot: &CatalogSnapshot,
    presets: &[FilterPreset],
    query: &MarketplaceQuery,
) -> MarketplaceView {
    let (filter, sort) = query.filter_request().resolve(presets);

    let mut rows: Vec<&ServiceListing> = filter.evaluate(&snapshot.listings).collect();
    let total = rows.len();
    sort.apply(&mut rows);

    let per_page = query.per_page.unwrap_or(12).max(1);
    let total_pages = total.max(1).div_ceil(per_page);
    let page = query.page.unwrap_or(1).clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let listings: Vec<ListingCard> = rows
        .into_iter()
        .skip(start)
        .take(per_page)
        .map(listing_card)
        .collect();

    let chips: Vec<ChipView> = filter
        .chips()
        .into_iter()
        .map(|chip| ChipView {
            remove_href: marketplace_href(&filter.remove_predicate(chip.kind), sort),
            label: chip.label,
        })
        .collect();

    let sort_options = SortKey::ALL
        .into_iter()
        .map(|key| SortOptionRow {
            label: key.label().to_string(),
            selected: key == sort,
            href: marketplace_href(&filter, key),
        })
        .collect();

    let category_options = std::iter::once(CategoryOptionRow {
        slug: "all".to_string(),
        label: "Semua kategori".to_string(),
        selected: filter.category().is_none(),
    })
    .chain(Category::ALL.iter().map(|&category| CategoryOptionRow {
        slug: category.slug().to_string(),
        label: category.label().to_string(),
        selected: filter.category() == Some(category),
    }))
    .collect();

    let (price_min, price_max) = match filter.price() {
        Some(range) => (range.min.to_string(), range.max.to_string()),
        None => (String::new(), String::new()),
    };

    let form = FormView {
        category_options,
        location: filter.location().unwrap_or_default().to_string(),
        price_min,
        price_max,
        min_rating: filter
            .min_rating()
            .map(|r| r.to_string())
            .unwrap_or_default(),
        q: filter.query().unwrap_or_default().to_string(),
        sort: if sort == SortKey::Recommended {
            String::new()
        } else {
            sort.as_str().to_string()
        },
    };

    MarketplaceView {
        form,
        has_filters: !chips.is_empty(),
        chips,
        presets: preset_rows(presets, &filter, sort),
        category_facets: category_facets(&snapshot.listings, &filter, sort),
        location_facets: location_facets(&snapshot.listings, &filter, sort),
        sort_options,
        count_line: format!("Menampilkan {} dari {} layanan", listings.len(), total),
        listings,
        page,
        total_pages,
        has_prev: page > 1,
        prev_href: marketplace_href_paged(&filter, sort, page.saturating_sub(1)),
        has_next: page < total_pages,
        next_href: marketplace_href_paged(&filter, sort, page + 1),
        reset_href: "/marketplace".to_string(),
        catalog_origin: snapshot.origin.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::Path;
    use tower::ServiceExt;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .unwrap()
    }

    fn test_state() -> AppState {
        let root = workspace_root();
        let catalog = CatalogConfig {
            backend_url: None,
            catalog_path: root.join("fixtures/catalog.json"),
            presets_path: root.join("presets.yaml"),
            user_agent: "test".to_string(),
            http_timeout_secs: 1,
        };
        AppState::new(root, catalog)
    }

    async fn get_response(uri: &str) -> axum::response::Response {
        app(test_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn get_text(uri: &str) -> (StatusCode, String) {
        let resp = get_response(uri).await;
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn seed_snapshot() -> CatalogSnapshot {
        let dir = tempfile::tempdir().unwrap();
        let config = CatalogConfig {
            backend_url: None,
            catalog_path: dir.path().join("missing.json"),
            presets_path: dir.path().join("missing.yaml"),
            user_agent: "test".to_string(),
            http_timeout_secs: 1,
        };
        load_catalog(&config).await
    }

    #[tokio::test]
    async fn landing_page_shows_categories_and_presets() {
        let (status, body) = get_text("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Tukangin"));
        assert!(body.contains("Listrik"));
        assert!(body.contains("Termurah"));
    }

    #[tokio::test]
    async fn keyword_search_narrows_the_results() {
        let (status, body) = get_text("/marketplace?q=AC").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Service AC Rumah"));
        assert!(!body.contains("Perbaikan Atap Bocor"));
    }

    #[tokio::test]
    async fn results_partial_fires_the_htmx_event() {
        let resp = get_response("/marketplace/results?category=cooling").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["hx-trigger"].to_str().unwrap(),
            "marketplaceResultsLoaded"
        );
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Service AC Rumah"));
        assert!(text.contains("Cuci AC Split 1 PK"));
        assert!(!text.contains("Instalasi Listrik Rumah"));
    }

    #[tokio::test]
    async fn combined_filters_render_chips_and_narrow() {
        let (status, body) = get_text("/marketplace?category=plumbing&min_rating=4.4").await;
        assert_eq!(status, StatusCode::OK);
        // One chip per active dimension.
        assert!(body.contains("Ledeng"));
        assert!(body.contains("Rating 4.4+"));
        assert!(body.contains("Perbaikan Keran"));
        assert!(!body.contains("Pasang Water Heater"));
    }

    #[tokio::test]
    async fn detail_page_renders_and_unknown_id_is_404() {
        let (status, body) = get_text("/marketplace/svc-101").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Service AC Rumah"));
        assert!(body.contains("Pak Budi Teknik"));

        let (status, _) = get_text("/marketplace/no-such-listing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn api_search_applies_presets_and_sorts() {
        let (status, body) = get_text("/api/search?preset=termurah&sort=price_asc").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["total"], 5);
        assert_eq!(json["sort"], "price_asc");
        assert_eq!(json["origin"], "file");
        assert_eq!(json["filters"][0]["kind"], "price_range");

        let listings = json["listings"].as_array().unwrap();
        assert_eq!(listings[0]["price"], 85_000);
        let prices: Vec<u64> = listings
            .iter()
            .map(|l| l["price"].as_u64().unwrap())
            .collect();
        assert!(prices.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(prices.iter().all(|&p| p <= 200_000));
    }

    #[tokio::test]
    async fn stylesheet_is_served() {
        let resp = get_response("/assets/static/app.css").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/css; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn facet_counts_ignore_their_own_dimension() {
        let snapshot = seed_snapshot().await;
        let presets = tukangin_catalog::default_presets();
        let query = MarketplaceQuery {
            category: Some("cooling".to_string()),
            ..MarketplaceQuery::default()
        };
        let view = build_marketplace_view(&snapshot, &presets, &query);

        assert_eq!(view.listings.len(), 2);
        assert_eq!(view.chips.len(), 1);

        // The category column is counted without the category constraint.
        assert_eq!(view.category_facets[0].label, "Semua");
        assert_eq!(view.category_facets[0].count, snapshot.listings.len());
        assert!(view.category_facets.iter().skip(1).all(|row| row.count == 2));
        assert!(view
            .category_facets
            .iter()
            .any(|row| row.selected && row.label == "AC & Pendingin"));

        // Locations still honor the category constraint.
        assert_eq!(view.location_facets.len(), 2);
        assert!(view.location_facets.iter().all(|row| row.count == 1));
    }

    #[tokio::test]
    async fn pagination_clamps_out_of_range_pages() {
        let snapshot = seed_snapshot().await;
        let presets = tukangin_catalog::default_presets();
        let query = MarketplaceQuery {
            page: Some(99),
            per_page: Some(5),
            ..MarketplaceQuery::default()
        };
        let view = build_marketplace_view(&snapshot, &presets, &query);

        assert_eq!(view.total_pages, 3);
        assert_eq!(view.page, 3);
        assert!(view.has_prev);
        assert!(!view.has_next);
        assert_eq!(view.listings.len(), 2);
        assert_eq!(view.count_line, "Menampilkan 2 dari 12 layanan");
    }

    #[tokio::test]
    async fn preset_rows_mark_an_applied_preset_active() {
        let snapshot = seed_snapshot().await;
        let presets = tukangin_catalog::default_presets();
        let query = MarketplaceQuery {
            preset: Some("rating-tinggi".to_string()),
            ..MarketplaceQuery::default()
        };
        let view = build_marketplace_view(&snapshot, &presets, &query);

        let active: Vec<&str> = view
            .presets
            .iter()
            .filter(|row| row.active)
            .map(|row| row.id.as_str())
            .collect();
        assert_eq!(active, vec!["rating-tinggi"]);
    }

    #[test]
    fn hrefs_encode_the_canonical_state() {
        let state = FilterState::default()
            .set_predicate(Predicate::Location(LocationFilter::In(
                "Jakarta Selatan".to_string(),
            )))
            .set_predicate(Predicate::Query("service ac".to_string()));
        let href = marketplace_href(&state, SortKey::PriceAsc);
        assert_eq!(
            href,
            "/marketplace?location=Jakarta+Selatan&q=service+ac&sort=price_asc"
        );
        assert_eq!(
            marketplace_href(&FilterState::default(), SortKey::Recommended),
            "/marketplace"
        );
    }
}
