//! Marketplace listing filter engine.
//!
//! Holds the active filter predicates for a browsing session as one value
//! (`FilterState`), with pure transitions that return the next state. The
//! visible listing subset, the active-filter chips, and the facet counts are
//! all derived from that one value, so the chip row can never drift out of
//! sync with what is actually being filtered.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use tukangin_core::{format_rupiah, Category, ServiceListing};

pub const CRATE_NAME: &str = "tukangin-filter";

/// Upper bound of the price slider, in rupiah. Ranges are clamped into
/// `[0, PRICE_RANGE_CEILING]`; a range whose max sits at the ceiling is
/// open-ended above (a maxed-out slider means "no cap").
pub const PRICE_RANGE_CEILING: u64 = 1_000_000;

/// Identity of one filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    Category,
    Location,
    PriceRange,
    MinRating,
    Query,
}

impl PredicateKind {
    pub const ALL: [PredicateKind; 5] = [
        PredicateKind::Category,
        PredicateKind::Location,
        PredicateKind::PriceRange,
        PredicateKind::MinRating,
        PredicateKind::Query,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PredicateKind::Category => "category",
            PredicateKind::Location => "location",
            PredicateKind::PriceRange => "price_range",
            PredicateKind::MinRating => "min_rating",
            PredicateKind::Query => "query",
        }
    }

    pub fn parse(raw: &str) -> Option<PredicateKind> {
        let normalized = raw.trim().to_ascii_lowercase();
        PredicateKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
    }
}

#[derive(Debug, Error)]
#[error("unknown category slug `{0}`")]
pub struct UnknownCategory(pub String);

/// Category constraint. `All` is the explicit wildcard: it matches every
/// listing and is therefore held as "no constraint" (and renders no chip).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryFilter {
    All,
    Only(Category),
}

impl TryFrom<String> for CategoryFilter {
    type Error = UnknownCategory;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(CategoryFilter::All);
        }
        Category::from_slug(trimmed)
            .map(CategoryFilter::Only)
            .ok_or_else(|| UnknownCategory(trimmed.to_string()))
    }
}

impl From<CategoryFilter> for String {
    fn from(filter: CategoryFilter) -> String {
        match filter {
            CategoryFilter::All => "all".to_string(),
            CategoryFilter::Only(category) => category.slug().to_string(),
        }
    }
}

/// Location constraint: exact match on the provider location, `Anywhere` is
/// the unset form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LocationFilter {
    Anywhere,
    In(String),
}

impl From<String> for LocationFilter {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("anywhere") {
            LocationFilter::Anywhere
        } else {
            LocationFilter::In(trimmed.to_string())
        }
    }
}

impl From<LocationFilter> for String {
    fn from(filter: LocationFilter) -> String {
        match filter {
            LocationFilter::Anywhere => String::new(),
            LocationFilter::In(location) => location,
        }
    }
}

/// Inclusive price interval in rupiah.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: u64,
    pub max: u64,
}

impl PriceRange {
    pub fn full() -> Self {
        Self {
            min: 0,
            max: PRICE_RANGE_CEILING,
        }
    }

    /// Build a range from possibly reversed, possibly out-of-domain bounds:
    /// bounds are swapped into order and capped at the ceiling, never rejected.
    pub fn clamped(min: u64, max: u64) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min: lo.min(PRICE_RANGE_CEILING),
            max: hi.min(PRICE_RANGE_CEILING),
        }
    }

    /// Inclusive on both ends; a max at the ceiling accepts any price above it.
    pub fn contains(&self, price: u64) -> bool {
        price >= self.min && (self.max >= PRICE_RANGE_CEILING || price <= self.max)
    }

    pub fn is_full(&self) -> bool {
        self.min == 0 && self.max >= PRICE_RANGE_CEILING
    }
}

/// One typed filter constraint, tagged by dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Category(CategoryFilter),
    Location(LocationFilter),
    PriceRange(PriceRange),
    MinRating(f64),
    Query(String),
}

impl Predicate {
    pub fn kind(&self) -> PredicateKind {
        match self {
            Predicate::Category(_) => PredicateKind::Category,
            Predicate::Location(_) => PredicateKind::Location,
            Predicate::PriceRange(_) => PredicateKind::PriceRange,
            Predicate::MinRating(_) => PredicateKind::MinRating,
            Predicate::Query(_) => PredicateKind::Query,
        }
    }

    /// Parse a predicate from its string-typed form (chip values, query
    /// params). Unknown kinds and unparseable values yield `None`; callers
    /// drop them and keep going.
    pub fn parse(kind: &str, value: &str) -> Option<Predicate> {
        match PredicateKind::parse(kind)? {
            PredicateKind::Category => {
                if value.trim().eq_ignore_ascii_case("all") {
                    Some(Predicate::Category(CategoryFilter::All))
                } else {
                    Category::from_slug(value)
                        .map(|category| Predicate::Category(CategoryFilter::Only(category)))
                }
            }
            PredicateKind::Location => {
                Some(Predicate::Location(LocationFilter::from(value.to_string())))
            }
            PredicateKind::PriceRange => {
                let (lo, hi) = value.split_once('-')?;
                Some(Predicate::PriceRange(PriceRange {
                    min: parse_price(lo)?,
                    max: parse_price(hi)?,
                }))
            }
            PredicateKind::MinRating => value.trim().parse::<f64>().ok().map(Predicate::MinRating),
            PredicateKind::Query => Some(Predicate::Query(value.to_string())),
        }
    }
}

/// Lenient price parse for user-controlled input: negative values saturate to
/// zero, absurdly large values saturate, garbage is `None`.
pub fn parse_price(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<i128>() {
        Ok(v) if v < 0 => Some(0),
        Ok(v) => Some(v.min(u64::MAX as i128) as u64),
        Err(_) => None,
    }
}

fn clamp_rating(rating: f64) -> f64 {
    if !rating.is_finite() {
        return 0.0;
    }
    rating.clamp(0.0, 5.0)
}

/// UI-facing projection of one active predicate.
///
/// `value` is the canonical machine encoding and parses back into the same
/// predicate; `label` is what the chip row displays. Chips are always derived
/// from a `FilterState`, never stored on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterChip {
    pub kind: PredicateKind,
    pub value: String,
    pub label: String,
}

/// The active filter predicates of one browsing session.
///
/// One optional slot per dimension, so "at most one predicate per type" holds
/// by construction. Every transition is pure: it leaves `self` untouched and
/// returns the next state. Setters canonicalize, which is what keeps the chip
/// round-trip exact: a wildcard category, an empty query, a zero rating floor,
/// and a full price range are all stored as an empty slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterState {
    category: Option<Category>,
    location: Option<String>,
    price: Option<PriceRange>,
    min_rating: Option<f64>,
    query: Option<String>,
}

impl FilterState {
    /// Replace the slot for the predicate's dimension. Out-of-domain numeric
    /// values are clamped to the nearest valid bound; nothing errors.
    #[must_use]
    pub fn set_predicate(&self, predicate: Predicate) -> FilterState {
        let mut next = self.clone();
        match predicate {
            Predicate::Category(CategoryFilter::All) => next.category = None,
            Predicate::Category(CategoryFilter::Only(category)) => next.category = Some(category),
            Predicate::Location(LocationFilter::Anywhere) => next.location = None,
            Predicate::Location(LocationFilter::In(location)) => {
                // Re-normalize so a literal "anywhere" or blank string stores
                // the same way it parses.
                next.location = match LocationFilter::from(location) {
                    LocationFilter::Anywhere => None,
                    LocationFilter::In(location) => Some(location),
                };
            }
            Predicate::PriceRange(raw) => {
                let range = PriceRange::clamped(raw.min, raw.max);
                if range != raw {
                    debug!(min = raw.min, max = raw.max, "price range clamped");
                }
                next.price = if range.is_full() { None } else { Some(range) };
            }
            Predicate::MinRating(rating) => {
                let rating = clamp_rating(rating);
                next.min_rating = if rating <= 0.0 { None } else { Some(rating) };
            }
            Predicate::Query(query) => {
                let query = query.trim();
                next.query = if query.is_empty() {
                    None
                } else {
                    Some(query.to_string())
                };
            }
        }
        next
    }

    /// Clear the slot for one dimension. Removing an absent predicate is a
    /// no-op, not an error.
    #[must_use]
    pub fn remove_predicate(&self, kind: PredicateKind) -> FilterState {
        let mut next = self.clone();
        match kind {
            PredicateKind::Category => next.category = None,
            PredicateKind::Location => next.location = None,
            PredicateKind::PriceRange => next.price = None,
            PredicateKind::MinRating => next.min_rating = None,
            PredicateKind::Query => next.query = None,
        }
        next
    }

    /// Back to defaults: no constraints, empty chip row.
    #[must_use]
    pub fn reset_all(&self) -> FilterState {
        FilterState::default()
    }

    /// Layer a preset over the current state: dimensions the preset names are
    /// replaced as if by `set_predicate`, every other dimension persists.
    #[must_use]
    pub fn apply_preset(&self, preset: &FilterPreset) -> FilterState {
        let overrides = &preset.filters;
        let mut next = self.clone();
        if let Some(category) = &overrides.category {
            next = next.set_predicate(Predicate::Category(category.clone()));
        }
        if let Some(location) = &overrides.location {
            next = next.set_predicate(Predicate::Location(location.clone()));
        }
        if overrides.price_min.is_some() || overrides.price_max.is_some() {
            next = next.set_predicate(Predicate::PriceRange(PriceRange::clamped(
                overrides.price_min.unwrap_or(0),
                overrides.price_max.unwrap_or(PRICE_RANGE_CEILING),
            )));
        }
        if let Some(rating) = overrides.min_rating {
            next = next.set_predicate(Predicate::MinRating(rating));
        }
        if let Some(query) = &overrides.query {
            next = next.set_predicate(Predicate::Query(query.clone()));
        }
        next
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn price(&self) -> Option<PriceRange> {
        self.price
    }

    pub fn min_rating(&self) -> Option<f64> {
        self.min_rating
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_default(&self) -> bool {
        *self == FilterState::default()
    }

    /// Whether the listing satisfies every active predicate (AND across
    /// dimensions; the query alone matches any of title, provider name,
    /// provider location).
    pub fn matches(&self, listing: &ServiceListing) -> bool {
        let lowered = self.query.as_ref().map(|q| q.to_lowercase());
        self.matches_with_query(listing, lowered.as_deref())
    }

    /// Lazily yield the listings that satisfy every active predicate, in the
    /// collection's own order. Pure: same state and items, same output.
    pub fn evaluate<'a>(
        &'a self,
        listings: &'a [ServiceListing],
    ) -> impl Iterator<Item = &'a ServiceListing> + 'a {
        let lowered = self.query.as_ref().map(|q| q.to_lowercase());
        listings
            .iter()
            .filter(move |listing| self.matches_with_query(listing, lowered.as_deref()))
    }

    fn matches_with_query(&self, listing: &ServiceListing, lowered_query: Option<&str>) -> bool {
        if let Some(category) = self.category {
            if listing.category != category {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if &listing.provider.location != location {
                return false;
            }
        }
        if let Some(range) = &self.price {
            if !range.contains(listing.price) {
                return false;
            }
        }
        if let Some(floor) = self.min_rating {
            if listing.rating < floor {
                return false;
            }
        }
        if let Some(needle) = lowered_query {
            let hit = text_contains(&listing.title, needle)
                || text_contains(&listing.provider.name, needle)
                || text_contains(&listing.provider.location, needle);
            if !hit {
                return false;
            }
        }
        true
    }

    /// Derive the chip row, one chip per active dimension in a fixed order.
    pub fn chips(&self) -> Vec<FilterChip> {
        let mut chips = Vec::new();
        if let Some(category) = self.category {
            chips.push(FilterChip {
                kind: PredicateKind::Category,
                value: category.slug().to_string(),
                label: category.label().to_string(),
            });
        }
        if let Some(location) = &self.location {
            chips.push(FilterChip {
                kind: PredicateKind::Location,
                value: location.clone(),
                label: location.clone(),
            });
        }
        if let Some(range) = &self.price {
            chips.push(FilterChip {
                kind: PredicateKind::PriceRange,
                value: format!("{}-{}", range.min, range.max),
                label: if range.max >= PRICE_RANGE_CEILING {
                    format!("{}+", format_rupiah(range.min))
                } else {
                    format!("{} - {}", format_rupiah(range.min), format_rupiah(range.max))
                },
            });
        }
        if let Some(rating) = self.min_rating {
            chips.push(FilterChip {
                kind: PredicateKind::MinRating,
                value: rating.to_string(),
                label: format!("Rating {rating}+"),
            });
        }
        if let Some(query) = &self.query {
            chips.push(FilterChip {
                kind: PredicateKind::Query,
                value: query.clone(),
                label: format!("\"{query}\""),
            });
        }
        chips
    }

    /// Rebuild a state from a chip row. Chips this crate generated come back
    /// bit-identical; foreign or garbled chips are dropped with a log line.
    pub fn from_chips(chips: &[FilterChip]) -> FilterState {
        chips
            .iter()
            .fold(FilterState::default(), |state, chip| {
                match Predicate::parse(chip.kind.as_str(), &chip.value) {
                    Some(predicate) => state.set_predicate(predicate),
                    None => {
                        debug!(kind = chip.kind.as_str(), value = %chip.value, "dropping unparseable filter chip");
                        state
                    }
                }
            })
    }
}

/// Partial predicate overrides carried by a preset. Absent fields leave the
/// corresponding dimension untouched when the preset is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Named filter shortcut. Presets are configuration data; applying one layers
/// its overrides over whatever is already active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub filters: PresetFilters,
}

/// Explicit ordering applied after filtering. `Recommended` keeps catalog
/// order; filtering itself never re-orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Recommended,
    PriceAsc,
    PriceDesc,
    RatingDesc,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [
        SortKey::Recommended,
        SortKey::PriceAsc,
        SortKey::PriceDesc,
        SortKey::RatingDesc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Recommended => "recommended",
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
            SortKey::RatingDesc => "rating_desc",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Recommended => "Rekomendasi",
            SortKey::PriceAsc => "Harga Terendah",
            SortKey::PriceDesc => "Harga Tertinggi",
            SortKey::RatingDesc => "Rating Tertinggi",
        }
    }

    pub fn parse(raw: &str) -> Option<SortKey> {
        let normalized = raw.trim().to_ascii_lowercase();
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
    }

    /// Stable sort, so equal keys keep the filtered order.
    pub fn apply(self, rows: &mut [&ServiceListing]) {
        match self {
            SortKey::Recommended => {}
            SortKey::PriceAsc => rows.sort_by(|a, b| a.price.cmp(&b.price)),
            SortKey::PriceDesc => rows.sort_by(|a, b| b.price.cmp(&a.price)),
            SortKey::RatingDesc => rows.sort_by(|a, b| b.rating.total_cmp(&a.rating)),
        }
    }
}

/// Raw, string-typed filter input as it arrives from a query string or CLI
/// flags. `resolve` turns it into a canonical state, dropping anything it
/// cannot understand rather than failing the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRequest {
    pub preset: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub min_rating: Option<String>,
    pub query: Option<String>,
    pub sort: Option<String>,
}

impl FilterRequest {
    /// Preset first, then explicit fields layered over it, mirroring how the
    /// marketplace page builds its links.
    pub fn resolve(&self, presets: &[FilterPreset]) -> (FilterState, SortKey) {
        let mut state = FilterState::default();

        if let Some(id) = trimmed(&self.preset) {
            match presets.iter().find(|preset| preset.id == id) {
                Some(preset) => state = state.apply_preset(preset),
                None => warn!(preset = %id, "ignoring unknown preset id"),
            }
        }

        if let Some(raw) = trimmed(&self.category) {
            if raw.eq_ignore_ascii_case("all") {
                state = state.set_predicate(Predicate::Category(CategoryFilter::All));
            } else {
                match Category::from_slug(raw) {
                    Some(category) => {
                        state = state
                            .set_predicate(Predicate::Category(CategoryFilter::Only(category)));
                    }
                    None => warn!(category = %raw, "ignoring unknown category slug"),
                }
            }
        }

        if let Some(raw) = trimmed(&self.location) {
            state = state.set_predicate(Predicate::Location(LocationFilter::In(raw.to_string())));
        }

        if self.price_min.is_some() || self.price_max.is_some() {
            let min = self
                .price_min
                .as_deref()
                .and_then(parse_price)
                .unwrap_or(0);
            let max = self
                .price_max
                .as_deref()
                .and_then(parse_price)
                .unwrap_or(PRICE_RANGE_CEILING);
            state = state.set_predicate(Predicate::PriceRange(PriceRange::clamped(min, max)));
        }

        if let Some(raw) = trimmed(&self.min_rating) {
            match raw.parse::<f64>() {
                Ok(rating) => state = state.set_predicate(Predicate::MinRating(rating)),
                Err(_) => warn!(min_rating = %raw, "ignoring unparseable rating floor"),
            }
        }

        if let Some(raw) = &self.query {
            state = state.set_predicate(Predicate::Query(raw.clone()));
        }

        let sort = match trimmed(&self.sort) {
            None => SortKey::default(),
            Some(raw) => SortKey::parse(raw).unwrap_or_else(|| {
                warn!(sort = %raw, "ignoring unknown sort key");
                SortKey::default()
            }),
        };

        (state, sort)
    }
}

fn trimmed(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn text_contains(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}
