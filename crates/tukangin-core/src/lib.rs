//! Core domain model for the Tukangin service marketplace.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "tukangin-core";

/// Service category a listing is filed under.
///
/// The enum is the single source of truth for both the wire slug and the
/// display label, so the marketplace surfaces never need a slug-to-label
/// lookup table of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Electrical,
    Plumbing,
    Cooling,
    Cleaning,
    Renovation,
    Home,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Electrical,
        Category::Plumbing,
        Category::Cooling,
        Category::Cleaning,
        Category::Renovation,
        Category::Home,
    ];

    /// Stable machine-readable tag used in catalog data, query strings, and chips.
    pub fn slug(self) -> &'static str {
        match self {
            Category::Electrical => "electrical",
            Category::Plumbing => "plumbing",
            Category::Cooling => "cooling",
            Category::Cleaning => "cleaning",
            Category::Renovation => "renovation",
            Category::Home => "home",
        }
    }

    /// Label shown on cards, chips, and the category picker.
    pub fn label(self) -> &'static str {
        match self {
            Category::Electrical => "Listrik",
            Category::Plumbing => "Ledeng",
            Category::Cooling => "AC & Pendingin",
            Category::Cleaning => "Kebersihan",
            Category::Renovation => "Renovasi",
            Category::Home => "Perbaikan Rumah",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Category> {
        let normalized = slug.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.slug() == normalized)
    }
}

/// Provider offering a service listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub rating: f64,
    pub location: String,
    pub available: bool,
}

/// One sellable service listing shown in the marketplace.
///
/// Listings arrive fully formed from the catalog and are never mutated while
/// a browsing session holds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceListing {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub provider: Provider,
    /// Price in rupiah, smallest unit.
    pub price: u64,
    /// Aggregate rating shown on the card, 0 to 5.
    pub rating: f64,
}

/// Format a rupiah amount with Indonesian thousand separators, e.g. `Rp250.000`.
pub fn format_rupiah(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("Rp{grouped}")
}
