use std::path::{Path, PathBuf};

use tukangin_catalog::{load_presets, CatalogFile};
use tukangin_filter::{FilterState, PRICE_RANGE_CEILING};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

#[test]
fn bundled_catalog_fixture_parses_and_is_filterable() {
    let path = workspace_root().join("fixtures/catalog.json");
    let text = std::fs::read_to_string(&path).expect("read fixtures/catalog.json");
    let file: CatalogFile = serde_json::from_str(&text).expect("parse fixtures/catalog.json");

    assert_eq!(file.version, 1);
    assert!(!file.listings.is_empty());

    // Prices must sit on the rupiah scale the filter UI exposes, not all
    // above the slider ceiling.
    assert!(file
        .listings
        .iter()
        .any(|l| l.price <= PRICE_RANGE_CEILING));

    let everything = FilterState::default();
    assert_eq!(
        everything.evaluate(&file.listings).count(),
        file.listings.len()
    );
}

#[test]
fn bundled_presets_parse_and_resolve() {
    let path = workspace_root().join("presets.yaml");
    let presets = load_presets(&path).expect("load presets.yaml");
    assert!(!presets.is_empty());

    for preset in &presets {
        assert!(!preset.id.trim().is_empty());
        assert!(!preset.name.trim().is_empty());
        let state = FilterState::default().apply_preset(preset);
        assert!(!state.is_default(), "preset {} is a no-op", preset.id);
    }
}
