use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tukangin_catalog::{load_catalog, load_presets_or_default, CatalogConfig};
use tukangin_core::{format_rupiah, ServiceListing};
use tukangin_filter::{FilterRequest, FilterState};

#[derive(Debug, Parser)]
#[command(name = "tukangin-cli")]
#[command(about = "Tukangin marketplace command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Filter the catalog and print the matching listings.
    Search(SearchArgs),
    /// List the configured filter presets.
    Presets,
    /// Run the marketplace web UI.
    Serve,
}

#[derive(Debug, Default, Args)]
struct SearchArgs {
    /// Preset id to start from, e.g. "termurah".
    #[arg(long)]
    preset: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    price_min: Option<String>,
    #[arg(long)]
    price_max: Option<String>,
    #[arg(long)]
    min_rating: Option<String>,
    /// Keyword matched against title, provider, and location.
    #[arg(short, long)]
    query: Option<String>,
    /// recommended, price_asc, price_desc, or rating_desc.
    #[arg(long)]
    sort: Option<String>,
}

impl SearchArgs {
    fn filter_request(&self) -> FilterRequest {
        FilterRequest {
            preset: self.preset.clone(),
            category: self.category.clone(),
            location: self.location.clone(),
            price_min: self.price_min.clone(),
            price_max: self.price_max.clone(),
            min_rating: self.min_rating.clone(),
            query: self.query.clone(),
            sort: self.sort.clone(),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Search(SearchArgs::default())) {
        Commands::Search(args) => {
            let config = CatalogConfig::from_env();
            let snapshot = load_catalog(&config).await;
            let presets = load_presets_or_default(&config.presets_path);
            let (filter, sort) = args.filter_request().resolve(&presets);

            let mut rows: Vec<&ServiceListing> = filter.evaluate(&snapshot.listings).collect();
            sort.apply(&mut rows);

            println!(
                "{} layanan cocok (katalog: {})",
                rows.len(),
                snapshot.origin.as_str()
            );
            let chips = filter.chips();
            if !chips.is_empty() {
                let labels: Vec<String> = chips.into_iter().map(|chip| chip.label).collect();
                println!("Filter aktif: {}", labels.join(", "));
            }
            for listing in rows {
                println!(
                    "{:<10} {:<36} {:<16} {:>12} {:>4.1} {}",
                    listing.id,
                    listing.title,
                    listing.category.label(),
                    format_rupiah(listing.price),
                    listing.rating,
                    listing.provider.location
                );
            }
        }
        Commands::Presets => {
            let config = CatalogConfig::from_env();
            let presets = load_presets_or_default(&config.presets_path);
            for preset in &presets {
                let applied = FilterState::default().apply_preset(preset);
                let labels: Vec<String> = applied
                    .chips()
                    .into_iter()
                    .map(|chip| chip.label)
                    .collect();
                println!("{:<16} {:<16} {}", preset.id, preset.name, labels.join(", "));
            }
        }
        Commands::Serve => {
            tukangin_web::serve_from_env().await?;
        }
    }

    Ok(())
}
