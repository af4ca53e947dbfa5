//! subsidios CLI - Load, summarize and export Colombian housing-subsidy data.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subsidios::pipeline::today;
use subsidios::query::{format_currency, format_number};
use subsidios::schema::{DEPARTMENT_COLUMN, VALUE_COLUMN};
use subsidios::{
    Config, DatasetCache, DatasetCategory, DatasetRouter, Filter, LoadOutcome, PageObserver,
    QueryView,
};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "subsidios")]
#[command(version)]
#[command(about = "Housing-subsidy data from the Colombian open-data portal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "subsidios.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a category and report where it came from
    Load {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print headline indicators and grouped sums of a filtered view
    Summary {
        #[command(flatten)]
        view: ViewArgs,

        /// Column to group by
        #[arg(long, default_value = DEPARTMENT_COLUMN)]
        by: String,

        /// Number of groups to show
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Export a filtered view as CSV
    Export {
        #[command(flatten)]
        view: ViewArgs,

        /// Directory to write the CSV file into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

#[derive(Args)]
struct SourceArgs {
    /// Dataset category: general, rural, military, improvement-program, used-housing
    category: DatasetCategory,

    /// Drop every cached dataset and refetch (General: force the live API)
    #[arg(long)]
    refresh: bool,
}

#[derive(Args)]
struct ViewArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Equality filter, repeatable: COLUMN=VALUE
    #[arg(short, long = "filter", value_name = "COLUMN=VALUE")]
    filters: Vec<String>,

    /// First year of the range (inclusive)
    #[arg(long)]
    from_year: Option<i64>,

    /// Last year of the range (inclusive)
    #[arg(long)]
    to_year: Option<i64>,
}

impl ViewArgs {
    fn to_filter(&self) -> Result<Filter> {
        let mut filter = Filter::new();
        for raw in &self.filters {
            let Some((column, value)) = raw.split_once('=') else {
                bail!("Invalid filter '{raw}': expected COLUMN=VALUE");
            };
            filter = filter.with_equals(column.trim(), value.trim());
        }

        match (self.from_year, self.to_year) {
            (Some(from), Some(to)) => filter = filter.with_years(from, to),
            (Some(from), None) => filter = filter.with_years(from, i64::MAX),
            (None, Some(to)) => filter = filter.with_years(i64::MIN, to),
            (None, None) => {}
        }
        Ok(filter)
    }
}

/// Spinner fed by the API sweep.
struct SweepProgress(ProgressBar);

impl SweepProgress {
    fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Self(pb)
    }
}

impl PageObserver for SweepProgress {
    fn on_page(&self, records_so_far: usize) {
        self.0
            .set_message(format!("{} records fetched", format_number(records_so_far as f64)));
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

const EXAMPLE_CONFIG: &str = r#"# subsidios configuration file

[api]
# Live resource for the General category (paginated with $limit/$offset)
resource_url = "https://www.datos.gov.co/resource/h2yr-zfb2.json"
metadata_url = "https://www.datos.gov.co/api/views/h2yr-zfb2.json"
page_size = 900
timeout_secs = 30
max_retries = 3  # attempts per page on HTTP 429

[snapshots]
base_url = "https://www.datos.gov.co/snapshots/subsidios"
as_of = "20260217"
timeout_secs = 60

# Optional per-category filename overrides
# [snapshots.files]
# military = "subsidios_military_20260217.csv"

[cache]
ttl_secs = 3600
"#;

fn print_example_config() {
    println!("{EXAMPLE_CONFIG}");
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {path:?}"))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn load(config: &Config, source: &SourceArgs) -> Result<LoadOutcome> {
    let cache = Arc::new(DatasetCache::new(config.cache.ttl()));
    let progress = Arc::new(SweepProgress::new());
    let router = DatasetRouter::from_config(config, cache)
        .context("Failed to build HTTP clients")?
        .with_observer(Arc::clone(&progress) as Arc<dyn PageObserver>);

    let outcome = router.load(source.category, source.refresh).await;
    progress.0.finish_and_clear();

    let outcome = outcome.with_context(|| format!("Failed to load {}", source.category))?;
    for notice in &outcome.notices {
        warn!("{notice}");
    }
    Ok(outcome)
}

fn print_source(outcome: &LoadOutcome) {
    println!("Source:      {}", outcome.source());
    println!("As of:       {}", outcome.as_of());
    println!("Records:     {}", format_number(outcome.dataset.len() as f64));
    if outcome.dataset.is_partial() {
        println!("Complete:    no (partial API sweep)");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;

            info!("Configuration is valid");
            info!("  API: {} (page size {})", config.api.resource_url, config.api.page_size);
            info!(
                "  Snapshots: {} (as of {})",
                config.snapshots.base_url, config.snapshots.as_of
            );
            info!("  Cache TTL: {}s", config.cache.ttl_secs);
            return Ok(());
        }

        Commands::Load { source } => {
            let config = load_config(&cli.config)?;
            let outcome = load(&config, &source).await?;

            println!("\n=== {} ===", source.category);
            print_source(&outcome);
            println!("Columns:     {}", outcome.dataset.columns().join(", "));

            let view = QueryView::new(&outcome.dataset);
            if let Some((from, to)) = view.year_bounds() {
                println!("Years:       {from}-{to}");
            }
            for (column, values) in view.filter_choices() {
                println!("Filter:      {column} ({} values)", values.len());
            }
        }

        Commands::Summary { view, by, top } => {
            let config = load_config(&cli.config)?;
            let filter = view.to_filter()?;
            let outcome = load(&config, &view.source).await?;

            let dataset = &outcome.dataset;
            let view = QueryView::new(dataset).filter(&filter);
            let profile = view.profile();
            let totals = view.totals();

            println!("\n=== {} ===", dataset.category());
            print_source(&outcome);
            println!("Filtered:    {}", format_number(totals.records as f64));
            if let Some(beneficiaries) = totals.beneficiaries {
                println!("Beneficiaries: {}", format_number(beneficiaries));
            }
            if let Some(amount) = totals.amount {
                println!("Assigned:    {}", format_currency(amount));
            }
            if let Some(departments) = totals.departments {
                println!("Departments: {departments}");
            }

            if !dataset.has_column(&by) {
                bail!("Column '{by}' is not present in {}", dataset.category());
            }

            let columns: Vec<&str> = [profile.beneficiary_column, VALUE_COLUMN]
                .into_iter()
                .filter(|c| dataset.has_column(c))
                .collect();
            let grouped = match columns.first() {
                Some(first) => view.group_sum(&by, &columns).sort_desc(first),
                None => view.group_sum(&by, &columns),
            }
            .top(top);

            println!("\n--- Top {} by {by} ---", grouped.len());
            for group in &grouped.groups {
                let sums: Vec<String> = grouped
                    .columns
                    .iter()
                    .zip(&group.sums)
                    .map(|(column, sum)| {
                        if column == VALUE_COLUMN {
                            format!("{column}={}", format_currency(*sum))
                        } else {
                            format!("{column}={}", format_number(*sum))
                        }
                    })
                    .collect();
                println!("{:<40} {}", group.key, sums.join("  "));
            }
        }

        Commands::Export { view, output_dir } => {
            let config = load_config(&cli.config)?;
            let filter = view.to_filter()?;
            let outcome = load(&config, &view.source).await?;

            let query = QueryView::new(&outcome.dataset).filter(&filter);
            if query.is_empty() {
                warn!("Filters matched no rows; writing header only");
            }

            let path = query
                .export_to_dir(&output_dir, &today())
                .with_context(|| format!("Failed to export to {output_dir:?}"))?;

            println!("Exported {} records to {}", query.len(), path.display());
        }
    }

    Ok(())
}
