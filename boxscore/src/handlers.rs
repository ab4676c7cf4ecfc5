use anyhow::{Context, anyhow};
use boxscore_core::manifest::SeasonSummary;
use boxscore_core::{
    EntityCallback, EntityOutcome, EntityReport, ExtractOptions, Extractor, HttpSource,
    ManifestStore, OutputLayout, RunReport, SourceClient, SourceCredentials, SourceRegistry,
};
use boxscore_scanner::{
    BatchOptions, BatchScrapeResult, BatchScraper, HttpFetcher, PingResult, RetryPolicy,
    RetryingFetcher, ScannerConfig, html,
};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Hours after which `--incremental` considers a manifest entry stale.
pub const INCREMENTAL_MAX_AGE_HOURS: f64 = 24.0;

/// Which seasons an `extract` invocation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearSelection {
    Single(u16),
    All,
}

pub fn print_banner() {
    println!(
        "{} {}",
        "boxscore".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_white()
    );
    println!();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `-v` when set.
pub fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// Helper functions for the extract handler

pub fn build_extract_options(
    force: bool,
    max_age_hours: Option<f64>,
    incremental: bool,
    with_schedule: bool,
) -> ExtractOptions {
    let max_age_hours = match (max_age_hours, incremental) {
        (Some(hours), _) => Some(hours),
        (None, true) => Some(INCREMENTAL_MAX_AGE_HOURS),
        (None, false) => None,
    };

    ExtractOptions {
        skip_existing: !force,
        max_age_hours,
        with_schedule,
    }
}

pub fn select_years(year: Option<u16>, all: bool, default_year: u16) -> YearSelection {
    match (year, all) {
        (_, true) => YearSelection::All,
        (Some(year), false) => YearSelection::Single(year),
        (None, false) => YearSelection::Single(default_year),
    }
}

/// Built-in sources, extended by an optional definitions file
pub fn build_registry(sources_file: Option<&PathBuf>) -> anyhow::Result<SourceRegistry> {
    let mut registry = SourceRegistry::builtin().context("Built-in source definitions are invalid")?;

    if let Some(path) = sources_file {
        registry
            .load_file(path)
            .with_context(|| format!("Failed to load sources file {}", path.display()))?;
    }

    Ok(registry)
}

pub fn expand_output_dir(dir: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(dir).as_ref())
}

pub fn format_entity_line(report: &EntityReport) -> String {
    match &report.outcome {
        EntityOutcome::Extracted {
            count, duration_ms, ..
        } => format!(
            "  {} {} {} {}",
            "✓".green().bold(),
            report.entity.bright_white(),
            format!("{} records", count).cyan(),
            format!("({}ms)", duration_ms).dimmed()
        ),
        EntityOutcome::Skipped => format!(
            "  {} {} {}",
            "↷".yellow(),
            report.entity.bright_white(),
            "skipped".yellow()
        ),
        EntityOutcome::Failed { error, .. } => format!(
            "  {} {} {}",
            "✗".red().bold(),
            report.entity.bright_white(),
            error.red()
        ),
    }
}

pub fn format_run_summary(report: &RunReport) -> String {
    let mut lines = Vec::new();

    for season in &report.seasons {
        lines.push(format!(
            "  {} {} extracted, {} skipped, {} failed",
            season.year.to_string().bright_white().bold(),
            season.extracted(),
            season.skipped(),
            season.failed()
        ));
    }

    lines.push(format!(
        "  {} {} extracted, {} skipped, {} failed across {} season(s)",
        "Total:".bold(),
        report.extracted(),
        report.skipped(),
        report.failed(),
        report.seasons.len()
    ));

    lines.join("\n")
}

pub fn format_season_summary(summary: &SeasonSummary) -> String {
    format!(
        "  {} {}/{} entities, {} records{}",
        summary.year.bright_white().bold(),
        summary.extracted,
        summary.total,
        summary.records,
        summary
            .latest
            .as_ref()
            .map(|ts| format!(", last extracted {}", ts))
            .unwrap_or_default()
    )
}

// Helper functions for the scrape handler

/// Load URLs from either a file or the repeated `--url` arguments
pub fn load_urls_from_source(
    urls: &[Url],
    urls_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(urls_file_path) = urls_file {
        load_urls_from_file(urls_file_path)
    } else if !urls.is_empty() {
        Ok(urls.iter().map(|url| url.as_str().to_string()).collect())
    } else {
        Err("Either --url or --urls-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file, ignoring blank lines and `#` comments
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read URLs file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line) {
        if matches!(url.scheme(), "http" | "https") {
            return Some(line.to_string());
        }
    }

    let with_scheme = format!("https://{}", line);
    if Url::parse(&with_scheme).is_ok_and(|url| url.host().is_some()) {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

pub fn format_scrape_summary(batch: &BatchScrapeResult) -> String {
    let mut lines = Vec::new();

    for result in &batch.results {
        match (&result.response, &result.error) {
            (Some(response), _) => lines.push(format!(
                "  {} {} {} {}",
                "✓".green().bold(),
                result.url.bright_white(),
                response.status_code.to_string().cyan(),
                format!("({}ms, {} bytes)", response.duration_ms, response.body.len()).dimmed()
            )),
            (None, error) => lines.push(format!(
                "  {} {} {}",
                "✗".red().bold(),
                result.url.bright_white(),
                error.as_deref().unwrap_or("unknown error").red()
            )),
        }
    }

    lines.push(format!(
        "  {} {}/{} succeeded, {} failed in {}ms",
        "Total:".bold(),
        batch.success_count,
        batch.total_count,
        batch.failure_count,
        batch.duration_ms
    ));

    lines.join("\n")
}

pub fn format_ping(result: &PingResult) -> String {
    let status = result
        .status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string());

    if result.accessible {
        format!(
            "{} {} {} {}",
            "✓".green().bold(),
            result.url.bright_white(),
            status.cyan(),
            format!("({}ms)", result.duration_ms).dimmed()
        )
    } else {
        format!(
            "{} {} {} {}",
            "✗".red().bold(),
            result.url.bright_white(),
            status.red(),
            result.error.as_deref().unwrap_or("unreachable").red()
        )
    }
}

fn new_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message);
    spinner
}

fn retrying_fetcher(config: &ScannerConfig) -> anyhow::Result<Arc<RetryingFetcher<HttpFetcher>>> {
    let fetcher = HttpFetcher::new(config).context("Failed to build HTTP client")?;
    Ok(Arc::new(RetryingFetcher::new(
        fetcher,
        RetryPolicy::from_config(config),
    )))
}

// Command handlers. `Ok(false)` means the command ran but something it
// touched failed; `Err` is reserved for fatal conditions.

pub async fn handle_extract(args: &ArgMatches) -> anyhow::Result<bool> {
    let source_name = args
        .get_one::<String>("SOURCE")
        .ok_or_else(|| anyhow!("SOURCE is required"))?;
    let output_dir = args
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or("./output");

    let registry = build_registry(args.get_one::<PathBuf>("sources-file"))?;
    let definition = registry.resolve(source_name).ok_or_else(|| {
        anyhow!(
            "Unknown source '{}'. Known sources: {}",
            source_name,
            registry.names().join(", ")
        )
    })?;

    let config = ScannerConfig::from_env();
    let credentials = SourceCredentials::from_env(&definition.name);
    let client = HttpSource::new(definition, credentials, retrying_fetcher(&config)?, &config)
        .with_context(|| format!("Invalid definition for source '{}'", source_name))?;

    let options = build_extract_options(
        args.get_flag("force"),
        args.get_one::<f64>("max-age").copied(),
        args.get_flag("incremental"),
        args.get_flag("with-schedule"),
    );
    let selection = select_years(
        args.get_one::<u16>("year").copied(),
        args.get_flag("all"),
        client.default_year(),
    );

    let layout = OutputLayout::new(expand_output_dir(output_dir));
    let mut store = ManifestStore::open(&layout, client.name()).await?;
    info!(
        source = client.name(),
        manifest = %store.path().display(),
        ?selection,
        "starting extraction"
    );

    print_divider();
    println!(
        "  {} {} → {}",
        "EXTRACT".bright_white().bold(),
        client.name().bright_cyan(),
        layout.source_dir(client.name()).display()
    );
    print_divider();

    let spinner = new_spinner(format!("Extracting {}...", client.name()));
    let progress = spinner.clone();
    let callback: EntityCallback = Arc::new(move |report: &EntityReport| {
        progress.set_message(format!("{} {}", report.year, report.entity));
        progress.println(format_entity_line(report));
    });

    let mut extractor = Extractor::new(&client, &mut store, layout)?
        .with_pacing(config.rate_limit_delay())
        .with_entity_callback(callback);

    let outcome = match selection {
        YearSelection::All => extractor.extract_all(&options).await,
        YearSelection::Single(year) => {
            extractor
                .extract_season(year, &options)
                .await
                .map(|season| RunReport {
                    source: client.name().to_string(),
                    seasons: vec![season],
                })
        }
    };
    spinner.finish_and_clear();
    let report = outcome?;

    println!();
    println!("{}", format_run_summary(&report));

    Ok(!report.has_failures())
}

pub fn handle_sources(args: &ArgMatches) -> anyhow::Result<bool> {
    let registry = build_registry(args.get_one::<PathBuf>("sources-file"))?;

    for definition in registry.iter() {
        println!(
            "{} {}-{} (default {})",
            definition.name.bright_cyan().bold(),
            definition.first_year,
            definition.last_year,
            definition.default_year
        );
        println!("  {}", definition.base_url.dimmed());
        for entity in &definition.entities {
            let marker = if entity.optional { " (optional)" } else { "" };
            println!("  {} {}{}", "•".blue(), entity.name, marker.yellow());
        }
    }

    Ok(true)
}

pub async fn handle_status(args: &ArgMatches) -> anyhow::Result<bool> {
    let source_name = args
        .get_one::<String>("SOURCE")
        .ok_or_else(|| anyhow!("SOURCE is required"))?;
    let output_dir = args
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or("./output");

    let layout = OutputLayout::new(expand_output_dir(output_dir));
    let store = ManifestStore::open(&layout, source_name).await?;
    let summaries = store.summary();

    println!(
        "{} {}",
        source_name.bright_cyan().bold(),
        store.path().display().to_string().dimmed()
    );
    if summaries.is_empty() {
        println!("  {}", "Nothing extracted yet".yellow());
        return Ok(true);
    }

    for summary in &summaries {
        println!("{}", format_season_summary(summary));
    }
    let last_run = &store.manifest().last_run;
    if !last_run.is_empty() {
        println!("  {} {}", "Last run:".bold(), last_run);
    }

    Ok(true)
}

pub async fn handle_ping(args: &ArgMatches) -> anyhow::Result<bool> {
    let url = args
        .get_one::<Url>("URL")
        .ok_or_else(|| anyhow!("URL is required"))?;

    let config = ScannerConfig::from_env();
    let scraper = BatchScraper::new(retrying_fetcher(&config)?, &config);
    let result = scraper.ping(url.as_str()).await;

    println!("{}", format_ping(&result));
    Ok(result.accessible)
}

pub async fn handle_scrape(args: &ArgMatches) -> anyhow::Result<bool> {
    let urls: Vec<Url> = args
        .get_many::<Url>("url")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let urls = load_urls_from_source(&urls, args.get_one::<PathBuf>("urls-file"))
        .map_err(|e| anyhow!(e))?;

    let config = ScannerConfig::from_env();
    let scraper = BatchScraper::new(retrying_fetcher(&config)?, &config);
    let options = BatchOptions {
        timeout_ms: args.get_one::<u64>("timeout").copied(),
        concurrency: args.get_one::<usize>("concurrency").copied(),
        ..BatchOptions::default()
    };

    let spinner = new_spinner(format!("Fetching {} URL(s)...", urls.len()));
    let batch = scraper.scrape_batch(&urls, &options).await;
    spinner.finish_and_clear();

    println!("{}", format_scrape_summary(&batch));
    Ok(batch.failure_count == 0)
}

pub fn handle_parse(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = args
        .get_one::<PathBuf>("FILE")
        .ok_or_else(|| anyhow!("FILE is required"))?;
    let document = read_document(path)?;

    let rendered = match args.get_one::<String>("select") {
        Some(selector) => {
            let attribute = args.get_one::<String>("attr").map(String::as_str);
            let matches = html::query_selector(&document, selector, attribute)?;
            serde_json::to_string_pretty(&matches)?
        }
        None => {
            let base_url = args.get_one::<String>("base-url").map(String::as_str);
            let parsed = html::parse(&document, base_url)?;
            serde_json::to_string_pretty(&parsed)?
        }
    };

    println!("{}", rendered);
    Ok(true)
}

fn read_document(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
