// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export the pure helpers for tests and embedding
pub use handlers::{
    INCREMENTAL_MAX_AGE_HOURS, YearSelection, build_extract_options, build_registry,
    expand_output_dir, format_entity_line, format_ping, format_run_summary,
    format_scrape_summary, format_season_summary, load_urls_from_file, load_urls_from_source,
    parse_url_line, select_years,
};
