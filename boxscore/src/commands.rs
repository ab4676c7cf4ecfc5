use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("boxscore")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("boxscore")
        .about("Incremental extraction of sports league statistics")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" ... "Increase log verbosity (-v info, -vv debug)")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("extract")
                .about(
                    "Extract every entity of a source for one season (or all seasons), \
                skipping what the manifest already has.",
                )
                .arg(arg!(<SOURCE> "Name of the source to extract (see `boxscore sources`)"))
                .arg(
                    arg!(-y --"year" <YEAR>)
                        .required(false)
                        .help("Season to extract (default: the source's default season)")
                        .value_parser(clap::value_parser!(u16))
                        .conflicts_with("all"),
                )
                .arg(
                    arg!(--"all")
                        .required(false)
                        .help("Extract the source's full historical range")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-f --"force")
                        .required(false)
                        .help("Re-extract entities even if the manifest marks them complete")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"with-schedule")
                        .required(false)
                        .help("Include the optional schedule/game extraction pass")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"max-age" <HOURS>)
                        .required(false)
                        .help("Re-extract manifest entries older than HOURS")
                        .value_parser(clap::value_parser!(f64))
                        .conflicts_with("incremental"),
                )
                .arg(
                    arg!(--"incremental")
                        .required(false)
                        .help("Alias for --max-age=24")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Output directory for manifests and entity files")
                        .default_value("./output"),
                )
                .arg(
                    arg!(--"sources-file" <PATH>)
                        .required(false)
                        .help("JSON file with additional source definitions")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("sources")
                .about("List known sources with their seasons and entities")
                .arg(
                    arg!(--"sources-file" <PATH>)
                        .required(false)
                        .help("JSON file with additional source definitions")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("status")
                .about("Show the extraction manifest of a source")
                .arg(arg!(<SOURCE> "Name of the source"))
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Output directory for manifests and entity files")
                        .default_value("./output"),
                ),
        )
        .subcommand(
            command!("ping")
                .about("Check whether a URL is reachable")
                .arg(arg!(<URL> "The URL to probe").value_parser(clap::value_parser!(Url))),
        )
        .subcommand(
            command!("scrape")
                .about("Fetch a batch of URLs with retry under a bounded worker pool")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("A URL to fetch (repeatable)")
                        .value_parser(clap::value_parser!(Url))
                        .action(clap::ArgAction::Append)
                        .conflicts_with("urls-file"),
                )
                .arg(
                    arg!(-H --"urls-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to fetch")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-c --"concurrency" <NUM_WORKERS>)
                        .required(false)
                        .help("Maximum simultaneous requests (default: BOXSCORE_MAX_CONCURRENCY or 5)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-t --"timeout" <MILLISECONDS>)
                        .required(false)
                        .help("Per-request timeout in milliseconds")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            command!("parse")
                .about("Parse a local HTML file into text, metadata, links and images")
                .arg(
                    arg!(<FILE> "HTML file to parse")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"base-url" <URL>)
                        .required(false)
                        .help("Resolve relative links and images against this URL"),
                )
                .arg(
                    arg!(-s --"select" <SELECTOR>)
                        .required(false)
                        .help("Run a CSS selector query instead of a full parse"),
                )
                .arg(
                    arg!(-a --"attr" <NAME>)
                        .required(false)
                        .help("With --select, extract this attribute instead of text")
                        .requires("select"),
                ),
        )
}
