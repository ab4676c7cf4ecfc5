use boxscore::handlers::{
    handle_extract, handle_parse, handle_ping, handle_scrape, handle_sources, handle_status,
    init_tracing, print_banner,
};
use clap::builder::styling::Styles;
use colored::Colorize;
use commands::command_argument_builder;

mod commands;

pub const CLAP_STYLING: Styles = Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_tracing(chosen_command.get_count("verbose"));

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let outcome = match chosen_command.subcommand() {
        Some(("extract", primary_command)) => handle_extract(primary_command).await,
        Some(("sources", primary_command)) => handle_sources(primary_command),
        Some(("status", primary_command)) => handle_status(primary_command).await,
        Some(("ping", primary_command)) => handle_ping(primary_command).await,
        Some(("scrape", primary_command)) => handle_scrape(primary_command).await,
        Some(("parse", primary_command)) => handle_parse(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(2);
        }
    }
}
