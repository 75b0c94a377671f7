use colored::Colorize;
use sitescan::commands::command_argument_builder;
use sitescan::handlers::{handle_analyze, handle_check, handle_resolve, handle_submit, init_tracing};
use sitescan_core::print_banner;

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

    let result = match chosen_command.subcommand() {
        Some(("resolve", primary_command)) => handle_resolve(primary_command).await,
        Some(("analyze", primary_command)) => handle_analyze(primary_command).await,
        Some(("check", primary_command)) => handle_check(primary_command).await,
        Some(("submit", primary_command)) => handle_submit(primary_command).await,
        // No subcommand provided, just show the banner
        None => return,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
