use crate::CLAP_STYLING;
use crate::handlers::{parse_endpoint, parse_since};
use clap::{arg, command};
use url::Url;

fn sitemap_url_arg() -> clap::Arg {
    arg!(<SITEMAP_URL>)
        .help("URL of the sitemap or sitemap index (http, https or file)")
        .value_parser(clap::value_parser!(Url))
}

fn timeout_arg(default: &'static str) -> clap::Arg {
    arg!(--"timeout" <SECONDS>)
        .required(false)
        .help("Per-request timeout in seconds")
        .value_parser(clap::value_parser!(u64))
        .default_value(default)
}

fn threads_arg(default: &'static str) -> clap::Arg {
    arg!(-t --"threads" <NUM_WORKERS>)
        .required(false)
        .help("The number of async workers in the probe pool.")
        .value_parser(clap::value_parser!(usize))
        .default_value(default)
}

fn max_depth_arg() -> clap::Arg {
    arg!(--"max-depth" <DEPTH>)
        .required(false)
        .help("Deepest sitemap index nesting to follow below the root")
        .value_parser(clap::value_parser!(usize))
        .default_value("5")
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitescan")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitescan")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and progress output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Raise log verbosity (-v info, -vv debug)")
                .required(false)
                .action(clap::ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("resolve")
                .about("Resolve a sitemap (recursively through sitemap indexes) into its URL list")
                .arg(sitemap_url_arg())
                .arg(max_depth_arg())
                .arg(timeout_arg("30"))
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the URL list to a file (default: print to screen)")
                        .value_parser(clap::value_parser!(String)),
                ),
        )
        .subcommand(
            command!("analyze")
                .about("Probe every URL in a sitemap and write an SEO report")
                .arg(sitemap_url_arg())
                .arg(threads_arg("10"))
                .arg(timeout_arg("30"))
                .arg(max_depth_arg())
                .arg(
                    arg!(--"max-redirects" <COUNT>)
                        .required(false)
                        .help("Redirects to follow before a probe fails")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    arg!(-o --"output" <PREFIX>)
                        .required(false)
                        .help("Report file prefix; a timestamp and extension are appended")
                        .default_value("seo_report"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: csv, json, text")
                        .value_parser(["csv", "json", "text"])
                        .default_value("csv"),
                )
                .arg(
                    arg!(--"deadline" <SECONDS>)
                        .required(false)
                        .help("Stop probing after this many seconds and write a partial report")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            command!("check")
                .about("Quick availability check (HEAD requests) of every URL in a sitemap")
                .arg(sitemap_url_arg())
                .arg(threads_arg("20"))
                .arg(timeout_arg("10"))
                .arg(max_depth_arg()),
        )
        .subcommand(
            command!("submit")
                .about("Submit the URLs of a sitemap to an IndexNow endpoint")
                .arg(sitemap_url_arg())
                .arg(
                    arg!(--"api-key" <KEY>)
                        .required(true)
                        .help("IndexNow API key")
                        .env("INDEXNOW_API_KEY"),
                )
                .arg(
                    arg!(--"key-location" <URL>)
                        .required(true)
                        .help("URL where the API key file is hosted"),
                )
                .arg(
                    arg!(--"host" <HOST>)
                        .required(false)
                        .help("Site host (default: host of the sitemap URL)"),
                )
                .arg(
                    arg!(--"endpoint" <ENDPOINT>)
                        .required(false)
                        .help("IndexNow endpoint: bing, yandex or a full URL")
                        .value_parser(parse_endpoint)
                        .default_value("bing"),
                )
                .arg(
                    arg!(--"batch-size" <COUNT>)
                        .required(false)
                        .help("URLs per submission")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("100"),
                )
                .arg(
                    arg!(--"delay" <SECONDS>)
                        .required(false)
                        .help("Delay between batches in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("1"),
                )
                .arg(
                    arg!(--"retries" <COUNT>)
                        .required(false)
                        .help("Retries per batch on rate limiting, server or transport errors")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("2"),
                )
                .arg(
                    arg!(--"since" <DATE>)
                        .required(false)
                        .help("Only submit URLs whose lastmod is on or after YYYY-MM-DD")
                        .value_parser(parse_since),
                )
                .arg(max_depth_arg())
                .arg(timeout_arg("30")),
        )
}
