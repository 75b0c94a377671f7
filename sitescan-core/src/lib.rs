pub mod analyze;
pub mod indexnow;
pub mod report;

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
       _ _
   ___(_) |_ ___  ___  ___ __ _ _ __
  / __| | __/ _ \/ __|/ __/ _` | '_ \
  \__ \ | ||  __/\__ \ (_| (_| | | | |
  |___/_|\__\___||___/\___\__,_|_| |_|
"#;
    println!("{}", banner.cyan());
    println!(
        "  {} {}\n",
        "sitemap auditing and SEO probing".dimmed(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
