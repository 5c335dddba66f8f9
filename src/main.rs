#![forbid(unsafe_code)]

//! dtr — disk tree CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("dtr: {e}");
        std::process::exit(e.exit_code());
    }
}
