//! `rockstar` binary entry point. See [`rockstar_cli`] for the driver logic.

use clap::Parser;
use rockstar_cli::{init_tracing, run, Cli};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
