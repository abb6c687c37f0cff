//! Rockstar CLI
//!
//! The thin driver that reads a `.rock` source file from disk and hands it
//! to [`rockstar_compiler`]/[`rockstar_rt`]: the lexer turns it into a
//! token stream, the evaluator runs that stream to completion, and `Shout`
//! output lands on stdout as it's produced. Everything here is plumbing —
//! the language itself lives in the other two crates.

use clap::Parser;
use rockstar_compiler::tokenize;
use rockstar_rt::Evaluator;
use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use thiserror::Error;

/// `rockstar [<path>] [--dump-tokens] [-v]`.
///
/// With no `path`, `demo.rock` in the current directory is run. `--dump-tokens`
/// is a debugging aid: it prints the lexer's token stream as JSON instead of
/// executing the program. `-v`/`--verbose` raises the `tracing` filter one
/// step regardless of `RUST_LOG`.
#[derive(Parser, Debug)]
#[command(
    name = "rockstar",
    version,
    about = "An interpreter for the Rockstar programming language",
    long_about = "Rockstar is a dynamically-typed language whose syntax is \
                  inspired by song lyrics.\n\nWith no arguments, `demo.rock` \
                  in the current directory is executed."
)]
pub struct Cli {
    /// Path to a `.rock` source file. Defaults to `demo.rock`.
    #[arg(default_value = "demo.rock")]
    pub path: PathBuf,

    /// Print the lexed token stream as JSON instead of running the program.
    #[arg(long)]
    pub dump_tokens: bool,

    /// Raise the tracing filter to `debug` regardless of `RUST_LOG`.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("couldn't read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Lex(#[from] rockstar_compiler::LexError),
    #[error("{0}")]
    Runtime(#[from] rockstar_rt::RuntimeError),
    #[error("couldn't serialize tokens: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Installs a `tracing` subscriber that writes to stderr, honoring
/// `RUST_LOG` (defaults to `warn`) so diagnostics never interleave with
/// `Shout`'s stdout output. `verbose` raises the floor to `debug` when
/// `RUST_LOG` isn't set.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

/// Runs the interpreter end to end against stdout. Returns the error that
/// should be reported (with a source line where applicable) and result in
/// a non-zero exit code.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let source = std::fs::read_to_string(&cli.path).map_err(|source| CliError::Read {
        path: cli.path.display().to_string(),
        source,
    })?;
    let tokens = tokenize(&source)?;

    if cli.dump_tokens {
        let json = serde_json::to_string_pretty(&tokens)?;
        println!("{json}");
        return Ok(());
    }

    let stdout: Rc<RefCell<dyn io::Write>> = Rc::new(RefCell::new(io::stdout()));
    let mut evaluator = Evaluator::new(tokens, stdout);
    evaluator.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("rockstar-cli-test-{name}-{}.rock", std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let cli = Cli {
            path: PathBuf::from("/nonexistent/path/definitely-not-here.rock"),
            dump_tokens: false,
            verbose: false,
        };
        assert!(matches!(run(&cli), Err(CliError::Read { .. })));
    }

    #[test]
    fn runs_a_well_formed_program() {
        let path = write_source("hello", "Shout \"hello\"\n");
        let cli = Cli { path: path.clone(), dump_tokens: false, verbose: false };
        assert!(run(&cli).is_ok());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn surfaces_lex_errors() {
        let path = write_source("bad-string", "Shout \"oops\n");
        let cli = Cli { path: path.clone(), dump_tokens: false, verbose: false };
        assert!(matches!(run(&cli), Err(CliError::Lex(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn dump_tokens_prints_json_instead_of_running() {
        let path = write_source("dump", "Shout \"hi\"\n");
        let cli = Cli { path: path.clone(), dump_tokens: true, verbose: false };
        assert!(run(&cli).is_ok());
        std::fs::remove_file(path).ok();
    }
}
