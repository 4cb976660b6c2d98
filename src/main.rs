//! AeroCDC CLI entry point
//!
//! Minimal entrypoint: parse arguments, dispatch to the CLI module,
//! print errors to stderr, exit non-zero on failure. All logic lives in
//! the library.

use aerocdc::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
