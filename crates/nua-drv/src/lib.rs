//! Command-line driver.
//!
//! The entire CLI surface is one positional argument, a path to a
//! source file, so [`main`] parses argv, reads the file, compiles and
//! runs it, and reports the exit code (0 on success, nonzero on
//! file-load, parse, or runtime failure) in one function rather than
//! a separate `Config`/`Session` split.

use std::path::PathBuf;

use nua_util::diagnostic::{Diagnostic, Level};
use nua_util::Handler;

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_FILE_LOAD: i32 = 2;
const EXIT_COMPILE: i32 = 3;
const EXIT_RUNTIME: i32 = 4;

struct Args {
    path: PathBuf,
}

fn parse_args<I: Iterator<Item = String>>(mut argv: I) -> Result<Args, String> {
    argv.next(); // argv[0], the binary's own path
    let path = argv
        .next()
        .ok_or_else(|| "usage: nua <script.nua>".to_string())?;
    if argv.next().is_some() {
        return Err("usage: nua <script.nua>".to_string());
    }
    Ok(Args { path: PathBuf::from(path) })
}

fn print_diagnostic(diag: &Diagnostic) {
    if diag.span.line > 0 {
        eprintln!("{}:{}: {}: {}", diag.span.line, diag.span.column, diag.level, diag.message);
    } else {
        eprintln!("{}: {}", diag.level, diag.message);
    }
    for note in &diag.notes {
        eprintln!("  note: {note}");
    }
    for help in &diag.helps {
        eprintln!("  help: {help}");
    }
}

/// Parse argv, run the named script, and return the process exit
/// code.
pub fn main() -> i32 {
    let args = match parse_args(std::env::args()) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return EXIT_USAGE;
        }
    };

    let handler = Handler::new();
    match nua_runtime::run_file(&args.path, &handler) {
        Ok(()) => EXIT_OK,
        Err(nua_runtime::RuntimeError::FileLoad { path, source }) => {
            eprintln!("error: could not read `{path}`: {source}");
            EXIT_FILE_LOAD
        }
        Err(nua_runtime::RuntimeError::Compile) => {
            for diag in handler.diagnostics() {
                if diag.level == Level::Error || diag.level == Level::Bug {
                    print_diagnostic(&diag);
                }
            }
            EXIT_COMPILE
        }
        Err(nua_runtime::RuntimeError::Vm(err)) => {
            eprintln!("error: {err}");
            EXIT_RUNTIME
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_a_usage_error() {
        let err = parse_args(["nua".to_string()].into_iter()).unwrap_err();
        assert!(err.contains("usage"));
    }

    #[test]
    fn extra_arguments_are_a_usage_error() {
        let argv = ["nua".to_string(), "a.nua".to_string(), "b.nua".to_string()];
        assert!(parse_args(argv.into_iter()).is_err());
    }

    #[test]
    fn one_positional_argument_is_accepted() {
        let argv = ["nua".to_string(), "script.nua".to_string()];
        let args = parse_args(argv.into_iter()).expect("one path argument should parse");
        assert_eq!(args.path, PathBuf::from("script.nua"));
    }
}
