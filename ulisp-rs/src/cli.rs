//! Command-line argument parsing.
//!
//! Usage:
//!   ulisp [-v] fmt     [<file>]
//!   ulisp [-v] minify  [<file>]
//!   ulisp [-v] library [<file>]
//!   ulisp [-v] declare <decl>...
//!   ulisp [-v] embed   <file> <decl>...
//!   ulisp [-v] config  [<file>]
//!
//! Scripts are read from stdin when no file is given.  A `<decl>` is
//! `name(a b)`, `name/N` or a full `(defjs name (a b))` form.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::config::BridgeConfig;
use crate::library::LibraryEntry;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ULISP_CONFIG";

const CONFIG_FILE_NAME: &str = "ulisp.conf";

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "ulisp", version, about = "uLisp script tooling", long_about = None)]
pub struct Cli {
    /// Log debug detail to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pretty-print a script
    Fmt {
        /// Script file (stdin if omitted)
        file: Option<PathBuf>,
        /// Spaces per nesting level
        #[arg(long, default_value_t = 2)]
        indent: usize,
    },
    /// Strip comments and collapse whitespace
    Minify { file: Option<PathBuf> },
    /// Print the wire-form library a script runs with
    Library {
        file: Option<PathBuf>,
        /// One declaration per line instead of the single wire line
        #[arg(long)]
        lines: bool,
    },
    /// Render a user-library block from declarations
    Declare {
        #[arg(required = true)]
        decls: Vec<LibraryEntry>,
    },
    /// Replace (or insert) the user-library block of a script
    Embed {
        file: PathBuf,
        decls: Vec<LibraryEntry>,
    },
    /// Print the effective bridge configuration as JSON
    Config {
        /// Config file (searched for if omitted)
        file: Option<PathBuf>,
    },
}

// ── Input helpers ─────────────────────────────────────────────────────────────

/// Read a script from `file`, or from stdin when `None`.
pub fn read_source(file: Option<&Path>) -> std::io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s)?;
            Ok(s)
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the config file in the standard locations.
///
/// Priority: `$ULISP_CONFIG` → the platform config directory →
/// `./ulisp.conf`.  Returns the first path that exists, or `None`.
pub fn find_config_file() -> Option<PathBuf> {
    let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let from_dirs = ProjectDirs::from("", "", "ulisp")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME));
    config_candidates(from_env, from_dirs).find(|p| p.exists())
}

fn config_candidates(
    from_env: Option<PathBuf>,
    from_dirs: Option<PathBuf>,
) -> impl Iterator<Item = PathBuf> {
    from_env
        .into_iter()
        .chain(from_dirs)
        .chain(std::iter::once(PathBuf::from(CONFIG_FILE_NAME)))
}

/// Load the config from `explicit`, or from the first file
/// [`find_config_file`] finds.  No file at all means defaults.
pub fn load_config(explicit: Option<&Path>) -> std::io::Result<BridgeConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };
    match path {
        Some(p) => {
            tracing::debug!(path = %p.display(), "loading config");
            // Per-line problems are logged by the loader.
            BridgeConfig::load_file(&p).map(|(config, _errors)| config)
        }
        None => Ok(BridgeConfig::default()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ulisp").chain(args.iter().copied()))
    }

    #[test]
    fn fmt_defaults() {
        let cli = parse(&["fmt"]).unwrap();
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Command::Fmt { file: None, indent: 2 }));
    }

    #[test]
    fn fmt_with_file_and_indent() {
        let cli = parse(&["fmt", "blink.lisp", "--indent", "4"]).unwrap();
        match cli.command {
            Command::Fmt { file, indent } => {
                assert_eq!(file, Some(PathBuf::from("blink.lisp")));
                assert_eq!(indent, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn verbose_is_global() {
        assert!(parse(&["-v", "minify"]).unwrap().verbose);
        assert!(parse(&["minify", "--verbose"]).unwrap().verbose);
    }

    #[test]
    fn declare_parses_entries() {
        let cli = parse(&["declare", "blink(pin times)", "reset/0"]).unwrap();
        match cli.command {
            Command::Declare { decls } => {
                assert_eq!(decls.len(), 2);
                assert_eq!(decls[0].declaration(), "(defjs blink (pin times))");
                assert_eq!(decls[1].declaration(), "(defjs reset ())");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn declare_requires_a_declaration() {
        assert!(parse(&["declare"]).is_err());
    }

    #[test]
    fn bad_declaration_rejected() {
        assert!(parse(&["declare", "no spaces allowed()"]).is_err());
    }

    #[test]
    fn embed_allows_no_declarations() {
        let cli = parse(&["embed", "a.lisp"]).unwrap();
        assert!(matches!(cli.command, Command::Embed { ref decls, .. } if decls.is_empty()));
    }

    #[test]
    fn missing_subcommand() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn candidate_order() {
        let found: Vec<_> = config_candidates(
            Some(PathBuf::from("/env/u.conf")),
            Some(PathBuf::from("/home/x/.config/ulisp/ulisp.conf")),
        )
        .collect();
        assert_eq!(
            found,
            [
                PathBuf::from("/env/u.conf"),
                PathBuf::from("/home/x/.config/ulisp/ulisp.conf"),
                PathBuf::from("ulisp.conf"),
            ]
        );
        assert_eq!(config_candidates(None, None).count(), 1);
    }

    #[test]
    fn explicit_config_file() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "max_heap = 500").unwrap();
        let c = load_config(Some(f.path())).unwrap();
        assert_eq!(c.max_heap, 500);
        assert!(load_config(Some(Path::new("/nonexistent/ulisp.conf"))).is_err());
    }
}
