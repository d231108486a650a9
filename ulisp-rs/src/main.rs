use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ulisp::cli::{self, Cli, Command};
use ulisp::format::{self, PrettyOptions};
use ulisp::library;

fn main() -> Result<()> {
    let args = Cli::parse();
    install_tracing(args.verbose);

    let out = match args.command {
        Command::Fmt { file, indent } => {
            let source = read(file.as_deref())?;
            let opts = PrettyOptions { indent: " ".repeat(indent), ..PrettyOptions::default() };
            format::pretty_with(&source, &opts)
        }
        Command::Minify { file } => format::minify(&read(file.as_deref())?),
        Command::Library { file, lines } => {
            let entries = library::full_library(&read(file.as_deref())?);
            tracing::debug!(entries = entries.len(), "library built");
            if lines {
                entries.iter().map(|e| format!("{e}\n")).collect()
            } else {
                library::render_wire(&entries)
            }
        }
        Command::Declare { decls } => library::render_block(&decls),
        Command::Embed { file, decls } => {
            let source = read(Some(file.as_path()))?;
            library::embed_block(&source, &decls)
        }
        Command::Config { file } => {
            let config = cli::load_config(file.as_deref()).context("cannot read config")?;
            serde_json::to_string_pretty(&config)?
        }
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(out.as_bytes())?;
    if !out.is_empty() && !out.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

fn read(file: Option<&std::path::Path>) -> Result<String> {
    cli::read_source(file).with_context(|| match file {
        Some(p) => format!("failed to read {}", p.display()),
        None => "failed to read stdin".to_owned(),
    })
}

fn install_tracing(verbose: bool) {
    let default = if verbose { "ulisp=debug" } else { "ulisp=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
