use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pycxx::{TranspileConfig, Transpiler, parser};

const USAGE: &str = "\
Usage: pycxx [--config <file.yaml>] [--output <file.cpp>] [input.py]

Reads the program from stdin when no input file is given.
Set PYCXX_LOG (e.g. PYCXX_LOG=debug) to control diagnostics on stderr.";

#[derive(Debug, Default)]
struct Options {
    config_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    input_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();

    let Some(options) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = match &options.config_path {
        Some(path) => TranspileConfig::load(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => TranspileConfig::default(),
    };

    let source = match &options.input_path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            buffer
        }
    };
    let input_name = options
        .input_path
        .as_ref()
        .map_or_else(|| "<stdin>".to_string(), |path| path.display().to_string());

    let program = parser::parse(&source).with_context(|| format!("Parsing {input_name}"))?;
    debug!(statements = program.statements.len(), "parsed program");
    let output = Transpiler::new(config)
        .transpile(&program)
        .with_context(|| format!("Translating {input_name}"))?;

    match &options.output_path {
        Some(path) => {
            fs::write(path, &output).with_context(|| format!("Writing {}", path.display()))?;
            info!(path = %path.display(), bytes = output.len(), "wrote translation");
        }
        None => print!("{output}"),
    }
    Ok(())
}

/// Returns `None` when help was requested.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Options>> {
    let mut options = Options::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("Missing config path after {arg}"))?;
                options.config_path = Some(PathBuf::from(path));
            }
            "--output" | "-o" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("Missing output path after {arg}"))?;
                options.output_path = Some(PathBuf::from(path));
            }
            flag if flag.starts_with('-') && flag != "-" => bail!("Unknown option '{flag}'"),
            _ => {
                if options.input_path.is_some() {
                    bail!("Only one input file is supported");
                }
                if arg != "-" {
                    options.input_path = Some(PathBuf::from(arg));
                }
            }
        }
    }
    Ok(Some(options))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PYCXX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
