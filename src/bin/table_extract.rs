//! Extract tables and labeled fields from one OCR'd page.
//!
//! Usage:
//!   table_extract --config classes.yaml --input page.json
//!   table_extract --config classes.json --input page.json --class invoice --pretty
//!
//! Prints the extraction as JSON on stdout. A page without a table still
//! succeeds with `"found": false`.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use table_oxide::config::DocumentConfig;
use table_oxide::input::Page;
use table_oxide::processor::{ConfiguredProcessor, ProcessorRegistry};

#[derive(Parser)]
#[command(name = "table_extract")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconstruct tables and fields from OCR text fragments", long_about = None)]
struct Cli {
    /// Class configuration (.yaml/.yml or .json)
    #[arg(long)]
    config: PathBuf,

    /// OCR page as JSON
    #[arg(long)]
    input: PathBuf,

    /// Document class, overriding the page's own
    #[arg(long)]
    class: Option<String>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

fn report(err: &dyn std::error::Error) {
    log::error!("{}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        log::error!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn run(cli: &Cli) -> table_oxide::Result<String> {
    let config = DocumentConfig::from_path(&cli.config)?;
    let mut registry = ProcessorRegistry::new();
    registry.register(Box::new(ConfiguredProcessor::new("configured", config)?));

    let page = Page::from_json(&std::fs::read_to_string(&cli.input)?)?;
    let output = match &cli.class {
        Some(class) => registry.process_as(&page, class)?,
        None => registry.process(&page)?,
    };
    let json = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    Ok(json)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        },
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        },
    }
}
