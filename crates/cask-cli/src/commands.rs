use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use cask_collection::{CollectionConfig, CollectionReader, CollectionWriter};
use cask_manifest::normalize_text;
use cask_store::{BlockStore, DirBlockStore};
use cask_types::Locator;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

#[derive(Serialize)]
struct PutOutput {
    locator: Locator,
    streams: usize,
    files: usize,
}

#[derive(Serialize)]
struct FileRow {
    path: String,
    size: u64,
}

pub fn run_command(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match &cli.command {
        Command::Put(args) => cmd_put(&cli, config, args, out),
        Command::Manifest(args) => cmd_manifest(&cli, config, args, out),
        Command::Ls(args) => cmd_ls(&cli, config, args, out),
        Command::Cat(args) => cmd_cat(&cli, config, args, out),
        Command::Normalize(args) => cmd_normalize(config, args, out),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CollectionConfig> {
    let mut config = match &cli.config {
        Some(path) => CollectionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CollectionConfig::default(),
    };
    if let Some(block_size) = cli.block_size {
        config.block_size = block_size;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn BlockStore>> {
    let store = DirBlockStore::open(&cli.store)
        .with_context(|| format!("opening block store {}", cli.store.display()))?;
    Ok(Arc::new(store))
}

/// A collection argument is a locator, manifest text, or a file holding
/// manifest text.
fn open_reader(cli: &Cli, config: CollectionConfig, input: &str) -> anyhow::Result<CollectionReader> {
    let store = open_store(cli)?;
    let path = Path::new(input);
    if path.is_file() {
        debug!(path = %path.display(), "reading manifest from file");
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return Ok(CollectionReader::new(&text, store, config)?);
    }
    Ok(CollectionReader::new(input, store, config)?)
}

fn cmd_put(cli: &Cli, config: CollectionConfig, args: &PutArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut writer = CollectionWriter::new(open_store(cli)?, config)?;
    if args.path.is_dir() {
        writer.write_directory_tree(&args.path, &args.stream, args.max_depth)?;
    } else {
        writer.start_new_stream(&args.stream)?;
        writer.write_file_path(&args.path, None)?;
    }
    let locator = writer.finish()?;
    let streams = writer.finished_streams();
    let files = streams.iter().map(|s| s.files.len()).sum();

    match cli.format {
        OutputFormat::Json => {
            let output = PutOutput { locator, streams: streams.len(), files };
            writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
        }
        OutputFormat::Text => {
            writeln!(out, "{locator}")?;
            eprintln!(
                "{} Stored {} files in {} streams",
                "✓".green().bold(),
                files.to_string().bold(),
                streams.len().to_string().bold()
            );
        }
    }
    Ok(())
}

fn cmd_manifest(cli: &Cli, config: CollectionConfig, args: &ManifestArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut reader = open_reader(cli, config, &args.collection)?;
    out.write_all(reader.manifest_text()?.as_bytes())?;
    Ok(())
}

fn cmd_ls(cli: &Cli, config: CollectionConfig, args: &LsArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut reader = open_reader(cli, config, &args.collection)?;
    let rows: Vec<FileRow> = reader
        .all_files()?
        .map(|entry| FileRow { path: entry.path(), size: entry.size() })
        .collect();

    match cli.format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?,
        OutputFormat::Text => {
            for row in &rows {
                writeln!(out, "{:>12}  {}", row.size.to_string().dimmed(), row.path)?;
            }
        }
    }
    Ok(())
}

fn cmd_cat(cli: &Cli, config: CollectionConfig, args: &CatArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut reader = open_reader(cli, config, &args.collection)?;
    let data = reader
        .read_file(&args.path)
        .with_context(|| format!("reading {} from collection", args.path))?;
    out.write_all(&data)?;
    Ok(())
}

fn cmd_normalize(config: CollectionConfig, args: &NormalizeArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let manifest = normalize_text(&text, &config.empty_block_locator)?;
    out.write_all(manifest.to_text().as_bytes())?;
    Ok(())
}
