//! # imagepile CLI
//!
//! Command-line interface for the imagepile block deduplication store.
//!
//! The pile directory (pool + hash index) comes from the `IMGDIR`
//! environment variable or the global config file; `-` stands for
//! stdin/stdout wherever a file path is expected.

use std::fs::File;
use std::io::{self, Cursor, Read, Write};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

mod args;
mod signals;

use args::split_add_args;
use imagepile_config::Config;
use imagepile_image::{ingest, reconstruct};
use imagepile_store::{BlockPool, DedupStore, POOL_FILE};
use signals::TerminationFlag;

/// Imagepile - deduplicating disk image store
#[derive(Parser)]
#[command(name = "imagepile")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an image to the pile, producing its descriptor
    ///
    /// Positionals are `[head_skip] <input> <descriptor_out>`; the
    /// optional leading byte offset shortens the first block for images
    /// whose partitions start off the 4096-byte grid.
    Add {
        #[arg(value_name = "ARGS", num_args = 2..=3, required = true)]
        args: Vec<String>,
    },

    /// Reconstruct an image's original data from its descriptor
    Read {
        #[arg(value_name = "DESCRIPTOR_IN")]
        descriptor: String,

        #[arg(value_name = "OUTPUT")]
        output: String,
    },
}

fn main() -> Result<()> {
    imagepile_config::logging::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Add { args } => cmd_add(&args),
        Commands::Read { descriptor, output } => cmd_read(&descriptor, &output),
    }
}

fn cmd_add(raw_args: &[String]) -> Result<()> {
    let add = split_add_args(raw_args)?;
    ensure_distinct(add.input, add.descriptor_out)?;

    let config = Config::load()?;
    let pile_dir = config.pile_dir()?;

    signals::install().context("cannot install signal handlers")?;

    let mut store = DedupStore::open(pile_dir)
        .with_context(|| format!("cannot open pile in {}", pile_dir.display()))?;
    info!(fingerprints = store.blocks(), "lookup rebuilt from hash index");

    let mut input = open_input(add.input)?;

    let report = if add.descriptor_out == "-" {
        // The tail_bytes patch needs a seekable sink, so a stdout
        // descriptor is staged in memory and streamed out afterwards.
        let mut staged = Cursor::new(Vec::new());
        let report = ingest(
            &mut store,
            &mut input,
            &mut staged,
            add.head_skip,
            &TerminationFlag,
        )?;
        io::stdout()
            .write_all(staged.get_ref())
            .context("cannot write descriptor to stdout")?;
        report
    } else {
        let out = File::create(add.descriptor_out)
            .with_context(|| format!("cannot open descriptor output: {}", add.descriptor_out))?;
        ingest(&mut store, &mut input, out, add.head_skip, &TerminationFlag)?
    };

    info!(
        blocks = report.blocks,
        bytes = report.bytes,
        new = report.new_blocks,
        reused = report.reused_blocks,
        probes = report.probes,
        collisions = report.collisions,
        "image added"
    );
    Ok(())
}

fn cmd_read(descriptor: &str, output: &str) -> Result<()> {
    ensure_distinct(descriptor, output)?;

    let config = Config::load()?;
    let pile_dir = config.pile_dir()?;

    signals::install().context("cannot install signal handlers")?;

    let pool_path = pile_dir.join(POOL_FILE);
    let mut pool = BlockPool::open_readonly(&pool_path)
        .with_context(|| format!("cannot open pool: {}", pool_path.display()))?;

    let descriptor_in = open_input(descriptor)?;
    let out = open_output(output)?;

    let report = reconstruct(&mut pool, descriptor_in, out, &TerminationFlag)?;
    info!(
        blocks = report.blocks,
        bytes = report.bytes,
        "image reconstructed"
    );
    Ok(())
}

fn ensure_distinct(a: &str, b: &str) -> Result<()> {
    if a != "-" && a == b {
        bail!("input and output files must be different");
    }
    Ok(())
}

fn open_input(path: &str) -> Result<Box<dyn Read>> {
    if path == "-" {
        Ok(Box::new(io::stdin().lock()))
    } else {
        let file =
            File::open(path).with_context(|| format!("cannot open input: {path}"))?;
        Ok(Box::new(file))
    }
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        Ok(Box::new(io::stdout().lock()))
    } else {
        let file =
            File::create(path).with_context(|| format!("cannot open output: {path}"))?;
        Ok(Box::new(file))
    }
}
