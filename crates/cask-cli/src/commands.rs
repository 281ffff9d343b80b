use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;

use cask_crypto::digest_reader;
use cask_hub::{HubConfig, HubRegistry};
use cask_server::{CaskServer, ServerConfig};
use cask_store::{BlobStorage, DiskStorage, StorageConfig};
use cask_types::{HashAlgorithm, SizedContentAddress};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Put(args) => cmd_put(args, format),
        Command::Get(args) => cmd_get(args),
        Command::Hash(args) => cmd_hash(args, format),
        Command::List(args) => cmd_list(args, format),
        Command::InitConfig(args) => cmd_init_config(args),
    }
}

fn open_storage(args: &StoreArgs) -> anyhow::Result<DiskStorage> {
    let hubs = Arc::new(HubRegistry::new(HubConfig::default())?);
    DiskStorage::new(StorageConfig::new(&args.root), hubs)
        .with_context(|| format!("opening blob store at {}", args.root.display()))
}

/// Open `path` for reading; `-` is stdin.
fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Box::new(file))
}

fn print_blob(blob: &SizedContentAddress, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}  {}", blob.address.to_string().yellow(), blob.size),
        OutputFormat::Json => println!(
            "{}",
            json!({ "address": blob.address.to_string(), "size": blob.size })
        ),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = args.root {
        config.storage_root = root;
    }
    println!(
        "cask server on {} (root: {})",
        config.bind_addr.to_string().bold(),
        config.storage_root.display()
    );
    let server = CaskServer::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

/// Hash the input, then receive it. Stdin is buffered so it can be read twice.
fn put_blob(args: &PutArgs) -> anyhow::Result<SizedContentAddress> {
    let storage = open_storage(&args.store)?;
    let mut buffered = Vec::new();
    let hashed = if args.file == Path::new("-") {
        io::stdin().lock().read_to_end(&mut buffered)?;
        digest_reader(args.algorithm, &buffered[..])?
    } else {
        digest_reader(args.algorithm, open_input(&args.file)?)?
    };

    let source: Box<dyn Read + '_> = if args.file == Path::new("-") {
        Box::new(&buffered[..])
    } else {
        open_input(&args.file)?
    };
    let blob = storage
        .receive(&hashed.address, source, &args.mirrors)
        .with_context(|| format!("storing {}", args.file.display()))?;
    Ok(blob)
}

fn cmd_put(args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let blob = put_blob(&args)?;
    if let OutputFormat::Text = format {
        print!("{} ", "✓".green().bold());
    }
    print_blob(&blob, format);
    Ok(())
}

fn cmd_get(args: GetArgs) -> anyhow::Result<()> {
    let storage = open_storage(&args.store)?;
    let mut fetched = storage.fetch(&args.address)?;
    let copied = match &args.output {
        Some(path) => {
            let mut out =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let n = io::copy(&mut fetched.reader, &mut out)?;
            out.sync_all()?;
            n
        }
        None => {
            let mut out = io::stdout().lock();
            let n = io::copy(&mut fetched.reader, &mut out)?;
            out.flush()?;
            n
        }
    };
    anyhow::ensure!(
        copied == fetched.blob.size,
        "blob {} changed while reading: {copied} of {} bytes",
        args.address,
        fetched.blob.size
    );
    Ok(())
}

fn cmd_hash(args: HashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let blob = digest_reader(args.algorithm, open_input(&args.file)?)?;
    print_blob(&blob, format);
    Ok(())
}

fn list_blobs(args: &ListArgs) -> anyhow::Result<Vec<SizedContentAddress>> {
    let storage = open_storage(&args.store)?;
    let algorithms = match args.algorithm {
        Some(algorithm) => vec![algorithm],
        None => HashAlgorithm::ALL.to_vec(),
    };
    let mut blobs = Vec::new();
    for algorithm in algorithms {
        blobs.extend(storage.enumerate(algorithm)?);
    }
    Ok(blobs)
}

fn cmd_list(args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let blobs = list_blobs(&args)?;
    if blobs.is_empty() {
        if let OutputFormat::Text = format {
            println!("No blobs stored.");
        }
        return Ok(());
    }
    for blob in &blobs {
        print_blob(blob, format);
    }
    Ok(())
}

fn cmd_init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    ServerConfig::write_default(&args.path)?;
    println!(
        "{} Wrote default configuration to {}",
        "✓".green().bold(),
        args.path.display().to_string().bold()
    );
    Ok(())
}
