use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "packvault",
    about = "packvault -- deduplicating attachment store for packaged documents",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding blobs, working directories and the catalog
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a package's attachments and rewrite its document to download references
    Ingest(IngestArgs),
    /// Revert a document's download references and package it with its attachments
    Export(ExportArgs),
    /// Delete one attachment by composite key
    Delete(DeleteArgs),
    /// Fetch stored content by download reference or hash
    Download(DownloadArgs),
    /// List stored content records
    Files(ListArgs),
    /// List attachment metadata rows
    Metas(ListArgs),
    /// Show which leaves a path resolves to
    Resolve(ResolveArgs),
}

#[derive(Args)]
pub struct IngestArgs {
    /// Package file (.tar.gz) or unpacked package directory
    pub input: PathBuf,
    /// Where to write the rewritten document
    #[arg(short, long)]
    pub out: PathBuf,
    /// Document to use instead of the package's document.json
    #[arg(long)]
    pub document: Option<PathBuf>,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Document JSON holding download references
    pub document: PathBuf,
    /// Output package file, or directory with --dir
    #[arg(short, long)]
    pub out: PathBuf,
    /// Write an unpacked directory instead of a .tar.gz package
    #[arg(long)]
    pub dir: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Composite key `owner::collection::leaf`
    pub identity: String,
}

#[derive(Args)]
pub struct DownloadArgs {
    /// Download reference, `{hash}{ext}` file name or bare hash
    pub reference: String,
    /// Output file; defaults to the attachment's original name
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long, default_value = "0")]
    pub offset: usize,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Package file, package directory or document JSON
    pub input: PathBuf,
    /// Attachment path to resolve
    pub path: String,
}
