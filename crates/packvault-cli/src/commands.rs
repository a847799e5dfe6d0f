use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use packvault_pipeline::{
    load_document, Container, ContainerReader, ContainerWriter, DeleteOutcome, DirectoryContainer,
    DirectoryWriter, ItemOutcome, PackageReader, PackageWriter, PageRequest, Vault, VaultConfig,
};
use packvault_tree::{collect_identities, normalize, resolve_one, Document, LeafTarget};
use packvault_types::Identity;
use serde::Serialize;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.root.as_deref())?;
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::Ingest(args) => cmd_ingest(config, args, json),
        Command::Export(args) => cmd_export(config, args, json),
        Command::Delete(args) => cmd_delete(config, args, json),
        Command::Download(args) => cmd_download(config, args, json),
        Command::Files(args) => cmd_files(config, args, json),
        Command::Metas(args) => cmd_metas(config, args, json),
        Command::Resolve(args) => cmd_resolve(args, json),
    }
}

fn load_config(path: Option<&Path>, root: Option<&Path>) -> anyhow::Result<VaultConfig> {
    let config = match path {
        Some(path) => VaultConfig::load(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => VaultConfig::default(),
    };
    Ok(match root {
        Some(root) => config.with_root(root),
        None => config,
    })
}

fn open_container(input: &Path) -> anyhow::Result<Box<dyn Container>> {
    if input.is_dir() {
        return Ok(Box::new(DirectoryContainer::open(input)?));
    }
    let bytes = fs::read(input).with_context(|| format!("cannot read {}", input.display()))?;
    PackageReader
        .open(&bytes)
        .with_context(|| format!("{} is not a package", input.display()))
}

fn read_document(path: &Path) -> anyhow::Result<Document> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("{} is not a document", path.display()))
}

fn write_document(path: &Path, doc: &Document) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(doc)?)
        .with_context(|| format!("cannot write {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_ingest(config: VaultConfig, args: IngestArgs, json: bool) -> anyhow::Result<()> {
    let container = open_container(&args.input)?;
    let mut doc = match &args.document {
        Some(path) => read_document(path)?,
        None => load_document(container.as_ref()).context("package has no readable document")?,
    };

    let vault = Vault::open(config)?;
    let report = vault.ingest(&mut doc, container.as_ref())?;
    vault.save()?;
    write_document(&args.out, &doc)?;

    if json {
        return print_json(&report);
    }
    println!(
        "{} Ingested {} candidates: {} rewritten, {} deduplicated, {} skipped",
        "✓".green().bold(),
        report.candidates.to_string().bold(),
        report.rewritten,
        report.deduplicated,
        report.skipped,
    );
    for item in &report.items {
        match &item.outcome {
            ItemOutcome::Stored { identity, url, degraded, .. } => {
                let mark = if *degraded { " (fallback)".yellow().to_string() } else { String::new() };
                println!("  {} {} -> {}{}", "stored:".green(), item.path, url.blue(), mark);
                println!("          {}", identity.to_string().dimmed());
            }
            ItemOutcome::Skipped { reason } => {
                println!("  {} {}: {}", "skipped:".red(), item.path, reason);
            }
        }
    }
    for collision in &report.collisions {
        println!(
            "  {} {} shared by {} and {}",
            "collision:".yellow().bold(),
            collision.identity,
            collision.first_path,
            collision.path
        );
    }
    println!("Document written to {}", args.out.display().to_string().bold());
    Ok(())
}

fn cmd_export(config: VaultConfig, args: ExportArgs, json: bool) -> anyhow::Result<()> {
    let mut doc = read_document(&args.document)?;
    let vault = Vault::open(config)?;
    let (bundle, _session) = vault.export(&mut doc)?;

    if args.dir {
        DirectoryWriter::new(&args.out).write(&doc, &bundle.attachments)?;
    } else {
        let package = PackageWriter.write(&doc, &bundle.attachments)?;
        fs::write(&args.out, package)
            .with_context(|| format!("cannot write {}", args.out.display()))?;
    }

    if json {
        return print_json(&bundle.report);
    }
    let report = &bundle.report;
    println!(
        "{} Exported {} attachments ({} reverted, {} unresolved, {} failed)",
        "✓".green().bold(),
        report.attachments.to_string().bold(),
        report.reverted,
        report.unresolved,
        report.failed,
    );
    for attachment in &bundle.attachments {
        println!(
            "  {} ({}, {} bytes)",
            attachment.path,
            attachment.content_type.cyan(),
            attachment.bytes.len()
        );
    }
    println!("  Session: {}", report.session.to_string().dimmed());
    println!("Written to {}", args.out.display().to_string().bold());
    Ok(())
}

fn cmd_delete(config: VaultConfig, args: DeleteArgs, json: bool) -> anyhow::Result<()> {
    let identity: Identity = args
        .identity
        .parse()
        .with_context(|| format!("invalid composite key {:?}", args.identity))?;
    let vault = Vault::open(config)?;
    let outcome = vault.delete_attachment(&identity)?;
    vault.save()?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        DeleteOutcome::Missing => println!("No attachment {}", identity.to_string().yellow()),
        DeleteOutcome::Released { meta, ref_count } => println!(
            "{} Deleted {}; content {} still referenced {} time(s)",
            "✓".green().bold(),
            identity.to_string().yellow(),
            meta.hash.short_hex().cyan(),
            ref_count
        ),
        DeleteOutcome::Reclaimed { meta } => println!(
            "{} Deleted {}; content {} reclaimed",
            "✓".green().bold(),
            identity.to_string().yellow(),
            meta.hash.short_hex().cyan()
        ),
    }
    Ok(())
}

fn cmd_download(config: VaultConfig, args: DownloadArgs, json: bool) -> anyhow::Result<()> {
    let vault = Vault::open(config)?;
    let download = vault.download_reference(&args.reference)?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(download.file_name()));
    fs::write(&out, &download.bytes).with_context(|| format!("cannot write {}", out.display()))?;

    if json {
        return print_json(&json!({
            "hash": download.record.hash,
            "file": out.display().to_string(),
            "size": download.bytes.len(),
            "contentType": download.meta.content_type,
        }));
    }
    println!(
        "{} {} ({}, {} bytes) -> {}",
        "✓".green().bold(),
        download.record.hash.short_hex().cyan(),
        download.meta.content_type,
        download.bytes.len(),
        out.display().to_string().bold()
    );
    Ok(())
}

fn page_request(args: &ListArgs) -> PageRequest {
    PageRequest {
        offset: args.offset,
        limit: args.limit,
    }
}

fn cmd_files(config: VaultConfig, args: ListArgs, json: bool) -> anyhow::Result<()> {
    let vault = Vault::open(config)?;
    let page = vault.list_contents(page_request(&args))?;
    if json {
        return print_json(&page);
    }
    for record in &page.items {
        println!(
            "{}  {:>10} bytes  refs {}  {}",
            record.hash.short_hex().yellow(),
            record.size,
            record.ref_count.to_string().bold(),
            record.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!("Showing {} of {} content records", page.items.len(), page.total);
    Ok(())
}

fn cmd_metas(config: VaultConfig, args: ListArgs, json: bool) -> anyhow::Result<()> {
    let vault = Vault::open(config)?;
    let page = vault.list_metadata(page_request(&args))?;
    if json {
        return print_json(&page);
    }
    for meta in &page.items {
        println!(
            "{}  {}{}  {}  {}",
            meta.identity.to_string().bold(),
            meta.name,
            meta.extension,
            meta.content_type.cyan(),
            meta.hash.short_hex().yellow()
        );
    }
    println!("Showing {} of {} metadata rows", page.items.len(), page.total);
    Ok(())
}

fn cmd_resolve(args: ResolveArgs, json: bool) -> anyhow::Result<()> {
    let doc = if args.input.is_file() && args.input.extension().is_some_and(|e| e == "json") {
        read_document(&args.input)?
    } else {
        let container = open_container(&args.input)?;
        load_document(container.as_ref()).context("package has no readable document")?
    };

    let mut resolutions = collect_identities(&doc, &normalize(&args.path))?;
    if resolutions.is_empty() {
        resolutions.push(resolve_one(&doc, &args.path)?);
    }

    let rows: Vec<_> = resolutions
        .iter()
        .map(|r| {
            let target = match r.target {
                LeafTarget::DefaultImage { .. } => "default_image",
                LeafTarget::Leaf(_) => "leaf",
                LeafTarget::Unlocated => "fallback",
            };
            (r.identity.composite_key(), target, r.degraded)
        })
        .collect();

    if json {
        let values: Vec<_> = rows
            .iter()
            .map(|(identity, target, degraded)| {
                json!({ "identity": identity, "target": target, "degraded": degraded })
            })
            .collect();
        return print_json(&values);
    }
    for (i, (identity, target, degraded)) in rows.iter().enumerate() {
        let mark = if *degraded { "degraded".yellow() } else { "ok".green() };
        println!("{}. {} [{}] {}", i + 1, identity.bold(), target, mark);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use packvault_tree::Node;

    use super::*;

    const DOCUMENT: &str = r#"{
        "records": [{ "id": "aas", "collections": ["sm"] }],
        "collections": [{
            "id": "sm",
            "children": [
                { "kind": "attachment", "id": "Logo", "value": "img/logo.png", "contentType": "image/png" }
            ]
        }]
    }"#;

    fn run(args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["packvault"];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv)?)
    }

    fn logo_value(doc: &Document) -> String {
        match &doc.collections[0].children[0] {
            Node::Attachment(leaf) => leaf.value.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }

    #[test]
    fn ingest_then_export_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("vault");
        let pkg = dir.path().join("pkg");
        fs::create_dir_all(pkg.join("img")).unwrap();
        fs::write(pkg.join("img/logo.png"), b"png").unwrap();
        fs::write(pkg.join("document.json"), DOCUMENT).unwrap();
        let ingested = dir.path().join("ingested.json");
        let out = dir.path().join("out");

        let root_arg = root.to_str().unwrap();
        run(&["--root", root_arg, "ingest", pkg.to_str().unwrap(), "-o", ingested.to_str().unwrap()])
            .unwrap();
        let doc = read_document(&ingested).unwrap();
        assert!(logo_value(&doc).contains("/api/transformer/download/"));
        assert!(root.join("catalog.json").is_file());

        run(&["--root", root_arg, "export", ingested.to_str().unwrap(), "-o", out.to_str().unwrap(), "--dir"])
            .unwrap();
        assert_eq!(fs::read(out.join("img/logo.png")).unwrap(), b"png");
        let exported = read_document(&out.join("document.json")).unwrap();
        assert_eq!(logo_value(&exported), "img/logo.png");

        run(&["--root", root_arg, "delete", "aas::sm::Logo"]).unwrap();
        run(&["--root", root_arg, "--format", "json", "files"]).unwrap();
    }

    #[test]
    fn delete_rejects_malformed_key() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        assert!(run(&["--root", root, "delete", "not-a-key"]).is_err());
    }

    #[test]
    fn resolve_reads_plain_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, DOCUMENT).unwrap();
        run(&["resolve", path.to_str().unwrap(), "IMG\\Logo.png"]).unwrap();
        run(&["--format", "json", "resolve", path.to_str().unwrap(), "other.png"]).unwrap();
    }
}
