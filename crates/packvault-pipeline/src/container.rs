//! Containers: the packaged form a document's attachments travel in.
//!
//! A container is a set of named byte parts plus, by convention, the
//! document itself as a `document.json` part. Three shapes are provided:
//!
//! - [`MemoryContainer`] -- parts held in a map, also the result of
//!   [`PackageReader`], which unpacks a gzip-compressed tar package.
//! - [`DirectoryContainer`] -- parts are files below a directory.
//! - [`PackageWriter`] / [`DirectoryWriter`] -- the reverse direction.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use packvault_tree::{normalize, referenced_paths, Document};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ContainerError, ContainerResult};

/// Name of the part holding the document itself.
pub const DOCUMENT_PART: &str = "document.json";

/// One attachment handed to a [`ContainerWriter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Container-relative path, as the document references it.
    pub path: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Read access to the parts of one opened container.
pub trait Container: Send + Sync {
    /// Bytes of the part a document path refers to.
    fn read_part(&self, path: &str) -> ContainerResult<Vec<u8>>;

    /// Every part name, sorted.
    fn part_names(&self) -> ContainerResult<Vec<String>>;

    /// Paths of the attachments `doc` references, in extraction order:
    /// default images first, then leaf values in walk order. External URLs
    /// are never candidates.
    fn candidate_paths(&self, doc: &Document) -> Vec<String> {
        referenced_paths(doc)
    }
}

/// Opens a container from its packaged bytes.
pub trait ContainerReader {
    fn open(&self, bytes: &[u8]) -> ContainerResult<Box<dyn Container>>;
}

/// Packages a document and its attachments.
pub trait ContainerWriter {
    type Output;

    fn write(&self, doc: &Document, attachments: &[Attachment]) -> ContainerResult<Self::Output>;
}

/// Map a document path to a container part key.
///
/// Strips a `file:` scheme and leading separators, unifies separators and
/// drops `.` segments. Returns `None` for empty paths and for paths with a
/// `..` segment, which could escape the container root.
pub fn part_key(path: &str) -> Option<String> {
    let trimmed = path.trim();
    let unscheme = match trimmed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("file:") => &trimmed[5..],
        _ => trimmed,
    };
    let unified = unscheme.replace('\\', "/");

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn require_key(path: &str) -> ContainerResult<String> {
    part_key(path).ok_or_else(|| ContainerError::InvalidPartPath(path.to_string()))
}

/// Parse the container's `document.json` part.
pub fn load_document(container: &dyn Container) -> ContainerResult<Document> {
    let bytes = match container.read_part(DOCUMENT_PART) {
        Ok(bytes) => bytes,
        Err(ContainerError::PartNotFound(_)) => {
            return Err(ContainerError::MissingDocument(DOCUMENT_PART))
        }
        Err(e) => return Err(e),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Parts held in memory, keyed by [`part_key`].
#[derive(Clone, Debug, Default)]
pub struct MemoryContainer {
    parts: BTreeMap<String, Vec<u8>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a part.
    pub fn insert(&mut self, path: &str, bytes: impl Into<Vec<u8>>) -> ContainerResult<()> {
        let key = require_key(path)?;
        self.parts.insert(key, bytes.into());
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_part(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> ContainerResult<Self> {
        self.insert(path, bytes)?;
        Ok(self)
    }

    /// Add `doc` as the `document.json` part.
    pub fn with_document(self, doc: &Document) -> ContainerResult<Self> {
        let json = serde_json::to_vec_pretty(doc)?;
        self.with_part(DOCUMENT_PART, json)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Container for MemoryContainer {
    fn read_part(&self, path: &str) -> ContainerResult<Vec<u8>> {
        let key = require_key(path)?;
        if let Some(bytes) = self.parts.get(&key) {
            return Ok(bytes.clone());
        }
        // Part names compare case-insensitively.
        let wanted = normalize(&key);
        self.parts
            .iter()
            .find(|(name, _)| normalize(name) == wanted)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(ContainerError::PartNotFound(key))
    }

    fn part_names(&self) -> ContainerResult<Vec<String>> {
        Ok(self.parts.keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Parts are the files below `root`.
#[derive(Clone, Debug)]
pub struct DirectoryContainer {
    root: PathBuf,
}

impl DirectoryContainer {
    pub fn open(root: impl Into<PathBuf>) -> ContainerResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ContainerError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", root.display()),
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn files(&self) -> impl Iterator<Item = (String, PathBuf)> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(&self.root).ok()?;
                let name = rel.to_string_lossy().replace('\\', "/");
                Some((name, entry.into_path()))
            })
    }
}

impl Container for DirectoryContainer {
    fn read_part(&self, path: &str) -> ContainerResult<Vec<u8>> {
        let key = require_key(path)?;
        match fs::read(self.root.join(&key)) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let wanted = normalize(&key);
        match self.files().find(|(name, _)| normalize(name) == wanted) {
            Some((name, file)) => {
                debug!(requested = %key, found = %name, "part matched case-insensitively");
                Ok(fs::read(file)?)
            }
            None => Err(ContainerError::PartNotFound(key)),
        }
    }

    fn part_names(&self) -> ContainerResult<Vec<String>> {
        let mut names: Vec<String> = self.files().map(|(name, _)| name).collect();
        names.sort();
        Ok(names)
    }
}

/// Writes `document.json` and every attachment below an output directory.
#[derive(Clone, Debug)]
pub struct DirectoryWriter {
    out_dir: PathBuf,
}

impl DirectoryWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl ContainerWriter for DirectoryWriter {
    type Output = PathBuf;

    fn write(&self, doc: &Document, attachments: &[Attachment]) -> ContainerResult<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;
        fs::write(
            self.out_dir.join(DOCUMENT_PART),
            serde_json::to_vec_pretty(doc)?,
        )?;
        for attachment in attachments {
            let key = require_key(&attachment.path)?;
            let dest = self.out_dir.join(&key);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, &attachment.bytes)?;
        }
        debug!(out = %self.out_dir.display(), attachments = attachments.len(), "directory package written");
        Ok(self.out_dir.clone())
    }
}

// ---------------------------------------------------------------------------
// Package (tar.gz)
// ---------------------------------------------------------------------------

/// Reads gzip-compressed tar packages into a [`MemoryContainer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PackageReader;

impl PackageReader {
    pub fn read(&self, bytes: &[u8]) -> ContainerResult<MemoryContainer> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut container = MemoryContainer::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            match part_key(&name) {
                Some(key) => {
                    container.parts.insert(key, data);
                }
                None => warn!(entry = %name, "skipping package entry outside the root"),
            }
        }
        Ok(container)
    }
}

impl ContainerReader for PackageReader {
    fn open(&self, bytes: &[u8]) -> ContainerResult<Box<dyn Container>> {
        Ok(Box::new(self.read(bytes)?))
    }
}

/// Writes gzip-compressed tar packages: `document.json` first, then the
/// attachments in bundle order.
#[derive(Clone, Copy, Debug, Default)]
pub struct PackageWriter;

impl ContainerWriter for PackageWriter {
    type Output = Vec<u8>;

    fn write(&self, doc: &Document, attachments: &[Attachment]) -> ContainerResult<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mtime = chrono::Utc::now().timestamp().max(0) as u64;

        let mut append = |name: &str, data: &[u8]| -> io::Result<()> {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            header.set_cksum();
            builder.append_data(&mut header, name, data)
        };

        append(DOCUMENT_PART, &serde_json::to_vec_pretty(doc)?)?;
        for attachment in attachments {
            let key = require_key(&attachment.path)?;
            append(&key, &attachment.bytes)?;
        }

        let encoder = builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use packvault_tree::{AttachmentLeaf, Collection, Node, OwnerRecord};

    use super::*;

    fn doc() -> Document {
        Document {
            records: vec![OwnerRecord::new("aas")],
            collections: vec![Collection {
                id: "sm".into(),
                children: vec![Node::Attachment(AttachmentLeaf::new(
                    "Logo",
                    "/aasx/Logo.png",
                    "image/png",
                ))],
            }],
        }
    }

    #[test]
    fn part_key_forms() {
        assert_eq!(part_key("/aasx/files/a.png").as_deref(), Some("aasx/files/a.png"));
        assert_eq!(part_key("file:///aasx/a.png").as_deref(), Some("aasx/a.png"));
        assert_eq!(part_key("FILE:aasx\\a.png").as_deref(), Some("aasx/a.png"));
        assert_eq!(part_key("./img//logo.png").as_deref(), Some("img/logo.png"));
        assert_eq!(part_key("../etc/passwd"), None);
        assert_eq!(part_key("a/../../b"), None);
        assert_eq!(part_key("  "), None);
        assert_eq!(part_key("/"), None);
    }

    #[test]
    fn memory_container_lookup() {
        let c = MemoryContainer::new()
            .with_part("/aasx/Logo.png", b"png".to_vec())
            .unwrap();
        assert_eq!(c.read_part("aasx/Logo.png").unwrap(), b"png");
        assert_eq!(c.read_part("file:/aasx/logo.PNG").unwrap(), b"png");
        assert!(matches!(
            c.read_part("aasx/other.png"),
            Err(ContainerError::PartNotFound(_))
        ));
        assert!(matches!(
            c.read_part("../x"),
            Err(ContainerError::InvalidPartPath(_))
        ));
        assert_eq!(c.part_names().unwrap(), vec!["aasx/Logo.png"]);
    }

    #[test]
    fn candidate_paths_default_to_document_references() {
        let c = MemoryContainer::new();
        assert_eq!(c.candidate_paths(&doc()), vec!["/aasx/Logo.png"]);
    }

    #[test]
    fn load_document_requires_part() {
        let empty = MemoryContainer::new();
        assert!(matches!(
            load_document(&empty),
            Err(ContainerError::MissingDocument(DOCUMENT_PART))
        ));
        let with_doc = MemoryContainer::new().with_document(&doc()).unwrap();
        assert_eq!(load_document(&with_doc).unwrap(), doc());
    }

    #[test]
    fn directory_container_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("aasx")).unwrap();
        fs::write(dir.path().join("aasx/Logo.png"), b"png").unwrap();
        fs::write(dir.path().join("document.json"), serde_json::to_vec(&doc()).unwrap()).unwrap();

        let c = DirectoryContainer::open(dir.path()).unwrap();
        assert_eq!(c.read_part("/aasx/Logo.png").unwrap(), b"png");
        assert_eq!(c.read_part("/AASX/logo.png").unwrap(), b"png");
        assert_eq!(
            c.part_names().unwrap(),
            vec!["aasx/Logo.png", "document.json"]
        );
        assert_eq!(load_document(&c).unwrap(), doc());
    }

    #[test]
    fn directory_container_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryContainer::open(dir.path().join("missing")).is_err());
    }

    #[test]
    fn directory_writer_round_trips_through_container() {
        let dir = tempfile::tempdir().unwrap();
        let out = DirectoryWriter::new(dir.path().join("out"))
            .write(
                &doc(),
                &[Attachment {
                    path: "/aasx/Logo.png".into(),
                    bytes: b"png".to_vec(),
                    content_type: "image/png".into(),
                }],
            )
            .unwrap();
        let c = DirectoryContainer::open(out).unwrap();
        assert_eq!(c.read_part("/aasx/Logo.png").unwrap(), b"png");
        assert_eq!(load_document(&c).unwrap(), doc());
    }

    #[test]
    fn package_round_trip() {
        let attachments = vec![Attachment {
            path: "/aasx/Logo.png".into(),
            bytes: b"\x89PNG".to_vec(),
            content_type: "image/png".into(),
        }];
        let bytes = PackageWriter.write(&doc(), &attachments).unwrap();

        let opened = PackageReader.open(&bytes).unwrap();
        assert_eq!(
            opened.part_names().unwrap(),
            vec!["aasx/Logo.png", DOCUMENT_PART]
        );
        assert_eq!(opened.read_part("/aasx/Logo.png").unwrap(), b"\x89PNG");
        assert_eq!(load_document(opened.as_ref()).unwrap(), doc());
    }

    #[test]
    fn garbage_package_is_an_error() {
        assert!(PackageReader.open(b"definitely not gzip").is_err());
    }
}
