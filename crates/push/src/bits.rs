//! Local application bits: scanning, fingerprinting and archiving.

use std::{
    collections::HashSet,
    fs::File,
    io::Read,
    path::{Component, Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};
use ignore::{DirEntry, WalkBuilder};
use sha2::{Digest, Sha256};

use crate::{PushError, client::Resource};

/// Per-directory ignore file, gitignore syntax.
pub const IGNORE_FILE: &str = ".cfignore";

/// Entries never uploaded, wherever they appear.
pub const DEFAULT_IGNORED: &[&str] = &[
    IGNORE_FILE,
    ".gitignore",
    ".git",
    ".hg",
    ".svn",
    "_darcs",
    ".DS_Store",
];

/// Only ignored at the application root.
const ROOT_MANIFEST: &str = "manifest.yml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub resource: Resource,
    pub full_path: PathBuf,
}

/// The files of an application directory that will be pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBits {
    root: PathBuf,
    files: Vec<LocalFile>,
}

impl LocalBits {
    /// Walk `root`, honouring ignore files and the default exclusions, and
    /// fingerprint every regular file.
    pub fn scan(root: &Path) -> Result<Self, PushError> {
        let bits_error = |message: String| PushError::Bits {
            path: root.to_path_buf(),
            message,
        };

        if !root.is_dir() {
            return Err(bits_error("not a directory".to_string()));
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .hidden(false)
            .add_custom_ignore_filename(IGNORE_FILE)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|entry| !is_default_ignored(entry));

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = entry.map_err(|e| bits_error(e.to_string()))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let full_path = entry.path().to_path_buf();
            let relative = full_path
                .strip_prefix(root)
                .map_err(|e| bits_error(e.to_string()))?;

            let resource = fingerprint(&full_path, relative).map_err(|e| PushError::Bits {
                path: full_path.clone(),
                message: e.to_string(),
            })?;
            files.push(LocalFile {
                resource,
                full_path,
            });
        }
        files.sort_by(|a, b| a.resource.path.cmp(&b.resource.path));

        tracing::debug!(root = %root.display(), files = files.len(), "Scanned application bits");

        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[LocalFile] {
        &self.files
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.files.iter().map(|f| f.resource.clone()).collect()
    }

    /// Gzipped tar of every file the remote side did not match.
    pub fn archive_unmatched(&self, matched: &[Resource]) -> Result<Vec<u8>, PushError> {
        let matched: HashSet<(&str, &str)> = matched
            .iter()
            .map(|r| (r.path.as_str(), r.checksum.as_str()))
            .collect();

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut archived = 0usize;

        for file in &self.files {
            let key = (file.resource.path.as_str(), file.resource.checksum.as_str());
            if matched.contains(&key) {
                continue;
            }

            let mut header = tar::Header::new_gnu();
            header.set_size(file.resource.size);
            header.set_mode(file.resource.mode);
            header.set_entry_type(tar::EntryType::Regular);

            let source = File::open(&file.full_path).map_err(|e| PushError::Bits {
                path: file.full_path.clone(),
                message: e.to_string(),
            })?;
            builder
                .append_data(&mut header, &file.resource.path, source)
                .map_err(|e| PushError::Bits {
                    path: file.full_path.clone(),
                    message: e.to_string(),
                })?;
            archived += 1;
        }

        let archive = builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| PushError::Bits {
                path: self.root.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(
            archived,
            matched = matched.len(),
            bytes = archive.len(),
            "Archived unmatched application files"
        );
        Ok(archive)
    }
}

fn is_default_ignored(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    DEFAULT_IGNORED.iter().any(|ignored| *ignored == name)
        || (entry.depth() == 1 && name == ROOT_MANIFEST)
}

fn fingerprint(full_path: &Path, relative: &Path) -> std::io::Result<Resource> {
    let mut file = File::open(full_path)?;
    let metadata = file.metadata()?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(Resource {
        path: slash_path(relative),
        checksum: hex::encode(hasher.finalize()),
        size: metadata.len(),
        mode: file_mode(&metadata),
    })
}

/// `/` separated relative path, independent of the host separator.
fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
