use std::fs;
use std::path::{Path, PathBuf};

use super::reader::FrameReader;
use super::{FrameSource, MediaCatalog};
use crate::error::{Result, RtspError};

/// File extension scanned for when none is configured.
pub const DEFAULT_EXTENSION: &str = "mjpeg";

/// A playable media file known to the registry.
///
/// The name is the file's basename and is what clients put on the wire;
/// the full path never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    name: String,
    path: PathBuf,
}

impl MediaSource {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open an independent reader; every session gets its own.
    pub fn open(&self) -> Result<FrameReader> {
        FrameReader::open(&self.path)
    }
}

/// Ordered, immutable set of media sources.
///
/// Built once at server start and shared read-only across all sessions,
/// so lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct MediaRegistry {
    sources: Vec<MediaSource>,
}

impl MediaRegistry {
    /// Scan `dir` for regular files whose extension matches one of
    /// `extensions` (case-insensitive, without the leading dot).
    ///
    /// Sources are ordered by file name. Names differing only in case are
    /// kept as separate entries.
    pub fn scan(dir: impl AsRef<Path>, extensions: &[String]) -> Result<Self> {
        let dir = dir.as_ref();
        let mut sources = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::debug!(path = %path.display(), "skipping non UTF-8 file name");
                continue;
            };
            if !has_extension(name, extensions) {
                continue;
            }
            sources.push(MediaSource::new(name, &path));
        }

        sources.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::info!(
            dir = %dir.display(),
            count = sources.len(),
            "media directory scanned"
        );
        Ok(Self { sources })
    }

    /// Build a registry from explicit sources, keeping their order.
    pub fn from_sources(sources: Vec<MediaSource>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[MediaSource] {
        &self.sources
    }

    /// Source names in scan order.
    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    /// Default source for a SETUP that names none.
    pub fn first(&self) -> Option<&MediaSource> {
        self.sources.first()
    }

    /// Look up a source by its exact name.
    ///
    /// Anything that could address a path outside the registry is rejected
    /// before the lookup.
    pub fn resolve(&self, name: &str) -> Option<&MediaSource> {
        if !is_valid_name(name) {
            tracing::warn!(name, "rejected media name");
            return None;
        }
        self.sources.iter().find(|s| s.name == name)
    }
}

impl MediaCatalog for MediaRegistry {
    fn names(&self) -> Vec<String> {
        MediaRegistry::names(self)
    }

    fn open(&self, name: Option<&str>) -> Result<(String, Box<dyn FrameSource>)> {
        let source = match name {
            Some(name) => self.resolve(name),
            None => self.first(),
        }
        .ok_or_else(|| RtspError::SourceNotFound(name.unwrap_or("<default>").to_string()))?;

        let reader = source.open()?;
        Ok((source.name.clone(), Box::new(reader)))
    }
}

fn has_extension(name: &str, extensions: &[String]) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
