use std::sync::Arc;

use cask_manifest::{normalize_stream_name, normalize_text, Manifest, Stream, StreamFile};
use cask_store::{BlockStore, MetadataService};
use cask_types::Locator;
use tracing::{debug, warn};

use crate::config::CollectionConfig;
use crate::error::{CollectionError, CollectionResult};
use crate::source::Source;

/// A file together with the stream that holds it.
#[derive(Clone, Copy, Debug)]
pub struct FileEntry<'a> {
    pub stream: &'a Stream,
    pub file: &'a StreamFile,
}

impl FileEntry<'_> {
    /// Full path, `<stream>/<file>`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.stream.name, self.file.name)
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }
}

enum ReaderState {
    Unpopulated,
    Populated(Populated),
}

struct Populated {
    manifest: Manifest,
    text: String,
}

/// Lazily loads, parses and normalizes a collection's manifest.
///
/// Nothing is fetched at construction. The first call to [`streams`],
/// [`all_files`], [`manifest_text`] or [`read_file`] resolves the source,
/// normalizes it, and keeps the result; later calls reuse it. From then on
/// the normalized text is the reader's manifest text, so readers built from
/// equivalent manifests agree byte for byte.
///
/// [`streams`]: CollectionReader::streams
/// [`all_files`]: CollectionReader::all_files
/// [`manifest_text`]: CollectionReader::manifest_text
/// [`read_file`]: CollectionReader::read_file
pub struct CollectionReader {
    source: Source,
    store: Arc<dyn BlockStore>,
    metadata: Option<Arc<dyn MetadataService>>,
    config: CollectionConfig,
    state: ReaderState,
}

impl CollectionReader {
    /// Create a reader from a collection locator or literal manifest text.
    ///
    /// Fails with [`CollectionError::InvalidArgument`] if `input` is neither.
    pub fn new(
        input: &str,
        store: Arc<dyn BlockStore>,
        config: CollectionConfig,
    ) -> CollectionResult<Self> {
        Ok(Self::from_source(Source::classify(input)?, store, config))
    }

    /// Create a reader from an already classified source.
    pub fn from_source(source: Source, store: Arc<dyn BlockStore>, config: CollectionConfig) -> Self {
        Self {
            source,
            store,
            metadata: None,
            config,
            state: ReaderState::Unpopulated,
        }
    }

    /// Consult `metadata` before the block store when resolving identifiers.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataService>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns `true` once the manifest has been fetched and normalized.
    pub fn is_populated(&self) -> bool {
        matches!(self.state, ReaderState::Populated(_))
    }

    /// Streams in name order.
    pub fn streams(&mut self) -> CollectionResult<&[Stream]> {
        Ok(self.populate()?.manifest.streams())
    }

    /// Every file in the collection, stream by stream, each stream's files in
    /// name order.
    pub fn all_files(&mut self) -> CollectionResult<impl Iterator<Item = FileEntry<'_>> + '_> {
        let manifest = &self.populate()?.manifest;
        Ok(manifest.streams().iter().flat_map(|stream| {
            stream
                .files
                .values()
                .map(move |file| FileEntry { stream, file })
        }))
    }

    /// Normalized manifest text.
    pub fn manifest_text(&mut self) -> CollectionResult<&str> {
        Ok(&self.populate()?.text)
    }

    /// Read a whole file, addressed as `<stream>/<file>` (`./a/b`, `a/b` and
    /// `b` for a file in `.` are all accepted).
    pub fn read_file(&mut self, path: &str) -> CollectionResult<Vec<u8>> {
        let store = Arc::clone(&self.store);
        let (stream_name, file_name) = match path.rsplit_once('/') {
            Some((stream, file)) => (normalize_stream_name(stream), file),
            None => (".".to_string(), path),
        };

        let manifest = &self.populate()?.manifest;
        let not_found = || CollectionError::FileNotFound(path.to_string());
        let stream = manifest.stream(&stream_name).ok_or_else(not_found)?;
        let file = stream.file(file_name).ok_or_else(not_found)?;

        let mut out = Vec::new();
        let mut cached: Option<Locator> = None;
        let mut block = Vec::new();
        for segment in stream.segments(file)? {
            if cached.as_ref() != Some(&segment.locator) {
                block = store.get(&segment.locator)?;
                cached = Some(segment.locator.clone());
            }
            let range = usize::try_from(segment.offset)
                .ok()
                .zip(usize::try_from(segment.end()).ok());
            let bytes = range
                .and_then(|(from, to)| block.get(from..to))
                .ok_or_else(|| CollectionError::ShortBlock {
                    locator: segment.locator.to_string(),
                })?;
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    fn populate(&mut self) -> CollectionResult<&Populated> {
        if let ReaderState::Unpopulated = self.state {
            let raw = self.fetch_manifest_text()?;
            let manifest = normalize_text(&raw, &self.config.empty_block_locator)?;
            let text = manifest.to_text();
            debug!(
                streams = manifest.streams().len(),
                bytes = text.len(),
                "collection manifest loaded"
            );
            self.state = ReaderState::Populated(Populated { manifest, text });
        }
        match &self.state {
            ReaderState::Populated(populated) => Ok(populated),
            ReaderState::Unpopulated => unreachable!("reader state set above"),
        }
    }

    fn fetch_manifest_text(&self) -> CollectionResult<String> {
        let locator = match &self.source {
            Source::ManifestText(text) => return Ok(text.clone()),
            Source::Identifier(locator) => locator,
        };
        let id = locator.to_string();

        if let Some(metadata) = &self.metadata {
            match metadata.get_manifest_text(&id) {
                Ok(text) => return Ok(text),
                Err(e) => warn!(
                    collection = %id,
                    error = %e,
                    "metadata lookup failed; fetching manifest from block store"
                ),
            }
        }

        let data = self.store.get(locator)?;
        String::from_utf8(data).map_err(|_| CollectionError::InvalidEncoding { id })
    }
}

impl std::fmt::Debug for CollectionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionReader")
            .field("source", &self.source)
            .field("populated", &self.is_populated())
            .finish()
    }
}
