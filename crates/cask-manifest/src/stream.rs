use std::collections::BTreeMap;
use std::fmt;

use cask_types::{Locator, Segment};

use crate::error::{ManifestError, ManifestResult};
use crate::escape::escape_name;

/// A contiguous byte range in stream space (the concatenation of a stream's
/// blocks).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub len: u64,
}

impl Span {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// A file within a normalized stream.
///
/// `spans` is minimal: no two adjacent spans are contiguous. A zero-length
/// file has no spans and is written as `0:0:<name>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFile {
    pub name: String,
    pub spans: Vec<Span>,
}

impl StreamFile {
    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.spans.iter().map(|s| s.len).sum()
    }
}

/// A normalized stream: deduplicated blocks plus files sorted by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stream {
    /// Stream name, `.` or beginning with `./`.
    pub name: String,
    /// Blocks in first-reference order, never empty.
    pub locators: Vec<Locator>,
    /// Files keyed by name.
    pub files: BTreeMap<String, StreamFile>,
}

impl Stream {
    /// Total bytes across the stream's blocks.
    pub fn len(&self) -> u64 {
        saturating_size(&self.locators)
    }

    /// Returns `true` if the stream has no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a file by name.
    pub fn file(&self, name: &str) -> Option<&StreamFile> {
        self.files.get(name)
    }

    /// Resolve a file's spans into the block segments holding its bytes.
    pub fn segments(&self, file: &StreamFile) -> ManifestResult<Vec<Segment>> {
        let mut out = Vec::new();
        for span in &file.spans {
            out.extend(locate(&self.locators, span.start, span.len)?);
        }
        Ok(out)
    }

    fn write_line(&self, out: &mut String) {
        out.push_str(&escape_name(&self.name));
        for locator in &self.locators {
            out.push(' ');
            out.push_str(&locator.to_string());
        }
        for file in self.files.values() {
            let name = escape_name(&file.name);
            if file.spans.is_empty() {
                out.push_str(&format!(" 0:0:{name}"));
            }
            for span in &file.spans {
                out.push_str(&format!(" {}:{}:{name}", span.start, span.len));
            }
        }
        out.push('\n');
    }
}

/// A normalized manifest: streams sorted by name, unique by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    streams: Vec<Stream>,
}

impl Manifest {
    /// Build a manifest, sorting streams by name. Later streams replace
    /// earlier ones with the same name.
    pub fn new(streams: impl IntoIterator<Item = Stream>) -> Self {
        let by_name: BTreeMap<String, Stream> =
            streams.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            streams: by_name.into_values().collect(),
        }
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams
            .binary_search_by(|s| s.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.streams[i])
    }

    /// Total number of files across all streams.
    pub fn file_count(&self) -> usize {
        self.streams.iter().map(|s| s.files.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Serialize to manifest text, one newline-terminated line per stream.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for stream in &self.streams {
            stream.write_line(&mut out);
        }
        out
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Sum of the block sizes, or `None` if it does not fit in a `u64`.
pub(crate) fn total_size(locators: &[Locator]) -> Option<u64> {
    locators
        .iter()
        .filter_map(Locator::size)
        .try_fold(0u64, u64::checked_add)
}

fn saturating_size(locators: &[Locator]) -> u64 {
    locators
        .iter()
        .filter_map(Locator::size)
        .fold(0u64, u64::saturating_add)
}

/// Map the stream-space range `[start, start + len)` onto the blocks that
/// hold it, splitting at block boundaries.
///
/// Zero-length ranges map to no segments. Zero-sized blocks never produce
/// segments.
pub fn locate(locators: &[Locator], start: u64, len: u64) -> ManifestResult<Vec<Segment>> {
    // Parsed and normalized streams always carry block sizes.
    let stream_len = saturating_size(locators);
    let end = start
        .checked_add(len)
        .filter(|end| *end <= stream_len)
        .ok_or(ManifestError::RangeOutOfBounds {
            start,
            len,
            stream_len,
        })?;
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut block_start = 0u64;
    for locator in locators {
        let block_end = block_start.saturating_add(locator.size().unwrap_or(0));
        let from = start.max(block_start);
        let to = end.min(block_end);
        if to > from {
            out.push(Segment::new(locator.clone(), from - block_start, to - from));
        }
        if block_end >= end {
            break;
        }
        block_start = block_end;
    }
    Ok(out)
}
