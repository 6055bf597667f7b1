use std::collections::{BTreeMap, HashMap};

use cask_types::{Locator, Segment};
use tracing::debug;

use crate::error::{ManifestError, ManifestResult};
use crate::escape::{has_empty_component, normalize_stream_name};
use crate::parse::{parse_manifest, RawStream};
use crate::stream::{Manifest, Span, Stream, StreamFile};

/// Parse manifest text and normalize it.
pub fn normalize_text(text: &str, empty_block: &Locator) -> ManifestResult<Manifest> {
    normalize(&parse_manifest(text)?, empty_block)
}

/// Build the canonical form of a set of parsed streams.
///
/// Files are regrouped by their full path, so `./a` + `b/c` lands in stream
/// `./a/b` as file `c`. Within each resulting stream, blocks are listed once
/// in the order files (sorted by name) first reference them, and each file's
/// segments are merged into maximal contiguous spans.
///
/// A stream line with no file tokens survives as an empty stream carrying
/// `empty_block`. A stream whose files all resolve into other streams
/// disappears.
pub fn normalize(streams: &[RawStream], empty_block: &Locator) -> ManifestResult<Manifest> {
    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<Segment>>> = BTreeMap::new();

    for raw in streams {
        let stream_name = normalize_stream_name(&raw.name);
        if raw.files.is_empty() {
            grouped.entry(stream_name).or_default();
            continue;
        }
        for (file_name, segments) in raw.file_segments()? {
            let (stream, file) = split_path(&stream_name, &file_name)?;
            grouped
                .entry(stream)
                .or_default()
                .entry(file)
                .or_default()
                .extend(segments);
        }
    }

    let manifest = Manifest::new(
        grouped
            .into_iter()
            .map(|(name, files)| normalize_stream(name, files, empty_block))
            .collect::<ManifestResult<Vec<_>>>()?,
    );
    debug!(
        streams = manifest.streams().len(),
        files = manifest.file_count(),
        "normalized manifest"
    );
    Ok(manifest)
}

/// Resolve `<stream>/<file>` into the stream holding the file and its
/// final name. Paths with empty components have no such split.
fn split_path(stream_name: &str, file_name: &str) -> ManifestResult<(String, String)> {
    let full = format!("{stream_name}/{file_name}");
    if has_empty_component(&full) {
        return Err(ManifestError::InvalidPath { path: full });
    }
    Ok(match full.rsplit_once('/') {
        Some((stream, file)) => (stream.to_string(), file.to_string()),
        None => (stream_name.to_string(), file_name.to_string()),
    })
}

fn normalize_stream(
    name: String,
    files: BTreeMap<String, Vec<Segment>>,
    empty_block: &Locator,
) -> ManifestResult<Stream> {
    let mut locators = Vec::new();
    let mut block_offsets: HashMap<Locator, u64> = HashMap::new();
    let mut stream_len = 0u64;
    for segment in files.values().flatten() {
        if !block_offsets.contains_key(&segment.locator) {
            block_offsets.insert(segment.locator.clone(), stream_len);
            locators.push(segment.locator.clone());
            stream_len = stream_len
                .checked_add(segment.locator.size().unwrap_or(0))
                .ok_or_else(|| ManifestError::StreamTooLarge {
                    stream: name.clone(),
                })?;
        }
    }

    let files = files
        .into_iter()
        .map(|(file_name, segments)| {
            let mut spans: Vec<Span> = Vec::new();
            for segment in &segments {
                let start = block_offsets[&segment.locator] + segment.offset;
                match spans.last_mut() {
                    Some(span) if span.end() == start => span.len += segment.len,
                    _ => spans.push(Span::new(start, segment.len)),
                }
            }
            let file = StreamFile {
                name: file_name.clone(),
                spans,
            };
            (file_name, file)
        })
        .collect();

    if locators.is_empty() {
        locators.push(empty_block.clone());
    }
    Ok(Stream {
        name,
        locators,
        files,
    })
}
