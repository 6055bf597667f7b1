use cask_types::{Locator, Segment};

use crate::error::{ManifestError, ManifestResult};
use crate::escape::{has_empty_component, unescape_name};
use crate::stream::{locate, total_size};

/// A `start:length:name` token, with the name unescaped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileToken {
    pub start: u64,
    pub len: u64,
    pub name: String,
}

impl FileToken {
    fn parse(token: &str) -> Option<Self> {
        let mut parts = token.splitn(3, ':');
        let start = parse_decimal(parts.next()?)?;
        let len = parse_decimal(parts.next()?)?;
        let name = parts.next()?;
        Some(Self {
            start,
            len,
            name: unescape_name(name),
        })
    }
}

fn parse_decimal(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// One manifest line exactly as written: no merging, sorting or dedup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawStream {
    pub name: String,
    pub locators: Vec<Locator>,
    pub files: Vec<FileToken>,
}

impl RawStream {
    /// Resolve every file token into block segments, in token order.
    ///
    /// A file named by several tokens appears once per token.
    pub fn file_segments(&self) -> ManifestResult<Vec<(String, Vec<Segment>)>> {
        self.files
            .iter()
            .map(|f| Ok((f.name.clone(), locate(&self.locators, f.start, f.len)?)))
            .collect()
    }
}

/// Parse manifest text into its stream lines. Blank lines are skipped.
pub fn parse_manifest(text: &str) -> ManifestResult<Vec<RawStream>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_stream_line(line, i + 1))
        .collect()
}

fn parse_stream_line(line: &str, line_no: usize) -> ManifestResult<RawStream> {
    let mut tokens = line.split_whitespace();
    let name = unescape_name(tokens.next().unwrap_or_default());
    if has_empty_component(&name) {
        return Err(ManifestError::InvalidStreamName {
            line: line_no,
            name,
        });
    }

    let mut locators = Vec::new();
    let mut files = Vec::new();
    for token in tokens {
        if let Some(file) = FileToken::parse(token) {
            if has_empty_component(&file.name) {
                return Err(ManifestError::InvalidFileToken {
                    line: line_no,
                    token: token.to_string(),
                });
            }
            files.push(file);
            continue;
        }
        let locator = Locator::parse(token);
        if !files.is_empty() {
            return Err(match locator {
                Ok(_) => ManifestError::LocatorAfterFile {
                    line: line_no,
                    token: token.to_string(),
                },
                Err(_) => ManifestError::InvalidFileToken {
                    line: line_no,
                    token: token.to_string(),
                },
            });
        }
        let locator = locator.map_err(|source| ManifestError::InvalidLocator {
            line: line_no,
            source,
        })?;
        if locator.size().is_none() {
            return Err(ManifestError::MissingBlockSize {
                line: line_no,
                token: token.to_string(),
            });
        }
        locators.push(locator);
    }

    if total_size(&locators).is_none() {
        return Err(ManifestError::StreamTooLarge { stream: name });
    }
    if locators.is_empty() && files.is_empty() {
        return Err(ManifestError::EmptyStreamLine {
            line: line_no,
            name,
        });
    }
    Ok(RawStream {
        name,
        locators,
        files,
    })
}
