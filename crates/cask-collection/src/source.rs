use std::str::FromStr;
use std::sync::LazyLock;

use cask_types::Locator;
use regex::Regex;

use crate::error::{CollectionError, CollectionResult};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-f0-9]{32}(\+\d+)?(\+\S+)*$").expect("identifier pattern compiles")
});

/// First line of a manifest with at least one file token.
static STREAM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\S+( [a-f0-9]{32,}(\+\S+)*)*( \d+:\d+:\S+)+\n")
        .expect("stream line pattern compiles")
});

/// First line of a manifest whose first stream is empty (locators only).
static EMPTY_STREAM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\S+( [a-f0-9]{32,}(\+\S+)*)+\n").expect("empty stream pattern compiles")
});

/// Where a reader gets its manifest from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Locator of a stored manifest (looked up through the metadata service
    /// first, then fetched from the block store).
    Identifier(Locator),
    /// Literal manifest text.
    ManifestText(String),
}

impl Source {
    /// Decide whether `input` is a collection identifier or manifest text.
    pub fn classify(input: &str) -> CollectionResult<Self> {
        if IDENTIFIER.is_match(input) {
            Locator::parse(input)
                .map(Self::Identifier)
                .map_err(|e| CollectionError::InvalidArgument(format!("bad collection locator: {e}")))
        } else if STREAM_LINE.is_match(input) || EMPTY_STREAM_LINE.is_match(input) {
            Ok(Self::ManifestText(input.to_string()))
        } else {
            Err(CollectionError::InvalidArgument(
                "expected a manifest or a collection locator".into(),
            ))
        }
    }
}

impl FromStr for Source {
    type Err = CollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::classify(s)
    }
}
