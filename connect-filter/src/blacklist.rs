//! Blacklist snapshot

use crate::matcher;

/// An ordered list of blacklist patterns
///
/// Once built a `Blacklist` is never mutated; a reload produces a new one and
/// publishes it through [`crate::BlacklistStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    patterns: Vec<String>,
}

impl Blacklist {
    /// Create a blacklist from already split patterns
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// Parse line-oriented source text, one pattern per line
    ///
    /// Both `\n` and `\r\n` line endings are accepted. Blank lines are kept as
    /// empty patterns so the list mirrors the file; matching skips them.
    pub fn parse(text: &str) -> Self {
        Self {
            patterns: text.lines().map(str::to_owned).collect(),
        }
    }

    /// Parse raw file contents, one pattern per line
    ///
    /// Lines that are not valid UTF-8 are decoded lossily instead of failing
    /// the whole file, so one stray byte only affects its own line.
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        Self {
            patterns: body
                .split(|&b| b == b'\n')
                .map(|line| {
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    String::from_utf8_lossy(line).into_owned()
                })
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check whether `host` (`domain` or `domain:port`) is blocked
    pub fn is_blocked(&self, host: &str) -> bool {
        matcher::matches(self, host)
    }
}

impl<S: Into<String>> FromIterator<S> for Blacklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}
