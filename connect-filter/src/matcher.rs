//! Host matching against blacklist patterns

use crate::blacklist::Blacklist;

/// Pattern that blocks every host
pub const BLOCK_ALL: &str = "*.*";

const WILDCARD: char = '*';

/// How a single pattern is evaluated
///
/// Wildcard rules are authoritative: the first one reached decides the result
/// of the whole match, whether it matches or not. Only `Contains` lets
/// evaluation fall through to later patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule<'a> {
    /// Empty line
    Skip,
    /// `*.*`
    BlockAll,
    /// `*suffix`: domain ends with `suffix`
    DomainSuffix(&'a str),
    /// `prefix*`: domain starts with `prefix`
    DomainPrefix(&'a str),
    /// Wildcard neither leading nor trailing, e.g. `ad*s.com`
    AnyDomain,
    /// Plain literal, compared against the full `host:port`
    Contains(&'a str),
}

impl<'a> Rule<'a> {
    pub fn parse(pattern: &'a str) -> Self {
        if pattern.is_empty() {
            Rule::Skip
        } else if pattern == BLOCK_ALL {
            Rule::BlockAll
        } else if pattern.contains(WILDCARD) {
            if let Some(suffix) = pattern.strip_prefix(WILDCARD) {
                Rule::DomainSuffix(suffix)
            } else if let Some(prefix) = pattern.strip_suffix(WILDCARD) {
                Rule::DomainPrefix(prefix)
            } else {
                Rule::AnyDomain
            }
        } else {
            Rule::Contains(pattern)
        }
    }

    /// Returns `Some(blocked)` if this rule decides the outcome
    fn decide(self, host: &str, domain: &str) -> Option<bool> {
        match self {
            Rule::Skip => None,
            Rule::BlockAll | Rule::AnyDomain => Some(true),
            Rule::DomainSuffix(suffix) => Some(domain.ends_with(suffix)),
            Rule::DomainPrefix(prefix) => Some(domain.starts_with(prefix)),
            Rule::Contains(literal) => host.contains(literal).then_some(true),
        }
    }
}

/// Domain part of a `host[:port]` string (everything before the first `:`)
pub fn domain_of(host: &str) -> &str {
    host.split_once(':').map_or(host, |(domain, _)| domain)
}

/// Check whether `host` is blocked by `blacklist`
///
/// Patterns are evaluated in order and the first deciding pattern wins.
/// Wildcard patterns compare against the domain with the port stripped;
/// literals compare against the raw `host` including any port.
pub fn matches(blacklist: &Blacklist, host: &str) -> bool {
    let domain = domain_of(host);
    blacklist
        .patterns()
        .iter()
        .find_map(|pattern| Rule::parse(pattern).decide(host, domain))
        .unwrap_or(false)
}
