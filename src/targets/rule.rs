//! Target Rules
//!
//! A rule is one entry of a whitelist or blacklist: a single IP address, a
//! CIDR range, an exact domain, or a wildcard domain pattern.

use glob::{MatchOptions, Pattern};
use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

/// Errors raised while loading rule strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetRuleError {
    #[error("Target rule cannot be empty")]
    Empty,

    #[error("Invalid network rule '{0}'")]
    InvalidNetwork(String),

    #[error("Invalid wildcard rule '{rule}': {reason}")]
    InvalidPattern { rule: String, reason: String },
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A scan target after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<'a> {
    Ip(IpAddr),
    Network(IpNet),
    Host(&'a str),
}

impl<'a> Target<'a> {
    /// Classify an already trimmed target string
    pub fn classify(raw: &'a str) -> Self {
        let unbracketed = raw.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Self::Ip(ip);
        }
        if raw.contains('/') {
            if let Ok(net) = raw.parse::<IpNet>() {
                return Self::Network(net);
            }
        }
        Self::Host(raw)
    }
}

/// One whitelist or blacklist entry
#[derive(Debug, Clone)]
pub enum TargetRule {
    Ip(IpAddr),
    Network(IpNet),
    /// Exact domain, stored lowercase
    Domain(String),
    /// `*` glob, anchored at both ends
    Wildcard { raw: String, pattern: Pattern },
}

impl TargetRule {
    /// Parse a rule string
    ///
    /// Anything containing `/` must be a CIDR range. Anything containing `*`
    /// is a wildcard; every other glob metacharacter is taken literally.
    pub fn parse(raw: &str) -> Result<Self, TargetRuleError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TargetRuleError::Empty);
        }

        if raw.contains('/') {
            return raw
                .parse::<IpNet>()
                .map(|net| Self::Network(net.trunc()))
                .map_err(|_| TargetRuleError::InvalidNetwork(raw.to_string()));
        }

        if let Ok(ip) = raw.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }

        let lowered = raw.to_ascii_lowercase();
        if lowered.contains('*') {
            let escaped = lowered
                .split('*')
                .map(Pattern::escape)
                .collect::<Vec<_>>()
                .join("*");
            let pattern =
                Pattern::new(&escaped).map_err(|e| TargetRuleError::InvalidPattern {
                    rule: raw.to_string(),
                    reason: e.msg.to_string(),
                })?;
            return Ok(Self::Wildcard {
                raw: raw.to_string(),
                pattern,
            });
        }

        Ok(Self::Domain(lowered))
    }

    /// Parse a list of rule strings, failing on the first bad entry
    pub fn parse_all<S: AsRef<str>>(rules: &[S]) -> Result<Vec<Self>, TargetRuleError> {
        rules.iter().map(|r| Self::parse(r.as_ref())).collect()
    }

    /// Whether this rule covers the target
    ///
    /// Network targets match a network rule when the two ranges overlap.
    /// Textual rules are also tried against the raw string so a wildcard such
    /// as `10.0.*` can match literal addresses.
    pub fn matches(&self, raw: &str, target: &Target<'_>) -> bool {
        match (self, target) {
            (Self::Ip(rule), Target::Ip(ip)) => rule == ip,
            (Self::Ip(rule), Target::Network(net)) => net.contains(rule),
            (Self::Network(rule), Target::Ip(ip)) => rule.contains(ip),
            (Self::Network(rule), Target::Network(net)) => {
                rule.contains(&net.network()) || net.contains(&rule.network())
            }
            (Self::Domain(domain), _) => raw.eq_ignore_ascii_case(domain),
            (Self::Wildcard { pattern, .. }, _) => pattern.matches_with(raw, MATCH_OPTIONS),
            _ => false,
        }
    }

    /// Whether this rule fully contains the target (used for allow decisions)
    pub fn covers(&self, raw: &str, target: &Target<'_>) -> bool {
        match (self, target) {
            (Self::Network(rule), Target::Network(net)) => rule.contains(net),
            (Self::Ip(rule), Target::Network(net)) => {
                net.prefix_len() == net.max_prefix_len() && net.addr() == *rule
            }
            _ => self.matches(raw, target),
        }
    }
}

impl fmt::Display for TargetRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Network(net) => write!(f, "{}", net),
            Self::Domain(domain) => write!(f, "{}", domain),
            Self::Wildcard { raw, .. } => write!(f, "{}", raw),
        }
    }
}
