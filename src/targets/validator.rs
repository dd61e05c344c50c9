//! Target Validator
//!
//! Decides whether a scan target may be contacted. Rules are loaded once and
//! never change, so a validator can be shared behind an `Arc` without locking.

use serde::Serialize;
use tracing::debug;

use super::ip::{is_restricted, overlaps_restricted};
use super::rule::{Target, TargetRule, TargetRuleError};

/// Outcome of validating one or more targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TargetDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Whitelist/blacklist validator for scan targets
///
/// Evaluation order, first match wins:
/// 1. empty target is denied
/// 2. blacklist match is denied (blacklist beats whitelist)
/// 3. private/loopback/link-local addresses are denied unless allowed
/// 4. with a non-empty whitelist, the target must match an entry
#[derive(Debug, Clone, Default)]
pub struct TargetValidator {
    whitelist: Vec<TargetRule>,
    blacklist: Vec<TargetRule>,
    allow_private: bool,
}

impl TargetValidator {
    pub fn new(whitelist: Vec<TargetRule>, blacklist: Vec<TargetRule>, allow_private: bool) -> Self {
        Self {
            whitelist,
            blacklist,
            allow_private,
        }
    }

    /// Build a validator from raw rule strings
    pub fn from_rules<S: AsRef<str>>(
        whitelist: &[S],
        blacklist: &[S],
        allow_private: bool,
    ) -> Result<Self, TargetRuleError> {
        Ok(Self::new(
            TargetRule::parse_all(whitelist)?,
            TargetRule::parse_all(blacklist)?,
            allow_private,
        ))
    }

    /// A validator with no lists that also admits private addresses
    pub fn permissive() -> Self {
        Self::new(Vec::new(), Vec::new(), true)
    }

    pub fn whitelist(&self) -> &[TargetRule] {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &[TargetRule] {
        &self.blacklist
    }

    pub fn allows_private(&self) -> bool {
        self.allow_private
    }

    /// Validate a single target
    pub fn validate(&self, target: &str) -> TargetDecision {
        let target = target.trim();
        if target.is_empty() {
            return TargetDecision::deny("Target cannot be empty".to_string());
        }

        let classified = Target::classify(target);

        if let Some(rule) = self
            .blacklist
            .iter()
            .find(|rule| rule.matches(target, &classified))
        {
            debug!(scan_target = target, rule = %rule, "target blacklisted");
            return TargetDecision::deny(format!(
                "Target {} is blacklisted (matches {})",
                target, rule
            ));
        }

        if !self.allow_private {
            let restricted = match &classified {
                Target::Ip(ip) => is_restricted(ip),
                Target::Network(net) => overlaps_restricted(net),
                Target::Host(_) => false,
            };
            if restricted {
                return TargetDecision::deny(format!(
                    "Private IP addresses not allowed: {}",
                    target
                ));
            }
        }

        if !self.whitelist.is_empty()
            && !self
                .whitelist
                .iter()
                .any(|rule| rule.covers(target, &classified))
        {
            return TargetDecision::deny(format!("Target {} not in whitelist", target));
        }

        TargetDecision::allow()
    }

    /// Validate several targets, stopping at the first denial
    pub fn validate_multiple<I, S>(&self, targets: I) -> TargetDecision
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for target in targets {
            let decision = self.validate(target.as_ref());
            if !decision.allowed {
                return decision;
            }
        }
        TargetDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn validator(whitelist: &[&str], blacklist: &[&str], allow_private: bool) -> TargetValidator {
        TargetValidator::from_rules(whitelist, blacklist, allow_private).unwrap()
    }

    #[test]
    fn test_empty_target_denied() {
        let v = TargetValidator::permissive();
        for target in ["", "   ", "\t"] {
            let decision = v.validate(target);
            assert!(!decision.allowed);
            assert_eq!(decision.reason.as_deref(), Some("Target cannot be empty"));
        }
    }

    #[test]
    fn test_blacklist_overrides_whitelist() {
        let v = validator(&["*.example.com"], &["secret.example.com"], false);

        assert!(v.validate("api.example.com").allowed);

        let decision = v.validate("secret.example.com");
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Target secret.example.com is blacklisted (matches secret.example.com)")
        );
    }

    #[test]
    fn test_blacklist_network() {
        let v = validator(&[], &["203.0.113.0/24"], false);
        let decision = v.validate("203.0.113.9");
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("203.0.113.0/24"));
        assert!(v.validate("198.51.100.1").allowed);
    }

    #[test]
    fn test_private_addresses() {
        let strict = validator(&[], &[], false);
        let decision = strict.validate("192.168.1.1");
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Private IP addresses not allowed: 192.168.1.1")
        );
        assert!(!strict.validate("127.0.0.1").allowed);
        assert!(!strict.validate("10.0.0.0/24").allowed);
        assert!(strict.validate("8.8.8.8").allowed);

        let lenient = validator(&[], &[], true);
        assert!(lenient.validate("192.168.1.1").allowed);
    }

    #[test]
    fn test_public_based_range_containing_private_space() {
        let strict = validator(&[], &[], false);
        for range in ["192.0.0.0/8", "172.0.0.0/8", "100.0.0.0/8", "0.0.0.0/0"] {
            let decision = strict.validate(range);
            assert!(!decision.allowed, "{} should be denied", range);
            assert_eq!(
                decision.reason,
                Some(format!("Private IP addresses not allowed: {}", range))
            );
        }
        assert!(strict.validate("8.0.0.0/8").allowed);

        let lenient = validator(&[], &[], true);
        assert!(lenient.validate("192.0.0.0/8").allowed);
    }

    #[test]
    fn test_blacklist_checked_before_private() {
        let v = validator(&[], &["127.0.0.1"], false);
        let reason = v.validate("127.0.0.1").reason.unwrap();
        assert!(reason.contains("blacklisted"));
    }

    #[test]
    fn test_whitelist_required_when_present() {
        let v = validator(&["scanme.nmap.org", "45.33.32.0/24"], &[], false);

        assert!(v.validate("scanme.nmap.org").allowed);
        assert!(v.validate("45.33.32.156").allowed);

        let decision = v.validate("google.com");
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Target google.com not in whitelist")
        );

        // A wider range than the whitelisted one is not covered
        assert!(!v.validate("45.33.0.0/16").allowed);
    }

    #[test]
    fn test_wildcard_whitelist() {
        let v = validator(&["*.example.com"], &[], false);

        let cases = vec![
            ("api.example.com", true),
            ("a.b.example.com", true),
            ("example.com", false),
            ("notexample.com", false),
            ("evil.example.com.attacker.net", false),
        ];

        for (target, expected) in cases {
            assert_eq!(v.validate(target).allowed, expected, "target {}", target);
        }
    }

    #[test]
    fn test_validate_multiple_returns_first_failure() {
        let v = validator(&[], &["bad.example.com"], false);

        assert!(v.validate_multiple(["8.8.8.8", "good.example.com"]).allowed);

        let decision = v.validate_multiple(["8.8.8.8", "10.0.0.1", "bad.example.com"]);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("Private IP"));

        assert!(v.validate_multiple(Vec::<String>::new()).allowed);
    }

    #[test]
    fn test_target_is_trimmed() {
        let v = validator(&["scanme.nmap.org"], &[], false);
        assert!(v.validate("  scanme.nmap.org ").allowed);
    }

    proptest! {
        #[test]
        fn prop_validate_is_deterministic(target in "[a-z0-9.*-]{0,24}") {
            let v = validator(&["*.example.com", "8.8.8.0/24"], &["bad.example.com"], false);
            prop_assert_eq!(v.validate(&target), v.validate(&target));
        }

        #[test]
        fn prop_blacklisted_never_allowed(sub in "[a-z]{1,10}") {
            let v = validator(&["*.example.com"], &["*.internal.example.com"], true);
            let target = format!("{}.internal.example.com", sub);
            prop_assert!(!v.validate(&target).allowed);
        }
    }
}
