//! Scan Target Validation
//!
//! Whitelist/blacklist enforcement for anything a tool is about to contact.
//!
//! # Rule Kinds
//!
//! - **IP**: `203.0.113.7`, `2001:db8::1`
//! - **CIDR**: `10.0.0.0/8`
//! - **Domain**: `scanme.nmap.org` (case-insensitive, exact)
//! - **Wildcard**: `*.example.com` (`*` matches any run of characters,
//!   anchored at both ends)

mod ip;
mod rule;
mod validator;

pub use ip::{is_restricted, overlaps_restricted};
pub use rule::{Target, TargetRule, TargetRuleError};
pub use validator::{TargetDecision, TargetValidator};
