//! Scan target extraction
//!
//! Picks the hosts, addresses and ranges out of a tool's argument list so
//! they can be checked against the target whitelist/blacklist before launch.
//!
//! Every positional argument is a target unless the tool declares it
//! otherwise: values of known option flags and tool keywords (dig record
//! types) are skipped, everything else is normalised and checked. Numeric
//! IPv4 spellings (`2130706433`, `0x7f000001`, `127.1`) become dotted quads
//! and nmap octet ranges (`10.0.0.1-20`, `192.168.*.1`) become the smallest
//! CIDR block covering them.

use ipnet::{IpNet, Ipv4Net};
use std::net::{IpAddr, Ipv4Addr};

/// What a tool's arguments mean, as far as target extraction cares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArgumentHints {
    /// Flags whose next argument is a plain value
    pub value_flags: &'static [&'static str],

    /// Flags whose next argument is a host the tool will contact
    pub host_flags: &'static [&'static str],

    /// Bare words the tool understands as keywords, matched case-insensitively
    pub keywords: &'static [&'static str],

    /// Only the first positional argument is a target (ssh destination);
    /// the rest is a remote command
    pub destination_only: bool,
}

/// Collect every argument that names something the tool will contact
pub fn extract_targets<S: AsRef<str>>(args: &[S], hints: &ArgumentHints) -> Vec<String> {
    let mut targets = Vec::new();
    let mut options_done = false;
    // Some(true): next argument is a host, Some(false): a plain value
    let mut pending: Option<bool> = None;

    for arg in args {
        let arg = arg.as_ref().trim();

        if let Some(is_host) = pending.take() {
            if is_host {
                targets.extend(target_from_arg(arg));
            }
            continue;
        }

        if !options_done && arg == "--" {
            options_done = true;
            continue;
        }

        if !options_done && is_flag(arg) {
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg, None),
            };
            if hints.host_flags.contains(&name) {
                match inline {
                    Some(value) => targets.extend(target_from_arg(value)),
                    None => pending = Some(true),
                }
            } else if inline.is_none() && hints.value_flags.contains(&name) {
                pending = Some(false);
            }
            continue;
        }

        if hints.keywords.iter().any(|k| k.eq_ignore_ascii_case(arg)) {
            continue;
        }
        targets.extend(target_from_arg(arg));
        if hints.destination_only {
            break;
        }
    }

    targets
}

/// Interpret one positional argument as a target
///
/// Returns `None` only for arguments that cannot name a host at all
/// (empty, `-`, port lists, free text).
pub fn target_from_arg(arg: &str) -> Option<String> {
    let arg = arg.trim();
    if arg.is_empty() || arg == "-" {
        return None;
    }

    if let Some(host) = host_from_url(arg) {
        return normalize(host);
    }

    // dig @resolver, ssh user@host
    let candidate = match arg.rsplit_once('@') {
        Some((_, host)) => host,
        None => arg,
    };
    normalize(strip_port(candidate))
}

fn is_flag(arg: &str) -> bool {
    arg.len() > 1 && (arg.starts_with('-') || arg.starts_with('+'))
}

fn normalize(candidate: &str) -> Option<String> {
    if candidate.is_empty() {
        return None;
    }
    if candidate.parse::<IpAddr>().is_ok() || candidate.parse::<IpNet>().is_ok() {
        return Some(candidate.to_string());
    }
    if let Some(ip) = parse_numeric_ipv4(candidate) {
        return Some(ip.to_string());
    }
    if let Some(net) = parse_octet_range(candidate) {
        return Some(net.to_string());
    }
    if let Some((host, prefix)) = candidate.split_once('/') {
        let prefix: u8 = prefix.parse().ok()?;
        if let Some(ip) = parse_numeric_ipv4(host) {
            return Ipv4Net::new(ip, prefix).ok().map(|net| net.trunc().to_string());
        }
        // nmap accepts hostname/prefix
        return is_hostname(host).then(|| host.to_string());
    }
    is_hostname(candidate).then(|| candidate.to_string())
}

fn is_hostname(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.starts_with('.')
        && !candidate.starts_with('-')
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' || c == '*')
}

/// inet_aton spellings: one to four parts, each decimal, `0x` hex or
/// leading-zero octal, the last part filling the remaining bytes
fn parse_numeric_ipv4(candidate: &str) -> Option<Ipv4Addr> {
    let parts: Vec<&str> = candidate.split('.').collect();
    if parts.len() > 4 {
        return None;
    }
    let values = parts
        .iter()
        .map(|part| parse_numeric_part(part))
        .collect::<Option<Vec<u32>>>()?;
    let (last, leading) = values.split_last()?;
    if leading.iter().any(|v| *v > 255) {
        return None;
    }

    let tail_bits = 8 * (4 - leading.len() as u32);
    if tail_bits < 32 && *last >= 1 << tail_bits {
        return None;
    }
    let address = leading
        .iter()
        .enumerate()
        .fold(*last, |acc, (i, v)| acc | v << (24 - 8 * i as u32));
    Some(Ipv4Addr::from(address))
}

fn parse_numeric_part(part: &str) -> Option<u32> {
    if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    if !part.chars().all(|c| c.is_ascii_digit()) || part.is_empty() {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return u32::from_str_radix(&part[1..], 8).ok();
    }
    part.parse().ok()
}

/// nmap octet-range notation, widened to the smallest covering CIDR
fn parse_octet_range(candidate: &str) -> Option<Ipv4Net> {
    if !candidate.contains(['-', ',', '*']) {
        return None;
    }
    let octets: Vec<&str> = candidate.split('.').collect();
    if octets.len() != 4 {
        return None;
    }

    let mut low = [0u8; 4];
    let mut high = [0u8; 4];
    for (i, spec) in octets.iter().enumerate() {
        let (lo, hi) = octet_bounds(spec)?;
        low[i] = lo;
        high[i] = hi;
    }

    let low = u32::from(Ipv4Addr::from(low));
    let high = u32::from(Ipv4Addr::from(high));
    let prefix = (low ^ high).leading_zeros() as u8;
    Ipv4Net::new(Ipv4Addr::from(low), prefix).ok().map(|net| net.trunc())
}

/// Lowest and highest value an octet spec (`*`, `5`, `1-20`, `1,3,7-9`) can take
fn octet_bounds(spec: &str) -> Option<(u8, u8)> {
    if spec == "*" {
        return Some((0, 255));
    }
    let mut bounds: Option<(u8, u8)> = None;
    for item in spec.split(',') {
        let (lo, hi): (u8, u8) = match item.split_once('-') {
            Some((lo, hi)) => (
                if lo.is_empty() { 0 } else { lo.parse().ok()? },
                if hi.is_empty() { 255 } else { hi.parse().ok()? },
            ),
            None => {
                let value: u8 = item.parse().ok()?;
                (value, value)
            }
        };
        if lo > hi {
            return None;
        }
        bounds = Some(match bounds {
            Some((a, b)) => (a.min(lo), b.max(hi)),
            None => (lo, hi),
        });
    }
    bounds
}

fn host_from_url(arg: &str) -> Option<&str> {
    let (_, rest) = arg.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = match authority.rsplit_once('@') {
        Some((_, host)) => host,
        None => authority,
    };
    let host = strip_port(host);
    (!host.is_empty()).then_some(host)
}

/// Drop a trailing `:port`, keeping bracketed IPv6 literals intact
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default();
    }
    match host.rsplit_once(':') {
        // More than one colon means a bare IPv6 address
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NMAP_LIKE: ArgumentHints = ArgumentHints {
        value_flags: &["-p", "--top-ports"],
        host_flags: &[],
        keywords: &[],
        destination_only: false,
    };

    #[test]
    fn test_extracts_common_shapes() {
        let cases = vec![
            ("8.8.8.8", Some("8.8.8.8")),
            ("10.0.0.0/24", Some("10.0.0.0/24")),
            ("::1", Some("::1")),
            ("scanme.nmap.org", Some("scanme.nmap.org")),
            ("https://example.com:8443/path?q=1", Some("example.com")),
            ("http://user:pw@[2001:db8::1]:80/", Some("2001:db8::1")),
            ("ops@bastion.example.com", Some("bastion.example.com")),
            ("@1.1.1.1", Some("1.1.1.1")),
            ("example.com:443", Some("example.com")),
            ("localhost", Some("localhost")),
            ("intranet", Some("intranet")),
            ("scanme.nmap.org/24", Some("scanme.nmap.org")),
        ];

        for (arg, expected) in cases {
            assert_eq!(target_from_arg(arg).as_deref(), expected, "arg {}", arg);
        }
    }

    #[test]
    fn test_numeric_ipv4_spellings() {
        let cases = vec![
            ("2130706433", "127.0.0.1"),
            ("0x7f000001", "127.0.0.1"),
            ("0177.0.0.1", "127.0.0.1"),
            ("127.1", "127.0.0.1"),
            ("10.1", "10.0.0.1"),
            ("0", "0.0.0.0"),
            ("http://2130706433/", "127.0.0.1"),
            ("0x7f000001/8", "127.0.0.0/8"),
        ];
        for (arg, expected) in cases {
            assert_eq!(target_from_arg(arg).as_deref(), Some(expected), "arg {}", arg);
        }
    }

    #[test]
    fn test_octet_ranges_widen_to_covering_cidr() {
        let cases = vec![
            ("10.0.0.1-20", "10.0.0.0/27"),
            ("192.168.1-3.*", "192.168.0.0/22"),
            ("10.0.0.1,5,9", "10.0.0.0/28"),
            ("45.33.32.*", "45.33.32.0/24"),
            ("*.*.*.*", "0.0.0.0/0"),
        ];
        for (arg, expected) in cases {
            assert_eq!(target_from_arg(arg).as_deref(), Some(expected), "arg {}", arg);
        }
    }

    #[test]
    fn test_ignores_non_targets() {
        for arg in ["80,443", "", "-", "a b", "StrictHostKeyChecking=no"] {
            assert_eq!(target_from_arg(arg), None, "arg {}", arg);
        }
    }

    #[test]
    fn test_flag_values_are_skipped() {
        let args = vec!["-sV", "-p", "22,80", "--top-ports", "100", "scanme.nmap.org", "45.33.32.0/24"];
        assert_eq!(
            extract_targets(&args, &NMAP_LIKE),
            vec!["scanme.nmap.org".to_string(), "45.33.32.0/24".to_string()]
        );
    }

    #[test]
    fn test_unrecognised_positionals_are_targets() {
        let args = vec!["-sT", "10.0.0.1-20", "intranet"];
        assert_eq!(
            extract_targets(&args, &NMAP_LIKE),
            vec!["10.0.0.0/27".to_string(), "intranet".to_string()]
        );
    }

    #[test]
    fn test_host_flags_and_keywords() {
        let hints = ArgumentHints {
            value_flags: &["-p"],
            host_flags: &["-h"],
            keywords: &["MX", "ANY"],
            destination_only: false,
        };
        let args = vec!["-h", "whois.example.net", "mx", "example.com", "--server=ignored"];
        assert_eq!(
            extract_targets(&args, &hints),
            vec!["whois.example.net".to_string(), "example.com".to_string()]
        );

        let inline = vec!["-h=10.0.0.1", "example.com"];
        assert_eq!(
            extract_targets(&inline, &hints),
            vec!["10.0.0.1".to_string(), "example.com".to_string()]
        );
    }

    #[test]
    fn test_destination_only_stops_at_remote_command() {
        let hints = ArgumentHints {
            value_flags: &["-p", "-i"],
            host_flags: &["-J"],
            keywords: &[],
            destination_only: true,
        };
        let args = vec!["-J", "jump.example.com", "-p", "22", "ops@server.example.com", "uptime", "intranet"];
        assert_eq!(
            extract_targets(&args, &hints),
            vec!["jump.example.com".to_string(), "server.example.com".to_string()]
        );
    }

    #[test]
    fn test_arguments_after_double_dash_are_positional() {
        let args = vec!["--", "-weird-host"];
        assert!(extract_targets(&args, &ArgumentHints::default()).is_empty());

        let args = vec!["--", "example.com"];
        assert_eq!(
            extract_targets(&args, &ArgumentHints::default()),
            vec!["example.com".to_string()]
        );
    }
}
