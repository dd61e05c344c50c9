//! Address classification for scan targets

use ipnet::{IpNet, Ipv4Net};
use lazy_static::lazy_static;
use std::net::{IpAddr, Ipv4Addr};

lazy_static! {
    /// Ranges that are private, loopback, link-local or otherwise
    /// non-routable on the public internet
    static ref RESTRICTED_NETS: Vec<IpNet> = [
        "0.0.0.0/8",          // "this network"
        "10.0.0.0/8",
        "100.64.0.0/10",      // carrier-grade NAT
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "255.255.255.255/32",
        "::/128",
        "::1/128",
        "fc00::/7",           // unique local
        "fe80::/10",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect();
}

/// Whether an address falls in a restricted range. IPv4-mapped IPv6
/// addresses are judged by their IPv4 form.
pub fn is_restricted(ip: &IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(*ip),
        IpAddr::V4(_) => *ip,
    };
    RESTRICTED_NETS.iter().any(|net| net.contains(&ip))
}

/// Whether any address of `net` is restricted
///
/// Two CIDR blocks overlap exactly when one contains the other's base
/// address, so `192.0.0.0/8` is caught by `192.168.0.0/16`.
pub fn overlaps_restricted(net: &IpNet) -> bool {
    let net = mapped_v4(net).unwrap_or(*net);
    RESTRICTED_NETS
        .iter()
        .any(|restricted| restricted.contains(&net.network()) || net.contains(&restricted.network()))
}

/// The IPv4 equivalent of a network lying inside `::ffff:0:0/96`
fn mapped_v4(net: &IpNet) -> Option<IpNet> {
    let IpNet::V6(v6) = net else {
        return None;
    };
    if v6.prefix_len() < 96 {
        return None;
    }
    let base: Ipv4Addr = v6.network().to_ipv4_mapped()?;
    Ipv4Net::new(base, v6.prefix_len() - 96).ok().map(IpNet::V4)
}
