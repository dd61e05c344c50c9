//! Built-in Tool Catalog
//!
//! The fifteen network tools shipped with the gateway. Most need nothing
//! beyond a descriptor; ssh, nmap and ping carry their own rules.

use std::path::PathBuf;
use std::sync::Arc;

use super::registry::{Tool, ToolDescriptor};
use super::request::{ExecRequest, SshOptions};
use super::targets::{extract_targets, ArgumentHints};
use super::validator::CommandValidationError;

/// nmap scan types that need raw sockets
const NMAP_PRIVILEGED_FLAGS: &[&str] = &["-sS", "-sA", "-sW", "-sM", "-O", "-sU"];

/// Options prepended to every structured ssh invocation. The host key
/// policy entry is replaced, not repeated, when the caller sets one: ssh
/// keeps the first value it sees for an option.
const SSH_EPHEMERAL_DEFAULTS: &[&str] = &[
    "-o",
    "BatchMode=yes",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "CheckHostIP=no",
    "-o",
    "LogLevel=ERROR",
];

const SSH_HOST_KEY_MODES: &[&str] = &["yes", "no", "accept-new"];

const DNS_KEYWORDS: &[&str] = &[
    "A", "AAAA", "ANY", "AXFR", "CAA", "CNAME", "DNSKEY", "DS", "HINFO", "IXFR", "MX", "NAPTR",
    "NS", "NSEC", "NSEC3", "PTR", "RRSIG", "SOA", "SPF", "SRV", "SSHFP", "TLSA", "TXT", "IN",
    "CH", "HS",
];

const SSH_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "-b", "-c", "-D", "-E", "-e", "-F", "-I", "-i", "-L", "-l", "-m", "-O", "-o", "-p", "-Q",
        "-R", "-S", "-W", "-w",
    ],
    host_flags: &["-J"],
    keywords: &[],
    destination_only: true,
};

const NMAP_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "-p", "--top-ports", "--exclude-ports", "--port-ratio", "-oN", "-oX", "-oG", "-oA", "-oS",
        "--script", "--script-args", "-e", "-g", "--source-port", "--max-retries", "--host-timeout",
        "--min-rate", "--max-rate", "--min-parallelism", "--max-parallelism", "--scan-delay",
        "--max-scan-delay", "--ttl", "--data-length", "--data", "--data-string", "--version-intensity",
        "--mtu", "--spoof-mac", "--stylesheet", "-iR", "--dns-servers",
    ],
    host_flags: &["-D", "-S", "--exclude"],
    keywords: &[],
    destination_only: false,
};

const DIG_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &["-b", "-c", "-f", "-k", "-p", "-t", "-y"],
    host_flags: &["-q", "-x"],
    keywords: DNS_KEYWORDS,
    destination_only: false,
};

const HOST_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &["-c", "-N", "-R", "-t", "-W", "-m"],
    host_flags: &[],
    keywords: DNS_KEYWORDS,
    destination_only: false,
};

const WHOIS_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &["-p", "-i", "-T", "-s", "-g", "-q", "-t", "-v"],
    host_flags: &["-h", "--host"],
    keywords: &[],
    destination_only: false,
};

const CURL_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "-A", "--user-agent", "-b", "--cookie", "-c", "--cookie-jar", "-d", "--data", "--data-raw",
        "--data-binary", "--data-urlencode", "-H", "--header", "-m", "--max-time",
        "--connect-timeout", "-o", "--output", "-u", "--user", "-w", "--write-out", "-X",
        "--request", "-e", "--referer", "-F", "--form", "--retry", "-r", "--range", "--cacert",
        "--cert", "--key", "--limit-rate", "--max-filesize", "--tls-max", "--ciphers",
    ],
    host_flags: &["-x", "--proxy", "--resolve", "--connect-to"],
    keywords: &[],
    destination_only: false,
};

const TRACE_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "-f", "-m", "-q", "-w", "-p", "-N", "-t", "-z", "-i", "-c", "-s", "-a", "-B", "-G", "-Q",
        "--port", "--interval", "--report-cycles", "--psize", "--max-ttl", "--first-ttl",
        "--timeout", "--max-unknown", "--order", "--tos", "--address", "--interface",
    ],
    host_flags: &["-g"],
    keywords: &[],
    destination_only: false,
};

const NC_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &["-i", "-p", "-q", "-w", "-I", "-O", "-T", "-V", "-e", "-c"],
    host_flags: &["-s", "-x", "-X"],
    keywords: &[],
    destination_only: false,
};

const TLS_SCAN_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "--sni-name", "--xml", "--timeout", "--sleep", "--starttls", "-t", "--starttls-proto",
        "--logfile", "--jsonfile", "--csvfile", "--htmlfile", "--outfile", "--severity",
        "--connect-timeout", "--openssl-timeout", "--proxy",
    ],
    host_flags: &["--ip"],
    keywords: &[],
    destination_only: false,
};

const NIKTO_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "-p", "-port", "-Tuning", "-o", "-output", "-Format", "-Plugins", "-timeout", "-Pause",
        "-maxtime", "-useragent", "-id", "-root", "-evasion", "-mutate", "-Display", "-config",
    ],
    host_flags: &["-h", "-host", "-vhost", "-useproxy"],
    keywords: &[],
    destination_only: false,
};

const WHATWEB_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "-a", "--aggression", "-U", "--user-agent", "-H", "--header", "-t", "--max-threads",
        "--log-brief", "--log-verbose", "--log-json", "--log-xml", "--open-timeout",
        "--read-timeout", "-p", "--plugins", "-i", "--input-file",
    ],
    host_flags: &["--proxy"],
    keywords: &[],
    destination_only: false,
};

const MASSCAN_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &[
        "-p", "--ports", "--rate", "--max-rate", "-oX", "-oJ", "-oL", "-oG", "-oB", "-e",
        "--adapter", "--adapter-port", "--adapter-mac", "--router-mac", "--wait", "--retries",
        "--banners", "--source-port", "-c", "--conf", "--excludefile", "--shard", "--seed", "--ttl",
    ],
    host_flags: &["--exclude", "--adapter-ip", "--router-ip"],
    keywords: &[],
    destination_only: false,
};

const PING_HINTS: ArgumentHints = ArgumentHints {
    value_flags: &["-c", "-i", "-s", "-t", "-W", "-w", "-I", "-l", "-M", "-p", "-Q", "-S", "-T"],
    host_flags: &[],
    keywords: &[],
    destination_only: false,
};

/// Every built-in tool
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    let generic = |descriptor: ToolDescriptor| -> Arc<dyn Tool> { Arc::new(GenericTool::new(descriptor)) };

    vec![
        Arc::new(SshTool::new()),
        Arc::new(NmapTool::new()),
        generic(
            ToolDescriptor::new("dig", "dig", "Query DNS records (A, MX, TXT, etc.)")
                .scanner()
                .hints(DIG_HINTS),
        ),
        generic(
            ToolDescriptor::new("host", "host", "Quick DNS lookup")
                .scanner()
                .hints(HOST_HINTS),
        ),
        generic(
            ToolDescriptor::new("whois", "whois", "Query domain registration info")
                .scanner()
                .hints(WHOIS_HINTS),
        ),
        generic(
            ToolDescriptor::new("curl", "curl", "Fetch URLs and test HTTP endpoints")
                .scanner()
                .hints(CURL_HINTS),
        ),
        generic(
            ToolDescriptor::new("traceroute", "traceroute", "Show network path to host")
                .privileged()
                .scanner()
                .hints(TRACE_HINTS),
        ),
        generic(
            ToolDescriptor::new("mtr", "mtr", "Live network diagnostics (traceroute + ping)")
                .privileged()
                .scanner()
                .hints(TRACE_HINTS),
        ),
        generic(
            ToolDescriptor::new("nc", "nc", "Connect to TCP/UDP ports")
                .scanner()
                .hints(NC_HINTS),
        ),
        generic(
            ToolDescriptor::new("sslscan", "sslscan", "Test SSL/TLS cipher suites")
                .scanner()
                .hints(TLS_SCAN_HINTS),
        ),
        generic(
            ToolDescriptor::new("testssl", "testssl.sh", "Comprehensive TLS security audit")
                .scanner()
                .hints(TLS_SCAN_HINTS)
                .max_timeout(600),
        ),
        generic(
            ToolDescriptor::new("nikto", "nikto", "Scan web servers for vulnerabilities")
                .scanner()
                .hints(NIKTO_HINTS)
                .max_timeout(1800),
        ),
        generic(
            ToolDescriptor::new("whatweb", "whatweb", "Detect web technologies")
                .scanner()
                .hints(WHATWEB_HINTS),
        ),
        generic(
            ToolDescriptor::new("masscan", "masscan", "Fast mass port scanner")
                .privileged()
                .scanner()
                .hints(MASSCAN_HINTS)
                .max_timeout(1800),
        ),
        Arc::new(PingTool::new()),
    ]
}

/// A tool with no special argument rules
#[derive(Debug, Clone)]
pub struct GenericTool {
    descriptor: ToolDescriptor,
}

impl GenericTool {
    pub fn new(descriptor: ToolDescriptor) -> Self {
        Self { descriptor }
    }
}

impl Tool for GenericTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }
}

/// nmap: only some scan types need CAP_NET_RAW
#[derive(Debug, Clone)]
pub struct NmapTool {
    descriptor: ToolDescriptor,
}

impl NmapTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("nmap", "nmap", "Scan ports and detect services")
                .privileged()
                .scanner()
                .hints(NMAP_HINTS)
                .max_timeout(1800),
        }
    }
}

impl Default for NmapTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for NmapTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn needs_capability(&self, args: &[String]) -> bool {
        args.iter().any(|arg| {
            NMAP_PRIVILEGED_FLAGS
                .iter()
                .any(|flag| arg.starts_with(flag))
        })
    }
}

/// ping: never runs unbounded
#[derive(Debug, Clone)]
pub struct PingTool {
    descriptor: ToolDescriptor,
}

impl PingTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("ping", "ping", "Test host connectivity")
                .scanner()
                .hints(PING_HINTS),
        }
    }
}

impl Default for PingTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for PingTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn transform_args(&self, args: Vec<String>) -> Vec<String> {
        let has_count = args
            .iter()
            .any(|arg| arg.starts_with("-c") || arg.starts_with("--count"));
        if has_count {
            return args;
        }

        let mut with_count = Vec::with_capacity(args.len() + 2);
        with_count.push("-c".to_string());
        with_count.push("4".to_string());
        with_count.extend(args);
        with_count
    }
}

/// ssh: either passthrough arguments or a command synthesized from
/// structured fields (`host`, `user`, `port`, ...)
#[derive(Debug, Clone)]
pub struct SshTool {
    descriptor: ToolDescriptor,
}

impl SshTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("ssh", "ssh", "Run commands on remote servers")
                .scanner()
                .hints(SSH_HINTS),
        }
    }

    fn build_structured(
        &self,
        host: &str,
        options: &SshOptions,
        remote_command: Option<&str>,
    ) -> Result<Vec<String>, CommandValidationError> {
        let host_key_mode = match options.strict_host_key_checking.as_deref() {
            Some(mode) if !SSH_HOST_KEY_MODES.contains(&mode) => {
                return Err(CommandValidationError::InvalidOption {
                    field: "strict_host_key_checking",
                    value: mode.to_string(),
                });
            }
            Some(mode) => mode,
            None => "no",
        };
        let mut args: Vec<String> = SSH_EPHEMERAL_DEFAULTS
            .iter()
            .map(|opt| {
                if opt.starts_with("StrictHostKeyChecking=") {
                    format!("StrictHostKeyChecking={}", host_key_mode)
                } else {
                    opt.to_string()
                }
            })
            .collect();

        if let Some(port) = options.port {
            if port == 0 {
                return Err(CommandValidationError::InvalidOption {
                    field: "port",
                    value: port.to_string(),
                });
            }
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        if let Some(config) = ssh_config_file(options.ssh_dir.as_deref()) {
            args.push("-F".to_string());
            args.push(config.to_string_lossy().into_owned());
        }

        if let Some(jump) = options.proxy_jump.as_deref() {
            args.push("-J".to_string());
            args.push(jump.to_string());
        }

        if options.allocate_tty {
            args.push("-t".to_string());
        }

        args.extend(options.extra_opts.iter().cloned());

        if host.trim().is_empty() || host.starts_with('-') {
            return Err(CommandValidationError::InvalidOption {
                field: "host",
                value: host.to_string(),
            });
        }
        match options.user.as_deref() {
            Some(user) if !user.is_empty() => args.push(format!("{}@{}", user, host)),
            _ => args.push(host.to_string()),
        }

        if let Some(command) = remote_command.filter(|c| !c.trim().is_empty()) {
            args.push("--".to_string());
            args.push(command.to_string());
        }

        Ok(args)
    }
}

impl Default for SshTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SshTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn structured_args(
        &self,
        request: &ExecRequest,
    ) -> Option<Result<Vec<String>, CommandValidationError>> {
        let host = request.ssh.host.as_deref()?;
        if request.args.is_some() {
            return None;
        }
        Some(self.build_structured(host, &request.ssh, request.command.as_deref()))
    }

    fn scan_targets(&self, args: &[String], request: &ExecRequest) -> Vec<String> {
        if let Some(host) = request.ssh.host.as_deref() {
            if request.args.is_none() {
                return vec![host.to_string()];
            }
        }
        extract_targets(args, &self.descriptor.hints)
    }
}

/// `<ssh_dir>/config` when it exists; `ssh_dir` defaults to `~/.ssh`
fn ssh_config_file(ssh_dir: Option<&str>) -> Option<PathBuf> {
    let dir = match ssh_dir {
        Some(dir) => expand_home(dir),
        None => PathBuf::from(std::env::var_os("HOME")?).join(".ssh"),
    };
    let config = dir.join("config");
    config.is_file().then_some(config)
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
