//! Tool Registry
//!
//! Maps tool names to their implementations. Adding a tool means registering
//! another [`Tool`]; dispatch never changes.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use super::request::ExecRequest;
use super::targets::{extract_targets, ArgumentHints};
use super::timeout::TimeoutPolicy;
use super::validator::CommandValidationError;

/// How long a PATH lookup result is trusted
const AVAILABILITY_TTL: Duration = Duration::from_secs(60);

/// Static description of a registered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    /// Name callers use
    pub name: String,

    /// Executable looked up on PATH
    pub binary: String,

    /// Human description
    pub description: String,

    /// Whether the tool needs CAP_NET_RAW for at least some invocations
    pub requires_capability: bool,

    /// Whether positional arguments are hosts the tool will contact
    pub scans_targets: bool,

    /// Timeout bounds
    pub timeouts: TimeoutPolicy,

    /// Which arguments are flag values or keywords rather than targets
    #[serde(skip)]
    pub hints: ArgumentHints,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        binary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            description: description.into(),
            requires_capability: false,
            scans_targets: false,
            timeouts: TimeoutPolicy::default(),
            hints: ArgumentHints::default(),
        }
    }

    pub fn privileged(mut self) -> Self {
        self.requires_capability = true;
        self
    }

    pub fn scanner(mut self) -> Self {
        self.scans_targets = true;
        self
    }

    pub fn hints(mut self, hints: ArgumentHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn max_timeout(mut self, secs: u64) -> Self {
        self.timeouts = TimeoutPolicy::with_max(secs);
        self
    }

    pub fn timeouts(mut self, policy: TimeoutPolicy) -> Self {
        self.timeouts = policy;
        self
    }
}

/// A wrapped command-line program
///
/// Hooks have defaults so most tools only provide a descriptor.
pub trait Tool: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Build the argument list from structured request fields instead of
    /// `command`/`args`. `None` means the tool has no structured mode for
    /// this request.
    fn structured_args(
        &self,
        _request: &ExecRequest,
    ) -> Option<Result<Vec<String>, CommandValidationError>> {
        None
    }

    /// Adjust validated arguments before the binary name is prepended
    fn transform_args(&self, args: Vec<String>) -> Vec<String> {
        args
    }

    /// Whether this particular invocation needs CAP_NET_RAW
    fn needs_capability(&self, _args: &[String]) -> bool {
        self.descriptor().requires_capability
    }

    /// Hosts, addresses and ranges this invocation will contact
    fn scan_targets(&self, args: &[String], _request: &ExecRequest) -> Vec<String> {
        if self.descriptor().scans_targets {
            extract_targets(args, &self.descriptor().hints)
        } else {
            Vec::new()
        }
    }
}

/// Registry of tools, plus a cached view of which binaries are installed
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    availability: Mutex<HashMap<String, (bool, Instant)>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            availability: Mutex::new(HashMap::new()),
        }
    }

    /// Registry holding every built-in tool
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        for tool in super::catalog::builtin_tools() {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool, replacing any previous tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        debug!(tool = %name, "registering tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Descriptors, sorted by name
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor().clone())
            .collect()
    }

    /// Whether the tool's binary is installed, cached for a minute
    ///
    /// A cache miss searches PATH, which touches the filesystem; async
    /// callers go through [`crate::gateway::Gateway::tool_available`].
    pub fn is_available(&self, name: &str) -> bool {
        let Some(tool) = self.tools.get(name) else {
            return false;
        };

        if let Some(available) = self.cached_availability(name) {
            return available;
        }

        // The lookup runs without the cache lock held
        let available = which::which(&tool.descriptor().binary).is_ok();
        self.availability
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), (available, Instant::now()));
        available
    }

    fn cached_availability(&self, name: &str) -> Option<bool> {
        let cache = self
            .availability
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .get(name)
            .filter(|(_, checked_at)| checked_at.elapsed() < AVAILABILITY_TTL)
            .map(|(available, _)| *available)
    }

    /// Installed state of every registered tool, keyed by name
    pub fn availability(&self) -> BTreeMap<String, bool> {
        self.names()
            .into_iter()
            .map(|name| {
                let available = self.is_available(&name);
                (name, available)
            })
            .collect()
    }

    /// Number of registered tools whose binary is installed
    pub fn available_count(&self) -> usize {
        self.availability().values().filter(|a| **a).count()
    }
}
