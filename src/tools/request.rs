//! Execution Request
//!
//! The structured input accepted by both the HTTP and MCP surfaces.

use serde::{Deserialize, Deserializer, Serialize};

/// Default output format hint
pub const DEFAULT_OUTPUT_FORMAT: &str = "text";

/// A request to run one tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Tool name; when absent, the first word of `command` names the tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Shell-style command string, split with POSIX word rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Pre-split argument list
    #[serde(
        default,
        deserialize_with = "deserialize_args",
        skip_serializing_if = "Option::is_none"
    )]
    pub args: Option<Vec<String>>,

    /// Timeout override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Output format hint, echoed back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Run as a background job
    #[serde(rename = "async", default)]
    pub run_async: bool,

    /// SSH structured-mode fields
    #[serde(flatten)]
    pub ssh: SshOptions,
}

impl ExecRequest {
    /// Request for `tool` with a pre-split argument list
    pub fn with_args<I, S>(tool: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool: Some(tool.into()),
            args: Some(args.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Request carrying only a full command string
    pub fn from_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.run_async = true;
        self
    }

    pub fn output_format(&self) -> &str {
        self.output_format.as_deref().unwrap_or(DEFAULT_OUTPUT_FORMAT)
    }
}

/// Fields used by the ssh tool to synthesize its own argument list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SshOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_jump: Option<String>,

    /// One of `yes`, `no`, `accept-new`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_host_key_checking: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allocate_tty: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_opts: Vec<String>,

    /// Directory holding an ssh `config` file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_dir: Option<String>,
}

/// Accept strings, numbers and booleans in `args`, as JSON clients often send
/// ports and counts unquoted.
fn deserialize_args<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    values
        .map(|values| {
            values
                .into_iter()
                .map(|value| match value {
                    serde_json::Value::String(s) => Ok(s),
                    serde_json::Value::Number(n) => Ok(n.to_string()),
                    serde_json::Value::Bool(b) => Ok(b.to_string()),
                    other => Err(serde::de::Error::custom(format!(
                        "'args' items must be strings, got {}",
                        other
                    ))),
                })
                .collect()
        })
        .transpose()
}
