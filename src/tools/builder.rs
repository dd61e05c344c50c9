//! Command Builder
//!
//! Turns an [`ExecRequest`] into the exact argument vector handed to the
//! process executor. Pure: no I/O, no target or capability checks.

use super::registry::Tool;
use super::request::ExecRequest;
use super::validator::{CommandValidationError, CommandValidator};

/// Builds argument vectors for registered tools
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    validator: CommandValidator,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `[binary, args...]` for a tool
    ///
    /// # Errors
    ///
    /// Returns an error if the request supplies neither or both of
    /// `command`/`args`, the command string cannot be split, or any argument
    /// contains a forbidden pattern.
    pub fn build(
        &self,
        tool: &dyn Tool,
        request: &ExecRequest,
    ) -> Result<Vec<String>, CommandValidationError> {
        let args = match tool.structured_args(request) {
            Some(args) => args?,
            None => parse_input(request.command.as_deref(), request.args.as_deref())?,
        };

        self.validator.validate_args(&args)?;

        let args = tool.transform_args(args);
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(tool.descriptor().binary.clone());
        argv.extend(args);
        Ok(argv)
    }
}

/// Pick the argument source: exactly one of `command` or `args`
pub fn parse_input(
    command: Option<&str>,
    args: Option<&[String]>,
) -> Result<Vec<String>, CommandValidationError> {
    match (command, args) {
        (Some(_), Some(_)) => Err(CommandValidationError::ConflictingInput),
        (Some(command), None) => split_command(command),
        (None, Some(args)) => Ok(args.to_vec()),
        (None, None) => Err(CommandValidationError::MissingInput),
    }
}

/// Split a command string with POSIX shell-word rules
pub fn split_command(command: &str) -> Result<Vec<String>, CommandValidationError> {
    shlex::split(command).ok_or(CommandValidationError::InvalidSyntax)
}
