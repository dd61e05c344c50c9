//! Argument Validation Module
//!
//! Every argument that will reach a subprocess is checked against a denylist
//! of shell control sequences. Commands are never run through a shell, so the
//! denylist is a second line of defence for tools that interpret their own
//! arguments (ssh remote commands, curl config expansion, and so on).

/// Substrings that are never allowed inside an argument
pub const DANGEROUS_PATTERNS: &[&str] = &[
    ";", "&&", "||", "|", "`", "$(", "${", ">", "<", "\n", "\r",
];

/// Error types for request and argument validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandValidationError {
    #[error("Dangerous pattern '{0}' not allowed in arguments")]
    DangerousPattern(&'static str),

    #[error("Either 'command' or 'args' required")]
    MissingInput,

    #[error("Provide either 'command' or 'args', not both")]
    ConflictingInput,

    #[error("Invalid command syntax: unbalanced quotes or trailing escape")]
    InvalidSyntax,

    #[error("Empty command")]
    EmptyCommand,

    #[error("Timeout must be at least {0} seconds")]
    TimeoutTooShort(u64),

    #[error("Timeout cannot exceed {0} seconds")]
    TimeoutTooLong(u64),

    #[error("Invalid value for '{field}': {value}")]
    InvalidOption { field: &'static str, value: String },
}

/// Denylist validator for subprocess arguments
#[derive(Debug, Clone)]
pub struct CommandValidator {
    /// Forbidden substrings
    patterns: Vec<&'static str>,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self {
            patterns: DANGEROUS_PATTERNS.to_vec(),
        }
    }
}

impl CommandValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a single argument
    pub fn check_argument(&self, arg: &str) -> Result<(), CommandValidationError> {
        match self.patterns.iter().find(|p| arg.contains(**p)) {
            Some(pattern) => Err(CommandValidationError::DangerousPattern(*pattern)),
            None => Ok(()),
        }
    }

    /// Check every argument, failing on the first offender
    pub fn validate_args<S: AsRef<str>>(&self, args: &[S]) -> Result<(), CommandValidationError> {
        args.iter()
            .try_for_each(|arg| self.check_argument(arg.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_safe_arguments() {
        let validator = CommandValidator::new();
        let safe = vec![
            "google.com",
            "+short",
            "-sV",
            "-p",
            "80,443",
            "https://example.com/path?q=1&x=2",
            "user@host",
            "-o",
            "BatchMode=yes",
            "$HOME",
            "uptime",
        ];

        for arg in safe {
            assert!(
                validator.check_argument(arg).is_ok(),
                "'{}' should be accepted",
                arg
            );
        }
    }

    #[test]
    fn test_dangerous_arguments() {
        let validator = CommandValidator::new();
        let cases = vec![
            ("a;b", ";"),
            ("true && id", "&&"),
            ("false || id", "||"),
            ("cat | sh", "|"),
            ("`id`", "`"),
            ("$(id)", "$("),
            ("${PATH}", "${"),
            ("> /etc/passwd", ">"),
            ("< /etc/shadow", "<"),
            ("line\nbreak", "\n"),
            ("carriage\rreturn", "\r"),
        ];

        for (arg, pattern) in cases {
            assert_eq!(
                validator.check_argument(arg),
                Err(CommandValidationError::DangerousPattern(pattern)),
                "'{}' should be rejected",
                arg.escape_debug()
            );
        }
    }

    #[test]
    fn test_validate_args_reports_first_offender() {
        let validator = CommandValidator::new();
        let args = vec!["google.com".to_string(), "; rm -rf /".to_string()];
        let err = validator.validate_args(&args).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Dangerous pattern ';' not allowed in arguments"
        );
    }

    proptest! {
        #[test]
        fn prop_semicolon_always_rejected(prefix in "[a-zA-Z0-9 .-]{0,16}", suffix in "[a-zA-Z0-9 .-]{0,16}") {
            let validator = CommandValidator::new();
            let arg = format!("{};{}", prefix, suffix);
            prop_assert!(validator.check_argument(&arg).is_err());
        }

        #[test]
        fn prop_plain_tokens_accepted(arg in "[a-zA-Z0-9.:,/=@+_-]{0,32}") {
            let validator = CommandValidator::new();
            prop_assert!(validator.check_argument(&arg).is_ok());
        }
    }
}
