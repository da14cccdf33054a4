//! Process-backed tool runner

use crate::{
    error::{Error, Result},
    traits::ToolRunner,
    types::ToolOutput,
};
use std::process::Command;

/// [`ToolRunner`] that spawns real processes and captures their output
///
/// Diagnostic text is captured verbatim so failures can be reported with
/// the tool's own words.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ToolRunner for SystemToolRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
        tracing::debug!(program, ?args, "invoking external tool");
        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_unavailable(program.to_string())
            } else {
                Error::Io(e)
            }
        })?;

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_tool_unavailable() {
        let runner = SystemToolRunner::new();
        let result = runner.run("imgrecon-no-such-tool-xyzzy", &[]);
        assert!(matches!(result, Err(Error::ToolUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_exit_code_and_output() {
        let runner = SystemToolRunner::new();
        let out = runner
            .run("sh", &["-c", "echo hello; echo oops >&2; exit 3"])
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.diagnostic(), "oops");
    }
}
