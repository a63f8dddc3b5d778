//! External tool invocation shared by the command-line engine bindings.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A program and its argument template.
///
/// Arguments may contain `{name}` placeholders that are replaced with paths
/// when the command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any argument references `{name}`.
    pub fn uses(&self, name: &str) -> bool {
        let placeholder = format!("{{{}}}", name);
        self.args.iter().any(|a| a.contains(&placeholder))
    }

    /// Expand the placeholders and run the program to completion.
    pub fn run(&self, vars: &[(&str, &Path)]) -> std::io::Result<Output> {
        let args: Vec<String> = self.args.iter().map(|a| substitute(a, vars)).collect();
        debug!("Running {} {:?}", self.program, args);

        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
    }
}

/// Short description of a failed run: exit status plus trimmed stderr.
pub fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{}", output.status)
    } else {
        format!("{}: {}", output.status, stderr)
    }
}

fn substitute(arg: &str, vars: &[(&str, &Path)]) -> String {
    let mut expanded = arg.to_string();
    for (name, path) in vars {
        let placeholder = format!("{{{}}}", name);
        if expanded.contains(&placeholder) {
            expanded = expanded.replace(&placeholder, &path.to_string_lossy());
        }
    }
    expanded
}
