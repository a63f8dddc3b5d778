//! Transform engine backed by an external XSLT processor.

use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use super::{Executable, TemplateRef, TransformEngine};
use crate::command::{describe_failure, CommandSpec};
use crate::error::TransformEngineError;
use crate::xml::XmlDocument;

/// Runs stylesheets through a command such as `xsltproc`.
///
/// The command line may reference `{stylesheet}`, `{input}` and `{output}`.
/// Without `{output}` the result is read from stdout.
#[derive(Debug, Clone)]
pub struct CommandTransformEngine {
    command: CommandSpec,
}

impl CommandTransformEngine {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

impl TransformEngine for CommandTransformEngine {
    fn compile(&self, template: &TemplateRef) -> Result<Box<dyn Executable>, TransformEngineError> {
        let compile_error = |reason: String| TransformEngineError::Compile {
            template: template.to_string(),
            reason,
        };

        // The processor compiles on every run, so only make sure the
        // stylesheet is there and well-formed.
        let content = std::fs::read(template.path()).map_err(|e| compile_error(e.to_string()))?;
        XmlDocument::parse(&content).map_err(|e| compile_error(e.to_string()))?;

        debug!("Loaded stylesheet {}", template);
        Ok(Box::new(CommandExecutable {
            command: self.command.clone(),
            stylesheet: template.path().to_path_buf(),
        }))
    }
}

struct CommandExecutable {
    command: CommandSpec,
    stylesheet: PathBuf,
}

impl Executable for CommandExecutable {
    fn apply(&self, input: &XmlDocument) -> Result<XmlDocument, TransformEngineError> {
        let mut input_file = tempfile::Builder::new()
            .prefix("einvoice-in-")
            .suffix(".xml")
            .tempfile()?;
        input
            .write_to(&mut input_file)
            .map_err(|e| TransformEngineError::Runtime(e.to_string()))?;
        input_file.flush()?;

        let output_file = tempfile::Builder::new()
            .prefix("einvoice-out-")
            .suffix(".xml")
            .tempfile()?;

        let output = self.command.run(&[
            ("stylesheet", self.stylesheet.as_path()),
            ("input", input_file.path()),
            ("output", output_file.path()),
        ])?;
        if !output.status.success() {
            return Err(TransformEngineError::Runtime(describe_failure(&output)));
        }

        let result = if self.command.uses("output") {
            std::fs::read(output_file.path())?
        } else {
            output.stdout
        };

        let document = XmlDocument::parse(&result)?;
        if document.root_element().is_none() {
            return Err(TransformEngineError::Runtime(
                "transform produced no document element".to_string(),
            ));
        }
        Ok(document)
    }
}
