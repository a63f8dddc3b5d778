//! Layout renderer backed by an external FO processor.

use std::path::Path;

use super::LayoutRenderer;
use crate::command::{describe_failure, CommandSpec};
use crate::error::RenderError;

/// Renders XSL-FO through a command such as `fop`.
///
/// The command line may reference `{input}` and `{output}`. Without
/// `{output}` the artifact is taken from stdout.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    command: CommandSpec,
}

impl CommandRenderer {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

impl LayoutRenderer for CommandRenderer {
    fn render(&self, layout_path: &Path, output_path: &Path) -> Result<(), RenderError> {
        let output = self
            .command
            .run(&[("input", layout_path), ("output", output_path)])?;
        if !output.status.success() {
            return Err(RenderError::Engine(describe_failure(&output)));
        }

        if !self.command.uses("output") {
            std::fs::write(output_path, &output.stdout)?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_render_to_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("layout.fo");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, "<fo:root/>").unwrap();

        let renderer = CommandRenderer::new(CommandSpec::new(
            "sh",
            ["-c", "cp \"$1\" \"$2\"", "sh", "{input}", "{output}"],
        ));
        renderer.render(&input, &output).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "<fo:root/>");
    }

    #[test]
    fn test_render_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("layout.fo");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, "<fo:root/>").unwrap();

        let renderer = CommandRenderer::new(CommandSpec::new("cat", ["{input}"]));
        renderer.render(&input, &output).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "<fo:root/>");
    }

    #[test]
    fn test_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new(CommandSpec::new("sh", ["-c", "echo font missing >&2; exit 2"]));

        let err = renderer
            .render(&dir.path().join("in.fo"), &dir.path().join("out.pdf"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Engine(msg) if msg.contains("font missing")));
    }

    #[test]
    fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new(CommandSpec::new("einvoice-no-such-renderer", ["{input}"]));

        let err = renderer
            .render(&dir.path().join("in.fo"), &dir.path().join("out.pdf"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
