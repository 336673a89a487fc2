//! Command-line contract of the external separation tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Normalize a model selector: keep its first whitespace-separated token.
///
/// Returns `None` for an empty selector or the literal `default`, in which
/// case the tool picks its own model.
pub fn normalize_model(model: Option<&str>) -> Option<String> {
    let token = model?.split_whitespace().next()?;
    if token.eq_ignore_ascii_case("default") {
        return None;
    }
    Some(token.to_string())
}

/// Arguments and environment for one separator invocation.
#[derive(Debug, Clone)]
pub struct SeparatorCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, OsString)>,
}

impl SeparatorCommand {
    /// `<program> <input> --output_dir=<dir> [--model_filename=<model>]`
    pub fn new(program: &Path, input: &Path, output_dir: &Path, model: Option<&str>) -> Self {
        let mut args = vec![input.as_os_str().to_owned()];

        let mut out = OsString::from("--output_dir=");
        out.push(output_dir.as_os_str());
        args.push(out);

        if let Some(model) = model {
            args.push(OsString::from(format!("--model_filename={model}")));
        }

        Self {
            program: program.to_path_buf(),
            args,
            env: Vec::new(),
        }
    }

    /// Export the resolved companion binary to the child under `var`.
    pub fn with_companion(mut self, var: &str, companion: &Path) -> Self {
        self.env
            .push((var.to_string(), companion.as_os_str().to_owned()));
        self
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}
