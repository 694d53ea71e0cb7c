use crate::error::{DebuggerError, DebuggerResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const START_OPTIONS: [&str; 5] = [
    "--quiet",
    "--no-save",
    "--no-restore",
    "--no-readline",
    "--interactive",
];

/// How to launch the interpreter for one debug session.
///
/// Field names follow the DAP `launch` arguments, so the same structure is
/// read straight from the request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    pub interpreter_path: PathBuf,
    #[serde(alias = "program")]
    pub script_path: PathBuf,
    /// Shell-quoted, passed to the script after `--args`.
    pub script_args: String,
    pub working_directory: Option<PathBuf>,
    pub envs: HashMap<String, String>,
    pub pass_parent_envs: bool,
    /// Sent before the top-level browser is entered.
    pub init_commands: Vec<String>,
    pub stop_on_entry: bool,
    pub stderr_settle_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            interpreter_path: PathBuf::from("R"),
            script_path: PathBuf::new(),
            script_args: String::new(),
            working_directory: None,
            envs: HashMap::new(),
            pass_parent_envs: true,
            init_commands: Vec::new(),
            stop_on_entry: true,
            stderr_settle_ms: 20,
        }
    }
}

impl RunConfig {
    pub fn for_script(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> DebuggerResult<()> {
        if is_blank(&self.interpreter_path) {
            return Err(DebuggerError::Config(
                "The R interpreter is not specified".to_string(),
            ));
        }
        if is_blank(&self.script_path) {
            return Err(DebuggerError::Config(
                "The R script is not specified".to_string(),
            ));
        }
        self.working_directory().map(|_| ())
    }

    /// Explicit directory if given, otherwise the script's parent.
    pub fn working_directory(&self) -> DebuggerResult<PathBuf> {
        if let Some(dir) = self.working_directory.as_ref().filter(|d| !is_blank(d)) {
            return Ok(dir.clone());
        }

        match self.script_path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Ok(PathBuf::from(".")),
            Some(parent) => Ok(parent.to_path_buf()),
            None => Err(DebuggerError::Config(
                "The working directory couldn't be calculated".to_string(),
            )),
        }
    }

    pub fn command_line(&self) -> DebuggerResult<(PathBuf, Vec<String>)> {
        self.validate()?;

        let mut args: Vec<String> = START_OPTIONS.iter().map(|s| s.to_string()).collect();
        let script_args = self.script_args.trim();
        if !script_args.is_empty() {
            let split = shlex::split(script_args).ok_or_else(|| {
                DebuggerError::Config(format!("Malformed script arguments: {script_args}"))
            })?;
            args.push("--args".to_string());
            args.extend(split);
        }

        Ok((self.interpreter_path.clone(), args))
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_launch_arguments() {
        let config: RunConfig = serde_json::from_value(json!({
            "program": "/work/analysis.R",
            "scriptArgs": "--input 'my data.csv'",
            "stopOnEntry": false
        }))
        .unwrap();

        assert_eq!(config.script_path, PathBuf::from("/work/analysis.R"));
        assert_eq!(config.interpreter_path, PathBuf::from("R"));
        assert!(!config.stop_on_entry);
        assert!(config.pass_parent_envs);
    }

    #[test]
    fn splits_script_args_after_marker() {
        let config = RunConfig {
            script_args: "--input 'my data.csv' -v".to_string(),
            ..RunConfig::for_script("/work/analysis.R")
        };
        let (program, args) = config.command_line().unwrap();

        assert_eq!(program, PathBuf::from("R"));
        let marker = args.iter().position(|a| a == "--args").unwrap();
        assert_eq!(&args[marker + 1..], ["--input", "my data.csv", "-v"]);
    }

    #[test]
    fn no_marker_without_script_args() {
        let (_, args) = RunConfig::for_script("a.R").command_line().unwrap();
        assert!(!args.iter().any(|a| a == "--args"));
        assert!(args.iter().any(|a| a == "--interactive"));
    }

    #[test]
    fn working_directory_defaults_to_script_parent() {
        let config = RunConfig::for_script("/work/project/main.R");
        assert_eq!(
            config.working_directory().unwrap(),
            PathBuf::from("/work/project")
        );

        let relative = RunConfig::for_script("main.R");
        assert_eq!(relative.working_directory().unwrap(), PathBuf::from("."));

        let explicit = RunConfig {
            working_directory: Some(PathBuf::from("/tmp")),
            ..config
        };
        assert_eq!(explicit.working_directory().unwrap(), PathBuf::from("/tmp"));
    }

    #[test]
    fn rejects_missing_pieces() {
        let missing_script = RunConfig::default();
        match missing_script.validate() {
            Err(DebuggerError::Config(msg)) => assert_eq!(msg, "The R script is not specified"),
            other => panic!("unexpected: {:?}", other),
        }

        let missing_interpreter = RunConfig {
            interpreter_path: PathBuf::from("  "),
            ..RunConfig::for_script("a.R")
        };
        match missing_interpreter.validate() {
            Err(DebuggerError::Config(msg)) => {
                assert_eq!(msg, "The R interpreter is not specified")
            }
            other => panic!("unexpected: {:?}", other),
        }

        let root = RunConfig::for_script("/");
        assert!(root.validate().is_err());
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        let config = RunConfig {
            script_args: "'unterminated".to_string(),
            ..RunConfig::for_script("a.R")
        };
        assert!(matches!(config.command_line(), Err(DebuggerError::Config(_))));
    }
}
