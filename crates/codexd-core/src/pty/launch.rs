//! Launch configuration for the assistant CLI

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::host::LaunchSpec;

/// How the assistant is launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Executable name or path
    pub command: String,
    pub provider: String,
    /// Omitted from the command line when unset
    pub model: Option<String>,
    pub approval_mode: String,
    /// Inserted before the task text
    pub extra_args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    /// Added on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("TERM".to_string(), "xterm-256color".to_string());
        env.insert("FORCE_COLOR".to_string(), "1".to_string());

        Self {
            command: "codex".to_string(),
            provider: "openai".to_string(),
            model: None,
            approval_mode: "full-auto".to_string(),
            extra_args: Vec::new(),
            cwd: None,
            cols: 80,
            rows: 30,
            env,
        }
    }
}

impl LaunchConfig {
    /// Build the launch for one task; the task text is the final argument
    pub fn spec_for(&self, task: &str) -> LaunchSpec {
        let mut args = vec!["--provider".to_string(), self.provider.clone()];
        if let Some(model) = self.model.as_deref().filter(|m| !m.is_empty()) {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push("--approval-mode".to_string());
        args.push(self.approval_mode.clone());
        args.extend(self.extra_args.iter().cloned());
        args.push(task.to_string());

        LaunchSpec {
            program: self.command.clone(),
            args,
            cwd: self.cwd.clone(),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cols: self.cols,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_launch_args() {
        let spec = LaunchConfig::default().spec_for("fix the build");
        assert_eq!(spec.program, "codex");
        assert_eq!(
            spec.args,
            vec![
                "--provider",
                "openai",
                "--approval-mode",
                "full-auto",
                "fix the build"
            ]
        );
        assert_eq!((spec.cols, spec.rows), (80, 30));
        assert!(spec
            .env
            .contains(&("TERM".to_string(), "xterm-256color".to_string())));
        assert!(spec.env.contains(&("FORCE_COLOR".to_string(), "1".to_string())));
    }

    #[test]
    fn test_model_and_extra_args() {
        let config = LaunchConfig {
            model: Some("o4-mini".to_string()),
            extra_args: vec!["--quiet".to_string()],
            ..LaunchConfig::default()
        };
        let spec = config.spec_for("task");
        assert_eq!(
            spec.args,
            vec![
                "--provider",
                "openai",
                "--model",
                "o4-mini",
                "--approval-mode",
                "full-auto",
                "--quiet",
                "task"
            ]
        );

        let empty_model = LaunchConfig {
            model: Some(String::new()),
            ..LaunchConfig::default()
        };
        assert!(!empty_model.spec_for("t").args.contains(&"--model".to_string()));
    }

    #[test]
    fn test_task_text_is_single_argument() {
        let spec = LaunchConfig::default().spec_for("rename foo; rm -rf /");
        assert_eq!(spec.args.last().unwrap(), "rename foo; rm -rf /");
    }
}
