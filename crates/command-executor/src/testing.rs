//! A scripted runner for tests
//!
//! [`ScriptedRunner`] never spawns anything. It records every command it is
//! asked to run and answers from a list of rules matched against the rendered
//! command line. Commands matching no rule succeed with empty output.
//! Output files of tools such as `openssl` can be emulated with
//! [`ScriptedRunner::creates_outputs`].

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Mutex;

use crate::command::Command;
use crate::error::Result;
use crate::process::Output;
use crate::runner::CommandRunner;

struct Rule {
    pattern: String,
    output: Output,
}

struct Effect {
    pattern: String,
    flags: Vec<String>,
}

/// Records commands and replies with scripted outcomes
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    effects: Mutex<Vec<Effect>>,
    history: Mutex<Vec<Command>>,
}

impl ScriptedRunner {
    /// Create a runner where every command succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `code` and `stdout` to commands whose line contains `pattern`
    ///
    /// Rules registered later take precedence over earlier ones.
    pub fn respond(&self, pattern: impl Into<String>, code: i32, stdout: impl Into<String>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.into(),
            output: Output::with_code(code, stdout),
        });
    }

    /// Make commands whose line contains `pattern` exit with status 1
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.respond(pattern, 1, "");
    }

    /// When a command containing `pattern` succeeds, create the file named by
    /// the argument following each of `flags`
    ///
    /// Existing files are left untouched.
    pub fn creates_outputs(&self, pattern: impl Into<String>, flags: &[&str]) {
        self.effects.lock().unwrap().push(Effect {
            pattern: pattern.into(),
            flags: flags.iter().map(|flag| flag.to_string()).collect(),
        });
    }

    fn apply_effects(&self, command: &Command, line: &str) {
        let effects = self.effects.lock().unwrap();
        for effect in effects.iter().filter(|effect| line.contains(&effect.pattern)) {
            for pair in command.get_args().windows(2) {
                if effect.flags.iter().any(|flag| pair[0].as_os_str() == OsStr::new(flag)) {
                    touch(Path::new(&pair[1]));
                }
            }
        }
    }

    /// Every command run so far, in order
    pub fn history(&self) -> Vec<Command> {
        self.history.lock().unwrap().clone()
    }

    /// Every command line run so far, in order
    pub fn lines(&self) -> Vec<String> {
        self.history().iter().map(ToString::to_string).collect()
    }

    /// Whether some recorded command line contains `pattern`
    pub fn ran(&self, pattern: &str) -> bool {
        self.lines().iter().any(|line| line.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn output(&self, command: &Command) -> Result<Output> {
        self.history.lock().unwrap().push(command.clone());
        let line = command.to_string();
        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .rev()
            .find(|rule| line.contains(&rule.pattern))
            .map(|rule| rule.output.clone())
            .unwrap_or_else(|| Output::with_code(0, ""));
        drop(rules);
        if output.status.success() {
            self.apply_effects(command, &line);
        }
        Ok(output)
    }
}

fn touch(path: &Path) {
    if path.exists() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, "");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_scripted_outcomes() {
        let runner = ScriptedRunner::new();
        runner.fail_on("openssl");
        runner.respond("hostname -d", 0, "example.org\n");

        let ok = Command::builder("update-ca-certificates").build();
        assert!(runner.status(&ok).await.unwrap().success());

        let bad = Command::builder("openssl").arg("req").build();
        assert_eq!(runner.status(&bad).await.unwrap().code, Some(1));

        let host = Command::builder("hostname").arg("-d").build();
        assert_eq!(runner.output(&host).await.unwrap().stdout, "example.org\n");

        assert_eq!(
            runner.lines(),
            vec!["update-ca-certificates", "openssl req", "hostname -d"]
        );
        assert!(runner.ran("openssl"));
    }

    #[smol_potat::test]
    async fn test_creates_outputs_on_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let key = dir.path().join("certs/key.pem");
        let crt = dir.path().join("certs/crt.pem");
        std::fs::create_dir_all(dir.path().join("certs")).unwrap();
        std::fs::write(&crt, "kept").unwrap();

        let runner = ScriptedRunner::new();
        runner.creates_outputs("openssl", &["-out", "-keyout"]);
        let req = Command::builder("openssl")
            .args(["req", "-new", "-keyout"])
            .arg(&key)
            .arg("-out")
            .arg(&crt)
            .build();
        runner.output(&req).await.unwrap();

        assert!(key.is_file());
        assert_eq!(std::fs::read_to_string(&crt).unwrap(), "kept");

        let csr = dir.path().join("csr.pem");
        runner.fail_on("openssl");
        let failing = Command::builder("openssl").arg("-out").arg(&csr).build();
        runner.output(&failing).await.unwrap();
        assert!(!csr.exists());
    }

    #[smol_potat::test]
    async fn test_later_rules_win() {
        let runner = ScriptedRunner::new();
        runner.fail_on("service");
        runner.respond("service nginx", 0, "");

        let nginx = Command::builder("service").args(["nginx", "restart"]).build();
        let postfix = Command::builder("service").args(["postfix", "restart"]).build();
        assert!(runner.status(&nginx).await.unwrap().success());
        assert!(!runner.status(&postfix).await.unwrap().success());
    }
}
