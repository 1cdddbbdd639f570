//! A scripted in-memory executor for tests.
//!
//! Commands are matched against substring rules registered up front;
//! unmatched commands succeed with empty output. Every call is recorded
//! so tests can assert on ordering and targets.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::executor::{CommandOutput, ExecError, ExecResult, Executor, Host};

/// One recorded executor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run { host: String, command: String },
    Copy { host: String, local: PathBuf, remote: PathBuf },
}

struct Rule {
    pattern: String,
    /// Responses consumed in order; the last one repeats.
    responses: VecDeque<CommandOutput>,
}

/// Scripted [`Executor`] implementation.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
    fail_copies_to: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` return `output`.
    pub fn on(&self, pattern: &str, output: CommandOutput) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            responses: VecDeque::from([output]),
        });
    }

    /// Commands containing `pattern` fail with the given status.
    pub fn fail_on(&self, pattern: &str, status: i32) {
        self.on(
            pattern,
            CommandOutput {
                status,
                stdout: String::new(),
                stderr: format!("scripted failure for `{pattern}`"),
            },
        );
    }

    /// Commands containing `pattern` succeed and print `stdout`.
    pub fn stdout_on(&self, pattern: &str, stdout: &str) {
        self.on(
            pattern,
            CommandOutput {
                status: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    /// Commands containing `pattern` walk through `responses` in order,
    /// repeating the last one once exhausted.
    pub fn on_sequence(&self, pattern: &str, responses: Vec<CommandOutput>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
    }

    /// Copies to the given host fail.
    pub fn fail_copy_to(&self, host: &str) {
        self.fail_copies_to.lock().unwrap().push(host.to_string());
    }

    /// Everything recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded run commands, as `host: command` lines.
    pub fn run_log(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Run { host, command } => Some(format!("{host}: {command}")),
                Call::Copy { .. } => None,
            })
            .collect()
    }

    fn respond(&self, command: &str) -> CommandOutput {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if command.contains(&rule.pattern) {
                return if rule.responses.len() > 1 {
                    rule.responses.pop_front().unwrap()
                } else {
                    rule.responses.front().cloned().unwrap_or(CommandOutput::ok())
                };
            }
        }
        CommandOutput::ok()
    }
}

impl Executor for ScriptedExecutor {
    async fn run(&self, host: &Host, command: &str) -> ExecResult<CommandOutput> {
        self.calls.lock().unwrap().push(Call::Run {
            host: host.to_string(),
            command: command.to_string(),
        });
        Ok(self.respond(command))
    }

    async fn run_inherited(&self, host: &Host, command: &str) -> ExecResult<i32> {
        let out = self.run(host, command).await?;
        Ok(out.status)
    }

    async fn copy(&self, host: &Host, local: &Path, remote: &Path) -> ExecResult<()> {
        self.calls.lock().unwrap().push(Call::Copy {
            host: host.to_string(),
            local: local.to_path_buf(),
            remote: remote.to_path_buf(),
        });
        if self
            .fail_copies_to
            .lock()
            .unwrap()
            .iter()
            .any(|h| host.to_string() == *h)
        {
            return Err(ExecError::Copy {
                host: host.to_string(),
                detail: "scripted copy failure".to_string(),
            });
        }
        Ok(())
    }
}
