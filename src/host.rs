/// Host command execution.
///
/// Adapter management and the inquiry fallback both drive the host's
/// Bluetooth tooling (`systemctl`, `service`, `hciconfig`, `hcitool`)
/// through the [`CommandRunner`] seam, so their parsing and retry logic
/// can be exercised with scripted output instead of a real radio.
use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CommandError;

/// Captured result of a finished host command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout (test and fake helper).
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a program to completion and captures its output.
///
/// A non-zero exit is *not* an error: callers inspect [`CommandOutput`]
/// because tools like `timeout` exit non-zero on the normal path.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the local host via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    detach: bool,
}

impl SystemRunner {
    /// Start every child in its own process group, so a terminal SIGINT
    /// aimed at this process does not reach it.
    pub fn detached() -> Self {
        Self { detach: true }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        log::debug!("exec: {} {}", program, args.join(" "));
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        #[cfg(unix)]
        if self.detach {
            command.process_group(0);
        }
        let output = command
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builds privileged invocations, optionally prefixed with `sudo`.
#[derive(Debug, Clone, Copy)]
pub struct Privilege {
    pub use_sudo: bool,
}

impl Privilege {
    /// Split a privileged command into `(program, args)`.
    pub fn command<'a>(&self, program: &'a str, args: &[&'a str]) -> (&'a str, Vec<&'a str>) {
        if self.use_sudo {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(program);
            full.extend_from_slice(args);
            ("sudo", full)
        } else {
            (program, args.to_vec())
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted runner shared by the adapter and scanner tests.
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Replies to commands from a script keyed by the full command line.
    /// Unscripted commands fail to spawn, like a missing binary would.
    #[derive(Default)]
    pub struct ScriptedRunner {
        replies: Mutex<HashMap<String, Vec<CommandOutput>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        /// Queue a reply. Repeated replies for one command are consumed in
        /// order; the last one sticks.
        pub fn reply(self, command_line: &str, output: CommandOutput) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(command_line.to_owned())
                .or_default()
                .push(output);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
            let line = if args.is_empty() {
                program.to_owned()
            } else {
                format!("{} {}", program, args.join(" "))
            };
            self.calls.lock().unwrap().push(line.clone());

            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&line) {
                Some(queue) if queue.len() > 1 => Ok(queue.remove(0)),
                Some(queue) if !queue.is_empty() => Ok(queue[0].clone()),
                _ => Err(CommandError::Spawn {
                    program: program.to_owned(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not scripted"),
                }),
            }
        }
    }
}
