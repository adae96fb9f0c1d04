//! Command execution abstraction.
//!
//! Every external process Zappy starts (package managers, `nginx`, `systemctl`,
//! `certbot`, `ufw`, `firewall-cmd`, ...) goes through the [`CommandExecutor`]
//! trait. Higher-level components never touch `std::process` directly; they
//! call a [`Runner`], which adds privilege escalation and command echoing on
//! top of an executor. Unit tests substitute a mock executor and assert on
//! the exact argv sequence.

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::ZappyError;
use crate::utils::shell_join;

#[cfg(test)]
use mockall::automock;

/// Binary used for privilege escalation.
pub const SUDO: &str = "sudo";

/// Poll interval while waiting on a command with a deadline.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Uniform result of an external process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if the process exited normally
    pub code: Option<i32>,
}

impl CommandResult {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    /// A failed result with the given stderr and exit code 1.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            code: Some(1),
        }
    }

    /// Convert a failed result into a [`ZappyError::CommandExecution`].
    pub fn check(self, command: &str) -> crate::error::Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let detail = if self.stderr.trim().is_empty() {
                match self.code {
                    Some(code) => format!("exit code {}", code),
                    None => "terminated by signal".to_string(),
                }
            } else {
                self.stderr.clone()
            };
            Err(ZappyError::command(command, &detail))
        }
    }

    /// stdout, or stderr when stdout is empty. Handy for status displays.
    pub fn output_text(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Trait for command execution, allowing dependency injection for testing.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute `cmd` with `args`, capturing stdout and stderr in full.
    ///
    /// A non-zero exit is reported through [`CommandResult::success`], not as
    /// an `Err`. `Err` means the process could not be started at all.
    /// With a `timeout`, the child is killed once the deadline passes.
    fn execute(
        &self,
        cmd: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandResult>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    fn wait_with_deadline(mut child: Child, timeout: Duration) -> Result<CommandResult> {
        // Drain both pipes on their own threads so a chatty child cannot
        // block on a full pipe while we poll for exit.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            thread::sleep(WAIT_POLL);
        };

        let stdout = join_reader(stdout_reader);
        let mut stderr = join_reader(stderr_reader);

        Ok(match status {
            Some(status) => CommandResult {
                stdout,
                stderr,
                success: status.success(),
                code: status.code(),
            },
            None => {
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("Command timed out after {}s", timeout.as_secs()));
                CommandResult {
                    stdout,
                    stderr,
                    success: false,
                    code: None,
                }
            }
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).to_string()
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(
        &self,
        cmd: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match timeout {
            None => {
                let output = command
                    .output()
                    .with_context(|| format!("Failed to execute {}", cmd))?;
                Ok(CommandResult {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    success: output.status.success(),
                    code: output.status.code(),
                })
            }
            Some(timeout) => {
                let child = command
                    .spawn()
                    .with_context(|| format!("Failed to execute {}", cmd))?;
                Self::wait_with_deadline(child, timeout)
            }
        }
    }
}

/// How elevated commands are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Already privileged (root), run commands as-is
    None,
    /// Prefix elevated commands with `sudo`
    Sudo,
}

impl Privilege {
    /// `None` when running as root, `Sudo` otherwise.
    pub fn detect() -> Self {
        if is_root() {
            Privilege::None
        } else {
            Privilege::Sudo
        }
    }
}

/// Check if running as root (effective UID == 0)
pub fn is_root() -> bool {
    // SAFETY: geteuid() has no preconditions, never fails and touches no state.
    unsafe { libc::geteuid() == 0 }
}

/// Fail unless the effective user is root.
pub fn check_root() -> Result<()> {
    if !is_root() {
        return Err(ZappyError::Permission(
            "This operation requires root privileges. Please run with sudo.".to_string(),
        )
        .into());
    }
    Ok(())
}

/// The single entry point for running external commands.
///
/// Cheap to clone; components keep their own copy.
#[derive(Clone)]
pub struct Runner {
    executor: Arc<dyn CommandExecutor>,
    privilege: Privilege,
    echo: bool,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("privilege", &self.privilege)
            .field("echo", &self.echo)
            .finish()
    }
}

impl Runner {
    pub fn new(executor: Arc<dyn CommandExecutor>, privilege: Privilege) -> Self {
        Self {
            executor,
            privilege,
            echo: false,
        }
    }

    /// Runner backed by real processes.
    pub fn system(privilege: Privilege) -> Self {
        Self::new(Arc::new(RealCommandExecutor::new()), privilege)
    }

    /// Log every invoked command at INFO instead of DEBUG.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Run `argv`, prefixing it with `sudo` when `elevated` and the runner is
    /// configured for sudo. Never retries, never times out.
    pub fn run(&self, argv: &[&str], elevated: bool) -> CommandResult {
        self.invoke(argv, elevated, None)
    }

    /// Same as [`Runner::run`] with an explicit deadline.
    pub fn run_with_timeout(&self, argv: &[&str], elevated: bool, timeout: Duration) -> CommandResult {
        self.invoke(argv, elevated, Some(timeout))
    }

    /// Run and turn a failure into [`ZappyError::CommandExecution`].
    pub fn run_checked(&self, argv: &[&str], elevated: bool) -> crate::error::Result<CommandResult> {
        self.run(argv, elevated).check(&shell_join(argv))
    }

    fn invoke(&self, argv: &[&str], elevated: bool, timeout: Option<Duration>) -> CommandResult {
        let Some((program, rest)) = argv.split_first() else {
            return CommandResult::failed("empty command");
        };

        let (cmd, args): (&str, Vec<String>) = if elevated && self.privilege == Privilege::Sudo {
            (SUDO, argv.iter().map(|s| s.to_string()).collect())
        } else {
            (*program, rest.iter().map(|s| s.to_string()).collect())
        };

        let mut shown = vec![cmd.to_string()];
        shown.extend(args.iter().cloned());
        let command_line = shell_join(&shown);
        if self.echo {
            info!("Running: {}", command_line);
        } else {
            debug!("Running: {}", command_line);
        }

        match self.executor.execute(cmd, &args, timeout) {
            Ok(result) => {
                if !result.success {
                    debug!(
                        "Command failed ({:?}): {}: {}",
                        result.code,
                        command_line,
                        result.stderr.trim()
                    );
                }
                result
            }
            Err(e) => CommandResult {
                stdout: String::new(),
                stderr: format!("{:#}", e),
                success: false,
                code: None,
            },
        }
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// mockall has issues with lifetimes in `&[&str]`, so the trait uses
/// `&[String]` and tests compare against this.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        let args = args_to_strings(&["arg1", "arg2", "arg3"]);
        assert_eq!(args, vec!["arg1", "arg2", "arg3"]);
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_command_result_default() {
        let output = CommandResult::default();
        assert!(output.stdout.is_empty());
        assert!(output.stderr.is_empty());
        assert!(!output.success);
        assert!(output.code.is_none());
    }

    #[test]
    fn test_command_result_check() {
        assert!(CommandResult::ok("fine").check("true").is_ok());

        let err = CommandResult::failed("boom").check("nginx -t").unwrap_err();
        assert_eq!(
            err,
            ZappyError::CommandExecution {
                command: "nginx -t".to_string(),
                stderr: "boom".to_string()
            }
        );

        let silent = CommandResult {
            code: Some(3),
            ..Default::default()
        };
        let err = silent.check("false").unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
    }

    #[test]
    fn test_output_text_prefers_stdout() {
        assert_eq!(CommandResult::ok("out").output_text(), "out");
        assert_eq!(CommandResult::failed("err").output_text(), "err");
    }

    #[test]
    fn test_real_executor_echo() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("echo", &args_to_strings(&["-n", "hello"]), None)
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.code, Some(0));
    }

    #[test]
    fn test_real_executor_failure_is_not_err() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("ls", &args_to_strings(&["--invalid-flag"]), None)
            .unwrap();
        assert!(!output.success);
        assert!(!output.stderr.is_empty());
    }

    #[test]
    fn test_real_executor_missing_binary_is_err() {
        let executor = RealCommandExecutor::new();
        let result = executor.execute("/nonexistent/zappy-test-binary", &[], None);
        assert!(result.is_err());
    }

    #[test]
    fn test_real_executor_timeout_kills_child() {
        let executor = RealCommandExecutor::new();
        let start = Instant::now();
        let output = executor
            .execute(
                "sleep",
                &args_to_strings(&["5"]),
                Some(Duration::from_millis(200)),
            )
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(!output.success);
        assert!(output.code.is_none());
        assert!(output.stderr.contains("timed out"));
    }

    #[test]
    fn test_real_executor_timeout_not_reached() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute(
                "echo",
                &args_to_strings(&["done"]),
                Some(Duration::from_secs(5)),
            )
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "done");
    }

    #[test]
    fn test_runner_prefixes_sudo_when_elevated() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args, timeout| {
                cmd == "sudo" && args == ["nginx".to_string(), "-t".to_string()] && timeout.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(CommandResult::ok("")));

        let runner = Runner::new(Arc::new(mock), Privilege::Sudo);
        assert!(runner.run(&["nginx", "-t"], true).success);
    }

    #[test]
    fn test_runner_no_prefix_when_not_elevated() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args, timeout| cmd == "nginx" && args == ["-v".to_string()] && timeout.is_none())
            .times(1)
            .returning(|_, _, _| Ok(CommandResult::ok("")));

        let runner = Runner::new(Arc::new(mock), Privilege::Sudo);
        assert!(runner.run(&["nginx", "-v"], false).success);
    }

    #[test]
    fn test_runner_no_prefix_when_root() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args, _| cmd == "systemctl" && args == args_to_strings(&["reload", "nginx"]).as_slice())
            .times(1)
            .returning(|_, _, _| Ok(CommandResult::ok("")));

        let runner = Runner::new(Arc::new(mock), Privilege::None);
        assert!(runner.run(&["systemctl", "reload", "nginx"], true).success);
    }

    #[test]
    fn test_runner_echo_runs_failing_command() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args, _| cmd == "sudo" && args == args_to_strings(&["ufw", "enable"]).as_slice())
            .times(1)
            .returning(|_, _, _| Ok(CommandResult::failed("ERROR: need root")));

        let runner = Runner::new(Arc::new(mock), Privilege::Sudo).with_echo(true);
        let result = runner.run(&["ufw", "enable"], true);
        assert!(!result.success);
        assert_eq!(result.stderr, "ERROR: need root");
    }

    #[test]
    fn test_runner_passes_timeout() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|_, _, timeout| *timeout == Some(Duration::from_secs(10)))
            .times(1)
            .returning(|_, _, _| Ok(CommandResult::ok("")));

        let runner = Runner::new(Arc::new(mock), Privilege::None);
        assert!(runner
            .run_with_timeout(&["ufw", "status"], true, Duration::from_secs(10))
            .success);
    }

    #[test]
    fn test_runner_spawn_error_becomes_failed_result() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _, _| Err(anyhow::anyhow!("Failed to execute certbot")));

        let runner = Runner::new(Arc::new(mock), Privilege::None);
        let result = runner.run(&["certbot", "renew"], true);
        assert!(!result.success);
        assert!(result.code.is_none());
        assert!(result.stderr.contains("certbot"));
    }

    #[test]
    fn test_runner_empty_argv() {
        let mock = MockCommandExecutor::new();
        let runner = Runner::new(Arc::new(mock), Privilege::None);
        let result = runner.run(&[], true);
        assert!(!result.success);
    }

    #[test]
    fn test_runner_run_checked() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _, _| Ok(CommandResult::failed("unit nginx.service not found")));

        let runner = Runner::new(Arc::new(mock), Privilege::None);
        let err = runner
            .run_checked(&["systemctl", "reload", "nginx"], true)
            .unwrap_err();
        match err {
            ZappyError::CommandExecution { command, stderr } => {
                assert_eq!(command, "systemctl reload nginx");
                assert!(stderr.contains("not found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
