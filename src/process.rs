//! Centralized command execution with consistent error handling.
//!
//! Every external tool the pipeline depends on goes through [`Cmd`]. The
//! actual process spawning sits behind [`CommandRunner`] so that tests can
//! script tool output without touching real devices.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{FlashError, Result};
use crate::events::EventSink;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code, or -1 if terminated by signal.
    pub code: i32,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    pub fn new(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    envs: BTreeMap<String, String>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// If true, inherit stdio instead of capturing.
    stream: bool,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            envs: BTreeMap::new(),
            allow_fail: false,
            stream: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Inherit stdio so the operator sees the tool's own progress output.
    pub fn stream_output(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn envs(&self) -> &BTreeMap<String, String> {
        &self.envs
    }

    pub fn is_checked(&self) -> bool {
        !self.allow_fail
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Run through `host`, logging the invocation first.
    ///
    /// A non-zero exit is [`FlashError::CommandFailed`] unless
    /// [`allow_fail`](Self::allow_fail) was set.
    pub fn run(self, host: Host<'_>) -> Result<CommandResult> {
        host.sink.info("process", format!("Running command: {}", self));

        let result = host.runner.execute(&self)?;

        if !self.allow_fail && !result.success() {
            let stderr = result.stderr_trimmed();
            host.sink.error(
                "process",
                format!("Command failed: {}: {}", self.program, stderr),
            );
            return Err(FlashError::CommandFailed {
                program: self.program,
                args: self.args,
                code: result.code,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Executes a prepared [`Cmd`].
///
/// Implementations only report what the process did; the check policy and
/// audit logging live in [`Cmd::run`].
pub trait CommandRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult>;
}

/// Runs commands on the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        command.envs(&cmd.envs);

        if let Some(ref dir) = cmd.current_dir {
            command.current_dir(dir);
        }

        let spawn_err = |source| FlashError::Spawn {
            program: cmd.program.clone(),
            source,
        };

        if cmd.stream {
            command.stdin(Stdio::inherit());
            command.stdout(Stdio::inherit());
            command.stderr(Stdio::inherit());
            let status = command.status().map_err(spawn_err)?;
            return Ok(CommandResult::new(status.code().unwrap_or(-1), "", ""));
        }

        let output = command.output().map_err(spawn_err)?;
        Ok(CommandResult {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The runner and event sink a component works against.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub runner: &'a dyn CommandRunner,
    pub sink: &'a dyn EventSink,
}

impl<'a> Host<'a> {
    pub fn new(runner: &'a dyn CommandRunner, sink: &'a dyn EventSink) -> Self {
        Self { runner, sink }
    }

    /// Run a checked command with arguments. Fails with stderr on error.
    pub fn run<I, S>(&self, program: &str, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Cmd::new(program).args(args).run(*self)
    }

    /// Run a command and hand back whatever it returned, whatever the exit code.
    pub fn run_unchecked<I, S>(&self, program: &str, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Cmd::new(program).args(args).allow_fail().run(*self)
    }

    /// Flush filesystem buffers.
    pub fn sync(&self) -> Result<()> {
        self.run("sync", [] as [&str; 0]).map(|_| ())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Level, MemorySink};

    fn host<'a>(sink: &'a MemorySink) -> Host<'a> {
        Host::new(&SystemRunner, sink)
    }

    #[test]
    fn test_run_success() {
        let sink = MemorySink::new();
        let result = host(&sink).run("echo", ["hello"]).unwrap();
        assert!(result.success());
        assert_eq!(result.stdout_trimmed(), "hello");
    }

    #[test]
    fn test_every_invocation_is_logged() {
        let sink = MemorySink::new();
        host(&sink).run("echo", ["audit", "me"]).unwrap();
        assert!(sink.contains(Level::Info, "Running command: echo audit me"));
    }

    #[test]
    fn test_run_captures_stderr() {
        let sink = MemorySink::new();
        let result = host(&sink)
            .run_unchecked("ls", ["/nonexistent_path_12345"])
            .unwrap();

        assert!(!result.success());
        assert!(!result.stderr.is_empty());
        assert!(sink.messages_at(Level::Error).is_empty());
    }

    #[test]
    fn test_run_failure_is_command_failed() {
        let sink = MemorySink::new();
        let err = host(&sink)
            .run("ls", ["/nonexistent_path_12345"])
            .unwrap_err();

        match err {
            FlashError::CommandFailed {
                program, stderr, ..
            } => {
                assert_eq!(program, "ls");
                assert!(stderr.contains("No such file") || stderr.contains("cannot access"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
        assert!(sink.contains(Level::Error, "Command failed: ls"));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let sink = MemorySink::new();
        let err = host(&sink)
            .run("nonexistent_program_12345", [] as [&str; 0])
            .unwrap_err();
        assert!(matches!(err, FlashError::Spawn { .. }));
        assert!(err.to_string().contains("Is it installed?"));
    }

    #[test]
    fn test_cmd_builder_chaining() {
        let sink = MemorySink::new();
        let result = Cmd::new("echo")
            .arg("hello")
            .arg("world")
            .run(host(&sink))
            .unwrap();

        assert_eq!(result.stdout_trimmed(), "hello world");
    }

    #[test]
    fn test_allow_fail() {
        let sink = MemorySink::new();
        let result = Cmd::new("false").allow_fail().run(host(&sink)).unwrap();

        assert!(!result.success());
        assert_eq!(result.code(), 1);
    }

    #[test]
    fn test_run_in_directory_with_env() {
        let sink = MemorySink::new();
        let result = Cmd::new("sh")
            .args(["-c", "pwd; echo $USBFREEDOM_TEST_VAR"])
            .dir(Path::new("/tmp"))
            .env("USBFREEDOM_TEST_VAR", "test-value")
            .run(host(&sink))
            .unwrap();
        assert!(result.stdout.contains("tmp"));
        assert!(result.stdout.contains("test-value"));
    }

    #[test]
    fn test_display_and_argv() {
        let cmd = Cmd::new("parted").args(["-s", "/dev/sdb", "mklabel", "gpt"]);
        assert_eq!(cmd.to_string(), "parted -s /dev/sdb mklabel gpt");
        assert_eq!(cmd.argv(), vec!["parted", "-s", "/dev/sdb", "mklabel", "gpt"]);
        assert!(cmd.is_checked());
        assert!(!cmd.clone().allow_fail().is_checked());
    }
}
