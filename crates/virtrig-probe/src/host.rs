use crate::ProbeError;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Blocking external-command executor with a per-invocation timeout.
///
/// Every invocation starts from the configured working directory, so probes
/// can assume a fixed root no matter what a test did to the environment.
/// On timeout the child is killed best-effort and the call returns
/// `ProbeError::Timeout`; the harness proceeds even if the underlying
/// process lingers.
#[derive(Debug, Clone)]
pub struct HostRunner {
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl Default for HostRunner {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: Duration::from_secs(1200),
        }
    }
}

impl HostRunner {
    pub fn new(cwd: Option<PathBuf>, timeout: Duration) -> Self {
        Self { cwd, timeout }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            cwd: self.cwd.clone(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a program with arguments, capturing stdout and stderr.
    /// A non-zero exit is not an error at this level; see `run_checked`.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProbeError> {
        let mut command = Command::new(program);
        command.args(args);
        self.execute(command, &display_command(program, args))
    }

    /// Run a shell command line (`sh -c`), used for configured command
    /// templates like the suite run command.
    pub fn run_shell(&self, command_line: &str) -> Result<CommandOutput, ProbeError> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        self.execute(command, command_line)
    }

    /// Like `run`, but a non-zero exit becomes `ProbeError::CommandFailed`.
    /// Returns stdout on success.
    pub fn run_checked(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        let rendered = display_command(program, args);
        let output = self.run(program, args)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ProbeError::CommandFailed {
                command: rendered,
                status: output.status,
                stderr: output.stderr,
            })
        }
    }

    fn execute(
        &self,
        mut command: Command,
        rendered: &str,
    ) -> Result<CommandOutput, ProbeError> {
        debug!("running: {rendered}");

        // Capture into unnamed temp files rather than pipes, so a chatty
        // child can never fill a pipe and deadlock the poll loop.
        let mut out_file = tempfile::tempfile()?;
        let mut err_file = tempfile::tempfile()?;

        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file.try_clone()?))
            .stderr(Stdio::from(err_file.try_clone()?));
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let start = Instant::now();
        let mut child = command.spawn()?;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProbeError::Timeout {
                    command: rendered.to_owned(),
                    secs: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        let duration = start.elapsed();

        let mut stdout = String::new();
        out_file.seek(SeekFrom::Start(0))?;
        out_file.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        err_file.seek(SeekFrom::Start(0))?;
        err_file.read_to_string(&mut stderr)?;

        Ok(CommandOutput {
            status: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration,
        })
    }
}

fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_owned()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
