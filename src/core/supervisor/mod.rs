// ─── Process Supervisor ───
// Launches the server, waits for its readiness marker, records the PID and
// later terminates the process through that record. Start and stop usually
// run in separate invocations; the PID record is their only shared state.

mod output;
mod pid;
mod record;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::core::error::{ProvisionError, ProvisionResult};

pub use output::OutputBuffer;
pub use pid::extract_pid;
pub use record::{ProcessRecord, PID_FILE_NAME};

pub const DEFAULT_READINESS_MARKER: &str = "HTTP server is up and listening";
pub const DEFAULT_MAX_WAIT_CYCLES: u32 = 20;
pub const DEFAULT_SLEEP_MILLIS: u64 = 500;

/// Combined stdout/stderr of the started server, next to the PID record.
pub const LOG_FILE_NAME: &str = "event-store.log";

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `[program, args...]`; `None` for an empty list.
    pub fn from_parts(parts: &[String]) -> Option<Self> {
        let (program, args) = parts.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn with_arg(&self, arg: impl Into<String>) -> Self {
        let mut spec = self.clone();
        spec.args.push(arg.into());
        spec
    }
}

/// How long and for what to wait after launching the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub marker: String,
    pub max_wait_cycles: u32,
    pub poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            marker: DEFAULT_READINESS_MARKER.to_string(),
            max_wait_cycles: DEFAULT_MAX_WAIT_CYCLES,
            poll_interval: Duration::from_millis(DEFAULT_SLEEP_MILLIS),
        }
    }
}

/// Server that reported readiness and whose PID has been recorded.
#[derive(Debug, Clone)]
pub struct StartedServer {
    pub pid: String,
    pub output: Vec<String>,
    pub log_file: PathBuf,
}

/// Exit status and combined output of a command run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub lines: Vec<String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Start/stop control over a single server per working directory.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    install_dir: PathBuf,
    record_dir: PathBuf,
    record: ProcessRecord,
    readiness: ReadinessPolicy,
}

impl ProcessSupervisor {
    /// Commands run in `install_dir`; the PID record and server log live in `record_dir`.
    pub fn new(install_dir: &Path, record_dir: &Path, readiness: ReadinessPolicy) -> Self {
        Self {
            install_dir: install_dir.to_path_buf(),
            record_dir: record_dir.to_path_buf(),
            record: ProcessRecord::in_dir(record_dir),
            readiness,
        }
    }

    pub fn record(&self) -> &ProcessRecord {
        &self.record
    }

    /// Launch the server and wait until its output contains the readiness marker.
    ///
    /// stdout and stderr both go to [`LOG_FILE_NAME`] next to the process
    /// record, so the server keeps a valid output target after this process
    /// exits. The log is re-read into an [`OutputBuffer`] on every poll
    /// cycle. On success the PID from the first output line is written to the
    /// process record and the child keeps running after this returns. Any
    /// failure after the launch kills the child and logs its output.
    #[instrument(skip(self), fields(install_dir = ?self.install_dir))]
    pub async fn start(&self, command: &CommandSpec) -> ProvisionResult<StartedServer> {
        let program = resolve_program(&self.install_dir, &command.program);
        make_owner_executable(&self.install_dir, &program)?;

        let log_path = self.log_path();
        let log_err = |source| ProvisionError::Io {
            path: log_path.clone(),
            source,
        };
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ProvisionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let log = File::create(&log_path).map_err(log_err)?;
        let log_for_stderr = log.try_clone().map_err(log_err)?;

        let mut cmd = Command::new(&program);
        cmd.args(&command.args)
            .current_dir(&self.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_for_stderr));

        info!("Launching {:?} {:?}, output in {:?}", program, command.args, log_path);
        let child = cmd.spawn().map_err(|source| ProvisionError::LaunchFailed {
            program: program.to_string_lossy().to_string(),
            source,
        })?;

        let output = OutputBuffer::new();
        let started = self
            .await_readiness(&log_path, &output)
            .await
            .and_then(|lines| self.record_pid(&lines).map(|pid| (pid, lines)));

        match started {
            Ok((pid, lines)) => Ok(StartedServer {
                pid,
                output: lines,
                log_file: log_path,
            }),
            Err(err) => Err(abort_start(child, &output, &log_path, err).await),
        }
    }

    /// Poll the server log until the marker shows up or the cycle budget runs out.
    async fn await_readiness(
        &self,
        log_path: &Path,
        output: &OutputBuffer,
    ) -> ProvisionResult<Vec<String>> {
        let mut cycles = 0;
        loop {
            output.reload(log_path)?;
            if output.contains(&self.readiness.marker) {
                return Ok(output.lines());
            }
            if cycles >= self.readiness.max_wait_cycles {
                return Err(ProvisionError::StartupTimeout {
                    waited_ms: self.readiness.poll_interval.as_millis() as u64
                        * u64::from(cycles),
                    output: Vec::new(),
                });
            }
            tokio::time::sleep(self.readiness.poll_interval).await;
            cycles += 1;
        }
    }

    fn record_pid(&self, lines: &[String]) -> ProvisionResult<String> {
        log_lines_debug(lines);
        let pid = extract_pid(lines)?;
        info!("Event store process ID: {}", pid);
        self.record.write(&pid)?;
        Ok(pid)
    }

    /// Server output of the most recent start.
    pub fn log_path(&self) -> PathBuf {
        self.record_dir.join(LOG_FILE_NAME)
    }

    /// Terminate the recorded server with `termination` (the PID is appended
    /// as last argument) and remove the record.
    #[instrument(skip(self), fields(record = ?self.record.path()))]
    pub async fn stop(&self, termination: &CommandSpec) -> ProvisionResult<CommandOutcome> {
        let pid = self.record.read()?;
        let outcome = run_to_completion(&self.install_dir, &termination.with_arg(pid)).await?;

        if !outcome.success() {
            log_lines_error(&outcome.lines);
            return Err(ProvisionError::TerminationFailed {
                code: outcome.exit_code,
                output: outcome.lines,
            });
        }

        log_lines_debug(&outcome.lines);
        self.record.delete()?;
        info!("Event store successfully stopped");
        Ok(outcome)
    }

    /// Run a one-shot command in the install directory, capturing its output.
    pub async fn run_in_install_dir(&self, command: &CommandSpec) -> ProvisionResult<CommandOutcome> {
        run_to_completion(&self.install_dir, command).await
    }
}

/// Kill a child whose start failed and log everything it wrote at error level.
/// Returns `err` with the output attached where the variant carries it.
async fn abort_start(
    mut child: Child,
    output: &OutputBuffer,
    log_path: &Path,
    err: ProvisionError,
) -> ProvisionError {
    let pid = child.id();
    match child.kill() {
        Ok(()) => match tokio::task::spawn_blocking(move || child.wait()).await {
            Ok(Ok(status)) => debug!("Server process {} ended: {}", pid, status),
            Ok(Err(e)) => warn!("Failed to reap server process {}: {}", pid, e),
            Err(e) => warn!("Failed to reap server process {}: {}", pid, e),
        },
        Err(e) => warn!("Failed to kill server process {}: {}", pid, e),
    }

    if let Err(e) = output.reload(log_path) {
        warn!("Keeping output read before the failure: {}", e);
    }
    let lines = output.lines();
    log_lines_error(&lines);
    err.with_output(lines)
}

/// Spawn `command` in `dir`, wait for it and collect stdout and stderr.
pub async fn run_to_completion(
    dir: &Path,
    command: &CommandSpec,
) -> ProvisionResult<CommandOutcome> {
    let program = resolve_program(dir, &command.program);
    debug!("Running {:?} {:?} in {:?}", program, command.args, dir);

    let mut child = Command::new(&program)
        .args(&command.args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProvisionError::LaunchFailed {
            program: program.to_string_lossy().to_string(),
            source,
        })?;

    let output = OutputBuffer::new();
    let readers: Vec<_> = [
        child.stdout.take().map(|s| output.capture(s)),
        child.stderr.take().map(|s| output.capture(s)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let status = tokio::task::spawn_blocking(move || child.wait())
        .await?
        .map_err(|source| ProvisionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    for reader in readers {
        reader.await?;
    }

    Ok(CommandOutcome {
        exit_code: status.code(),
        lines: output.lines(),
    })
}

/// Relative programs with a path component (`./run-node.sh`, `bin/server`)
/// resolve against `dir`; bare names are left for `PATH` lookup.
fn resolve_program(dir: &Path, program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Owner-executable bit for a start script shipped inside the install directory.
#[cfg(unix)]
fn make_owner_executable(install_dir: &Path, program: &Path) -> ProvisionResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if !program.starts_with(install_dir) || !program.is_file() {
        return Ok(());
    }
    let io_err = |source| ProvisionError::Io {
        path: program.to_path_buf(),
        source,
    };
    let mut permissions = std::fs::metadata(program).map_err(io_err)?.permissions();
    permissions.set_mode(permissions.mode() | 0o100);
    std::fs::set_permissions(program, permissions).map_err(io_err)
}

#[cfg(not(unix))]
fn make_owner_executable(_install_dir: &Path, _program: &Path) -> ProvisionResult<()> {
    Ok(())
}

fn log_lines_debug(lines: &[String]) {
    for line in lines {
        debug!("{}", line);
    }
}

fn log_lines_error(lines: &[String]) {
    for line in lines {
        error!("{}", line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn fast_policy(max_wait_cycles: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            max_wait_cycles,
            poll_interval: Duration::from_millis(100),
            ..ReadinessPolicy::default()
        }
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", vec!["-c".into(), script.into()])
    }

    fn kill() -> CommandSpec {
        CommandSpec::new("kill", vec![])
    }

    fn is_running(pid: &str) -> bool {
        Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success()
    }

    fn child_pid(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("child.pid"))
            .unwrap()
            .trim()
            .to_string()
    }

    #[tokio::test]
    async fn start_records_pid_and_stop_removes_it() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), fast_policy(50));

        let started = supervisor
            .start(&sh(
                "echo \"[$$,10,12:47:52.297] HTTP server is up and listening\"; exec sleep 30",
            ))
            .await
            .unwrap();

        assert!(started.pid.parse::<u32>().is_ok());
        assert_eq!(supervisor.record().read().unwrap(), started.pid);
        assert_eq!(started.log_file, tmp.path().join("event-store.log"));
        assert!(std::fs::read_to_string(&started.log_file)
            .unwrap()
            .contains("HTTP server is up and listening"));

        let outcome = supervisor.stop(&kill()).await.unwrap();
        assert!(outcome.success());
        assert!(!supervisor.record().exists());
    }

    #[tokio::test]
    async fn readiness_marker_on_stderr_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), fast_policy(50));

        let started = supervisor
            .start(&sh(
                "echo \"[$$,1,00:00:00.000] HTTP server is up and listening\" >&2; exec sleep 30",
            ))
            .await
            .unwrap();

        supervisor.stop(&kill()).await.unwrap();
        assert!(!started.output.is_empty());
    }

    #[tokio::test]
    async fn timeout_carries_output_and_writes_no_record() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), fast_policy(3));

        let err = supervisor
            .start(&sh("echo still booting; exec sleep 30"))
            .await
            .unwrap_err();

        match err {
            ProvisionError::StartupTimeout { waited_ms, output } => {
                assert_eq!(waited_ms, 300);
                assert_eq!(output, ["still booting"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!supervisor.record().exists());
    }

    #[tokio::test]
    async fn ready_without_pid_prefix_is_pid_format_error() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), fast_policy(50));

        let err = supervisor
            .start(&sh(
                "echo $$ > child.pid; echo booting without pid prefix; \
                 echo HTTP server is up and listening; exec sleep 30",
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::PidFormat { .. }));
        assert_eq!(
            err.captured_output(),
            ["booting without pid prefix", "HTTP server is up and listening"]
        );
        assert!(!supervisor.record().exists());
        assert!(!is_running(&child_pid(tmp.path())));
    }

    #[tokio::test]
    async fn losing_the_log_while_waiting_kills_the_server() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), fast_policy(50));

        let err = supervisor
            .start(&sh(
                "echo $$ > child.pid; echo booting; sleep 0.3; rm event-store.log; exec sleep 30",
            ))
            .await
            .unwrap_err();

        match &err {
            ProvisionError::Io { path, .. } => assert_eq!(path, &supervisor.log_path()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!supervisor.record().exists());
        assert!(!is_running(&child_pid(tmp.path())));
    }

    #[tokio::test]
    async fn timed_out_server_is_killed() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), fast_policy(2));

        let err = supervisor
            .start(&sh("echo $$ > child.pid; exec sleep 30"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::StartupTimeout { .. }));
        assert!(!is_running(&child_pid(tmp.path())));
    }

    #[tokio::test]
    async fn start_script_in_install_dir_is_made_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("run-node.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"[$$,10,12:00:00.000] $1 HTTP server is up and listening\"\nexec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), fast_policy(50));
        let started = supervisor
            .start(&CommandSpec::new("./run-node.sh", vec!["--mem-db=TRUE".into()]))
            .await
            .unwrap();

        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o100, 0o100);
        assert!(started.output[0].contains("--mem-db=TRUE"));

        supervisor.stop(&kill()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run_to_completion(
            tmp.path(),
            &CommandSpec::new("./does-not-exist.sh", vec![]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProvisionError::LaunchFailed { .. }));
    }

    #[tokio::test]
    async fn stop_without_record_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), ReadinessPolicy::default());
        assert!(matches!(
            supervisor.stop(&kill()).await,
            Err(ProvisionError::NoPidRecorded { .. })
        ));
    }

    #[tokio::test]
    async fn failing_termination_keeps_record() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(tmp.path(), tmp.path(), ReadinessPolicy::default());
        supervisor.record().write("4711").unwrap();

        let err = supervisor
            .stop(&sh("echo \"no such process: $0\" >&2; exit 3"))
            .await
            .unwrap_err();

        match err {
            ProvisionError::TerminationFailed { code, output } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, ["no such process: 4711"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(supervisor.record().exists());
    }

    #[tokio::test]
    async fn run_to_completion_collects_output() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = run_to_completion(tmp.path(), &sh("echo one; echo two"))
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.lines, ["one", "two"]);
    }

    #[test]
    fn program_resolution() {
        let dir = Path::new("/opt/es");
        assert_eq!(resolve_program(dir, "./run-node.sh"), dir.join("./run-node.sh"));
        assert_eq!(resolve_program(dir, "bin/server"), dir.join("bin/server"));
        assert_eq!(resolve_program(dir, "kill"), PathBuf::from("kill"));
        assert_eq!(resolve_program(dir, "/bin/kill"), PathBuf::from("/bin/kill"));
    }
}
