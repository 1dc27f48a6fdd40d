/// Benchmark lifecycle: build the program, run it, capture its output, and
/// feed stdout through the parser.
///
/// Each stage completes before the next starts. Child processes are always
/// reaped, including after a build failure or a timeout kill.
use crate::config::{BenchmarkConfig, BuildConfig};
use crate::parser::{self, OrphanPolicy, ParseError, ParseReport};
use crate::schema::MetricSchema;
use crate::store::MetricsStore;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// How long to keep draining pipes after a timed-out child is killed.
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

/// Output captured from a finished child process.
#[derive(Debug)]
pub struct CapturedOutput {
    /// Process exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// The child was killed after exceeding the timeout.
    pub timed_out: bool,
}

/// Settings shared by every stage of one benchmark run.
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub build: &'a BuildConfig,
    pub workdir: &'a Path,
    pub output_dir: &'a Path,
    pub timeout: Option<Duration>,
    pub orphan_rows: OrphanPolicy,
    pub save_transcript: bool,
    /// Run an executable that is already built.
    pub skip_build: bool,
}

/// Parsed metrics from a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    pub store: MetricsStore,
    pub report: ParseReport,
    pub transcript: Option<PathBuf>,
}

/// Errors that stop a benchmark run.
#[derive(Debug)]
pub enum RunError {
    /// Failed to spawn the compiler or the benchmark.
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// Failed to read from the child's pipes or wait on it.
    Io { source: std::io::Error },
    /// The build exited non-zero.
    Build {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The benchmark exited non-zero. Its partial stdout was still parsed.
    Execution {
        exit_code: Option<i32>,
        stderr: String,
        partial_samples: usize,
        /// Why the partial output was rejected, if it was.
        partial_error: Option<ParseError>,
    },
    /// The benchmark was killed after `secs` seconds.
    Timeout {
        secs: u64,
        stderr: String,
        partial_samples: usize,
        partial_error: Option<ParseError>,
    },
    /// Failed to save the captured transcript.
    Transcript {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(ParseError),
}

impl RunError {
    /// Pipeline stage the error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::Build { .. } => "build",
            RunError::Spawn { .. } | RunError::Io { .. } => "process",
            RunError::Execution { .. } | RunError::Timeout { .. } => "execution",
            RunError::Transcript { .. } => "transcript",
            RunError::Parse(_) => "parse",
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Spawn { program, source } => {
                write!(f, "failed to spawn {program}: {source}")
            }
            RunError::Io { source } => write!(f, "I/O error while running child: {source}"),
            RunError::Build { exit_code, stderr } => {
                write!(f, "build failed ({})", describe_exit(*exit_code))?;
                write_diagnostics(f, stderr)
            }
            RunError::Execution {
                exit_code,
                stderr,
                partial_samples,
                partial_error,
            } => {
                write!(
                    f,
                    "benchmark failed ({}), {partial_samples} samples parsed before failure",
                    describe_exit(*exit_code)
                )?;
                write_partial_error(f, partial_error.as_ref())?;
                write_diagnostics(f, stderr)
            }
            RunError::Timeout {
                secs,
                stderr,
                partial_samples,
                partial_error,
            } => {
                write!(
                    f,
                    "benchmark timed out after {secs}s, {partial_samples} samples parsed before kill"
                )?;
                write_partial_error(f, partial_error.as_ref())?;
                write_diagnostics(f, stderr)
            }
            RunError::Transcript { path, source } => {
                write!(f, "failed to write transcript {}: {}", path.display(), source)
            }
            RunError::Parse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Spawn { source, .. } => Some(source),
            RunError::Io { source } => Some(source),
            RunError::Transcript { source, .. } => Some(source),
            RunError::Parse(e) => Some(e),
            RunError::Execution {
                partial_error: Some(e),
                ..
            }
            | RunError::Timeout {
                partial_error: Some(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

fn write_partial_error(
    f: &mut std::fmt::Formatter<'_>,
    error: Option<&ParseError>,
) -> std::fmt::Result {
    match error {
        Some(e) => write!(f, " (partial output rejected: {e})"),
        None => Ok(()),
    }
}

fn write_diagnostics(f: &mut std::fmt::Formatter<'_>, stderr: &str) -> std::fmt::Result {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        Ok(())
    } else {
        write!(f, ":\n{stderr}")
    }
}

/// Substitute `{source}` and `{executable}` in the build arguments.
fn expand_args(args: &[String], source: &Path, executable: &Path) -> Vec<String> {
    let source = source.to_string_lossy();
    let executable = executable.to_string_lossy();
    args.iter()
        .map(|arg| {
            arg.replace("{source}", &source)
                .replace("{executable}", &executable)
        })
        .collect()
}

/// Compile the benchmark. Fails with [`RunError::Build`] on non-zero exit.
pub async fn build(
    build: &BuildConfig,
    bench: &BenchmarkConfig,
    workdir: &Path,
) -> Result<CapturedOutput, RunError> {
    let args = expand_args(
        bench.build_args.as_deref().unwrap_or(&build.args),
        &bench.source,
        &bench.executable,
    );
    tracing::info!(
        benchmark = %bench.name,
        command = %build.command,
        args = ?args,
        "building benchmark"
    );

    let output = capture(Path::new(&build.command), &args, workdir, None).await?;
    if !output.success {
        return Err(RunError::Build {
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    tracing::info!(
        duration_ms = output.duration.as_millis() as u64,
        "build finished"
    );
    Ok(output)
}

/// Run the built executable with no arguments and capture its output.
///
/// A non-zero exit is not an error here; the caller still parses the
/// partial output before reporting the failure.
pub async fn execute(
    bench: &BenchmarkConfig,
    workdir: &Path,
    timeout: Option<Duration>,
) -> Result<CapturedOutput, RunError> {
    // Resolved before spawning: a relative program path would otherwise be
    // looked up from inside `workdir`.
    let program = std::path::absolute(workdir.join(&bench.executable))
        .map_err(|e| RunError::Io { source: e })?;
    tracing::info!(
        benchmark = %bench.name,
        program = %program.display(),
        timeout_secs = timeout.map(|t| t.as_secs()),
        "running benchmark"
    );
    let output = capture(&program, &[], workdir, timeout).await?;
    tracing::info!(
        exit_code = ?output.exit_code,
        stdout_bytes = output.stdout.len(),
        duration_secs = output.duration.as_secs(),
        timed_out = output.timed_out,
        "benchmark finished"
    );
    Ok(output)
}

/// Build, execute, and parse one benchmark.
pub async fn run_benchmark(
    bench: &BenchmarkConfig,
    schema: &MetricSchema,
    opts: &RunOptions<'_>,
) -> Result<RunOutcome, RunError> {
    if opts.skip_build {
        tracing::info!(benchmark = %bench.name, "skipping build");
    } else {
        build(opts.build, bench, opts.workdir).await?;
    }

    let output = execute(bench, opts.workdir, opts.timeout).await?;

    let transcript = if opts.save_transcript {
        Some(save_transcript(opts.output_dir, &bench.name, &output.stdout)?)
    } else {
        None
    };

    let parsed = parser::parse_transcript(schema, opts.orphan_rows, &output.stdout);

    if output.timed_out || !output.success {
        let (partial_samples, partial_error) = match parsed {
            Ok((store, _)) => (store.sample_count(), None),
            Err(e) => {
                tracing::warn!(benchmark = %bench.name, error = %e, "partial output failed to parse");
                (0, Some(e))
            }
        };
        return Err(if output.timed_out {
            RunError::Timeout {
                secs: opts.timeout.map_or(0, |t| t.as_secs()),
                stderr: output.stderr,
                partial_samples,
                partial_error,
            }
        } else {
            RunError::Execution {
                exit_code: output.exit_code,
                stderr: output.stderr,
                partial_samples,
                partial_error,
            }
        });
    }

    let (store, report) = parsed.map_err(RunError::Parse)?;
    Ok(RunOutcome {
        store,
        report,
        transcript,
    })
}

/// Write captured stdout to `{output_dir}/{name}.stdout.txt`.
fn save_transcript(output_dir: &Path, name: &str, stdout: &str) -> Result<PathBuf, RunError> {
    let path = output_dir.join(format!("{name}.stdout.txt"));
    std::fs::create_dir_all(output_dir)
        .and_then(|()| std::fs::write(&path, stdout))
        .map_err(|e| RunError::Transcript {
            path: path.clone(),
            source: e,
        })?;
    tracing::debug!(path = %path.display(), "saved transcript");
    Ok(path)
}

/// Spawn `program`, collect stdout and stderr separately, and wait for exit.
///
/// The child gets its own process group so a timeout can kill anything it
/// spawned as well.
async fn capture(
    program: &Path,
    args: &[String],
    workdir: &Path,
    timeout: Option<Duration>,
) -> Result<CapturedOutput, RunError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| RunError::Spawn {
        program: program.display().to_string(),
        source: e,
    })?;
    let pid = child.id();
    tracing::debug!(pid, "child process started");

    let (Some(mut stdout_pipe), Some(mut stderr_pipe)) = (child.stdout.take(), child.stderr.take())
    else {
        return Err(RunError::Io {
            source: std::io::Error::other("child pipes were not captured"),
        });
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let waited = {
        let wait = async {
            let (out, err) = tokio::join!(
                stdout_pipe.read_to_end(&mut stdout),
                stderr_pipe.read_to_end(&mut stderr)
            );
            if let Err(e) = out.and(err) {
                return Err(e);
            }
            child.wait().await
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
            None => Some(wait.await),
        }
    };

    let (status, timed_out) = match waited {
        Some(status) => (status.map_err(|e| RunError::Io { source: e })?, false),
        None => {
            tracing::warn!(pid, "benchmark exceeded timeout, killing process group");
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            // Reap the child even if the group kill failed.
            let _ = child.start_kill();
            let status = child
                .wait()
                .await
                .map_err(|e| RunError::Io { source: e })?;
            let _ = tokio::time::timeout(DRAIN_AFTER_KILL, async {
                let _ = tokio::join!(
                    stdout_pipe.read_to_end(&mut stdout),
                    stderr_pipe.read_to_end(&mut stderr)
                );
            })
            .await;
            (status, true)
        }
    };

    Ok(CapturedOutput {
        exit_code: status.code(),
        success: status.success() && !timed_out,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        duration: start.elapsed(),
        timed_out,
    })
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::warn!(pid, error = %e, "failed to kill benchmark process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
