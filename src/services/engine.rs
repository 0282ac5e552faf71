use std::{
    env,
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};

use crate::models::{compilation::EngineKind, errors::AppError};
use crate::utils::config::AppConfig;

/// Environment variable pointing tectonic at its persistent bundle cache.
pub const CACHE_DIR_VAR: &str = "TECTONIC_CACHE_DIR";

/// Captured output of a successful engine run.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs the configured LaTeX engine as a subprocess.
#[derive(Debug, Clone)]
pub struct EngineInvoker {
    engine: String,
    kind: EngineKind,
    timeout: Duration,
    cache_dir: PathBuf,
}

impl EngineInvoker {
    pub fn new(engine: impl Into<String>, timeout: Duration, cache_dir: impl Into<PathBuf>) -> Self {
        let engine = engine.into();
        Self {
            kind: EngineKind::from_engine_name(&engine),
            engine,
            timeout,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.latex_engine.clone(),
            config.compile_timeout(),
            config.tectonic_cache_dir.clone(),
        )
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Command line for compiling `main_filename` inside `work_dir`
    pub fn build_command(&self, work_dir: &Path, main_filename: &str) -> Vec<OsString> {
        let flags: &[&str] = match self.kind {
            EngineKind::Tectonic => &[
                "--synctex=0",
                "--keep-intermediates",
                "--keep-logs",
                "--outdir",
            ],
            EngineKind::PdfLatexCompatible => &[
                "-interaction=nonstopmode",
                "-halt-on-error",
                "-output-directory",
            ],
        };

        let mut argv = Vec::with_capacity(flags.len() + 3);
        argv.push(OsString::from(&self.engine));
        argv.extend(flags.iter().map(OsString::from));
        argv.push(work_dir.as_os_str().to_owned());
        argv.push(OsString::from(main_filename));
        argv
    }

    /// Run `argv` in `work_dir`, bounded by the configured timeout.
    ///
    /// The child gets its own process group. On timeout, I/O failure or this
    /// future being dropped, the whole group is killed. A run that exits and
    /// closes its output normally is not signalled again, since its group id
    /// is free for reuse once the leader is reaped.
    pub async fn invoke(&self, argv: &[OsString], work_dir: &Path) -> Result<EngineOutput, AppError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AppError::internal_error("Empty engine command"))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // An operator-supplied cache location wins over the configured one.
        if env::var_os(CACHE_DIR_VAR).is_none() {
            command.env(CACHE_DIR_VAR, &self.cache_dir);
        }

        #[cfg(unix)]
        command.process_group(0);

        tracing::debug!("Running engine: {:?}", argv);
        let started = Instant::now();

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                AppError::engine_not_found(program.to_string_lossy())
            } else {
                AppError::internal_error(format!("Failed to start LaTeX engine: {}", e))
            }
        })?;
        let mut group = ProcessGroupGuard::new(child.id());

        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());

        let outcome = tokio::time::timeout(self.timeout, async {
            tokio::join!(child.wait(), stdout, stderr)
        })
        .await;

        let (status, stdout, stderr) = match outcome {
            Ok((Ok(status), stdout, stderr)) => {
                // The leader is reaped and every pipe is closed, so the group
                // id may already be reused.
                group.disarm();
                (status, stdout, stderr)
            }
            Ok((Err(e), _, _)) => {
                group.kill();
                let _ = child.wait().await;
                return Err(AppError::internal_error(format!("Engine I/O failed: {}", e)));
            }
            Err(_) => {
                // Stragglers holding the pipes keep the group alive until here.
                group.kill();
                let _ = child.wait().await;
                tracing::warn!(
                    "Engine exceeded {:?} in {}, process group killed",
                    self.timeout,
                    work_dir.display()
                );
                return Err(AppError::timeout(self.timeout.as_secs()));
            }
        };
        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(stdout), Ok(stderr)) => (stdout, stderr),
            (Err(e), _) | (_, Err(e)) => {
                return Err(AppError::internal_error(format!("Engine I/O failed: {}", e)));
            }
        };

        let elapsed = started.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

        if !status.success() {
            tracing::debug!("Engine exited with {} after {:?}", status, elapsed);
            return Err(AppError::CompilationFailed {
                status: status.code(),
                stdout,
                stderr,
            });
        }

        tracing::debug!("Engine finished in {:?}", elapsed);
        Ok(EngineOutput {
            stdout,
            stderr,
            elapsed,
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// SIGKILLs the child's process group once, at the latest on drop,
/// unless disarmed first.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::{
            errno::Errno,
            sys::signal::{killpg, Signal},
            unistd::Pid,
        };

        let Some(pgid) = self.pgid.take() else {
            return;
        };
        let Ok(raw) = i32::try_from(pgid) else {
            return;
        };

        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!("Failed to kill engine process group {}: {}", pgid, e),
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        // kill_on_drop covers the direct child
        self.pgid.take();
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}
