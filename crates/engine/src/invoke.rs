use crate::error::{ErrorKind, Result};
use crate::outcome::{EngineOutcome, EngineStatus};
use exn::ResultExt;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to keep reading output once a killed engine is gone. Anything it
/// forked may hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);
const EXECUTABLE_NAMES: [&str; 2] = ["ddc", "ddc.exe"];

/// Everything the engine needs to process one arrangement file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub arrangement: PathBuf,
    pub phrase_length: u16,
    pub remove_sustain: bool,
    pub ramp_model: Option<PathBuf>,
    pub clean: bool,
    pub keep_log: bool,
}

impl Invocation {
    /// Directory the engine must run in; it resolves the arrangement relative
    /// to its working directory.
    pub fn working_dir(&self) -> &Path {
        match self.arrangement.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// `<file> -l <len> -s <Y|N> [-m <model>] -p <Y|N> -t <Y|N>`
    pub fn args(&self) -> Result<Vec<OsString>> {
        let Some(file_name) = self.arrangement.file_name() else {
            exn::bail!(ErrorKind::InvalidArrangement(self.arrangement.clone()));
        };
        let mut args: Vec<OsString> = vec![
            file_name.to_os_string(),
            "-l".into(),
            self.phrase_length.to_string().into(),
            "-s".into(),
            flag(self.remove_sustain).into(),
        ];
        if let Some(model) = &self.ramp_model {
            // The working directory changes, so relative model paths would break.
            let model = std::path::absolute(model).or_raise(|| ErrorKind::Model(model.clone()))?;
            args.extend(["-m".into(), model.into_os_string()]);
        }
        args.extend(["-p".into(), flag(self.clean).into(), "-t".into(), flag(self.keep_log).into()]);
        Ok(args)
    }
}

fn flag(value: bool) -> &'static str {
    match value {
        true => "Y",
        false => "N",
    }
}

/// Anything that can turn an [`Invocation`] into an [`EngineOutcome`].
///
/// Implementations block the calling thread until the run is over.
pub trait Engine: Send + Sync {
    fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> Result<EngineOutcome>;
}

/// Runs the engine executable as a child process.
#[derive(Debug, Clone)]
pub struct EngineInvoker {
    executable: PathBuf,
    timeout: Duration,
}

impl EngineInvoker {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { executable: executable.into(), timeout }
    }

    /// Use `preferred` if it exists, otherwise fall back to an engine on `PATH`.
    pub fn discover(preferred: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let preferred = preferred.as_ref();
        if preferred.is_file() {
            return Ok(Self::new(preferred, timeout));
        }
        tracing::info!(path = %preferred.display(), "Engine not found under install root; searching PATH");
        for exe in EXECUTABLE_NAMES {
            if let Ok(path) = which::which(exe) {
                return Ok(Self::new(path, timeout));
            }
        }
        exn::bail!(ErrorKind::EngineNotFound(preferred.to_path_buf()));
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

enum Termination {
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

impl Engine for EngineInvoker {
    #[instrument(skip_all, fields(arrangement = %invocation.arrangement.display()))]
    fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> Result<EngineOutcome> {
        let args = invocation.args()?;
        tracing::debug!(executable = %self.executable.display(), ?args, "Starting difficulty engine");
        let mut child = Command::new(&self.executable)
            .args(&args)
            .current_dir(invocation.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .or_raise(|| ErrorKind::Spawn)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let termination = loop {
            if let Some(status) = child.try_wait().or_raise(|| ErrorKind::Wait)? {
                break Termination::Exited(status.code());
            }
            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                break Termination::TimedOut;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        };
        let grace = match termination {
            Termination::Exited(_) => deadline.saturating_duration_since(Instant::now()).max(DRAIN_GRACE),
            _ => {
                // Killing an already exited child is harmless; reaping is not optional.
                _ = child.kill();
                child.wait().or_raise(|| ErrorKind::Wait)?;
                DRAIN_GRACE
            },
        };

        let stdout = stdout.collect(grace);
        let stderr = stderr.collect(DRAIN_GRACE);
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim_end(), "Engine wrote to standard error");
        }
        let status = match termination {
            Termination::Exited(code) => EngineStatus::from_exit_code(code),
            Termination::TimedOut => {
                tracing::warn!(timeout = ?self.timeout, "Engine exceeded its wait bound and was killed");
                EngineStatus::TimedOut
            },
            Termination::Cancelled => EngineStatus::Cancelled,
        };
        tracing::info!(%status, "Engine finished");
        Ok(EngineOutcome::new(status, stdout))
    }
}

/// Output read so far from one of the engine's pipes.
struct Drain {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Drain {
    /// Wait up to `wait` for the pipe to close, then take whatever arrived.
    fn collect(self, wait: Duration) -> String {
        if self.done.recv_timeout(wait).is_err() {
            tracing::debug!("Engine output still held open by another process; keeping what was read");
        }
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Read a pipe to the end on its own thread so a chatty child never blocks on
/// a full pipe while we poll for its exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let (sender, done) = mpsc::channel();
    let shared = buffer.clone();
    thread::spawn(move || {
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; 8192];
            while let Ok(read @ 1..) = pipe.read(&mut chunk) {
                shared.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(&chunk[..read]);
            }
        }
        _ = sender.send(());
    });
    Drain { buffer, done }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;

    fn invocation(arrangement: impl Into<PathBuf>) -> Invocation {
        Invocation {
            arrangement: arrangement.into(),
            phrase_length: 60,
            remove_sustain: true,
            ramp_model: None,
            clean: false,
            keep_log: false,
        }
    }

    #[test]
    fn arguments_without_model() {
        let args = invocation("/songs/song.xml").args().unwrap();
        assert_eq!(args, ["song.xml", "-l", "60", "-s", "Y", "-p", "N", "-t", "N"]);
    }

    #[test]
    fn arguments_with_model_are_absolute() {
        let mut inv = invocation("song.xml");
        inv.ramp_model = Some(PathBuf::from("ddc/ddc_default.xml"));
        inv.clean = true;
        inv.keep_log = true;
        inv.remove_sustain = false;
        let args = inv.args().unwrap();
        assert_eq!(args[..5], ["song.xml", "-l", "60", "-s", "N"]);
        assert_eq!(args[5], "-m");
        assert!(Path::new(&args[6]).is_absolute());
        assert!(Path::new(&args[6]).ends_with("ddc/ddc_default.xml"));
        assert_eq!(args[7..], ["-p", "Y", "-t", "Y"]);
    }

    #[test]
    fn working_dir_of_bare_file_name() {
        assert_eq!(invocation("song.xml").working_dir(), Path::new("."));
        assert_eq!(invocation("/a/b/song.xml").working_dir(), Path::new("/a/b"));
    }

    #[test]
    fn arrangement_without_file_name() {
        let err = invocation("/").args().unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::InvalidArrangement(_)));
    }

    #[test]
    fn discover_missing_engine() {
        let dir = tempfile::tempdir().unwrap();
        let preferred = dir.path().join("ddc").join("definitely-not-the-engine");
        match EngineInvoker::discover(&preferred, Duration::from_secs(1)) {
            // A real engine on PATH is allowed to win.
            Ok(invoker) => assert_ne!(invoker.executable(), preferred),
            Err(err) => assert!(matches!(err.deref(), ErrorKind::EngineNotFound(_))),
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Mutex;

        // Writing an executable while another test forks can fail the exec with
        // ETXTBSY, so process tests run one at a time.
        static SERIAL: Mutex<()> = Mutex::new(());

        fn fake_engine(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ddc");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn arrangement(dir: &Path) -> PathBuf {
            let songs = dir.join("songs");
            fs::create_dir_all(&songs).unwrap();
            let path = songs.join("song.xml");
            fs::write(&path, "<song/>").unwrap();
            path
        }

        #[test]
        fn runs_in_arrangement_directory_and_captures_stdout() {
            let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "printf '%s\\n' \"$@\" > args.txt\necho processed \"$1\"\nexit 0");
            let invoker = EngineInvoker::new(engine, Duration::from_secs(10));
            let outcome = invoker.run(&invocation(arrangement(dir.path())), &CancellationToken::new()).unwrap();
            assert_eq!(outcome.status, EngineStatus::Success);
            assert_eq!(outcome.stdout, "processed song.xml\n");
            let args = fs::read_to_string(dir.path().join("songs").join("args.txt")).unwrap();
            assert_eq!(args, "song.xml\n-l\n60\n-s\nY\n-p\nN\n-t\nN\n");
        }

        #[test]
        fn exit_codes_map_to_statuses() {
            let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
            let dir = tempfile::tempdir().unwrap();
            let song = arrangement(dir.path());
            for (code, expected) in [
                (1, EngineStatus::SystemError),
                (2, EngineStatus::ToolWarning),
                (9, EngineStatus::Unknown(Some(9))),
            ] {
                let engine = fake_engine(dir.path(), &format!("echo code {code}\nexit {code}"));
                let outcome = EngineInvoker::new(engine, Duration::from_secs(10))
                    .run(&invocation(&song), &CancellationToken::new())
                    .unwrap();
                assert_eq!(outcome.status, expected);
                assert_eq!(outcome.stdout, format!("code {code}\n"));
            }
        }

        #[test]
        fn slow_engine_times_out() {
            let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "echo started\nexec sleep 30");
            let started = Instant::now();
            let outcome = EngineInvoker::new(engine, Duration::from_millis(300))
                .run(&invocation(arrangement(dir.path())), &CancellationToken::new())
                .unwrap();
            assert_eq!(outcome.status, EngineStatus::TimedOut);
            assert_eq!(outcome.stdout, "started\n");
            assert!(started.elapsed() < Duration::from_secs(20));
        }

        #[test]
        fn forked_helper_does_not_outlive_the_timeout() {
            let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
            let dir = tempfile::tempdir().unwrap();
            // No exec: the shell forks `sleep`, which inherits stdout and survives the kill.
            let engine = fake_engine(dir.path(), "echo started\nsleep 8");
            let started = Instant::now();
            let outcome = EngineInvoker::new(engine, Duration::from_millis(300))
                .run(&invocation(arrangement(dir.path())), &CancellationToken::new())
                .unwrap();
            assert_eq!(outcome.status, EngineStatus::TimedOut);
            assert_eq!(outcome.stdout, "started\n");
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn cancellation_kills_engine() {
            let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "exec sleep 30");
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            let canceller = thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                trigger.cancel();
            });
            let started = Instant::now();
            let outcome = EngineInvoker::new(engine, Duration::from_secs(60))
                .run(&invocation(arrangement(dir.path())), &cancel)
                .unwrap();
            canceller.join().unwrap();
            assert_eq!(outcome.status, EngineStatus::Cancelled);
            assert!(started.elapsed() < Duration::from_secs(20));
        }

        #[test]
        fn missing_executable_fails_to_spawn() {
            let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
            let dir = tempfile::tempdir().unwrap();
            let err = EngineInvoker::new(dir.path().join("nope"), Duration::from_secs(1))
                .run(&invocation(arrangement(dir.path())), &CancellationToken::new())
                .unwrap_err();
            assert!(matches!(err.deref(), ErrorKind::Spawn));
        }
    }
}
