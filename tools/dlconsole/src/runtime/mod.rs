use crate::decode::decode_line;
use crate::errors::ConsoleError;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Lines longer than this are emitted in pieces.
pub const MAX_LINE_BYTES: usize = 8192;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl RunRequest {
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Output { run_id: u64, text: String },
    Exit { run_id: u64, exit_code: Option<i32> },
}

impl HostEvent {
    pub fn run_id(&self) -> u64 {
        match self {
            Self::Output { run_id, .. } | Self::Exit { run_id, .. } => *run_id,
        }
    }
}

pub trait ProcessHost: Send + Sync {
    fn start_run(&self, request: RunRequest) -> Result<u64, ConsoleError>;
    fn stop_run(&self, run_id: u64) -> Result<(), ConsoleError>;
}

pub trait Notifier: Send + Sync {
    fn notify_completion(&self, title: &str, body: &str);
    fn signal_refresh(&self);
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, ConsoleError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), ConsoleError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), ConsoleError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn stdout_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), ConsoleError>;
}

#[derive(Default)]
struct HostState {
    next_run_id: u64,
    children: HashMap<u64, Child>,
}

/// Runs external tools as child processes and streams their output as
/// [`HostEvent`]s. Each stream is read on its own thread; a waiter thread
/// emits the single `Exit` after both streams are drained.
pub struct ProductionProcessHost {
    events: UnboundedSender<HostEvent>,
    state: Arc<Mutex<HostState>>,
}

impl ProductionProcessHost {
    pub fn new() -> (Self, UnboundedReceiver<HostEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let host = Self {
            events,
            state: Arc::new(Mutex::new(HostState {
                next_run_id: 1,
                children: HashMap::new(),
            })),
        };
        (host, receiver)
    }
}

impl ProcessHost for ProductionProcessHost {
    fn start_run(&self, request: RunRequest) -> Result<u64, ConsoleError> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.env("LC_ALL", "en_US.UTF-8").env("LANG", "en_US.UTF-8");
            // Own process group so stopping reaches ffmpeg and other helpers.
            cmd.process_group(0);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ConsoleError::Launch(format!("{}: {e}", request.program)))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run_id = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| ConsoleError::Process("process table poisoned".to_string()))?;
            let run_id = state.next_run_id;
            state.next_run_id += 1;
            state.children.insert(run_id, child);
            run_id
        };

        let mut readers = Vec::new();
        if let Some(stdout) = stdout {
            let events = self.events.clone();
            readers.push(thread::spawn(move || pump_lines(stdout, run_id, &events)));
        }
        if let Some(stderr) = stderr {
            let events = self.events.clone();
            readers.push(thread::spawn(move || pump_lines(stderr, run_id, &events)));
        }

        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        thread::spawn(move || {
            let exit_code = wait_for_exit(&state, run_id);
            for reader in readers {
                let _ = reader.join();
            }
            let _ = events.send(HostEvent::Exit { run_id, exit_code });
        });

        Ok(run_id)
    }

    fn stop_run(&self, run_id: u64) -> Result<(), ConsoleError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ConsoleError::Process("process table poisoned".to_string()))?;
        match state.children.get_mut(&run_id) {
            Some(child) => {
                if kill_process_tree(child.id()) {
                    return Ok(());
                }
                child
                    .kill()
                    .map_err(|e| ConsoleError::Process(format!("stop run {run_id}: {e}")))
            }
            // Already reaped; nothing left to stop.
            None => Ok(()),
        }
    }
}

/// Kills the child and everything it spawned. Returns `false` when the tree
/// kill could not be issued and only the direct child should be killed.
fn kill_process_tree(pid: u32) -> bool {
    #[cfg(unix)]
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    #[cfg(windows)]
    let status = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    #[cfg(not(any(unix, windows)))]
    let status: std::io::Result<std::process::ExitStatus> =
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported));
    status.is_ok_and(|status| status.success())
}

fn wait_for_exit(state: &Mutex<HostState>, run_id: u64) -> Option<i32> {
    loop {
        {
            let Ok(mut guard) = state.lock() else {
                return None;
            };
            let Some(child) = guard.children.get_mut(&run_id) else {
                return None;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    guard.children.remove(&run_id);
                    return status.code();
                }
                Ok(None) => {}
                Err(_) => {
                    guard.children.remove(&run_id);
                    return None;
                }
            }
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Splits a byte stream on `\r` or `\n` and emits each line as one chunk.
/// Progress bars redraw with `\r`, so every redraw becomes its own chunk.
pub fn pump_lines(mut reader: impl Read, run_id: u64, events: &UnboundedSender<HostEvent>) {
    let emit = |line: &[u8]| {
        let _ = events.send(HostEvent::Output {
            run_id,
            text: decode_line(line),
        });
    };

    let mut line = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte == b'\r' || byte == b'\n' {
                        emit(&line);
                        line.clear();
                    } else {
                        line.push(byte);
                        if line.len() >= MAX_LINE_BYTES {
                            let split = utf8_split_point(&line);
                            emit(&line[..split]);
                            line.drain(..split);
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    if !line.is_empty() {
        emit(&line);
    }
}

/// Length of the longest prefix of `bytes` that does not end inside a UTF-8
/// sequence. Input that is not UTF-8 at the tail is split at its full length.
fn utf8_split_point(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let tail_start = len.saturating_sub(4);
    let Some(lead) = (tail_start..len).rev().find(|&i| bytes[i] & 0xC0 != 0x80) else {
        return len;
    };
    let width = match bytes[lead] {
        b if b & 0x80 == 0 => 1,
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        b if b & 0xF8 == 0xF0 => 4,
        _ => return len,
    };
    if lead > 0 && lead + width > len {
        lead
    } else {
        len
    }
}

/// Rings the terminal bell on completion and keeps the last message for the
/// status line.
#[derive(Default)]
pub struct TerminalNotifier {
    pub bell: bool,
    last_message: Mutex<Option<String>>,
    refreshes: AtomicU64,
}

impl TerminalNotifier {
    pub fn new(bell: bool) -> Self {
        Self {
            bell,
            ..Self::default()
        }
    }

    pub fn take_message(&self) -> Option<String> {
        self.last_message.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl Notifier for TerminalNotifier {
    fn notify_completion(&self, title: &str, body: &str) {
        if self.bell {
            use std::io::Write;
            let mut out = std::io::stdout();
            let _ = out.write_all(b"\x07");
            let _ = out.flush();
        }
        if let Ok(mut slot) = self.last_message.lock() {
            *slot = Some(format!("{title}: {body}"));
        }
    }

    fn signal_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, ConsoleError> {
        std::fs::read_to_string(path).map_err(|e| ConsoleError::Io(e.to_string()))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), ConsoleError> {
        std::fs::write(path, contents).map_err(|e| ConsoleError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), ConsoleError> {
        std::fs::create_dir_all(path).map_err(|e| ConsoleError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdout_is_tty(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdout())
    }

    fn write_line(&self, line: &str) -> Result<(), ConsoleError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| ConsoleError::Io(e.to_string()))
    }
}

#[derive(Default, Clone)]
pub struct FakeProcessHost {
    started: Arc<Mutex<Vec<RunRequest>>>,
    stopped: Arc<Mutex<Vec<u64>>>,
    fail_next: Arc<Mutex<Option<ConsoleError>>>,
    next_run_id: Arc<Mutex<u64>>,
}

impl FakeProcessHost {
    pub fn set_fail_next(&self, error: ConsoleError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    pub fn started(&self) -> Vec<RunRequest> {
        self.started.lock().expect("started lock").clone()
    }

    pub fn stopped(&self) -> Vec<u64> {
        self.stopped.lock().expect("stopped lock").clone()
    }
}

impl ProcessHost for FakeProcessHost {
    fn start_run(&self, request: RunRequest) -> Result<u64, ConsoleError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        self.started.lock().expect("started lock").push(request);
        let mut next = self.next_run_id.lock().expect("next lock");
        *next += 1;
        Ok(*next)
    }

    fn stop_run(&self, run_id: u64) -> Result<(), ConsoleError> {
        self.stopped.lock().expect("stopped lock").push(run_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    Completion { title: String, body: String },
    Refresh,
}

#[derive(Default, Clone)]
pub struct FakeNotifier {
    calls: Arc<Mutex<Vec<NotifierCall>>>,
}

impl FakeNotifier {
    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn completions(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, NotifierCall::Completion { .. }))
            .count()
    }
}

impl Notifier for FakeNotifier {
    fn notify_completion(&self, title: &str, body: &str) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(NotifierCall::Completion {
                title: title.to_string(),
                body: body.to_string(),
            });
    }

    fn signal_refresh(&self) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(NotifierCall::Refresh);
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<ConsoleError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: ConsoleError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    fn maybe_fail(&self) -> Result<(), ConsoleError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, ConsoleError> {
        self.maybe_fail()?;
        self.file(path)
            .ok_or_else(|| ConsoleError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), ConsoleError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), ConsoleError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            ..Self::default()
        }
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn stdout_is_tty(&self) -> bool {
        self.is_tty
    }

    fn write_line(&self, line: &str) -> Result<(), ConsoleError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }
}
