use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long to keep collecting pipe output once the child itself is gone.
/// Descendants that inherited the pipes can hold them open indefinitely.
const EXITED_DRAIN_GRACE: Duration = Duration::from_secs(5);
const KILLED_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum Finished {
    Exited(Output),
    TimedOut { after: Duration, stderr: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Spawns `cmd` with piped stdio and waits for it, killing it after `timeout`.
pub fn run(cmd: &mut Command, timeout: Option<Duration>) -> Result<Finished> {
    debug!("spawn {:?} timeout={:?}", cmd, timeout);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {:?}", cmd.get_program()))?;

    match timeout {
        Some(t) => wait_with_timeout(&mut child, t),
        None => Ok(Finished::Exited(
            child.wait_with_output().with_context(|| "waiting for child")?,
        )),
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Finished> {
    // Drain both pipes while waiting; a child blocked on a full pipe never exits.
    let (tx, rx) = mpsc::channel();
    if let Some(out) = child.stdout.take() {
        spawn_reader(Pipe::Stdout, out, tx.clone());
    }
    if let Some(err) = child.stderr.take() {
        spawn_reader(Pipe::Stderr, err, tx);
    }

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let (stdout, stderr) = collect(&rx, EXITED_DRAIN_GRACE);
            return Ok(Finished::Exited(Output {
                status,
                stdout,
                stderr,
            }));
        }

        if start.elapsed() > timeout {
            warn!("child process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            let (_, stderr) = collect(&rx, KILLED_DRAIN_GRACE);
            return Ok(Finished::TimedOut {
                after: timeout,
                stderr,
            });
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}

fn spawn_reader<R>(pipe: Pipe, mut src: R, tx: mpsc::Sender<(Pipe, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(err) = src.read_to_end(&mut buf) {
            debug!("reading child {pipe:?}: {err}");
        }
        // The receiver may have given up waiting already.
        let _ = tx.send((pipe, buf));
    });
}

/// Gathers reader output until both pipes close or `grace` runs out.
/// Readers still blocked after that are left detached.
fn collect(rx: &Receiver<(Pipe, Vec<u8>)>, grace: Duration) -> (Vec<u8>, Vec<u8>) {
    let deadline = Instant::now() + grace;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok((Pipe::Stdout, buf)) => stdout = buf,
            Ok((Pipe::Stderr, buf)) => stderr = buf,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                debug!("child pipes still open after {grace:?}; not waiting further");
                break;
            }
        }
    }
    (stdout, stderr)
}

/// Last `max_lines` non-empty lines of a child's stderr.
pub fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
