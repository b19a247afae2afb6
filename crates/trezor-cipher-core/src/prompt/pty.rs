//! Askpass behind a pseudo-terminal relay
//!
//! Some askpass helpers insist on a controlling terminal and read the PIN
//! from `/dev/tty` instead of stdin. This backend gives them one:
//!
//! ```text
//!   real stdin ──(relay thread)──► pty master ──► askpass (slave = tty, stdin, stderr)
//!   real stderr ◄──(calling thread)── pty master                  │
//!   captured secret ◄──(capture thread)── stdout pipe ◄───────────┘
//! ```
//!
//! Both directions over the master must move concurrently: the helper can
//! sit waiting for keystrokes while its prompt text is still unread.
//!
//! The real terminal is switched to raw mode for the duration of the prompt
//! so keystrokes reach the helper unprocessed; [`RawModeGuard`] puts it back
//! on every exit path.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, OpenptyResult};
use nix::sys::termios::{self, SetArg, Termios};
use zeroize::Zeroizing;

use super::{trim_line_endings, PromptBackend, PromptError, PromptRequest};
use crate::memory::SecretBuffer;

/// How long the relay thread waits on its input before re-checking its stop flag.
const RELAY_POLL_INTERVAL_MS: u16 = 100;

const RELAY_CHUNK: usize = 1024;

/// Askpass program driven through a pseudo-terminal.
#[derive(Debug)]
pub struct PtyAskpass {
    program: PathBuf,
    /// Relayed to the helper instead of the real stdin when set.
    input: Option<OwnedFd>,
}

impl PtyAskpass {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            input: None,
        }
    }

    /// Relay `input` to the helper's terminal in place of stdin.
    pub fn with_input(mut self, input: OwnedFd) -> Self {
        self.input = Some(input);
        self
    }
}

impl PromptBackend for PtyAskpass {
    fn get_secret(&mut self, request: &PromptRequest) -> Result<SecretBuffer, PromptError> {
        log::info!(
            "Running command \"{} {}\" on a pseudo-terminal",
            self.program.display(),
            request.title
        );

        let stdin = io::stdin();
        let source = match &self.input {
            Some(fd) => fd.as_fd(),
            None => stdin.as_fd(),
        };

        let pty = Pty::open()?;
        let mut child = spawn_on_pty(&self.program, &request.title, pty.slave)?;
        let mut master = File::from(pty.master);

        let capture = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || -> io::Result<Zeroizing<Vec<u8>>> {
                let mut captured = Zeroizing::new(Vec::new());
                stdout.read_to_end(&mut captured)?;
                Ok(captured)
            })
        });

        let raw_mode = match RawModeGuard::enable(source) {
            Ok(guard) => Some(guard),
            Err(e) => {
                log::warn!(
                    "stdin is not a usable terminal ({}); waiting for the askpass utility anyway \
                     (this is OK if it does not need input from our stdin)",
                    e
                );
                None
            }
        };

        let relay = match (source.try_clone_to_owned(), master.try_clone()) {
            (Ok(input), Ok(relay_master)) => Some(StdinRelay::start(File::from(input), relay_master)),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("cannot relay stdin to the askpass utility: {}", e);
                None
            }
        };

        let echoed = copy_master_to_stderr(&mut master);

        let status = child.wait();
        drop(relay);
        drop(raw_mode);

        let captured = match capture {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("askpass output reader panicked"))??,
            None => Zeroizing::new(Vec::new()),
        };
        echoed?;
        let status = status?;
        if !status.success() {
            log::debug!("askpass exited with {}", status);
        }

        Ok(SecretBuffer::new(trim_line_endings(&captured).to_vec()))
    }
}

/// Both ends of a freshly allocated pseudo-terminal.
struct Pty {
    master: OwnedFd,
    slave: OwnedFd,
}

impl Pty {
    fn open() -> io::Result<Self> {
        let OpenptyResult { master, slave } = openpty(None, None)?;
        set_cloexec(&master)?;
        set_cloexec(&slave)?;
        Ok(Self { master, slave })
    }
}

fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}

/// Start `program title` with the pty slave as its controlling terminal,
/// stdin and stderr. stdout is piped back to us.
///
/// Consumes `slave`: once the child owns the only copies, reads on the master
/// report end-of-stream when the child is gone.
fn spawn_on_pty(program: &Path, title: &str, slave: OwnedFd) -> io::Result<Child> {
    let mut command = Command::new(program);
    command
        .arg(title)
        .stdin(Stdio::from(slave.try_clone()?))
        .stderr(Stdio::from(slave))
        .stdout(Stdio::piped());

    // SAFETY: only async-signal-safe calls between fork and exec.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    command.spawn()
}

/// Forward everything the helper writes to its terminal onto our stderr.
///
/// Returns once the slave side is closed, which Linux reports as `EIO`.
fn copy_master_to_stderr(master: &mut File) -> io::Result<()> {
    let mut buf = [0u8; RELAY_CHUNK];
    let stderr = io::stderr();
    loop {
        match master.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                let mut out = stderr.lock();
                out.write_all(&buf[..n])?;
                out.flush()?;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Copies the relay input (normally stdin) into the pty master on a
/// background thread.
///
/// Dropping the relay stops and joins the thread; the thread notices within
/// [`RELAY_POLL_INTERVAL_MS`], so no stale reader is left competing for
/// stdin when the next prompt starts.
struct StdinRelay {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<io::Result<u64>>>,
}

impl StdinRelay {
    fn start(input: File, master: File) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || relay_input(input, master, &flag));
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for StdinRelay {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(bytes)) => log::debug!("relayed {} bytes of stdin to the askpass utility", bytes),
                Ok(Err(e)) => log::debug!("stdin relay stopped: {}", e),
                Err(_) => log::warn!("stdin relay thread panicked"),
            }
        }
    }
}

fn relay_input(mut input: File, mut master: File, stop: &AtomicBool) -> io::Result<u64> {
    let mut buf = Zeroizing::new([0u8; RELAY_CHUNK]);
    let mut total = 0u64;

    while !stop.load(Ordering::SeqCst) {
        let ready = {
            let mut fds = [PollFd::new(input.as_fd(), PollFlags::POLLIN)];
            poll(&mut fds, PollTimeout::from(RELAY_POLL_INTERVAL_MS))
        };
        match ready {
            Ok(0) | Err(Errno::EINTR) => continue,
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        let n = match input.read(&mut buf[..]) {
            Ok(0) => {
                log::debug!("relay input reached end of stream");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        master.write_all(&buf[..n])?;
        total += n as u64;
    }

    Ok(total)
}

/// Holds a terminal in raw mode; the saved attributes are restored on drop.
#[derive(Debug)]
pub struct RawModeGuard {
    fd: OwnedFd,
    saved: Termios,
}

impl RawModeGuard {
    /// Switch `fd` to raw mode. Fails when `fd` is not a terminal.
    pub fn enable(fd: BorrowedFd<'_>) -> io::Result<Self> {
        let saved = termios::tcgetattr(fd)?;
        let fd = fd.try_clone_to_owned()?;

        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&fd, SetArg::TCSANOW, &raw)?;

        Ok(Self { fd, saved })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(&self.fd, SetArg::TCSANOW, &self.saved) {
            log::warn!("failed to restore terminal mode: {}", e);
        }
    }
}
