//! Secure-entry agent backend (`pinentry`)
//!
//! Speaks the Assuan line protocol with a long-lived `pinentry` process:
//!
//! ```text
//! < OK Pleased to meet you
//! > SETTITLE PIN
//! < OK
//! > GETPIN
//! < D 1234
//! < OK
//! > BYE
//! ```
//!
//! Command arguments and `D` payloads are percent-escaped (`%`, CR, LF).
//! The session is closed when the [`Pinentry`] is dropped.

use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use zeroize::Zeroizing;

use super::{PromptBackend, PromptError, PromptRequest};
use crate::memory::SecretBuffer;

/// gpg-error code for "Operation cancelled".
const GPG_ERR_CANCELED: u32 = 99;

/// The error-code part of a gpg-error value (the rest encodes the source).
const GPG_ERR_CODE_MASK: u32 = 0xFFFF;

/// Terminal handed to curses/tty flavours of pinentry when set.
const TTY_ENV_VAR: &str = "GPG_TTY";

/// One server line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Err { code: u32, message: String },
    /// Percent-decoded `D` payload.
    Data(Vec<u8>),
    Status(String),
    Inquire(String),
    Comment,
    Unknown(String),
}

/// Parse one line (without its terminating newline).
pub fn parse_response(line: &[u8]) -> Response {
    let (keyword, rest) = match line.iter().position(|&b| b == b' ') {
        Some(i) => (&line[..i], &line[i + 1..]),
        None => (line, &line[line.len()..]),
    };
    let text = || String::from_utf8_lossy(rest).into_owned();

    match keyword {
        b"OK" => Response::Ok,
        b"ERR" => {
            let rest = text();
            let (code, message) = rest.split_once(' ').unwrap_or((rest.as_str(), ""));
            Response::Err {
                code: code.parse().unwrap_or(0),
                message: message.to_string(),
            }
        }
        b"D" => Response::Data(percent_decode(rest)),
        b"S" => Response::Status(text()),
        b"INQUIRE" => Response::Inquire(text()),
        _ if keyword.first() == Some(&b'#') => Response::Comment,
        _ => Response::Unknown(String::from_utf8_lossy(line).into_owned()),
    }
}

/// Escape a command argument.
pub fn percent_encode(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    for ch in arg.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            _ => out.push(ch),
        }
    }
    out
}

/// Undo `%XX` escapes; malformed escapes are kept verbatim.
pub fn percent_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'%' && i + 2 < data.len() {
            if let (Some(hi), Some(lo)) = (hex_value(data[i + 1]), hex_value(data[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|d| d as u8)
}

/// Client side of an Assuan conversation over any reader/writer pair.
#[derive(Debug)]
pub struct AssuanSession<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> AssuanSession<R, W> {
    /// Wrap a connection and consume the server greeting.
    pub fn connect(reader: R, writer: W) -> Result<Self, PromptError> {
        let mut session = Self { reader, writer };
        session.read_until_done()?;
        Ok(session)
    }

    /// Send `command [arg]` and wait for the final `OK`/`ERR`.
    ///
    /// Returns the concatenated `D` payloads.
    pub fn transact(
        &mut self,
        command: &str,
        arg: Option<&str>,
    ) -> Result<Zeroizing<Vec<u8>>, PromptError> {
        let line = match arg {
            Some(arg) if !arg.is_empty() => format!("{} {}\n", command, percent_encode(arg)),
            _ => format!("{}\n", command),
        };
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.read_until_done()
    }

    fn read_until_done(&mut self) -> Result<Zeroizing<Vec<u8>>, PromptError> {
        let mut data = Zeroizing::new(Vec::new());
        loop {
            let mut line = Zeroizing::new(Vec::new());
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                return Err(PromptError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "pinentry closed the connection",
                )));
            }
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }

            match parse_response(&line) {
                Response::Ok => return Ok(data),
                Response::Err { code, message } => {
                    return Err(if code & GPG_ERR_CODE_MASK == GPG_ERR_CANCELED {
                        PromptError::Cancelled
                    } else {
                        PromptError::Agent(format!("{} ({})", message, code))
                    });
                }
                Response::Data(mut chunk) => {
                    data.extend_from_slice(&chunk);
                    zeroize::Zeroize::zeroize(&mut chunk);
                }
                Response::Inquire(keyword) => {
                    log::debug!("pinentry inquired {:?}; cancelling the inquiry", keyword);
                    self.writer.write_all(b"CAN\n")?;
                    self.writer.flush()?;
                }
                Response::Status(_) | Response::Comment => {}
                Response::Unknown(other) => {
                    log::debug!("ignoring unexpected pinentry line {:?}", other);
                }
            }
        }
    }

    /// Say goodbye; errors are irrelevant at this point.
    fn bye(&mut self) {
        let _ = self.writer.write_all(b"BYE\n");
        let _ = self.writer.flush();
    }
}

/// A running `pinentry` process.
#[derive(Debug)]
pub struct Pinentry {
    /// Taken on drop so the agent sees end-of-file before it is reaped.
    session: Option<AssuanSession<BufReader<ChildStdout>, ChildStdin>>,
    child: Child,
}

impl Pinentry {
    /// Start the agent and open the session.
    pub fn spawn(program: &Path) -> Result<Self, PromptError> {
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PromptError::Agent("pinentry pipes are unavailable".into()));
        };

        let mut session = match AssuanSession::connect(BufReader::new(stdout), stdin) {
            Ok(session) => session,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        if let Ok(tty) = std::env::var(TTY_ENV_VAR) {
            let option = format!("ttyname={}", tty);
            if let Err(e) = session.transact("OPTION", Some(&option)) {
                log::debug!("pinentry rejected {}: {}", option, e);
            }
        }

        Ok(Self {
            session: Some(session),
            child,
        })
    }
}

impl PromptBackend for Pinentry {
    fn get_secret(&mut self, request: &PromptRequest) -> Result<SecretBuffer, PromptError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PromptError::Agent("pinentry session is closed".into()))?;
        get_pin(session, request)
    }
}

impl Drop for Pinentry {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.bye();
        }
        match self.child.wait() {
            Ok(status) => log::debug!("pinentry exited with {}", status),
            Err(e) => log::debug!("failed to reap pinentry: {}", e),
        }
    }
}

/// Describe the prompt and request the PIN.
pub fn get_pin<R: BufRead, W: Write>(
    session: &mut AssuanSession<R, W>,
    request: &PromptRequest,
) -> Result<SecretBuffer, PromptError> {
    session.transact("SETTITLE", Some(&request.title))?;
    session.transact("SETDESC", Some(&request.description))?;
    session.transact("SETPROMPT", Some(&request.title))?;
    session.transact("SETOK", Some(&request.ok_label))?;
    session.transact("SETCANCEL", Some(&request.cancel_label))?;

    let pin = session.transact("GETPIN", None)?;
    Ok(SecretBuffer::new(pin.to_vec()))
}
