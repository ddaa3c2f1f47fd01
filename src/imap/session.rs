use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};
use tracing::debug;

use crate::imap::error::ImapError;

/// Completion status of a tagged IMAP command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapStatus {
    Ok,
    No,
    Bad,
}

/// Everything the server said in response to one tagged command: the
/// untagged lines, any literals they carried, and the final status.
#[derive(Debug, Clone)]
pub struct ImapResponse {
    pub status: ImapStatus,
    pub info: String,
    pub untagged: Vec<String>,
    pub literals: Vec<Vec<u8>>,
}

impl ImapResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, ImapStatus::Ok)
    }
}

/// Blocking IMAP4 client session over implicit TLS (typically port 993).
///
/// Only the narrow slice of the protocol the bounce monitor needs is spoken
/// here: LOGIN, SELECT, SEARCH, FETCH and LOGOUT, with `{n}` literal parsing
/// for fetched messages.
pub struct ImapSession {
    stream: TlsStream<TcpStream>,
    buffer: Vec<u8>,
    tag_counter: u32,
}

impl ImapSession {
    /// Connects to `host:port` and completes the TLS handshake, then reads
    /// the server greeting.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self, ImapError> {
        let addrs: Vec<SocketAddr> = format!("{host}:{port}")
            .to_socket_addrs()
            .map_err(|source| ImapError::Connect {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_err = None;
        let mut tcp = None;
        for addr in &addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(source) => last_err = Some(source),
            }
        }
        let tcp = tcp.ok_or_else(|| ImapError::Connect {
            host: host.to_string(),
            source: last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no socket address resolved")
            }),
        })?;
        tcp.set_read_timeout(timeout).map_err(ImapError::io)?;
        tcp.set_write_timeout(timeout).map_err(ImapError::io)?;

        let connector = TlsConnector::new().map_err(ImapError::tls)?;
        let stream = complete_handshake(&connector, host, tcp)?;

        let mut session = Self {
            stream,
            buffer: Vec::new(),
            tag_counter: 0,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(ImapError::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        debug!(host, "imap session established");
        Ok(session)
    }

    /// `LOGIN` with quoted credentials. A `NO` status maps to
    /// [`ImapError::AuthRejected`].
    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        let command = format!(
            "LOGIN {} {}",
            quote_string(username),
            quote_string(password)
        );
        let response = self.run_command(&command)?;
        match response.status {
            ImapStatus::Ok => Ok(()),
            _ => Err(ImapError::AuthRejected(response.info)),
        }
    }

    pub fn select_inbox(&mut self) -> Result<(), ImapError> {
        let response = self.run_command("SELECT INBOX")?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(ImapError::CommandFailed {
                command: "SELECT INBOX".to_string(),
                info: response.info,
            })
        }
    }

    /// Returns the sequence numbers of unseen messages in the selected
    /// mailbox.
    pub fn search_unseen(&mut self) -> Result<Vec<u32>, ImapError> {
        let response = self.run_command("SEARCH UNSEEN")?;
        if !response.is_ok() {
            return Err(ImapError::CommandFailed {
                command: "SEARCH UNSEEN".to_string(),
                info: response.info,
            });
        }
        let mut ids = Vec::new();
        for line in &response.untagged {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                for token in rest.split_whitespace() {
                    if let Ok(id) = token.parse::<u32>() {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Fetches the full RFC 822 text of one message. The fetch marks the
    /// message `\Seen`, so a later `SEARCH UNSEEN` will not return it again.
    pub fn fetch_message(&mut self, seq: u32) -> Result<Vec<u8>, ImapError> {
        let command = format!("FETCH {seq} (RFC822)");
        let response = self.run_command(&command)?;
        if !response.is_ok() {
            return Err(ImapError::CommandFailed {
                command,
                info: response.info,
            });
        }
        response
            .literals
            .into_iter()
            .next()
            .ok_or_else(|| ImapError::Protocol(format!("FETCH {seq} returned no literal")))
    }

    /// Best-effort LOGOUT; teardown must not mask the caller's verdict.
    pub fn logout(&mut self) {
        let _ = self.run_command("LOGOUT");
    }

    fn run_command(&mut self, command: &str) -> Result<ImapResponse, ImapError> {
        self.tag_counter += 1;
        let tag = format!("a{:03}", self.tag_counter);
        let line = format!("{tag} {command}\r\n");
        self.stream
            .write_all(line.as_bytes())
            .map_err(ImapError::io)?;
        self.stream.flush().map_err(ImapError::io)?;

        let mut untagged = Vec::new();
        let mut literals = Vec::new();
        loop {
            let line = self.read_line()?;
            if let Some(rest) = line.strip_prefix(&format!("{tag} ")) {
                let (status, info) = parse_tagged(rest)?;
                return Ok(ImapResponse {
                    status,
                    info,
                    untagged,
                    literals,
                });
            }
            if let Some(size) = literal_size(&line) {
                literals.push(self.read_exact_buffered(size)?);
            }
            untagged.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                if line.ends_with(b"\r\n") {
                    line.truncate(line.len() - 2);
                } else if line.ends_with(b"\n") {
                    line.truncate(line.len() - 1);
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            self.fill_buffer()?;
        }
    }

    fn read_exact_buffered(&mut self, size: usize) -> Result<Vec<u8>, ImapError> {
        while self.buffer.len() < size {
            self.fill_buffer()?;
        }
        Ok(self.buffer.drain(..size).collect())
    }

    fn fill_buffer(&mut self) -> Result<(), ImapError> {
        let mut buf = [0u8; 4096];
        let read = self.stream.read(&mut buf).map_err(ImapError::io)?;
        if read == 0 {
            return Err(ImapError::io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        self.buffer.extend_from_slice(&buf[..read]);
        Ok(())
    }
}

fn parse_tagged(rest: &str) -> Result<(ImapStatus, String), ImapError> {
    let (word, info) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match word {
        "OK" => ImapStatus::Ok,
        "NO" => ImapStatus::No,
        "BAD" => ImapStatus::Bad,
        other => {
            return Err(ImapError::Protocol(format!(
                "unknown completion status: {other}"
            )));
        }
    };
    Ok((status, info.to_string()))
}

/// Extracts `n` from a line ending in `{n}` (an IMAP literal announcement).
fn literal_size(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let inner = line.get(open + 1..line.len() - 1)?;
    if !line.ends_with('}') {
        return None;
    }
    inner.parse::<usize>().ok()
}

fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn complete_handshake(
    connector: &TlsConnector,
    domain: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, ImapError> {
    match connector.connect(domain, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(ImapError::tls(err)),
        Err(HandshakeError::WouldBlock(mut mid)) => loop {
            match mid.handshake() {
                Ok(tls) => break Ok(tls),
                Err(HandshakeError::Failure(err)) => break Err(ImapError::tls(err)),
                Err(HandshakeError::WouldBlock(next)) => mid = next,
            }
        },
    }
}
