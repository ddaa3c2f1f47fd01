use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use native_tls::{HandshakeError, TlsConnector, TlsStream};
use tracing::debug;

use crate::smtp::error::SmtpError;

/// A parsed (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_positive_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .map(|token| token.eq_ignore_ascii_case(cap))
                .unwrap_or(false)
        })
    }

    pub fn message(&self) -> String {
        self.lines.join(" ")
    }
}

#[derive(Debug)]
enum StreamState {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Invalid,
}

/// Blocking SMTP client session against a single relay.
///
/// The stream starts in plain TCP and can be upgraded in place via
/// [`SmtpSession::starttls`]. Every command/reply pair is recorded in the
/// transcript for diagnostics.
pub struct SmtpSession {
    host: String,
    state: StreamState,
    buffer: Vec<u8>,
    timeout: Option<Duration>,
    pub transcript: Vec<String>,
}

impl SmtpSession {
    /// Connects to `host:port`, trying every resolved socket address until
    /// one accepts, and applies `timeout` to connect, reads and writes.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self, SmtpError> {
        let addrs: Vec<SocketAddr> = format!("{host}:{port}")
            .to_socket_addrs()
            .map_err(|source| SmtpError::Connect {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in &addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(timeout).map_err(SmtpError::io)?;
                    stream.set_write_timeout(timeout).map_err(SmtpError::io)?;
                    debug!(host, %addr, "smtp connection established");
                    return Ok(Self {
                        host: host.to_string(),
                        state: StreamState::Plain(stream),
                        buffer: Vec::new(),
                        timeout,
                        transcript: Vec::new(),
                    });
                }
                Err(source) => last_err = Some(source),
            }
        }
        Err(SmtpError::Connect {
            host: host.to_string(),
            source: last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no socket address resolved")
            }),
        })
    }

    /// Reads the server greeting without sending anything.
    pub fn read_banner(&mut self) -> Result<SmtpReply, SmtpError> {
        let reply = self.read_reply()?;
        self.record_reply(&reply);
        Ok(reply)
    }

    /// Sends one command line and reads the reply.
    pub fn send_command(&mut self, command: &str) -> Result<SmtpReply, SmtpError> {
        self.record("C", command);
        let mut data = command.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.write_all(&data)?;
        let reply = self.read_reply()?;
        self.record_reply(&reply);
        Ok(reply)
    }

    /// Issues STARTTLS and, on a positive reply, upgrades the stream.
    pub fn starttls(&mut self, connector: &TlsConnector) -> Result<SmtpReply, SmtpError> {
        let reply = self.send_command("STARTTLS")?;
        if !reply.is_positive_completion() {
            return Ok(reply);
        }

        let mut state = StreamState::Invalid;
        std::mem::swap(&mut self.state, &mut state);
        let plain = match state {
            StreamState::Plain(stream) => stream,
            StreamState::Tls(stream) => {
                self.state = StreamState::Tls(stream);
                return Ok(reply);
            }
            StreamState::Invalid => {
                return Err(SmtpError::Protocol("invalid stream state".into()));
            }
        };

        let mut tls = complete_handshake(connector, &self.host, plain)?;
        if let Some(timeout) = self.timeout {
            tls.get_mut()
                .set_read_timeout(Some(timeout))
                .map_err(SmtpError::io)?;
            tls.get_mut()
                .set_write_timeout(Some(timeout))
                .map_err(SmtpError::io)?;
        }
        self.state = StreamState::Tls(Box::new(tls));
        debug!(host = %self.host, "smtp stream upgraded to TLS");
        Ok(reply)
    }

    /// `AUTH PLAIN` with the given credential. A non-2xx reply is an
    /// [`SmtpError::AuthRejected`], not a probe verdict.
    pub fn auth_plain(&mut self, username: &str, password: &str) -> Result<(), SmtpError> {
        let token = BASE64.encode(format!("\0{username}\0{password}"));
        self.record("C", "AUTH PLAIN ****");
        let mut data = format!("AUTH PLAIN {token}").into_bytes();
        data.extend_from_slice(b"\r\n");
        self.write_all(&data)?;
        let reply = self.read_reply()?;
        self.record_reply(&reply);
        if reply.is_positive_completion() {
            Ok(())
        } else {
            Err(SmtpError::AuthRejected {
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    /// Transmits a full message body after `DATA`, dot-stuffed, terminated
    /// with `<CRLF>.<CRLF>`. Returns the final reply.
    pub fn send_data(&mut self, message: &str) -> Result<SmtpReply, SmtpError> {
        let data_reply = self.send_command("DATA")?;
        if !data_reply.is_positive_intermediate() {
            return Ok(data_reply);
        }

        let mut payload = Vec::with_capacity(message.len() + 8);
        for line in message.split("\r\n") {
            if line.starts_with('.') {
                payload.push(b'.');
            }
            payload.extend_from_slice(line.as_bytes());
            payload.extend_from_slice(b"\r\n");
        }
        payload.extend_from_slice(b".\r\n");
        self.record("C", "<message body>");
        self.write_all(&payload)?;
        let reply = self.read_reply()?;
        self.record_reply(&reply);
        Ok(reply)
    }

    /// Sends QUIT and swallows the reply; teardown must not mask the verdict.
    pub fn quit(&mut self) {
        self.record("C", "QUIT");
        let mut data = b"QUIT".to_vec();
        data.extend_from_slice(b"\r\n");
        if self.write_all(&data).is_ok() {
            if let Ok(reply) = self.read_reply() {
                self.record_reply(&reply);
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        match &mut self.state {
            StreamState::Plain(stream) => {
                stream.write_all(data).map_err(SmtpError::io)?;
                stream.flush().map_err(SmtpError::io)
            }
            StreamState::Tls(stream) => {
                stream.write_all(data).map_err(SmtpError::io)?;
                stream.flush().map_err(SmtpError::io)
            }
            StreamState::Invalid => Err(SmtpError::Protocol("invalid stream state".into())),
        }
    }

    fn read_reply(&mut self) -> Result<SmtpReply, SmtpError> {
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.read_line()?;
            let (parsed_code, is_last, text) = parse_reply_line(&line)?;
            if let Some(existing) = code {
                if existing != parsed_code {
                    return Err(SmtpError::Protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed_code}"
                    )));
                }
            } else {
                code = Some(parsed_code);
            }
            lines.push(text);
            if is_last {
                break;
            }
        }
        Ok(SmtpReply {
            code: code.unwrap_or(0),
            lines,
        })
    }

    fn read_line(&mut self) -> Result<String, SmtpError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                if line.ends_with(b"\r\n") {
                    line.truncate(line.len() - 2);
                } else if line.ends_with(b"\n") {
                    line.truncate(line.len() - 1);
                }
                return String::from_utf8(line)
                    .map_err(|err| SmtpError::Protocol(format!("utf8 error: {err}")));
            }

            let mut buf = [0u8; 512];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut buf),
                StreamState::Tls(stream) => stream.read(&mut buf),
                StreamState::Invalid => {
                    return Err(SmtpError::Protocol("invalid stream state".into()));
                }
            };
            let read = read.map_err(SmtpError::io)?;
            if read == 0 {
                return Err(SmtpError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }

    fn record(&mut self, direction: &str, message: &str) {
        self.transcript
            .push(format!("[{}] {direction}: {message}", self.host));
    }

    fn record_reply(&mut self, reply: &SmtpReply) {
        if reply.lines.is_empty() {
            self.record("S", &format!("{}", reply.code));
        } else {
            let code = reply.code;
            for line in reply.lines.clone() {
                self.record("S", &format!("{code} {line}"));
            }
        }
    }
}

/// Splits one reply line into its code, continuation flag and text. The line
/// comes straight off the wire, so indexing must stay on char boundaries; a
/// reply whose first bytes are not three ASCII digits is a protocol error,
/// never a panic.
fn parse_reply_line(line: &str) -> Result<(u16, bool, String), SmtpError> {
    let head = line
        .get(..3)
        .ok_or_else(|| SmtpError::Protocol(format!("invalid reply: {line}")))?;
    let code = head
        .parse::<u16>()
        .map_err(|_| SmtpError::Protocol(format!("invalid code in line: {line}")))?;
    let is_last = !matches!(line.as_bytes().get(3), Some(b'-'));
    let text = line.get(4..).unwrap_or("").to_string();
    Ok((code, is_last, text))
}

fn complete_handshake(
    connector: &TlsConnector,
    domain: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, SmtpError> {
    match connector.connect(domain, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(SmtpError::tls(err)),
        Err(HandshakeError::WouldBlock(mut mid)) => loop {
            match mid.handshake() {
                Ok(tls) => break Ok(tls),
                Err(HandshakeError::Failure(err)) => break Err(SmtpError::tls(err)),
                Err(HandshakeError::WouldBlock(next)) => mid = next,
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(code: u16, lines: &[&str]) -> SmtpReply {
        SmtpReply {
            code,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn reply_classification() {
        assert!(reply(250, &["Ok"]).is_positive_completion());
        assert!(reply(354, &["go ahead"]).is_positive_intermediate());
        assert!(reply(451, &["later"]).is_transient_failure());
        assert!(reply(550, &["no mailbox"]).is_permanent_failure());
    }

    #[test]
    fn reply_lines_parse_code_continuation_and_text() {
        assert_eq!(
            parse_reply_line("250-STARTTLS").expect("parses"),
            (250, false, "STARTTLS".to_string())
        );
        assert_eq!(
            parse_reply_line("220 ready").expect("parses"),
            (220, true, "ready".to_string())
        );
        assert_eq!(
            parse_reply_line("221").expect("parses"),
            (221, true, String::new())
        );
    }

    #[test]
    fn malformed_reply_lines_are_protocol_errors_not_panics() {
        // multi-byte first bytes must not split a char boundary
        assert!(matches!(
            parse_reply_line("ééé mock"),
            Err(SmtpError::Protocol(_))
        ));
        assert!(matches!(parse_reply_line(""), Err(SmtpError::Protocol(_))));
        assert!(matches!(parse_reply_line("2x"), Err(SmtpError::Protocol(_))));
        assert!(matches!(
            parse_reply_line("abc ok"),
            Err(SmtpError::Protocol(_))
        ));
    }

    #[test]
    fn capability_match_is_case_insensitive() {
        let ehlo = reply(250, &["smtp.example greets you", "STARTTLS", "AUTH PLAIN LOGIN"]);
        assert!(ehlo.has_capability("starttls"));
        assert!(ehlo.has_capability("AUTH"));
        assert!(!ehlo.has_capability("CHUNKING"));
    }
}
