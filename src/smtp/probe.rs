use std::time::Duration;

use native_tls::TlsConnector;
use tracing::{debug, warn};

use crate::smtp::error::SmtpError;
use crate::smtp::message::{build_probe_message, probe_token};
use crate::smtp::session::{SmtpReply, SmtpSession};

/// How the relay answered a `RCPT TO` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 2xx: the relay accepts mail for the recipient.
    Accepted(SmtpReply),
    /// 5xx: the relay explicitly refused the recipient.
    Rejected(SmtpReply),
    /// 4xx or anything else: no confident verdict.
    Indeterminate(SmtpReply),
}

/// Result of transmitting a test message through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The relay accepted the message; `token` correlates the bounce watch.
    Sent { token: String, reply: SmtpReply },
    /// The relay refused the recipient or the message body.
    Refused(SmtpReply),
}

/// A credentialed outbound relay used for both probe strategies.
///
/// Unlike probing a domain's own MX hosts, every session here goes through
/// one configured submission server: connect, EHLO, STARTTLS, EHLO again,
/// authenticate, then either ask about the recipient or deliver a probe
/// message. Sessions are always closed with QUIT.
#[derive(Debug, Clone)]
pub struct RelayProbe {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub helo: String,
    pub timeout: Option<Duration>,
    pub require_starttls: bool,
}

impl RelayProbe {
    /// Issues `RCPT TO:<address>` and classifies the numeric reply.
    pub fn rcpt_probe(&self, address: &str) -> Result<ProbeOutcome, SmtpError> {
        let mut session = self.open_session()?;
        let result = self.rcpt_dialogue(&mut session, address);
        session.quit();
        result
    }

    /// Transmits a complete test message to `address`. Success only proves
    /// the submission relay took the message, which is why the bounce
    /// monitor exists.
    pub fn send_probe(&self, address: &str) -> Result<SendOutcome, SmtpError> {
        let mut session = self.open_session()?;
        let result = self.send_dialogue(&mut session, address);
        session.quit();
        result
    }

    fn rcpt_dialogue(
        &self,
        session: &mut SmtpSession,
        address: &str,
    ) -> Result<ProbeOutcome, SmtpError> {
        let mail_reply = session.send_command(&format!("MAIL FROM:<{}>", self.username))?;
        if !mail_reply.is_positive_completion() {
            return Err(SmtpError::Protocol(format!(
                "MAIL FROM rejected with {}",
                mail_reply.code
            )));
        }

        let rcpt_reply = session.send_command(&format!("RCPT TO:<{address}>"))?;
        let outcome = classify_rcpt(rcpt_reply);
        debug!(address, ?outcome, "rcpt probe concluded");

        let _ = session.send_command("RSET");
        Ok(outcome)
    }

    fn send_dialogue(
        &self,
        session: &mut SmtpSession,
        address: &str,
    ) -> Result<SendOutcome, SmtpError> {
        let mail_reply = session.send_command(&format!("MAIL FROM:<{}>", self.username))?;
        if !mail_reply.is_positive_completion() {
            return Err(SmtpError::Protocol(format!(
                "MAIL FROM rejected with {}",
                mail_reply.code
            )));
        }

        let rcpt_reply = session.send_command(&format!("RCPT TO:<{address}>"))?;
        if !rcpt_reply.is_positive_completion() {
            warn!(address, code = rcpt_reply.code, "relay refused recipient");
            return Ok(SendOutcome::Refused(rcpt_reply));
        }

        let token = probe_token();
        let message = build_probe_message(&self.username, address, &token);
        let reply = session.send_data(&message)?;
        if reply.is_positive_completion() {
            debug!(address, %token, "probe message accepted by relay");
            Ok(SendOutcome::Sent { token, reply })
        } else {
            warn!(address, code = reply.code, "relay refused probe message");
            Ok(SendOutcome::Refused(reply))
        }
    }

    fn open_session(&self) -> Result<SmtpSession, SmtpError> {
        let mut session = SmtpSession::connect(&self.host, self.port, self.timeout)?;
        let banner = session.read_banner()?;
        if !banner.is_positive_completion() {
            session.quit();
            return Err(SmtpError::Protocol(format!(
                "unexpected greeting: {}",
                banner.code
            )));
        }

        let ehlo_cmd = format!("EHLO {}", self.helo);
        let ehlo = session.send_command(&ehlo_cmd)?;
        if !ehlo.is_positive_completion() {
            session.quit();
            return Err(SmtpError::Protocol(format!(
                "EHLO rejected with {}",
                ehlo.code
            )));
        }

        let starttls_advertised = ehlo.has_capability("STARTTLS");
        if self.require_starttls && !starttls_advertised {
            session.quit();
            return Err(SmtpError::StartTlsUnavailable {
                host: self.host.clone(),
            });
        }
        if starttls_advertised {
            let connector = TlsConnector::new().map_err(SmtpError::tls)?;
            let tls_reply = session.starttls(&connector)?;
            if !tls_reply.is_positive_completion() {
                session.quit();
                return Err(SmtpError::Protocol(format!(
                    "STARTTLS rejected with {}",
                    tls_reply.code
                )));
            }
            let _ = session.send_command(&ehlo_cmd)?;
        }

        if !self.username.is_empty() {
            if let Err(err) = session.auth_plain(&self.username, &self.password) {
                session.quit();
                return Err(err);
            }
        }

        Ok(session)
    }
}

fn classify_rcpt(reply: SmtpReply) -> ProbeOutcome {
    if reply.is_positive_completion() {
        ProbeOutcome::Accepted(reply)
    } else if reply.is_permanent_failure() {
        ProbeOutcome::Rejected(reply)
    } else {
        ProbeOutcome::Indeterminate(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    fn spawn_mock_server(
        script: Vec<(&'static str, &'static str)>,
    ) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().expect("addr").port();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            ready_tx.send(()).ok();
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = handle_session(&mut stream, script);
            }
        });
        ready_rx.recv().expect("server ready");
        (port, handle)
    }

    fn handle_session(
        stream: &mut TcpStream,
        script: Vec<(&'static str, &'static str)>,
    ) -> io::Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        stream.write_all(b"220 mock.smtp.test ESMTP\r\n")?;
        stream.flush()?;
        for (expected, response) in script {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            while expected == "<body>" && !line.trim_end().eq(".") {
                line.clear();
                reader.read_line(&mut line)?;
            }
            if expected != "<body>" {
                assert!(
                    line.starts_with(expected),
                    "expected command starting with '{expected}', got '{line}'"
                );
            }
            stream.write_all(response.as_bytes())?;
            stream.flush()?;
        }
        Ok(())
    }

    fn probe_for(port: u16) -> RelayProbe {
        RelayProbe {
            host: "127.0.0.1".to_string(),
            port,
            username: String::new(),
            password: String::new(),
            helo: "probe.test".to_string(),
            timeout: Some(std::time::Duration::from_secs(5)),
            require_starttls: false,
        }
    }

    #[test]
    fn classify_rcpt_maps_reply_classes() {
        let reply = |code| SmtpReply {
            code,
            lines: vec![String::new()],
        };
        assert!(matches!(classify_rcpt(reply(250)), ProbeOutcome::Accepted(_)));
        assert!(matches!(classify_rcpt(reply(550)), ProbeOutcome::Rejected(_)));
        assert!(matches!(
            classify_rcpt(reply(451)),
            ProbeOutcome::Indeterminate(_)
        ));
    }

    #[test]
    #[ignore = "requires loopback TCP binding"]
    fn rcpt_probe_accepts_on_250() {
        let (port, handle) = spawn_mock_server(vec![
            ("EHLO", "250-mock.example\r\n250 PIPELINING\r\n"),
            ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
            ("RCPT TO:", "250 2.1.5 Ok\r\n"),
            ("RSET", "250 2.0.0 Reset\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ]);
        let outcome = probe_for(port)
            .rcpt_probe("user@example.com")
            .expect("probe");
        assert!(matches!(outcome, ProbeOutcome::Accepted(_)));
        handle.join().expect("server thread");
    }

    #[test]
    #[ignore = "requires loopback TCP binding"]
    fn rcpt_probe_rejects_on_550() {
        let (port, handle) = spawn_mock_server(vec![
            ("EHLO", "250 mock.example\r\n"),
            ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
            ("RCPT TO:", "550 5.1.1 User unknown\r\n"),
            ("RSET", "250 2.0.0 Reset\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ]);
        let outcome = probe_for(port)
            .rcpt_probe("ghost@example.com")
            .expect("probe");
        match outcome {
            ProbeOutcome::Rejected(reply) => assert_eq!(reply.code, 550),
            other => panic!("unexpected outcome: {other:?}"),
        }
        handle.join().expect("server thread");
    }

    #[test]
    #[ignore = "requires loopback TCP binding"]
    fn send_probe_reports_sent_with_token() {
        let (port, handle) = spawn_mock_server(vec![
            ("EHLO", "250 mock.example\r\n"),
            ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
            ("RCPT TO:", "250 2.1.5 Ok\r\n"),
            ("DATA", "354 go ahead\r\n"),
            ("<body>", "250 2.0.0 queued\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ]);
        let outcome = probe_for(port)
            .send_probe("user@example.com")
            .expect("send");
        match outcome {
            SendOutcome::Sent { token, reply } => {
                assert_eq!(token.len(), 12);
                assert_eq!(reply.code, 250);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        handle.join().expect("server thread");
    }
}
