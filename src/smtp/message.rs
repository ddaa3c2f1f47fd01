use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};

/// Random token embedded in the probe subject and Message-ID so the bounce
/// monitor can correlate a notification with the probe that caused it.
pub fn probe_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

/// Builds the RFC 2822 test message transmitted under the send-and-wait
/// strategy. Lines are CRLF-separated; dot-stuffing happens at the session
/// layer.
pub fn build_probe_message(from: &str, to: &str, token: &str) -> String {
    let date = Utc::now().to_rfc2822();
    let from_domain = from.rsplit('@').next().unwrap_or("localhost");
    [
        format!("From: <{from}>"),
        format!("To: <{to}>"),
        format!("Subject: Address verification probe {token}"),
        format!("Date: {date}"),
        format!("Message-ID: <{token}@{from_domain}>"),
        "MIME-Version: 1.0".to_string(),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        String::new(),
        "This is an automated deliverability probe.".to_string(),
        "No action is required; the message can be ignored.".to_string(),
    ]
    .join("\r\n")
}
