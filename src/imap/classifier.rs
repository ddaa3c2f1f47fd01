/// A fetched message reduced to the two fields bounce heuristics look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub subject: String,
    pub body: String,
}

impl FetchedMessage {
    /// Parses raw RFC 822 text: the unfolded `Subject:` header and the body
    /// after the first blank line. Tolerant of malformed input; missing
    /// pieces come back empty.
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let (headers, body) = match text.split_once("\r\n\r\n") {
            Some((h, b)) => (h, b),
            None => match text.split_once("\n\n") {
                Some((h, b)) => (h, b),
                None => (text.as_ref(), ""),
            },
        };

        let mut subject = String::new();
        let mut in_subject = false;
        for line in headers.lines() {
            if in_subject {
                if line.starts_with(' ') || line.starts_with('\t') {
                    subject.push(' ');
                    subject.push_str(line.trim());
                    continue;
                }
                in_subject = false;
            }
            if let Some(rest) = strip_header(line, "subject:") {
                subject = rest.trim().to_string();
                in_subject = true;
            }
        }

        Self {
            subject,
            body: body.to_string(),
        }
    }
}

fn strip_header<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    // get() keeps multi-byte header names from splitting a char boundary
    let head = line.get(..name.len())?;
    if head.eq_ignore_ascii_case(name) {
        line.get(name.len()..)
    } else {
        None
    }
}

/// Decides whether a mailbox message is a non-delivery notice for the probed
/// address. Real bounce formats vary widely between providers, so the
/// heuristic is a strategy rather than a hard-coded match.
pub trait BounceClassifier {
    fn is_bounce(&self, message: &FetchedMessage, target_address: &str) -> bool;
}

/// Default heuristic: a delivery-failure marker in the subject
/// (case-insensitive) combined with the target address verbatim in the body.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    markers: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.into().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new([
            "bounce",
            "undelivered",
            "undeliverable",
            "delivery status notification",
            "returned to sender",
            "failure notice",
        ])
    }
}

impl BounceClassifier for KeywordClassifier {
    fn is_bounce(&self, message: &FetchedMessage, target_address: &str) -> bool {
        let subject = message.subject.to_ascii_lowercase();
        let marker_hit = self.markers.iter().any(|marker| subject.contains(marker));
        marker_hit && message.body.contains(target_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(subject: &str, body: &str) -> FetchedMessage {
        FetchedMessage {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn parse_extracts_subject_and_body() {
        let raw = b"From: mailer@example.com\r\nSubject: Undelivered Mail\r\n\
                    \tReturned to Sender\r\nDate: x\r\n\r\nuser@example.org was not found\r\n";
        let msg = FetchedMessage::parse(raw);
        assert_eq!(msg.subject, "Undelivered Mail Returned to Sender");
        assert!(msg.body.contains("user@example.org"));
    }

    #[test]
    fn parse_tolerates_multibyte_header_names() {
        let raw = "h\u{e9}llo-\u{e7}: x\r\nSubject: Undeliverable\r\n\r\nghost@example.org\r\n";
        let msg = FetchedMessage::parse(raw.as_bytes());
        assert_eq!(msg.subject, "Undeliverable");
        assert!(msg.body.contains("ghost@example.org"));
    }

    #[test]
    fn parse_tolerates_headerless_input() {
        let msg = FetchedMessage::parse(b"no structure at all");
        assert_eq!(msg.subject, "");
        assert_eq!(msg.body, "");
    }

    #[test]
    fn keyword_match_needs_subject_marker_and_body_address() {
        let classifier = KeywordClassifier::default();
        let target = "ghost@example.org";

        let hit = message("Undelivered Mail Returned to Sender", "ghost@example.org: no such user");
        assert!(classifier.is_bounce(&hit, target));

        let wrong_address = message("Undelivered Mail", "someone-else@example.org failed");
        assert!(!classifier.is_bounce(&wrong_address, target));

        let ordinary = message("Lunch on Friday?", "ghost@example.org mentioned in passing");
        assert!(!classifier.is_bounce(&ordinary, target));
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        let classifier = KeywordClassifier::default();
        let msg = message("BOUNCE notification", "ghost@example.org");
        assert!(classifier.is_bounce(&msg, "ghost@example.org"));
    }
}
