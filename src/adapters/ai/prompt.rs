//! Message table for the analysis prompt. Uses the `csv` crate for safe serialization.

use crate::domain::{DomainError, Message};
use chrono::DateTime;

/// Convert messages to a semicolon-delimited table: `MessageId;Time;Sender;Text`.
///
/// Messages are written in the order given; callers pass them oldest first.
pub fn messages_to_csv(messages: &[Message]) -> Result<String, DomainError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_writer(Vec::new());

    wtr.write_record(["MessageId", "Time", "Sender", "Text"])
        .map_err(csv_err)?;

    for msg in messages {
        let time = DateTime::from_timestamp(msg.sent_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| msg.sent_at.to_string());

        // One row per message; the csv crate quotes `;` and `"`.
        let text = msg.text.replace("\r\n", " ").replace(['\n', '\r'], " ");

        wtr.write_record([
            msg.message_id.to_string(),
            time,
            msg.sender_label(),
            text,
        ])
        .map_err(csv_err)?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| DomainError::Ai(format!("CSV flush failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| DomainError::Ai(format!("CSV is not UTF-8: {e}")))
}

fn csv_err(e: csv::Error) -> DomainError {
    DomainError::Ai(format!("CSV serialization failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(message_id: i64, sender_name: &str, text: &str) -> Message {
        Message {
            id: message_id,
            chat_id: -100,
            message_id,
            sender_id: 456,
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            sent_at: 1704067200, // 2024-01-01 00:00:00 UTC
            reactions: None,
            created_at: 1704067200,
        }
    }

    #[test]
    fn test_messages_to_csv_basic() {
        let csv = messages_to_csv(&[message(10, "Alice", "Hello world")]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "MessageId;Time;Sender;Text");
        assert_eq!(lines[1], "10;2024-01-01 00:00:00;Alice;Hello world");
    }

    #[test]
    fn test_messages_to_csv_special_chars() {
        let csv =
            messages_to_csv(&[message(1, "Bob", "Hello; with \"quotes\" and\nnewlines")]).unwrap();
        // header + 1 data row
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("\"Hello; with \"\"quotes\"\" and newlines\""));
    }

    #[test]
    fn test_blank_sender_falls_back_to_id() {
        let csv = messages_to_csv(&[message(1, " ", "hi")]).unwrap();
        assert!(csv.contains(";User 456;"));
    }

    #[test]
    fn test_empty_input_is_header_only() {
        let csv = messages_to_csv(&[]).unwrap();
        assert_eq!(csv.trim_end(), "MessageId;Time;Sender;Text");
    }
}
