//! Renders an `AnalysisResult` as a Telegram Markdown message.
//!
//! Pure: the generation time is passed in. Output never exceeds `MAX_MESSAGE_LENGTH`
//! characters; longer renderings are cut and end with `TRUNCATION_MARKER`.

use crate::domain::{AnalysisResult, QuestionAnalysis};
use crate::shared::config::MAX_MESSAGE_LENGTH;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use tracing::warn;

pub const TRUNCATION_MARKER: &str = "\n\n_[Report truncated due to length limit]_";

const SEPARATOR: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const FOOTER: &str = "_This report was generated automatically_";

/// Render the daily report for one chat.
pub fn format_report(
    result: &AnalysisResult,
    chat_name: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let summary = &result.summary;
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "📊 *Daily Communication Report*");
    let _ = writeln!(out, "Chat: {}", escape_markdown(chat_name));
    let _ = writeln!(out, "Period: Last 24 hours");
    let _ = writeln!(
        out,
        "Generated: {}",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(out, "\n{SEPARATOR}\n");

    let _ = writeln!(out, "📈 *Summary*");
    let _ = writeln!(out, "• Total Questions: {}", summary.total_questions);
    let _ = writeln!(out, "• Answered: {}", summary.answered);
    let _ = writeln!(out, "• Unanswered: {}", summary.unanswered);
    if let Some(avg) = summary.avg_response_time_minutes {
        let _ = writeln!(out, "• Avg Response Time: {}", format_duration(avg));
    }

    if let Some(breakdown) = response_breakdown(&result.questions) {
        let _ = writeln!(out, "\n⏱ *Response Time Breakdown*");
        let _ = writeln!(out, "• Fast (<1h): {}", breakdown[0]);
        let _ = writeln!(out, "• Medium (1-4h): {}", breakdown[1]);
        let _ = writeln!(out, "• Slow (4-24h): {}", breakdown[2]);
        let _ = writeln!(out, "• Very slow (>24h): {}", breakdown[3]);
    }

    let _ = writeln!(out, "\n{SEPARATOR}\n");

    if !result.questions.is_empty() {
        let _ = writeln!(out, "❓ *Questions Identified*\n");
        for (i, q) in result.questions.iter().enumerate() {
            let status = if q.is_answered {
                "✅ Answered"
            } else {
                "⏳ Pending"
            };
            let _ = writeln!(out, "{}. {} | {}", i + 1, status, q.category.label());
            let _ = writeln!(out, "   {}", escape_markdown(&q.text));
            if let (true, Some(minutes)) = (q.is_answered, q.response_time_minutes) {
                let _ = writeln!(out, "   Response time: {}", format_duration(minutes));
            }
            out.push('\n');
        }
    }

    let _ = write!(out, "{SEPARATOR}\n\n{FOOTER}");

    truncate_to_limit(out, MAX_MESSAGE_LENGTH)
}

/// Cut `text` so that, with the marker appended, it fits in `max_chars` characters.
pub fn truncate_to_limit(text: String, max_chars: usize) -> String {
    let len = text.chars().count();
    if len <= max_chars {
        return text;
    }
    warn!(len, max_chars, "report exceeds message limit, truncating");
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// `45m`, `2h`, `2h 30m`.
pub fn format_duration(minutes: f64) -> String {
    let minutes = minutes.max(0.0);
    if minutes < 60.0 {
        return format!("{}m", minutes as u64);
    }
    let hours = (minutes / 60.0) as u64;
    let mins = (minutes % 60.0) as u64;
    if mins == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {mins}m")
    }
}

/// Counts of answered questions per bucket: <1h, 1-4h, 4-24h, >=24h.
/// `None` when no answered question carries a response time.
fn response_breakdown(questions: &[QuestionAnalysis]) -> Option<[usize; 4]> {
    let mut buckets = [0usize; 4];
    let mut any = false;
    for minutes in questions
        .iter()
        .filter(|q| q.is_answered)
        .filter_map(|q| q.response_time_minutes)
    {
        any = true;
        let idx = match minutes {
            m if m < 60.0 => 0,
            m if m < 240.0 => 1,
            m if m < 1440.0 => 2,
            _ => 3,
        };
        buckets[idx] += 1;
    }
    any.then_some(buckets)
}

/// Escape characters that legacy Telegram Markdown treats as entity delimiters.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
