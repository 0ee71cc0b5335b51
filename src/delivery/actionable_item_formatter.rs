//! Renders an extracted action item as a WhatsApp-readable "visual card"
//! and as an RFC 5545 calendar event, localized to English or Hebrew.

use chrono::NaiveDateTime;
use serde_json::Value;

struct Strings {
    header_icon: &'static str,
    divider: &'static str,
    group: &'static str,
    goal: &'static str,
    deadline_text: &'static str,
    deadline_date: &'static str,
    context_header: &'static str,
}

const EN: Strings = Strings {
    header_icon: "📝",
    divider: "─────────────────",
    group: "📂 *Group*",
    goal: "📌 *Description*",
    deadline_text: "⏰ *Due (from text)*",
    deadline_date: "🗓️ *Date*",
    context_header: "💬 *Relevant Messages*",
};

const HE: Strings = Strings {
    header_icon: "📝",
    divider: "─────────────────",
    group: "📂 *קבוצה*",
    goal: "📌 *תיאור*",
    deadline_text: "⏰ *מועד (ממקור הטקסט)*",
    deadline_date: "🗓️ *תאריך יעד*",
    context_header: "💬 *הודעות רלוונטיות*",
};

fn strings_for(language_code: &str) -> &'static Strings {
    match language_code {
        "he" => &HE,
        _ => &EN,
    }
}

fn field(item: &Value, key: &str) -> String {
    item.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

pub fn format_card(item: &Value, language_code: &str) -> String {
    let s = strings_for(language_code);

    let title = item.get("task_title").and_then(Value::as_str).unwrap_or("Untitled Task");
    let group_name = field(item, "group_display_name");
    let description = field(item, "task_description");
    let text_deadline = field(item, "text_deadline");
    let timestamp_deadline = field(item, "timestamp_deadline");

    let mut lines = vec![format!("{} *{}*", s.header_icon, title), s.divider.to_string()];

    if !group_name.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}: {}", s.group, group_name));
    }
    if !description.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}: {}", s.goal, description));
    }
    if !text_deadline.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}: {}", s.deadline_text, text_deadline));
    }
    if !timestamp_deadline.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}: {}", s.deadline_date, timestamp_deadline));
    }
    lines.push(String::new());

    if let Some(messages) = item.get("relevant_task_messages").and_then(Value::as_array) {
        if !messages.is_empty() {
            lines.push(s.context_header.to_string());
            for message in messages {
                let sender = message.get("sender").and_then(Value::as_str).unwrap_or("Unknown");
                let content = message.get("content").and_then(Value::as_str).unwrap_or("");
                lines.push(format!("> \"_{content}_\""));
                lines.push(format!("> — {sender}"));
                lines.push(String::new());
            }
        }
    }

    lines.join("\n")
}

fn escape_ics_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace(';', "\\;").replace(',', "\\,").replace('\n', "\\n")
}

fn format_ics_timestamp(dt: NaiveDateTime) -> String {
    dt.format("%Y%m%dT%H%M%S").to_string()
}

/// Builds a one-hour VEVENT ending at `timestamp_deadline` (parsed as
/// `YYYY-MM-DD HH:MM:SS`), falling back to 24 hours from now if the
/// deadline is missing or malformed.
pub fn generate_ics(item: &Value, now: NaiveDateTime) -> Vec<u8> {
    let title = item.get("task_title").and_then(Value::as_str).unwrap_or("Actionable Item");
    let description = field(item, "task_description");
    let deadline_str = field(item, "timestamp_deadline");

    let end = NaiveDateTime::parse_from_str(&deadline_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| now + chrono::Duration::hours(24));
    let start = end - chrono::Duration::hours(1);

    let uid = format!("{}@chatimposter.internal", uuid::Uuid::new_v4());

    let body = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//chatimposter//ActionableQueue//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{uid}"),
        format!("DTSTAMP:{}", format_ics_timestamp(now)),
        format!("DTSTART:{}", format_ics_timestamp(start)),
        format!("DTEND:{}", format_ics_timestamp(end)),
        format!("SUMMARY:{}", escape_ics_text(title)),
        format!("DESCRIPTION:{}", escape_ics_text(&description)),
        "STATUS:CONFIRMED".to_string(),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ]
    .join("\r\n");

    body.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn format_card_includes_title_and_group() {
        let item = serde_json::json!({
            "task_title": "Submit report",
            "group_display_name": "Ops Team",
            "task_description": "Quarterly numbers",
        });
        let card = format_card(&item, "en");
        assert!(card.contains("Submit report"));
        assert!(card.contains("Ops Team"));
        assert!(card.contains("Quarterly numbers"));
    }

    #[test]
    fn format_card_uses_hebrew_strings() {
        let item = serde_json::json!({"task_title": "x", "group_display_name": "y"});
        let card = format_card(&item, "he");
        assert!(card.contains("קבוצה"));
    }

    #[test]
    fn generate_ics_escapes_special_characters() {
        let item = serde_json::json!({
            "task_title": "Comma, semi; back\\slash",
            "task_description": "line1\nline2",
        });
        let now = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let ics = String::from_utf8(generate_ics(&item, now)).unwrap();
        assert!(ics.contains("SUMMARY:Comma\\, semi\\; back\\\\slash"));
        assert!(ics.contains("DESCRIPTION:line1\\nline2"));
        assert!(ics.starts_with("BEGIN:VCALENDAR"));
        assert!(ics.trim_end().ends_with("END:VCALENDAR"));
    }

    #[test]
    fn generate_ics_falls_back_when_deadline_unparseable() {
        let item = serde_json::json!({"task_title": "No deadline"});
        let now = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let ics = String::from_utf8(generate_ics(&item, now)).unwrap();
        assert!(ics.contains("DTSTART:20260728T110000"));
        assert!(ics.contains("DTEND:20260728T120000"));
    }
}
