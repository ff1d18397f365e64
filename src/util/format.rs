use crate::model::Timestamp;

/// Format a count with thousands separators (12,345)
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a commit timestamp as YYYY-MM-DD in the committer's own offset
pub fn format_timestamp(timestamp: Option<Timestamp>) -> String {
    use time::macros::format_description;
    use time::{OffsetDateTime, UtcOffset};

    let Some(ts) = timestamp else {
        return "unknown".to_string();
    };

    let offset = UtcOffset::from_whole_seconds(ts.offset_minutes * 60).unwrap_or(UtcOffset::UTC);
    OffsetDateTime::from_unix_timestamp(ts.seconds)
        .ok()
        .and_then(|dt| {
            let format = format_description!("[year]-[month]-[day]");
            dt.to_offset(offset).format(&format).ok()
        })
        .unwrap_or_else(|| "unknown".to_string())
}
