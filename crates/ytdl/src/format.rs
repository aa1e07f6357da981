//! Human readable renderings used by the pages and the progress endpoint.

pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "0:00".to_string();
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub fn format_view_count(count: u64) -> String {
    match count {
        0 => "0 views".to_string(),
        c if c >= 1_000_000_000 => format!("{:.1}B views", c as f64 / 1_000_000_000.0),
        c if c >= 1_000_000 => format!("{:.1}M views", c as f64 / 1_000_000.0),
        c if c >= 1_000 => format!("{:.1}K views", c as f64 / 1_000.0),
        c => format!("{c} views"),
    }
}

/// Empty string for zero so templates can skip the size column.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes == 0 {
        return String::new();
    }
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} bytes")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.1} GB", b / GB)
    }
}
