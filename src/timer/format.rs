//! Countdown and duration display helpers.

/// `HH:MM:SS`, hours unbounded.
pub fn format_hms(total_secs: u64) -> String {
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// `MM:SS`, minutes keep counting past 59.
pub fn format_ms(total_secs: u64) -> String {
    let m = total_secs / 60;
    let s = total_secs % 60;
    format!("{:02}:{:02}", m, s)
}

/// Countdown display: `MM:SS` under an hour, `HH:MM:SS` from an hour on.
pub fn format_clock(total_secs: u64) -> String {
    if total_secs >= 3600 {
        format_hms(total_secs)
    } else {
        format_ms(total_secs)
    }
}

/// Compact duration for session lists, e.g. `1h 05m`, `25m`, `40s`.
pub fn format_duration_short(total_secs: u64) -> String {
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    match (h, m) {
        (0, 0) => format!("{}s", total_secs),
        (0, m) => format!("{}m", m),
        (h, m) => format!("{}h {:02}m", h, m),
    }
}

/// Fraction of the phase already consumed, in `[0, 1]`.
pub fn progress_fraction(total_time: u64, time_remaining: u64) -> f64 {
    if total_time == 0 {
        return 0.0;
    }
    let consumed = total_time.saturating_sub(time_remaining);
    consumed as f64 / total_time as f64
}
