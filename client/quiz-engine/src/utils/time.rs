use std::time::Duration;

/// Whole seconds, rounded down; what the backend expects for elapsed time.
pub fn whole_seconds(elapsed: Duration) -> u64 {
    elapsed.as_secs()
}

/// `mm:ss`, or `h:mm:ss` past the hour.
pub fn format_clock(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
