use nowify_core::PlaybackRecord;

pub const WAITING_TITLE: &str = "Waiting for music...";

fn clock(ms: u64) -> String {
    let secs = ms / 1_000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// One-line human summary of a record.
pub fn summary_line(record: &PlaybackRecord) -> String {
    let provider = record
        .provider
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    if record.is_idle() {
        return format!("[{provider}] {WAITING_TITLE}");
    }

    let state = if record.playing { "playing" } else { "paused" };
    let mut line = format!("[{provider}] {state}: {}", record.track_title);
    let artists = record.artist_line();
    if !artists.is_empty() {
        line.push_str(&format!(" - {artists}"));
    }
    if let Some(album) = &record.album.title {
        line.push_str(&format!(" ({album})"));
    }
    if record.duration_ms > 0 {
        line.push_str(&format!(
            " {}/{}",
            clock(record.progress_ms),
            clock(record.duration_ms)
        ));
    }
    if !record.tags.is_empty() {
        line.push_str(&format!(" #{}", record.tags.join(" #")));
    }
    line
}

/// Detail lines printed under the summary by `status`.
pub fn detail_lines(record: &PlaybackRecord) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(url) = &record.track_url {
        lines.push(format!("url: {url}"));
    }
    if let Some(date) = &record.release_date {
        lines.push(format!("released: {date}"));
    }
    if let Some(popularity) = record.popularity {
        lines.push(format!("popularity: {popularity}"));
    }
    if let Some(next) = &record.next_track {
        lines.push(format!("next: {} - {}", next.title, next.artist));
    }
    if let Some(previous) = &record.previous_track {
        lines.push(format!("previous: {} - {}", previous.title, previous.artist));
    }
    if let Some(top) = &record.top_track {
        match top.play_count {
            Some(count) => lines.push(format!(
                "month favourite: {} - {} ({count} plays)",
                top.title, top.artist
            )),
            None => lines.push(format!("month favourite: {} - {}", top.title, top.artist)),
        }
    }
    lines
}

pub fn json_line(record: &PlaybackRecord) -> serde_json::Result<String> {
    serde_json::to_string(record)
}
