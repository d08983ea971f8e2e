use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters Last.fm keeps as-is in its `/music/...` paths.
const LASTFM_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn lastfm_segment(value: &str) -> String {
    utf8_percent_encode(value, LASTFM_PATH)
        .to_string()
        .replace("%20", "+")
}

pub fn lastfm_track_url(artist: &str, title: &str) -> String {
    format!(
        "https://www.last.fm/music/{}/_/{}",
        lastfm_segment(artist),
        lastfm_segment(title)
    )
}

pub fn youtube_watch_url(video_id: &str) -> String {
    let encoded = utf8_percent_encode(video_id, NON_ALPHANUMERIC).to_string();
    format!("https://www.youtube.com/watch?v={encoded}")
}
