use nowify_core::PlaybackRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Different track: the record was swapped for the poll result.
    Replaced,
    /// Same track, play/pause flipped.
    StateChanged,
    /// Same track, only neighbour tracks changed.
    Patched,
    /// Poll came back empty; the record was marked as not playing.
    Stopped,
    Unchanged,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        self != MergeOutcome::Unchanged
    }
}

fn same_track(current: &PlaybackRecord, incoming: &PlaybackRecord) -> bool {
    incoming.track_id.is_some() && incoming.track_id == current.track_id
}

/// Copies neighbour tracks that differ from what is shown, including an
/// emptied queue or history.
fn patch_neighbours(current: &mut PlaybackRecord, incoming: PlaybackRecord) -> bool {
    let mut patched = false;
    if incoming.next_track != current.next_track {
        current.next_track = incoming.next_track;
        patched = true;
    }
    if incoming.previous_track != current.previous_track {
        current.previous_track = incoming.previous_track;
        patched = true;
    }
    patched
}

/// Folds one poll result into the live record.
///
/// A repeated track only patches neighbour tracks so that the locally
/// interpolated progress is not overwritten by a slightly stale poll. The
/// monthly favourite is session-scoped and survives track replacement.
pub fn merge_poll_result(
    current: &mut PlaybackRecord,
    incoming: Option<PlaybackRecord>,
) -> MergeOutcome {
    let Some(incoming) = incoming else {
        if current.playing {
            current.playing = false;
            return MergeOutcome::Stopped;
        }
        return MergeOutcome::Unchanged;
    };

    if same_track(current, &incoming) {
        if current.playing != incoming.playing {
            current.playing = incoming.playing;
            current.progress_ms = incoming.progress_ms;
            patch_neighbours(current, incoming);
            return MergeOutcome::StateChanged;
        }
        return if patch_neighbours(current, incoming) {
            MergeOutcome::Patched
        } else {
            MergeOutcome::Unchanged
        };
    }

    let mut next = incoming;
    if next.top_track.is_none() {
        next.top_track = current.top_track.clone();
    }
    if *current == next {
        return MergeOutcome::Unchanged;
    }
    *current = next;
    MergeOutcome::Replaced
}

/// One local progress step. Returns whether the record moved.
pub fn advance_progress(record: &mut PlaybackRecord, step_ms: u64) -> bool {
    if !record.can_interpolate() || record.progress_ms >= record.duration_ms {
        return false;
    }
    record.progress_ms = (record.progress_ms + step_ms).min(record.duration_ms);
    true
}
