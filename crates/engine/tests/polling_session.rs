//! Session actor behaviour under a paused tokio clock.

use async_trait::async_trait;
use nowify_core::{AlbumInfo, Credential, CredentialStore, PlaybackRecord, ProviderKind, TopTrack};
use nowify_engine::{spawn_engine, EngineConfig, EngineHandle, SessionPhase};
use nowify_providers::MusicProvider;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

struct Scripted {
    kind: ProviderKind,
    script: Mutex<VecDeque<(Duration, Option<PlaybackRecord>)>>,
    fallback: Option<PlaybackRecord>,
    delay: Duration,
    top: Option<TopTrack>,
    credential: Option<watch::Receiver<Credential>>,
    polls: AtomicUsize,
    top_calls: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Scripted {
    fn new(kind: ProviderKind, fallback: Option<PlaybackRecord>) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            top: None,
            credential: None,
            polls: AtomicUsize::new(0),
            top_calls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    fn then(self, delay: Duration, result: Option<PlaybackRecord>) -> Self {
        self.script.lock().unwrap().push_back((delay, result));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_top(mut self, top: TopTrack) -> Self {
        self.top = Some(top);
        self
    }

    fn with_credential(mut self, rx: watch::Receiver<Credential>) -> Self {
        self.credential = Some(rx);
        self
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MusicProvider for Scripted {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn credential(&self) -> Option<watch::Receiver<Credential>> {
        self.credential.clone()
    }

    async fn now_playing(&self) -> Option<PlaybackRecord> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        let (delay, result) = scripted.unwrap_or((self.delay, self.fallback.clone()));
        if !delay.is_zero() {
            sleep(delay).await;
        }
        result
    }

    fn supports_month_favorite(&self) -> bool {
        self.top.is_some()
    }

    async fn month_favorite(&self) -> Option<TopTrack> {
        self.top_calls.fetch_add(1, Ordering::SeqCst);
        self.top.clone()
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn track(id: &str, progress_ms: u64) -> PlaybackRecord {
    PlaybackRecord {
        playing: true,
        track_id: Some(id.to_string()),
        track_title: "Song".to_string(),
        track_artists: vec!["Artist".to_string()],
        album: AlbumInfo {
            title: Some("Album".to_string()),
            image_url: Some("u".to_string()),
        },
        progress_ms,
        duration_ms: 200_000,
        release_date: Some("2020".to_string()),
        provider: Some(ProviderKind::Subscription),
        ..PlaybackRecord::default()
    }
}

fn video(title: &str) -> PlaybackRecord {
    PlaybackRecord {
        playing: true,
        track_title: title.to_string(),
        track_artists: vec!["Channel".to_string()],
        provider: Some(ProviderKind::Video),
        ..PlaybackRecord::default()
    }
}

async fn wait_until<F>(engine: &EngineHandle, predicate: F) -> PlaybackRecord
where
    F: FnMut(&PlaybackRecord) -> bool,
{
    let mut rx = engine.subscribe();
    let record = rx.wait_for(predicate).await.expect("engine alive").clone();
    record
}

#[tokio::test(start_paused = true)]
async fn interpolates_between_polls_without_clobbering_progress() {
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(Scripted::new(
        ProviderKind::Subscription,
        Some(track("T1", 50_000)),
    ));

    engine.switch_provider(provider.clone()).await.unwrap();
    let first = wait_until(&engine, |r| r.track_id.is_some()).await;
    assert_eq!(first, track("T1", 50_000));
    assert_eq!(engine.phase(), SessionPhase::Polling);

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(engine.record().progress_ms, 51_000);

    // second poll at 2.5s reports 50_000 again; the same track keeps local progress
    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(provider.polls(), 2);
    assert_eq!(engine.record().progress_ms, 52_000);
}

#[tokio::test(start_paused = true)]
async fn track_change_replaces_record_with_reported_progress() {
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(
        Scripted::new(ProviderKind::Subscription, Some(track("T2", 10_000)))
            .then(Duration::ZERO, Some(track("T1", 150_000))),
    );

    engine.switch_provider(provider).await.unwrap();
    wait_until(&engine, |r| r.track_id.as_deref() == Some("T1")).await;

    let second = wait_until(&engine, |r| r.track_id.as_deref() == Some("T2")).await;
    assert_eq!(second.progress_ms, 10_000);

    sleep(Duration::from_millis(1_200)).await;
    assert_eq!(engine.record().progress_ms, 11_000);
}

#[tokio::test(start_paused = true)]
async fn empty_poll_marks_not_playing_and_freezes_progress() {
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(
        Scripted::new(ProviderKind::Subscription, None)
            .then(Duration::ZERO, Some(track("T1", 50_000))),
    );

    engine.switch_provider(provider).await.unwrap();
    wait_until(&engine, |r| r.playing).await;

    let stopped = wait_until(&engine, |r| !r.playing).await;
    assert_eq!(stopped.track_id.as_deref(), Some("T1"));
    assert_eq!(stopped.track_title, "Song");
    let frozen = stopped.progress_ms;

    sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.record().progress_ms, frozen);
    assert_eq!(engine.phase(), SessionPhase::Polling);
}

#[tokio::test(start_paused = true)]
async fn switching_provider_discards_in_flight_result() {
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let subscription = Arc::new(
        Scripted::new(ProviderKind::Subscription, Some(track("T1", 50_000)))
            .with_delay(Duration::from_secs(5)),
    );
    let clip = Arc::new(
        Scripted::new(ProviderKind::Video, Some(video("Clip")))
            .with_delay(Duration::from_secs(1)),
    );

    engine.switch_provider(subscription.clone()).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(subscription.polls(), 1);

    engine.switch_provider(clip.clone()).await.unwrap();
    let idle = wait_until(&engine, |r| r.provider == Some(ProviderKind::Video)).await;
    assert!(idle.is_idle());
    assert_eq!(subscription.disconnects.load(Ordering::SeqCst), 1);

    let mut rx = engine.subscribe();
    sleep(Duration::from_secs(6)).await;

    // the subscription poll resolved at 5s and must not have surfaced
    let current = rx.borrow_and_update().clone();
    assert_eq!(current.provider, Some(ProviderKind::Video));
    assert_eq!(current.track_title, "Clip");
    assert_eq!(subscription.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_poll_results_are_fenced() {
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(
        Scripted::new(ProviderKind::Subscription, Some(track("NEW", 1_000)))
            .then(Duration::from_secs(4), Some(track("OLD", 1_000)))
            .then(Duration::ZERO, Some(track("NEW", 1_000))),
    );

    engine.switch_provider(provider).await.unwrap();
    wait_until(&engine, |r| r.track_id.as_deref() == Some("NEW")).await;

    // the first (slow) poll lands at 4s, after the second one was applied
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(engine.record().track_id.as_deref(), Some("NEW"));
}

#[tokio::test(start_paused = true)]
async fn credential_loss_goes_idle_and_resumes_on_new_token() {
    let store = CredentialStore::new(Credential::new("tok"));
    let rx = store.handle(Arc::new(|| {})).subscribe();
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(
        Scripted::new(ProviderKind::Subscription, Some(track("T1", 50_000))).with_credential(rx),
    );

    engine.switch_provider(provider.clone()).await.unwrap();
    wait_until(&engine, |r| r.playing).await;

    store.clear();
    let idle = wait_until(&engine, |r| r.is_idle()).await;
    assert_eq!(idle.provider, Some(ProviderKind::Subscription));
    assert_eq!(engine.phase(), SessionPhase::Idle);

    let polls_when_lost = provider.polls();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(provider.polls(), polls_when_lost);
    assert!(engine.record().is_idle());

    store.set_token("fresh");
    wait_until(&engine, |r| r.playing).await;
    assert_eq!(engine.phase(), SessionPhase::Polling);
}

#[tokio::test(start_paused = true)]
async fn waits_for_credential_before_first_poll() {
    let store = CredentialStore::new(Credential::default());
    let rx = store.handle(Arc::new(|| {})).subscribe();
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(
        Scripted::new(ProviderKind::Subscription, Some(track("T1", 0))).with_credential(rx),
    );

    engine.switch_provider(provider.clone()).await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(provider.polls(), 0);
    assert_eq!(engine.phase(), SessionPhase::Idle);

    store.set_token("tok");
    wait_until(&engine, |r| r.track_id.is_some()).await;
    assert_eq!(provider.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn month_favorite_is_requested_once_and_survives_replacement() {
    let top = TopTrack {
        title: "Fav".to_string(),
        artist: "Loved".to_string(),
        image_url: None,
        play_count: Some(12),
    };
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(
        Scripted::new(ProviderKind::Scrobble, Some(video("Second")))
            .then(Duration::ZERO, Some(video("First")))
            .with_top(top.clone()),
    );

    engine.switch_provider(provider.clone()).await.unwrap();
    wait_until(&engine, |r| r.top_track.is_some()).await;

    let second = wait_until(&engine, |r| r.track_title == "Second").await;
    assert_eq!(second.top_track, Some(top));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(provider.top_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_both_timers() {
    let (engine, _task) = spawn_engine(EngineConfig::default());
    let provider = Arc::new(Scripted::new(
        ProviderKind::Subscription,
        Some(track("T1", 50_000)),
    ));

    engine.switch_provider(provider.clone()).await.unwrap();
    wait_until(&engine, |r| r.playing).await;

    engine.stop().await.unwrap();
    let idle = wait_until(&engine, |r| r.provider.is_none()).await;
    assert!(idle.is_idle());
    assert_eq!(provider.disconnects.load(Ordering::SeqCst), 1);

    let polls = provider.polls();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(provider.polls(), polls);
    assert_eq!(engine.record(), PlaybackRecord::idle(None));
    assert_eq!(engine.phase(), SessionPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn shutdown_ends_the_actor() {
    let (engine, task) = spawn_engine(EngineConfig::default());
    engine.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(engine.stop().await.is_err());
}
