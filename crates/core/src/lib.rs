pub mod config;
pub mod credential;
pub mod model;
pub mod urls;

pub use config::{AppConfig, ConfigIntervals, LastfmConfig, SpotifyConfig, YouTubeConfig};
pub use credential::{Credential, CredentialHandle, CredentialStore, RefreshCallback};
pub use model::{AlbumInfo, PlaybackRecord, ProviderKind, TopTrack, TrackSummary};
