//! Normalized session records
//!
//! A [`Session`] is built by the parser from one child of the server's
//! `MediaContainer`. Fields shared by every kind live on the session itself;
//! kind-specific attributes live in [`MediaDetails`], whose variant is the
//! session's [`SessionKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Library title reported for live TV sessions
pub const LIVE_TV_LIBRARY: &str = "LiveTV";
/// Library title reported for trailers
pub const TRAILERS_LIBRARY: &str = "Trailers";
/// Library title reported for unclassified clips
pub const OTHER_LIBRARY: &str = "Other";

/// Discriminant of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Movie,
    Episode,
    Track,
    Photo,
    Trailer,
    #[serde(rename = "livetv")]
    LiveTv,
    Other,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Movie => "movie",
            SessionKind::Episode => "episode",
            SessionKind::Track => "track",
            SessionKind::Photo => "photo",
            SessionKind::Trailer => "trailer",
            SessionKind::LiveTv => "livetv",
            SessionKind::Other => "other",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific attributes, one variant per [`SessionKind`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaDetails {
    Movie(MovieDetails),
    Episode(EpisodeDetails),
    Track(TrackDetails),
    Photo(PhotoDetails),
    Trailer(ClipDetails),
    #[serde(rename = "livetv")]
    LiveTv(ClipDetails),
    Other(ClipDetails),
}

impl MediaDetails {
    pub fn kind(&self) -> SessionKind {
        match self {
            MediaDetails::Movie(_) => SessionKind::Movie,
            MediaDetails::Episode(_) => SessionKind::Episode,
            MediaDetails::Track(_) => SessionKind::Track,
            MediaDetails::Photo(_) => SessionKind::Photo,
            MediaDetails::Trailer(_) => SessionKind::Trailer,
            MediaDetails::LiveTv(_) => SessionKind::LiveTv,
            MediaDetails::Other(_) => SessionKind::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub original_title: Option<String>,
    pub studio: Option<String>,
    pub content_rating: Option<String>,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    /// Title of the episode itself (the session title is the series title)
    pub episode_title: Option<String>,
    pub season_title: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub series_poster: Option<String>,
    pub series_banner: Option<String>,
    pub season_poster: Option<String>,
    pub content_rating: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackDetails {
    pub album_title: Option<String>,
    pub artist_title: Option<String>,
    pub album_thumb: Option<String>,
    pub artist_thumb: Option<String>,
    pub track_number: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoDetails {
    pub folder_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipDetails {
    pub subtype: Option<String>,
}

/// Viewer identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<String>,
    /// Raw account title as reported by the server (used for filtering)
    pub title: Option<String>,
    /// Title after the cosmetic alias table was applied
    pub display_title: Option<String>,
    pub image_path: Option<String>,
}

/// Playback state reported by the player
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Playing,
    Paused,
    Other(String),
}

impl PlayerState {
    /// Exact, case-sensitive mapping of the `state` attribute
    pub fn from_attr(value: &str) -> Self {
        match value {
            "playing" => PlayerState::Playing,
            "paused" => PlayerState::Paused,
            other => PlayerState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Other(raw) => raw,
        }
    }
}

/// Playback device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub product: Option<String>,
    pub profile: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub machine_identifier: Option<String>,
    pub state: Option<PlayerState>,
    pub is_local: Option<bool>,
    pub is_secure: Option<bool>,
    pub address: Option<String>,
    pub remote_address: Option<String>,
}

/// Streaming session attached to the playback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSession {
    pub id: Option<String>,
    pub bandwidth: Option<u64>,
    /// `lan` or `wan`
    pub location: Option<String>,
}

/// Active transcode, carried through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscodeSession {
    pub endpoint: Option<String>,
    pub throttled: Option<bool>,
    pub complete: Option<bool>,
    pub progress: Option<f64>,
    pub speed: Option<f64>,
    pub duration_ms: Option<u64>,
    pub context: Option<String>,
    pub source_video_codec: Option<String>,
    pub video_decision: Option<String>,
    pub audio_decision: Option<String>,
    pub protocol: Option<String>,
    pub container: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<u32>,
    pub hw_requested: Option<bool>,
    pub max_offset_available: Option<f64>,
    pub min_offset_available: Option<f64>,
}

/// One observed playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub title: String,
    pub details: MediaDetails,
    pub year: Option<u32>,
    /// Item endpoint on the server (`key`)
    pub endpoint: Option<String>,
    pub session_key: Option<String>,
    /// Library section as reported by the server
    pub library_section_title: Option<String>,
    pub library_section_key: Option<String>,
    pub thumb: Option<String>,
    pub art: Option<String>,
    pub duration_ms: Option<u64>,
    pub view_offset_ms: Option<u64>,
    pub user: Option<User>,
    pub player: Option<Player>,
    pub session: Option<StreamSession>,
    pub transcode_session: Option<TranscodeSession>,
}

impl Session {
    pub fn new(title: impl Into<String>, details: MediaDetails) -> Self {
        Self {
            title: title.into(),
            details,
            year: None,
            endpoint: None,
            session_key: None,
            library_section_title: None,
            library_section_key: None,
            thumb: None,
            art: None,
            duration_ms: None,
            view_offset_ms: None,
            user: None,
            player: None,
            session: None,
            transcode_session: None,
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.details.kind()
    }

    /// Library title used for filtering.
    ///
    /// Library-backed kinds report the server's section title; clips report a
    /// fixed sentinel.
    pub fn library_title(&self) -> Option<&str> {
        match self.details {
            MediaDetails::Movie(_)
            | MediaDetails::Episode(_)
            | MediaDetails::Track(_)
            | MediaDetails::Photo(_) => self.library_section_title.as_deref(),
            MediaDetails::Trailer(_) => Some(TRAILERS_LIBRARY),
            MediaDetails::LiveTv(_) => Some(LIVE_TV_LIBRARY),
            MediaDetails::Other(_) => Some(OTHER_LIBRARY),
        }
    }

    /// Playback progress in percent. Not clamped: an offset past the
    /// duration yields more than 100.
    pub fn progress_percent(&self) -> Option<f64> {
        match (self.view_offset_ms, self.duration_ms) {
            (Some(offset), Some(duration)) if duration > 0 => {
                Some(offset as f64 / duration as f64 * 100.0)
            }
            _ => None,
        }
    }

    /// Preferred poster image path for this kind
    pub fn poster_path(&self) -> Option<&str> {
        match &self.details {
            MediaDetails::Episode(ep) => ep
                .series_poster
                .as_deref()
                .or(ep.season_poster.as_deref())
                .or(self.thumb.as_deref()),
            MediaDetails::Track(track) => track
                .album_thumb
                .as_deref()
                .or(self.thumb.as_deref())
                .or(track.artist_thumb.as_deref()),
            MediaDetails::Movie(_)
            | MediaDetails::Photo(_)
            | MediaDetails::Trailer(_)
            | MediaDetails::LiveTv(_)
            | MediaDetails::Other(_) => self.thumb.as_deref(),
        }
    }

    pub fn player_state(&self) -> Option<&PlayerState> {
        self.player.as_ref().and_then(|p| p.state.as_ref())
    }

    pub fn is_local(&self) -> Option<bool> {
        self.player.as_ref().and_then(|p| p.is_local)
    }

    /// Raw user title, before alias substitution
    pub fn user_title(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.title.as_deref())
    }
}

/// Why a publication carries the sessions it does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// The server answered and the body parsed
    Updated,
    /// The server answered 200 but the body could not be parsed
    Unparsable,
    /// Every attempt of the cycle failed
    RetriesExhausted,
}

/// What the consumer receives once per poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub sessions: Vec<Session>,
    pub outcome: PollOutcome,
    /// Attempts used in the cycle (1..=3)
    pub attempts: u32,
    pub published_at: DateTime<Utc>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
