//! Parser for the `/status/sessions` payload
//!
//! The server answers with a single `MediaContainer` whose children are the
//! active items (`Video`, `Track`, `Photo`, ...). Each child carries a `type`
//! attribute and, optionally, `User`, `Player`, `Session` and
//! `TranscodeSession` sub-elements. Every attribute is optional: an absent
//! attribute maps to `None`, never to an error.

use crate::error::{Error, Result};
use crate::model::{
    ClipDetails, EpisodeDetails, MediaDetails, MovieDetails, PhotoDetails, Player, PlayerState,
    Session, StreamSession, TrackDetails, TranscodeSession, User,
};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, trace, warn};
use xmltree::{Element, XMLNode};

/// Name of the top-level element
pub const CONTAINER_ELEMENT: &str = "MediaContainer";

/// Substring identifying live TV among `clip` items
pub const LIVE_SESSION_MARKER: &str = "Live Session";

/// Typed, absence-tolerant attribute access
pub trait AttributeReader {
    /// Raw attribute value; empty or whitespace-only values count as absent
    fn text(&self, name: &str) -> Option<String>;

    fn number<T: FromStr>(&self, name: &str) -> Option<T> {
        self.text(name).and_then(|value| value.trim().parse().ok())
    }

    /// `1`/`true` and `0`/`false`
    fn flag(&self, name: &str) -> Option<bool> {
        match self.text(name)?.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
    }
}

impl AttributeReader for Element {
    fn text(&self, name: &str) -> Option<String> {
        self.attributes
            .get(name)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

/// Turns raw response bodies into [`Session`] lists
#[derive(Debug, Clone, Default)]
pub struct SessionParser {
    user_aliases: HashMap<String, String>,
}

impl SessionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser applying a raw-title → display-title table to users
    pub fn with_user_aliases(user_aliases: HashMap<String, String>) -> Self {
        Self { user_aliases }
    }

    /// Parse `body`, reporting malformed payloads as [`Error::Parse`]
    pub fn try_parse(&self, body: &str) -> Result<Vec<Session>> {
        if body.trim().is_empty() {
            return Err(Error::parse("empty body"));
        }

        let root = Element::parse(body.as_bytes()).map_err(|e| Error::parse(e.to_string()))?;
        if root.name != CONTAINER_ELEMENT {
            return Err(Error::parse(format!(
                "expected <{}> root, found <{}>",
                CONTAINER_ELEMENT, root.name
            )));
        }

        let mut sessions = Vec::new();
        for item in xml_children(&root) {
            match self.parse_item(item) {
                Some(session) => sessions.push(session),
                None => trace!(element = %item.name, "Skipping unrecognized item"),
            }
        }

        debug!(count = sessions.len(), "Parsed sessions payload");
        Ok(sessions)
    }

    /// Parse `body`, falling back to an empty list on malformed payloads
    pub fn parse(&self, body: &str) -> Vec<Session> {
        match self.try_parse(body) {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!("Discarding sessions payload: {}", err);
                Vec::new()
            }
        }
    }

    fn parse_item(&self, item: &Element) -> Option<Session> {
        let item_type = item.text("type")?;

        let (title, details) = match item_type.as_str() {
            "movie" => (
                item.text("title"),
                MediaDetails::Movie(MovieDetails {
                    original_title: item.text("originalTitle"),
                    studio: item.text("studio"),
                    content_rating: item.text("contentRating"),
                    rating: item.text("rating"),
                }),
            ),
            "episode" => (
                item.text("grandparentTitle").or_else(|| item.text("title")),
                MediaDetails::Episode(EpisodeDetails {
                    episode_title: item.text("title"),
                    season_title: item.text("parentTitle"),
                    season_number: item.number("parentIndex"),
                    episode_number: item.number("index"),
                    series_poster: item.text("grandparentThumb"),
                    series_banner: item.text("grandparentArt"),
                    season_poster: item.text("parentThumb"),
                    content_rating: item.text("contentRating"),
                }),
            ),
            "track" => (
                item.text("title"),
                MediaDetails::Track(TrackDetails {
                    album_title: item.text("parentTitle"),
                    artist_title: item.text("grandparentTitle"),
                    album_thumb: item.text("parentThumb"),
                    artist_thumb: item.text("grandparentThumb"),
                    track_number: item.number("index"),
                }),
            ),
            "photo" => (
                item.text("title"),
                MediaDetails::Photo(PhotoDetails {
                    folder_title: item.text("parentTitle"),
                }),
            ),
            "clip" => {
                let title = item.text("title");
                let clip = ClipDetails {
                    subtype: item.text("subtype"),
                };
                let details = if clip.subtype.as_deref() == Some("trailer") {
                    MediaDetails::Trailer(clip)
                } else if title
                    .as_deref()
                    .is_some_and(|t| t.contains(LIVE_SESSION_MARKER))
                {
                    MediaDetails::LiveTv(clip)
                } else {
                    MediaDetails::Other(clip)
                };
                (title, details)
            }
            _ => return None,
        };

        let mut session = Session::new(title.unwrap_or_default(), details);
        session.year = item.number("year");
        session.endpoint = item.text("key");
        session.session_key = item.text("sessionKey");
        session.library_section_title = item.text("librarySectionTitle");
        session.library_section_key = item.text("librarySectionKey");
        session.thumb = item.text("thumb");
        session.art = item.text("art");
        session.duration_ms = item.number("duration");
        session.view_offset_ms = item.number("viewOffset");

        session.user = child(item, "User").map(|el| self.read_user(el));
        session.player = child(item, "Player").map(read_player);
        session.session = child(item, "Session").map(read_stream_session);
        session.transcode_session = child(item, "TranscodeSession").map(read_transcode_session);

        Some(session)
    }

    fn read_user(&self, el: &Element) -> User {
        let title = el.text("title");
        let display_title = title
            .as_ref()
            .map(|raw| self.user_aliases.get(raw).cloned().unwrap_or_else(|| raw.clone()));

        User {
            id: el.text("id"),
            title,
            display_title,
            image_path: el.text("thumb"),
        }
    }
}

fn read_player(el: &Element) -> Player {
    Player {
        platform: el.text("platform"),
        platform_version: el.text("platformVersion"),
        product: el.text("product"),
        profile: el.text("profile"),
        title: el.text("title"),
        version: el.text("version"),
        machine_identifier: el.text("machineIdentifier"),
        state: el.text("state").map(|s| PlayerState::from_attr(&s)),
        is_local: el.flag("local"),
        is_secure: el.flag("secure"),
        address: el.text("address"),
        remote_address: el.text("remotePublicAddress"),
    }
}

fn read_stream_session(el: &Element) -> StreamSession {
    StreamSession {
        id: el.text("id"),
        bandwidth: el.number("bandwidth"),
        location: el.text("location"),
    }
}

fn read_transcode_session(el: &Element) -> TranscodeSession {
    TranscodeSession {
        endpoint: el.text("key"),
        throttled: el.flag("throttled"),
        complete: el.flag("complete"),
        progress: el.number("progress"),
        speed: el.number("speed"),
        duration_ms: el.number("duration"),
        context: el.text("context"),
        source_video_codec: el.text("sourceVideoCodec"),
        video_decision: el.text("videoDecision"),
        audio_decision: el.text("audioDecision"),
        protocol: el.text("protocol"),
        container: el.text("container"),
        video_codec: el.text("videoCodec"),
        audio_codec: el.text("audioCodec"),
        audio_channels: el.number("audioChannels"),
        hw_requested: el.flag("transcodeHwRequested"),
        max_offset_available: el.number("maxOffsetAvailable"),
        min_offset_available: el.number("minOffsetAvailable"),
    }
}

/// Element children only (text, comments and the like are skipped)
fn xml_children(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(elem) => Some(elem),
        _ => None,
    })
}

fn child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    xml_children(element).find(|child| child.name == name)
}
