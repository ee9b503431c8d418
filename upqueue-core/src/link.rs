use std::fmt::Display;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

lazy_static! {
    static ref VIDEO_ID_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_-]{11}$").unwrap();
    static ref TRACK_ID_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9]{22}$").unwrap();
}

const VIDEO_HOSTS: [&str; 4] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];
const SHORT_VIDEO_HOST: &str = "youtu.be";
const TRACK_HOST: &str = "open.spotify.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("URL is not a recognized video or track link")]
    UnrecognizedUrl,
}

/// The kind of media a submitted link points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    VideoLink,
    AudioTrackLink,
}

/// The kind of resource a track link points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackResource {
    Track,
    Album,
    Artist,
    Playlist,
    Show,
    Episode,
}

/// A classified link, carrying the canonical identifier of the media
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLink {
    Video { id: String },
    Track { resource: TrackResource, id: String },
}

/// Determines the media kind and canonical identifier of a submitted URL.
pub fn classify(input: &str) -> Result<MediaLink, ClassificationError> {
    let url = Url::parse(input.trim()).map_err(|_| ClassificationError::UnrecognizedUrl)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClassificationError::UnrecognizedUrl);
    }

    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or(ClassificationError::UnrecognizedUrl)?;

    let id = if VIDEO_HOSTS.contains(&host.as_str()) {
        video_id_from_path(&url)
    } else if host == SHORT_VIDEO_HOST {
        single_segment(&url).map(ToOwned::to_owned)
    } else if host == TRACK_HOST {
        return track_from_path(&url).ok_or(ClassificationError::UnrecognizedUrl);
    } else {
        None
    };

    id.filter(|id| VIDEO_ID_REGEX.is_match(id))
        .map(|id| MediaLink::Video { id })
        .ok_or(ClassificationError::UnrecognizedUrl)
}

fn video_id_from_path(url: &Url) -> Option<String> {
    let segments: Vec<_> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        // /watch?v=...
        ["watch"] => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned()),
        // /embed/... and /v/...
        ["embed", id] | ["v", id] => Some(id.to_string()),
        _ => None,
    }
}

fn single_segment(url: &Url) -> Option<&str> {
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let first = segments.next()?;

    segments.next().is_none().then_some(first)
}

fn track_from_path(url: &Url) -> Option<MediaLink> {
    let segments: Vec<_> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [resource, id] if TRACK_ID_REGEX.is_match(id) => Some(MediaLink::Track {
            resource: resource.parse().ok()?,
            id: id.to_string(),
        }),
        _ => None,
    }
}

impl MediaLink {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaLink::Video { .. } => MediaKind::VideoLink,
            MediaLink::Track { .. } => MediaKind::AudioTrackLink,
        }
    }

    /// The provider-specific identifier, independent of the URL shape
    pub fn canonical_id(&self) -> &str {
        match self {
            MediaLink::Video { id } => id,
            MediaLink::Track { id, .. } => id,
        }
    }

    /// Returns the URL a player surface can embed
    pub fn embed_url(&self) -> String {
        match self {
            MediaLink::Video { id } => format!("https://www.youtube.com/embed/{}", id),
            MediaLink::Track { resource, id } => {
                format!("https://open.spotify.com/embed/{}/{}", resource, id)
            }
        }
    }
}

impl MediaKind {
    /// The title shown until (or instead of) enrichment
    pub fn placeholder_title(&self) -> &'static str {
        match self {
            MediaKind::VideoLink => "YouTube Track",
            MediaKind::AudioTrackLink => "Spotify Track",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::VideoLink => "video",
            MediaKind::AudioTrackLink => "track",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(MediaKind::VideoLink),
            "track" => Ok(MediaKind::AudioTrackLink),
            other => Err(format!("Unknown media kind: {}", other)),
        }
    }
}

impl TrackResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackResource::Track => "track",
            TrackResource::Album => "album",
            TrackResource::Artist => "artist",
            TrackResource::Playlist => "playlist",
            TrackResource::Show => "show",
            TrackResource::Episode => "episode",
        }
    }
}

impl Display for TrackResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackResource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(TrackResource::Track),
            "album" => Ok(TrackResource::Album),
            "artist" => Ok(TrackResource::Artist),
            "playlist" => Ok(TrackResource::Playlist),
            "show" => Ok(TrackResource::Show),
            "episode" => Ok(TrackResource::Episode),
            _ => Err(()),
        }
    }
}
