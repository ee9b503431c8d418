use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use thiserror::Error;
use upqueue_core::{MediaKind, MediaLink, TrackResource};

mod http;
pub use http::*;

/// Shown when no image could be found for an item
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg?height=90&width=120";

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Failed to fetch metadata: {0}")]
    FetchError(String),

    #[error("Failed to parse metadata: {0}")]
    ParseError(String),

    #[error("Metadata provider responded with status {0}")]
    Status(u16),

    #[error("The resource has no metadata")]
    NotFound,

    #[error("No credentials are configured for this provider")]
    Unconfigured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
}

#[derive(Debug, Clone)]
pub struct VideoDetails {
    pub title: String,
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Clone)]
pub struct TrackPreview {
    pub title: String,
    pub artist: Option<String>,
    pub image: Option<String>,
}

/// Where display metadata for links comes from.
#[async_trait]
pub trait MetadataSource: Send + Sync + 'static {
    async fn video_details(&self, id: &str) -> Result<VideoDetails, EnrichmentError>;
    async fn track_preview(&self, url: &str) -> Result<TrackPreview, EnrichmentError>;
    async fn track_images(
        &self,
        resource: TrackResource,
        id: &str,
    ) -> Result<Vec<Thumbnail>, EnrichmentError>;
}

/// A source that never looks anything up, so every link gets default metadata.
pub struct OfflineMetadataSource;

#[async_trait]
impl MetadataSource for OfflineMetadataSource {
    async fn video_details(&self, _id: &str) -> Result<VideoDetails, EnrichmentError> {
        Err(EnrichmentError::Unconfigured)
    }

    async fn track_preview(&self, _url: &str) -> Result<TrackPreview, EnrichmentError> {
        Err(EnrichmentError::Unconfigured)
    }

    async fn track_images(
        &self,
        _resource: TrackResource,
        _id: &str,
    ) -> Result<Vec<Thumbnail>, EnrichmentError> {
        Err(EnrichmentError::Unconfigured)
    }
}

/// Display data for a submitted link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedMetadata {
    pub title: String,
    pub small_image: String,
    pub large_image: String,
}

impl EnrichedMetadata {
    fn placeholder(kind: MediaKind) -> Self {
        Self {
            title: kind.placeholder_title().to_string(),
            small_image: PLACEHOLDER_IMAGE.to_string(),
            large_image: PLACEHOLDER_IMAGE.to_string(),
        }
    }
}

/// Looks up display metadata for classified links.
/// Never fails, anything that goes wrong results in placeholders.
#[derive(Clone)]
pub struct Enrichment {
    source: Arc<dyn MetadataSource>,
}

impl Enrichment {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }

    pub async fn enrich(&self, link: &MediaLink, url: &str) -> EnrichedMetadata {
        match link {
            MediaLink::Video { id } => self.enrich_video(id).await,
            MediaLink::Track { resource, id } => self.enrich_track(url, *resource, id).await,
        }
    }

    async fn enrich_video(&self, id: &str) -> EnrichedMetadata {
        let details = self
            .source
            .video_details(id)
            .await
            .map_err(|err| match err {
                EnrichmentError::Unconfigured => {}
                err => warn!("Failed to fetch details for video {}: {}", id, err),
            })
            .ok();

        let mut metadata = EnrichedMetadata::placeholder(MediaKind::VideoLink);

        let (title, mut thumbnails) = details
            .map(|d| (Some(d.title), d.thumbnails))
            .unwrap_or_default();

        if let Some(title) = title.filter(|t| !t.is_empty()) {
            metadata.title = title;
        }

        // Smallest first
        thumbnails.sort_by_key(|t| t.width);

        match thumbnails.as_slice() {
            [] if !id.is_empty() => {
                metadata.small_image = format!("https://i.ytimg.com/vi/{}/mqdefault.jpg", id);
                metadata.large_image = format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id);
            }
            [] => {}
            [only] => {
                metadata.small_image = only.url.clone();
                metadata.large_image = only.url.clone();
            }
            [.., small, large] => {
                metadata.small_image = small.url.clone();
                metadata.large_image = large.url.clone();
            }
        }

        metadata
    }

    async fn enrich_track(&self, url: &str, resource: TrackResource, id: &str) -> EnrichedMetadata {
        let mut metadata = EnrichedMetadata::placeholder(MediaKind::AudioTrackLink);

        match self.source.track_preview(url).await {
            Ok(preview) => {
                if !preview.title.is_empty() {
                    metadata.title = match preview.artist {
                        Some(artist) => format!("{} - {}", preview.title, artist),
                        None => preview.title,
                    };
                }

                if let Some(image) = preview.image {
                    metadata.small_image = image.clone();
                    metadata.large_image = image;
                }
            }
            Err(EnrichmentError::Unconfigured) => {}
            Err(err) => warn!("Failed to fetch preview for {}: {}", url, err),
        }

        match self.source.track_images(resource, id).await {
            Ok(mut images) => {
                // Largest first
                images.sort_by(|a, b| b.width.cmp(&a.width));

                if let (Some(large), Some(small)) = (images.first(), images.last()) {
                    metadata.large_image = large.url.clone();
                    metadata.small_image = small.url.clone();
                }
            }
            Err(EnrichmentError::Unconfigured) => {}
            Err(err) => warn!("Failed to fetch images for {} {}: {}", resource, id, err),
        }

        metadata
    }
}
