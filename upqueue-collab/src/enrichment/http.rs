use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use upqueue_core::TrackResource;

use super::{EnrichmentError, MetadataSource, Thumbnail, TrackPreview, VideoDetails};

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const YOUTUBE_OEMBED: &str = "https://www.youtube.com/oembed";
const SPOTIFY_OEMBED: &str = "https://open.spotify.com/oembed";
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Credentials for the provider APIs. Without them, only public endpoints are used.
#[derive(Debug, Clone, Default)]
pub struct MetadataCredentials {
    pub youtube_api_key: Option<String>,
    pub spotify: Option<SpotifyCredentials>,
}

#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Fetches metadata from the YouTube and Spotify HTTP APIs.
pub struct HttpMetadataSource {
    client: Client,
    credentials: MetadataCredentials,
    spotify_token: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct VideoList {
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    thumbnails: HashMap<String, ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    author_name: Option<String>,
    thumbnail_url: Option<String>,
    thumbnail_width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Any Web API object with images. Tracks and episodes keep them on their album or show.
#[derive(Debug, Deserialize)]
struct SpotifyObject {
    #[serde(default)]
    images: Vec<ApiImage>,
    album: Option<Box<SpotifyObject>>,
    show: Option<Box<SpotifyObject>>,
}

impl HttpMetadataSource {
    pub fn new(credentials: MetadataCredentials) -> Result<Self, EnrichmentError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EnrichmentError::FetchError(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
            spotify_token: Mutex::new(None),
        })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, EnrichmentError> {
        let response = request
            .send()
            .await
            .map_err(|e| EnrichmentError::FetchError(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(EnrichmentError::NotFound);
        }

        if !status.is_success() {
            return Err(EnrichmentError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| EnrichmentError::ParseError(e.to_string()))
    }

    async fn spotify_token(&self) -> Result<String, EnrichmentError> {
        let credentials = self
            .credentials
            .spotify
            .as_ref()
            .ok_or(EnrichmentError::Unconfigured)?;

        let cached = self.spotify_token.lock().clone();
        if let Some(cached) = cached {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token);
            }
        }

        let request = self
            .client
            .post(SPOTIFY_TOKEN_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")]);

        let response: TokenResponse = self.fetch_json(request).await?;

        // Refresh a little early so a token never expires mid-request
        let lifetime = Duration::from_secs(response.expires_in.saturating_sub(30));
        *self.spotify_token.lock() = Some(AccessToken {
            token: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(response.access_token)
    }

    async fn video_from_api(&self, key: &str, id: &str) -> Result<VideoDetails, EnrichmentError> {
        let request = self
            .client
            .get(format!("{}/videos", YOUTUBE_API_BASE))
            .query(&[("part", "snippet"), ("id", id), ("key", key)]);

        let list: VideoList = self.fetch_json(request).await?;
        let video = list.items.into_iter().next().ok_or(EnrichmentError::NotFound)?;

        let thumbnails = video
            .snippet
            .thumbnails
            .into_values()
            .map(|t| Thumbnail {
                url: t.url,
                width: t.width.unwrap_or_default(),
            })
            .collect();

        Ok(VideoDetails {
            title: video.snippet.title,
            thumbnails,
        })
    }

    async fn video_from_oembed(&self, id: &str) -> Result<VideoDetails, EnrichmentError> {
        let watch_url = format!("https://www.youtube.com/watch?v={}", id);
        let request = self
            .client
            .get(YOUTUBE_OEMBED)
            .query(&[("url", watch_url.as_str()), ("format", "json")]);

        let embed: OEmbed = self.fetch_json(request).await?;

        let thumbnails = embed
            .thumbnail_url
            .map(|url| Thumbnail {
                url,
                width: embed.thumbnail_width.unwrap_or_default(),
            })
            .into_iter()
            .collect();

        Ok(VideoDetails {
            title: embed.title.unwrap_or_default(),
            thumbnails,
        })
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn video_details(&self, id: &str) -> Result<VideoDetails, EnrichmentError> {
        match &self.credentials.youtube_api_key {
            Some(key) => self.video_from_api(key, id).await,
            None => self.video_from_oembed(id).await,
        }
    }

    async fn track_preview(&self, url: &str) -> Result<TrackPreview, EnrichmentError> {
        let request = self.client.get(SPOTIFY_OEMBED).query(&[("url", url)]);
        let embed: OEmbed = self.fetch_json(request).await?;

        Ok(TrackPreview {
            title: embed.title.unwrap_or_default(),
            artist: embed.author_name.filter(|a| !a.is_empty()),
            image: embed.thumbnail_url,
        })
    }

    async fn track_images(
        &self,
        resource: TrackResource,
        id: &str,
    ) -> Result<Vec<Thumbnail>, EnrichmentError> {
        let token = self.spotify_token().await?;

        let request = self
            .client
            .get(format!("{}/{}s/{}", SPOTIFY_API_BASE, resource, id))
            .bearer_auth(token);

        let object: SpotifyObject = self.fetch_json(request).await?;

        let images = match (object.images.is_empty(), object.album, object.show) {
            (true, Some(album), _) => album.images,
            (true, None, Some(show)) => show.images,
            _ => object.images,
        };

        Ok(images
            .into_iter()
            .map(|i| Thumbnail {
                url: i.url,
                width: i.width.unwrap_or_default(),
            })
            .collect())
    }
}
