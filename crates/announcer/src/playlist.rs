//! Playlist service client.
//!
//! One blocking GET per cycle, no retries. The body is either a flat
//! `{title, artist}` object or the station's playlist document, whose
//! `now_playing` entry names the title `track`.

use std::time::Duration;

use serde::Deserialize;
use serde::de::Error as _;

use crate::config::AnnouncerConfig;
use crate::error::FetchError;
use announcer_proto::Track;

/// Flat body: `{title, artist}`.
#[derive(Debug, Deserialize)]
struct FlatTrack {
    title: String,
    artist: String,
}

/// `now_playing` entry of the station document. The station names the
/// title `track`; `title` is taken when `track` is absent.
#[derive(Debug, Deserialize)]
struct StationEntry {
    track: Option<String>,
    title: Option<String>,
    artist: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlaylistDocument {
    Station { now_playing: StationEntry },
    Flat(FlatTrack),
}

impl TryFrom<PlaylistDocument> for Track {
    type Error = serde_json::Error;

    fn try_from(doc: PlaylistDocument) -> Result<Self, Self::Error> {
        match doc {
            PlaylistDocument::Station { now_playing } => {
                let title = now_playing
                    .track
                    .or(now_playing.title)
                    .ok_or_else(|| serde_json::Error::custom("now_playing has no track title"))?;
                Ok(Track::new(title, now_playing.artist))
            }
            PlaylistDocument::Flat(flat) => Ok(Track::new(flat.title, flat.artist)),
        }
    }
}

/// Source of the currently playing track.
pub trait TrackSource {
    fn current_track(&self) -> Result<Track, FetchError>;
}

impl<S: TrackSource + ?Sized> TrackSource for &S {
    fn current_track(&self) -> Result<Track, FetchError> {
        (**self).current_track()
    }
}

/// HTTP client for the playlist service.
pub struct PlaylistClient {
    url: String,
    agent: ureq::Agent,
}

impl PlaylistClient {
    pub fn new(source_url: &str, source_tag: Option<&str>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            url: tagged_url(source_url, source_tag),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    pub fn from_config(config: &AnnouncerConfig) -> Self {
        Self::new(
            &config.source_url,
            config.source_tag.as_deref(),
            config.network_timeout,
        )
    }

    /// URL actually requested, source tag included.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn fetch_current_track(&self) -> Result<Track, FetchError> {
        tracing::debug!(url = %self.url, "fetching current track");
        let mut resp = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| FetchError::from_request(&self.url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.body_mut().read_to_string().map_err(|e| match e {
            ureq::Error::Timeout(_) => FetchError::Timeout {
                url: self.url.clone(),
            },
            other => FetchError::Body(other),
        })?;
        tracing::debug!(bytes = body.len(), "playlist response received");

        let track = parse_track(&body)?;
        tracing::debug!(title = %track.title, artist = %track.artist, "now playing");
        Ok(track)
    }
}

impl TrackSource for PlaylistClient {
    fn current_track(&self) -> Result<Track, FetchError> {
        self.fetch_current_track()
    }
}

/// Decode a playlist response body into the current track.
pub fn parse_track(body: &str) -> Result<Track, FetchError> {
    let doc: PlaylistDocument = serde_json::from_str(body)?;
    Ok(Track::try_from(doc)?)
}

/// Append `src=<tag>` to `base`, keeping any existing query.
pub fn tagged_url(base: &str, tag: Option<&str>) -> String {
    let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) else {
        return base.to_string();
    };
    let sep = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };
    format!("{base}{sep}src={}", urlencoding::encode(tag))
}
