//! Music API client: OAuth URL construction and the user's audio list.

use std::future::Future;
use std::time::Duration;

use panel_proto::config::ApiConfig;
use panel_proto::Track;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// OAuth authorize endpoint.
pub const AUTH_URL: &str = "https://oauth.vk.com/authorize";
/// Base for API method calls.
pub const METHOD_URL: &str = "https://api.vk.com/method/";
/// Page the OAuth flow redirects to with the token in its fragment.
pub const ACCESS_TOKEN_URL: &str = "https://oauth.vk.com/blank.html";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not logged in")]
    NotAuthorized,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("API returned HTTP {0}")]
    Status(u16),
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("unexpected API response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub trait ApiClient: Send + Sync {
    /// The logged-in user's tracks, in API order.  The request is detached
    /// from `self`, so callers can spawn it and keep handling input.
    fn get_playlist(&self) -> impl Future<Output = Result<Vec<Track>, ApiError>> + Send + 'static;

    /// Authorization page requesting `scope`.
    fn auth_url(&self, scope: &str) -> String;

    /// Prefix of the page the authorization flow ends on.
    fn access_token_callback_url(&self) -> &str;

    fn access_token(&self) -> Option<&str>;

    fn set_access_token(&mut self, token: Option<String>);
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<MethodError>,
}

#[derive(Debug, Deserialize)]
struct MethodError {
    error_code: i64,
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct AudioPage {
    #[serde(default)]
    items: Vec<AudioItem>,
}

#[derive(Debug, Deserialize)]
struct AudioItem {
    #[serde(default)]
    artist: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    url: String,
}

pub struct VkApi {
    client: reqwest::Client,
    client_id: u64,
    version: String,
    access_token: Option<String>,
}

impl VkApi {
    pub fn new(config: &ApiConfig) -> Self {
        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("api: could not build HTTP client ({}), requests have no timeout", e);
                reqwest::Client::new()
            }
        };
        Self {
            client,
            client_id: config.client_id,
            version: config.api_version.clone(),
            access_token: None,
        }
    }

    fn method_url(&self, method: &str, token: &str) -> Result<Url, ApiError> {
        let base = format!("{METHOD_URL}{method}");
        Url::parse_with_params(&base, &[("access_token", token), ("v", self.version.as_str())])
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

/// Turn an `audio.get` body into playlist tracks.
fn parse_audio_response(body: &str) -> Result<Vec<Track>, ApiError> {
    let envelope: Envelope<AudioPage> =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    if let Some(err) = envelope.error {
        return Err(ApiError::Api {
            code: err.error_code,
            message: err.error_msg,
        });
    }
    let page = envelope
        .response
        .ok_or_else(|| ApiError::Decode("missing response".to_string()))?;

    Ok(page
        .items
        .into_iter()
        .enumerate()
        .map(|(index, item)| Track {
            index,
            artist: item.artist,
            title: item.title,
            duration_secs: item.duration,
            url: item.url,
        })
        .collect())
}

impl ApiClient for VkApi {
    fn get_playlist(&self) -> impl Future<Output = Result<Vec<Track>, ApiError>> + Send + 'static {
        let client = self.client.clone();
        let url = self
            .access_token
            .as_deref()
            .ok_or(ApiError::NotAuthorized)
            .and_then(|token| self.method_url("audio.get", token));

        async move {
            let url = url?;
            debug!("api: GET audio.get");
            let response = client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(ApiError::Status(response.status().as_u16()));
            }
            let body = response.text().await?;

            let tracks = parse_audio_response(&body)?;
            info!("api: fetched {} tracks", tracks.len());
            Ok(tracks)
        }
    }

    fn auth_url(&self, scope: &str) -> String {
        let client_id = self.client_id.to_string();
        let params = [
            ("client_id", client_id.as_str()),
            ("scope", scope),
            ("redirect_uri", ACCESS_TOKEN_URL),
            ("display", "popup"),
            ("response_type", "token"),
            ("v", self.version.as_str()),
        ];
        match Url::parse_with_params(AUTH_URL, &params) {
            Ok(url) => url.to_string(),
            Err(_) => AUTH_URL.to_string(),
        }
    }

    fn access_token_callback_url(&self) -> &str {
        ACCESS_TOKEN_URL
    }

    fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }
}
