//! Video platform API client (metadata and audio stream lookup).
//!
//! Uses the public, unsigned endpoints. Login and signed requests are out of
//! scope; videos that need them resolve to `Forbidden` or an empty link.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{AudioLinkResolver, CollaboratorError, VideoLookup, VideoMetadataProvider};
use crate::domain::TaskMetadata;

/// Default API host
pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";

const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

/// Audio stream ids in order of preference (132k, 192k, 64k)
const PREFERRED_AUDIO_IDS: [u64; 3] = [30280, 30232, 30216];

/// Envelope shared by every API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    bvid: String,
    cid: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    owner: Option<ViewOwner>,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    pubdate: i64,
    #[serde(default)]
    is_upower_exclusive: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ViewOwner {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayUrlData {
    #[serde(default)]
    dash: Option<Dash>,
}

#[derive(Debug, Deserialize)]
struct Dash {
    #[serde(default)]
    audio: Vec<AudioStream>,
}

#[derive(Debug, Deserialize)]
struct AudioStream {
    id: u64,
    #[serde(default)]
    base_url: String,
}

/// HTTP client for the video platform
pub struct BilibiliClient {
    client: reqwest::Client,
    api_base: String,
}

impl BilibiliClient {
    /// Create a client with the given per-request timeout
    pub fn new(request_timeout: Duration) -> Result<Self, CollaboratorError> {
        Self::with_api_base(DEFAULT_API_BASE, request_timeout)
    }

    /// Create a client against a different API host
    pub fn with_api_base(
        api_base: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(REFERER, HeaderValue::from_static("https://www.bilibili.com"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Shared HTTP client (reused by the downloader for cookies and headers)
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, CollaboratorError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Map a view response onto a lookup answer
fn interpret_view(response: ApiResponse<ViewData>) -> Result<VideoLookup, CollaboratorError> {
    match response.code {
        0 => {
            let data = response.data.ok_or_else(|| CollaboratorError::Rejected {
                service: "bilibili".to_string(),
                message: "view response without data".to_string(),
            })?;

            let exclusive = data.is_upower_exclusive.unwrap_or(false);
            let mut metadata = TaskMetadata::new(data.bvid);
            metadata.cid = Some(data.cid);
            metadata.title = Some(data.title);
            metadata.owner = data.owner.map(|o| o.name).filter(|n| !n.is_empty());
            metadata.duration = Some(data.duration);
            metadata.pubdate = Some(data.pubdate);
            metadata.status = Some(if exclusive { "upower" } else { "normal" }.to_string());

            if exclusive {
                return Ok(VideoLookup::Forbidden("supporter-only video".to_string()));
            }
            Ok(VideoLookup::Found(metadata))
        }
        -404 | 62002 => Ok(VideoLookup::NotFound(response.message)),
        -403 | 62012 => Ok(VideoLookup::Forbidden(response.message)),
        62004 => Ok(VideoLookup::Pending(response.message)),
        code => Err(CollaboratorError::Rejected {
            service: "bilibili".to_string(),
            message: format!("code {}: {}", code, response.message),
        }),
    }
}

/// Pick the preferred audio stream URL
fn pick_audio(streams: &[AudioStream]) -> Option<String> {
    PREFERRED_AUDIO_IDS.iter().find_map(|id| {
        streams
            .iter()
            .find(|s| s.id == *id && !s.base_url.is_empty())
            .map(|s| s.base_url.clone())
    })
}

#[async_trait]
impl VideoMetadataProvider for BilibiliClient {
    async fn get_video(&self, bvid: &str) -> Result<VideoLookup, CollaboratorError> {
        let response: ApiResponse<ViewData> = self
            .get_json("/x/web-interface/view", &[("bvid", bvid.to_string())])
            .await?;
        interpret_view(response)
    }
}

#[async_trait]
impl AudioLinkResolver for BilibiliClient {
    async fn resolve(&self, bvid: &str, cid: u64) -> Result<Option<String>, CollaboratorError> {
        let response: ApiResponse<PlayUrlData> = self
            .get_json(
                "/x/player/playurl",
                &[
                    ("bvid", bvid.to_string()),
                    ("cid", cid.to_string()),
                    ("fnval", "16".to_string()),
                ],
            )
            .await?;

        if response.code != 0 {
            warn!(bvid, code = response.code, message = %response.message, "Audio link lookup refused");
            return Err(CollaboratorError::Rejected {
                service: "bilibili".to_string(),
                message: format!("code {}: {}", response.code, response.message),
            });
        }

        let streams = response
            .data
            .and_then(|d| d.dash)
            .map(|d| d.audio)
            .unwrap_or_default();
        Ok(pick_audio(&streams))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_view(json: &str) -> ApiResponse<ViewData> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_view_found() {
        let response = parse_view(
            r#"{"code":0,"message":"0","data":{"bvid":"BV1GJ411x7h7","cid":42,"title":"hello",
                "owner":{"mid":1,"name":"uploader"},"duration":1234,"pubdate":1700000000,
                "is_upower_exclusive":false}}"#,
        );
        match interpret_view(response).unwrap() {
            VideoLookup::Found(metadata) => {
                assert_eq!(metadata.bvid, "BV1GJ411x7h7");
                assert_eq!(metadata.cid, Some(42));
                assert_eq!(metadata.owner.as_deref(), Some("uploader"));
                assert_eq!(metadata.duration, Some(1234));
                assert_eq!(metadata.status.as_deref(), Some("normal"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_view_exclusive_is_forbidden() {
        let response = parse_view(
            r#"{"code":0,"data":{"bvid":"BV1GJ411x7h7","cid":42,"is_upower_exclusive":true}}"#,
        );
        assert!(matches!(interpret_view(response).unwrap(), VideoLookup::Forbidden(_)));
    }

    #[test]
    fn test_view_error_codes() {
        let not_found = parse_view(r#"{"code":-404,"message":"啥都木有","data":null}"#);
        assert!(matches!(interpret_view(not_found).unwrap(), VideoLookup::NotFound(_)));

        let reviewing = parse_view(r#"{"code":62004,"message":"稿件审核中"}"#);
        assert!(matches!(interpret_view(reviewing).unwrap(), VideoLookup::Pending(_)));

        let private = parse_view(r#"{"code":62012,"message":"仅UP主自己可见"}"#);
        assert!(matches!(interpret_view(private).unwrap(), VideoLookup::Forbidden(_)));

        let other = parse_view(r#"{"code":-352,"message":"风控校验失败"}"#);
        assert!(interpret_view(other).is_err());
    }

    #[test]
    fn test_audio_preference_order() {
        let streams = vec![
            AudioStream { id: 30216, base_url: "low".into() },
            AudioStream { id: 30232, base_url: "high".into() },
            AudioStream { id: 30280, base_url: "mid".into() },
        ];
        assert_eq!(pick_audio(&streams).as_deref(), Some("mid"));

        let streams = vec![
            AudioStream { id: 30216, base_url: "low".into() },
            AudioStream { id: 30232, base_url: "high".into() },
        ];
        assert_eq!(pick_audio(&streams).as_deref(), Some("high"));

        let streams = vec![AudioStream { id: 1, base_url: "x".into() }];
        assert_eq!(pick_audio(&streams), None);
    }
}
