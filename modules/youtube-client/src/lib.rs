pub mod error;
pub mod types;

pub use error::{Result, YoutubeError};
pub use types::{SearchListResponse, Video};

const BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Optional constraints for a video search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict to videos published on or after this RFC 3339 instant.
    pub published_after: Option<String>,
    /// Restrict to a single channel.
    pub channel_id: Option<String>,
}

pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: String,
}

impl YoutubeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Search for videos. One page only; the callers here never need
    /// more than the top handful of hits per query.
    pub async fn search_videos(
        &self,
        query: &str,
        max_results: u32,
        opts: &SearchOptions,
    ) -> Result<Vec<Video>> {
        tracing::debug!(query, max_results, "YouTube video search");

        let mut url = url::Url::parse(&format!("{BASE_URL}/search"))
            .map_err(|e| YoutubeError::Parse(e.to_string()))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("part", "snippet");
            q.append_pair("type", "video");
            q.append_pair("q", query);
            q.append_pair("maxResults", &max_results.min(50).to_string());
            q.append_pair("key", &self.api_key);
            if let Some(after) = &opts.published_after {
                q.append_pair("publishedAfter", after);
            }
            if let Some(channel) = &opts.channel_id {
                q.append_pair("channelId", channel);
            }
        }

        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(YoutubeError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let listing: SearchListResponse = resp.json().await?;
        let videos = listing
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id?;
                let snippet = item.snippet.unwrap_or_default();
                Some(Video {
                    video_id,
                    title: snippet.title,
                    description: snippet.description,
                    channel_id: snippet.channel_id,
                    channel_title: snippet.channel_title,
                    published_at: snippet.published_at,
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = videos.len(), "YouTube search complete");
        Ok(videos)
    }
}
