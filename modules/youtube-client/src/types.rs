use serde::Deserialize;

/// Top-level envelope for `search.list` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub id: SearchItemId,
    pub snippet: Option<Snippet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItemId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "channelId", default)]
    pub channel_id: String,
    #[serde(rename = "channelTitle", default)]
    pub channel_title: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
}

/// A found video, flattened from the API item.
#[derive(Debug, Clone)]
pub struct Video {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: Option<String>,
}

impl Video {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}
