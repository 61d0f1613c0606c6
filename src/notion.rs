//! Notion client: creates one database page per saved note.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::classifier::Note;

const NOTION_API_BASE_URL: &str = "https://api.notion.com";
const NOTION_API_VERSION: &str = "2022-06-28";

/// Document-store seam used by the dispatcher.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Create one document; returns its canonical URL.
    async fn create_page(&self, note: &Note) -> Result<String, Error>;
}

pub struct NotionClient {
    api_key: String,
    database_id: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct PageResponse {
    url: String,
}

impl NotionClient {
    pub fn new(api_key: String, database_id: String) -> Self {
        Self {
            api_key,
            database_id,
            base_url: NOTION_API_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: String, database_id: String, base_url: String) -> Self {
        Self {
            api_key,
            database_id,
            base_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NoteStore for NotionClient {
    async fn create_page(&self, note: &Note) -> Result<String, Error> {
        let request = json!({
            "parent": { "database_id": self.database_id },
            "properties": {
                "Title": { "title": [{ "text": { "content": note.title } }] },
                "Tag": { "multi_select": [{ "name": note.tag }] },
            },
            "children": [{
                "object": "block",
                "type": "paragraph",
                "paragraph": {
                    "rich_text": [{ "type": "text", "text": { "content": note.body } }]
                },
            }],
        });

        let response = self
            .http
            .post(format!("{}/v1/pages", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let page: PageResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(page.url)
    }
}

/// Store the note; any store failure is logged and absorbed into absence.
pub async fn persist(store: &dyn NoteStore, note: &Note) -> Option<String> {
    match store.create_page(note).await {
        Ok(url) => Some(url),
        Err(e) => {
            error!("Notion error: {e}");
            None
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
