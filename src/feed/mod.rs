use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::Discourse;
use crate::feed::model::{CategoriesResp, TagsResp};

pub mod model;

/// One snapshot of the forum taxonomy, deduplicated and ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub categories: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

/// Anything that can produce the current taxonomy snapshot.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Feed>;
}

#[derive(Clone)]
pub struct DiscourseClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for DiscourseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscourseClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DiscourseClient {
    pub fn from_config(cfg: &Discourse) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends in '/'.
        let mut base = cfg.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("invalid discourse.base_url")?;
        let http = Client::builder()
            .user_agent("discourse-notifier/0.1")
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key: cfg.api_key.clone(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<String> {
        let url = self.base_url.join(path).context("invalid endpoint path")?;
        let res = self
            .http
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("failed to reach discourse endpoint {}", path))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("discourse error {}: {}", status, body));
        }
        res.text()
            .await
            .with_context(|| format!("failed to read discourse response for {}", path))
    }

    pub async fn fetch_categories(&self) -> Result<BTreeSet<String>> {
        let body = self.get_json("categories.json").await?;
        let resp: CategoriesResp =
            serde_json::from_str(&body).context("invalid categories.json response")?;
        Ok(category_names(resp))
    }

    pub async fn fetch_tags(&self) -> Result<BTreeSet<String>> {
        let body = self.get_json("tags.json").await?;
        let resp: TagsResp = serde_json::from_str(&body).context("invalid tags.json response")?;
        Ok(tag_names(resp))
    }
}

#[async_trait]
impl FeedSource for DiscourseClient {
    async fn fetch(&self) -> Result<Feed> {
        let (categories, tags) = tokio::try_join!(self.fetch_categories(), self.fetch_tags())?;
        debug!(
            categories = categories.len(),
            tags = tags.len(),
            "fetched discourse taxonomy"
        );
        Ok(Feed { categories, tags })
    }
}

/// Collapse the categories payload to a set of names. Duplicate names
/// (e.g. subcategories named like a parent) collapse to one entry.
pub fn category_names(resp: CategoriesResp) -> BTreeSet<String> {
    resp.category_list
        .categories
        .into_iter()
        .map(|c| c.name)
        .collect()
}

/// Collapse the tags payload to a set of names. Discourse reports the
/// tag name in the `id` field.
pub fn tag_names(resp: TagsResp) -> BTreeSet<String> {
    resp.tags.into_iter().map(|t| t.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cfg(base_url: &str) -> Discourse {
        Discourse {
            base_url: base_url.into(),
            api_key: "k".into(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn category_names_dedupes_and_sorts() {
        let body = r#"{
            "category_list": {
                "can_create_category": false,
                "categories": [
                    {"id": 7, "name": "General", "slug": "general"},
                    {"id": 9, "name": "Announcements", "slug": "announcements"},
                    {"id": 12, "name": "General", "slug": "general-2"}
                ]
            }
        }"#;
        let resp: CategoriesResp = serde_json::from_str(body).unwrap();
        let names = category_names(resp);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["Announcements".to_string(), "General".to_string()]
        );
    }

    #[test]
    fn tag_names_uses_tag_id() {
        let body = r#"{
            "tags": [
                {"id": "feature", "text": "feature", "count": 1},
                {"id": "bug", "text": "bug", "count": 3},
                {"id": "bug", "text": "bug", "count": 3}
            ]
        }"#;
        let resp: TagsResp = serde_json::from_str(body).unwrap();
        let names = tag_names(resp);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["bug".to_string(), "feature".to_string()]
        );
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client =
            DiscourseClient::from_config(&sample_cfg("https://forum.example.com/community"))
                .unwrap();
        let url = client.base_url.join("categories.json").unwrap();
        assert_eq!(
            url.as_str(),
            "https://forum.example.com/community/categories.json"
        );
    }

    #[test]
    fn from_config_rejects_bad_base_url() {
        assert!(DiscourseClient::from_config(&sample_cfg("not a url")).is_err());
    }
}
