use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, warn};

use crate::error::{BackupError, Result};
use crate::model::{parse_timestamp, ContentDetail, ContentType, RemoteListItem};

pub mod model;

pub use model::{DraftDetail, ListResponse, ListedPost, PostDetail};

/// A publication root, e.g. `https://example.substack.com/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    base_url: Url,
}

impl Site {
    /// Build from the configured host name. A scheme or trailing slash typed by
    /// the user is tolerated; anything with a path is rejected.
    pub fn from_host(host: &str) -> Result<Self> {
        let trimmed = host
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(BackupError::Configuration(
                "substackUrl is not configured".into(),
            ));
        }
        let base_url = Url::parse(&format!("https://{}/", trimmed)).map_err(|err| {
            BackupError::Configuration(format!("invalid substackUrl '{}': {}", host, err))
        })?;
        if base_url.host_str().is_none() || base_url.path() != "/" {
            return Err(BackupError::Configuration(format!(
                "substackUrl must be a bare host name, got '{}'",
                host
            )));
        }
        Ok(Self { base_url })
    }

    pub fn from_base_url(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn listing_url(
        &self,
        content_type: ContentType,
        offset: usize,
        limit: usize,
    ) -> Result<Url> {
        let mut url = self.join(&format!(
            "api/v1/post_management/{}",
            content_type.as_str()
        ))?;
        let order_by = match content_type {
            ContentType::Drafts => "draft_updated_at",
            ContentType::Published => "post_date",
        };
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string())
            .append_pair("order_by", order_by)
            .append_pair("order_direction", "desc");
        Ok(url)
    }

    pub fn draft_url(&self, id: i64) -> Result<Url> {
        self.join(&format!("api/v1/drafts/{}", id))
    }

    pub fn post_url(&self, slug: &str) -> Result<Url> {
        let mut url = self.join("api/v1/posts/")?;
        url.path_segments_mut()
            .map_err(|_| BackupError::Configuration("substackUrl cannot be a base".into()))?
            .pop_if_empty()
            .push(slug);
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| BackupError::Configuration(format!("invalid API path {}: {}", path, err)))
    }
}

/// Read-only operations against the remote content API.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn list_page(
        &self,
        site: &Site,
        content_type: ContentType,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RemoteListItem>>;

    async fn fetch_draft(&self, site: &Site, id: i64) -> Result<DraftDetail>;

    async fn fetch_post(&self, site: &Site, slug: &str) -> Result<PostDetail>;
}

#[derive(Clone)]
pub struct SubstackClient {
    http: Client,
}

impl fmt::Debug for SubstackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubstackClient").finish_non_exhaustive()
    }
}

impl SubstackClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let http = Client::builder().user_agent(user_agent).no_proxy().build()?;
        Ok(Self { http })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "substack request");
        let res = self.http.get(url.clone()).send().await?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %url, "rate limited by Substack");
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            debug!(%status, url = %url, body = %body, "substack error body");
            return Err(BackupError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        res.json::<T>()
            .await
            .map_err(|err| BackupError::Decode(format!("{}: {}", url, err)))
    }
}

#[async_trait]
impl ContentApi for SubstackClient {
    async fn list_page(
        &self,
        site: &Site,
        content_type: ContentType,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RemoteListItem>> {
        let url = site.listing_url(content_type, offset, limit)?;
        let page: ListResponse = self.get_json(url).await?;
        Ok(page
            .posts
            .into_iter()
            .map(|p| p.into_item(content_type))
            .collect())
    }

    async fn fetch_draft(&self, site: &Site, id: i64) -> Result<DraftDetail> {
        self.get_json(site.draft_url(id)?).await
    }

    async fn fetch_post(&self, site: &Site, slug: &str) -> Result<PostDetail> {
        self.get_json(site.post_url(slug)?).await
    }
}

/// Resolve the full record for one listed item.
///
/// Drafts come from the draft endpoint by id. Published posts are looked up by
/// slug, then the draft endpoint is asked for the unrendered body of the same
/// id; if that second call fails the published body is kept.
pub async fn fetch_detail(
    api: &dyn ContentApi,
    site: &Site,
    content_type: ContentType,
    item: &RemoteListItem,
) -> Result<ContentDetail> {
    match content_type {
        ContentType::Drafts => {
            let draft = api.fetch_draft(site, item.id).await?;
            Ok(ContentDetail {
                id: item.id,
                title: non_empty(draft.draft_title.clone()),
                body: draft.body_text(),
                slug: item.slug.clone(),
                updated_at: item
                    .updated_at
                    .or_else(|| parse_timestamp(draft.draft_updated_at.as_deref())),
                published_at: None,
                cover_image: None,
            })
        }
        ContentType::Published => {
            let slug = item
                .slug
                .as_deref()
                .ok_or(BackupError::MissingSlug(item.id))?;
            let post = api.fetch_post(site, slug).await?;

            let (draft_title, body) = match api.fetch_draft(site, item.id).await {
                Ok(draft) => (
                    non_empty(draft.draft_title.clone()),
                    draft.body_text().or_else(|| post.body_text()),
                ),
                Err(err) => {
                    warn!(%err, id = item.id, "draft body unavailable, keeping published body");
                    (None, post.body_text())
                }
            };

            Ok(ContentDetail {
                id: item.id,
                title: non_empty(post.title.clone()).or(draft_title),
                body,
                slug: non_empty(post.slug.clone()).or_else(|| item.slug.clone()),
                updated_at: item
                    .updated_at
                    .or_else(|| parse_timestamp(post.updated_at.as_deref())),
                published_at: parse_timestamp(post.post_date.as_deref()).or(item.post_date),
                cover_image: non_empty(post.cover_image.clone())
                    .or_else(|| item.cover_image.clone()),
            })
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
