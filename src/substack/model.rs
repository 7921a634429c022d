//! Response shapes of the Substack endpoints the backup reads.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::{parse_timestamp, ContentType, RemoteListItem};

#[derive(Deserialize, Debug, Default)]
pub struct ListResponse {
    #[serde(default)]
    pub posts: Vec<ListedPost>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ListedPost {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub draft_updated_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub post_date: Option<String>,
}

impl ListedPost {
    /// Drafts are versioned by `draft_updated_at`, published posts by `updated_at`.
    pub fn into_item(self, content_type: ContentType) -> RemoteListItem {
        let stamp = match content_type {
            ContentType::Drafts => self.draft_updated_at.as_deref(),
            ContentType::Published => self.updated_at.as_deref(),
        };
        RemoteListItem {
            id: self.id,
            updated_at: parse_timestamp(stamp),
            slug: self.slug.filter(|s| !s.trim().is_empty()),
            cover_image: self.cover_image.filter(|s| !s.trim().is_empty()),
            post_date: parse_timestamp(self.post_date.as_deref()),
        }
    }
}

/// `GET /api/v1/drafts/{id}`
#[derive(Deserialize, Debug, Clone, Default)]
pub struct DraftDetail {
    #[serde(default)]
    pub draft_title: Option<String>,
    #[serde(default)]
    pub draft_body: Option<Value>,
    #[serde(default)]
    pub draft_updated_at: Option<String>,
}

impl DraftDetail {
    pub fn body_text(&self) -> Option<String> {
        body_text(self.draft_body.as_ref())
    }
}

/// `GET /api/v1/posts/{slug}`
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PostDetail {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub post_date: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

impl PostDetail {
    /// The document body; rendered HTML is wrapped as `{"html": ...}` when
    /// that is all the post carries.
    pub fn body_text(&self) -> Option<String> {
        body_text(self.body.as_ref()).or_else(|| {
            self.body_html
                .as_deref()
                .filter(|html| !html.trim().is_empty())
                .map(|html| json!({ "html": html }).to_string())
        })
    }
}

// Bodies usually arrive as a JSON document encoded in a string, occasionally inline.
fn body_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_timestamp_depends_on_content_type() {
        let post: ListedPost = serde_json::from_value(json!({
            "id": 3,
            "slug": "third",
            "draft_updated_at": "2024-05-01T00:00:00Z",
            "updated_at": "2024-04-01T00:00:00Z",
            "post_date": "2024-03-01T00:00:00Z"
        }))
        .unwrap();

        let draft = post.clone().into_item(ContentType::Drafts);
        let published = post.into_item(ContentType::Published);
        assert_eq!(draft.updated_at.unwrap().to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert_eq!(published.updated_at.unwrap().to_rfc3339(), "2024-04-01T00:00:00+00:00");
        assert!(published.post_date.is_some());
    }

    #[test]
    fn empty_slug_is_dropped() {
        let post: ListedPost = serde_json::from_value(json!({ "id": 1, "slug": "" })).unwrap();
        assert_eq!(post.into_item(ContentType::Published).slug, None);
    }

    #[test]
    fn bodies_accept_string_or_inline_documents() {
        let draft: DraftDetail =
            serde_json::from_value(json!({ "draft_body": "{\"type\":\"doc\"}" })).unwrap();
        assert_eq!(draft.body_text().as_deref(), Some("{\"type\":\"doc\"}"));

        let draft: DraftDetail =
            serde_json::from_value(json!({ "draft_body": { "type": "doc" } })).unwrap();
        assert_eq!(draft.body_text().as_deref(), Some("{\"type\":\"doc\"}"));

        let draft: DraftDetail = serde_json::from_value(json!({ "draft_body": null })).unwrap();
        assert_eq!(draft.body_text(), None);
    }

    #[test]
    fn post_body_falls_back_to_html() {
        let post: PostDetail =
            serde_json::from_value(json!({ "body": null, "body_html": "<p>hi</p>" })).unwrap();
        let body: Value = serde_json::from_str(&post.body_text().unwrap()).unwrap();
        assert_eq!(body, json!({ "html": "<p>hi</p>" }));

        let post: PostDetail =
            serde_json::from_value(json!({ "body": null, "body_html": "  " })).unwrap();
        assert_eq!(post.body_text(), None);
    }
}
