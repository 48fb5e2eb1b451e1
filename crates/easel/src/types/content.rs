//! Content blocks for tool results.

use serde::{Deserialize, Serialize};

/// A content block in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text.
    Text { text: String },

    /// Base64-encoded image.
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Link to content served out of band (e.g. an artifact URL).
    #[serde(rename = "resource_link")]
    ResourceLink {
        uri: String,
        name: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Content::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn resource_link(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Content::ResourceLink {
            uri: uri.into(),
            name: name.into(),
            mime_type: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_block() {
        let json = serde_json::to_value(Content::text("done")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "done");
    }

    #[test]
    fn image_block_uses_camel_case_mime() {
        let json = serde_json::to_value(Content::image("aGk=", "image/png")).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["mimeType"], "image/png");
    }

    #[test]
    fn resource_link_block() {
        let json =
            serde_json::to_value(Content::resource_link("/artifact/abc123", "abc123")).unwrap();
        assert_eq!(json["type"], "resource_link");
        assert_eq!(json["uri"], "/artifact/abc123");
        assert!(json.get("mimeType").is_none());
    }
}
