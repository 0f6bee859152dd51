//! Content parts of a transcript message.

use serde::{Deserialize, Serialize};

/// One ordered piece of message content.
///
/// # Examples
///
/// ```
/// use relaychat_core::Part;
///
/// let text = Part::text("What does this scan show?");
/// let image = Part::image("/uploads/1700000000000-scan.png");
///
/// assert_eq!(text.as_text(), Some("What does this scan show?"));
/// assert_eq!(image.as_text(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text itself
        text: String,
    },
    /// An image, referenced by URL, stored reference or local preview.
    Image {
        /// Reference or URL of the image
        content: String,
    },
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Creates an image part.
    pub fn image(content: impl Into<String>) -> Self {
        Part::Image {
            content: content.into(),
        }
    }

    /// Returns the text of a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::Image { .. } => None,
        }
    }
}
