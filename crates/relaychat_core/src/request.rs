//! Generation request and buffered response wire types.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Body of `POST /generate`.
///
/// The relay forwards this body to the backend byte for byte; the typed form
/// exists for the client side. Either `image_paths` or `images` is accepted
/// on input, `image_paths` is emitted.
///
/// # Examples
///
/// ```
/// use relaychat_core::GenerationRequest;
///
/// let request = GenerationRequest::builder()
///     .prompt("Describe the image")
///     .image_paths(vec!["/uploads/scan.png".to_string()])
///     .build()
///     .unwrap();
///
/// let json = serde_json::to_value(&request).unwrap();
/// assert_eq!(json["image_paths"][0], "/uploads/scan.png");
/// assert!(json.get("temperature").is_none());
/// ```
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(setter(into))]
pub struct GenerationRequest {
    /// Prompt text
    prompt: String,
    /// References of previously uploaded files
    #[serde(default, alias = "images")]
    #[builder(default)]
    image_paths: Vec<String>,
    /// Maximum number of generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    max_new_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    temperature: Option<f32>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    top_p: Option<f32>,
    /// Whether to sample instead of greedy decoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    do_sample: Option<bool>,
}

impl GenerationRequest {
    /// Returns a builder for constructing a GenerationRequest.
    pub fn builder() -> GenerationRequestBuilder {
        GenerationRequestBuilder::default()
    }

    /// Creates a request with a prompt, references and sampling options.
    pub fn new(
        prompt: impl Into<String>,
        image_paths: Vec<String>,
        options: &GenerationOptions,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            image_paths,
            max_new_tokens: options.max_new_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            do_sample: options.do_sample,
        }
    }
}

/// Sampling options applied to every request of a session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum number of generated tokens
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Whether to sample
    #[serde(default)]
    pub do_sample: Option<bool>,
}

/// A fully buffered generation response.
///
/// Backends disagree on the field carrying the text; [`BufferedResponse::text`]
/// resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Getters)]
pub struct BufferedResponse {
    /// Reply text without the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    /// Full decoded output, prompt included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generated_text: Option<String>,
    /// Reply text as emitted by chat-style backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    /// Error reported by the backend or relay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BufferedResponse {
    /// Creates a response carrying `response` text only.
    pub fn from_response(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            ..Self::default()
        }
    }

    /// Reply text: `response`, else `generated_text`, else `content`.
    ///
    /// # Examples
    ///
    /// ```
    /// use relaychat_core::BufferedResponse;
    ///
    /// let body: BufferedResponse =
    ///     serde_json::from_str(r#"{"generated_text": "full output"}"#).unwrap();
    /// assert_eq!(body.text(), Some("full output"));
    /// ```
    pub fn text(&self) -> Option<&str> {
        self.response
            .as_deref()
            .or(self.generated_text.as_deref())
            .or(self.content.as_deref())
    }
}
