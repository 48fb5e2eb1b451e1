//! Diffusion backend.
//!
//! Generation itself is a black box behind [`DiffusionBackend`]: hand over a
//! family, an operation, and the fully-resolved parameter payload, get back
//! the pipeline's raw JSON response. The production implementation forwards
//! to a local inference runner over HTTP and never retries.
//!
//! Pipeline responses come in two shapes depending on the caller-supplied
//! `return_dict` parameter: a wrapper object carrying an image list, or the
//! bare list. [`extract_primary_image`] is the one place that branches on
//! this, and the expected wrapper key is declared per family rather than
//! inferred from a sibling.

use std::time::Duration;

use async_trait::async_trait;
use easel::ToolError;
use serde_json::{Map, Value};
use thiserror::Error;

/// The three served pipeline families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    StableDiffusion,
    StableDiffusionXl,
    StableDiffusion3,
}

impl ModelFamily {
    pub fn slug(self) -> &'static str {
        match self {
            ModelFamily::StableDiffusion => "stable_diffusion",
            ModelFamily::StableDiffusionXl => "stable_diffusion_xl",
            ModelFamily::StableDiffusion3 => "stable_diffusion_3",
        }
    }

    /// Wrapper shape of this family's pipeline responses.
    ///
    /// Every family declares its own shape even where they currently agree;
    /// the check must never be copied from a sibling family.
    pub fn result_shape(self) -> ResultShape {
        match self {
            ModelFamily::StableDiffusion => ResultShape { wrapper_key: "images" },
            ModelFamily::StableDiffusionXl => ResultShape { wrapper_key: "images" },
            ModelFamily::StableDiffusion3 => ResultShape { wrapper_key: "images" },
        }
    }
}

/// Key under which a wrapper response carries its image list.
#[derive(Debug, Clone, Copy)]
pub struct ResultShape {
    pub wrapper_key: &'static str,
}

/// The three operations each family exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    TextToImage,
    ImageToImage,
    Inpaint,
}

impl GenerationMode {
    pub fn slug(self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "text_to_image",
            GenerationMode::ImageToImage => "img2img",
            GenerationMode::Inpaint => "inpaint",
        }
    }
}

/// One generation request, parameters fully resolved.
#[derive(Debug)]
pub struct GenerationJob {
    pub family: ModelFamily,
    pub mode: GenerationMode,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("inference runner unreachable: {0}")]
    Unreachable(String),

    #[error("inference runner timed out")]
    Timeout,

    #[error("inference runner error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed runner response: {0}")]
    InvalidResponse(String),
}

/// The black-box generation capability.
#[async_trait]
pub trait DiffusionBackend: Send + Sync {
    async fn run(&self, job: GenerationJob) -> Result<Value, BackendError>;
}

/// HTTP client for a local diffusion inference runner.
pub struct HttpDiffusionRunner {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDiffusionRunner {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl DiffusionBackend for HttpDiffusionRunner {
    async fn run(&self, job: GenerationJob) -> Result<Value, BackendError> {
        let url = format!(
            "{}/pipelines/{}/{}",
            self.base_url,
            job.family.slug(),
            job.mode.slug()
        );

        tracing::info!(family = job.family.slug(), mode = job.mode.slug(), "running pipeline");
        let response = self
            .client
            .post(&url)
            .json(&job.parameters)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout
                } else {
                    BackendError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

/// Pull the single output image (base64) out of a pipeline response.
///
/// Branches on the two declared shapes, takes the first element of the list,
/// and type-checks what it found; any surprise is an `UnexpectedResultType`
/// so the dispatcher reports it as such rather than as an operation failure.
pub fn extract_primary_image(response: &Value, shape: ResultShape) -> Result<String, ToolError> {
    let images = match response {
        Value::Object(map) => map
            .get(shape.wrapper_key)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ToolError::UnexpectedResultType(format!(
                    "wrapper response has no `{}` list",
                    shape.wrapper_key
                ))
            })?,
        Value::Array(items) => items,
        other => {
            return Err(ToolError::UnexpectedResultType(format!(
                "expected a wrapper object or a list, got {}",
                other
            )));
        }
    };

    let first = images.first().ok_or_else(|| {
        ToolError::UnexpectedResultType("pipeline returned no images".to_string())
    })?;

    first
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ToolError::UnexpectedResultType("image entry is not an encoded string".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SHAPE: ResultShape = ResultShape { wrapper_key: "images" };

    #[test]
    fn extracts_from_wrapper_object() {
        let response = json!({"images": ["QUJD", "REVG"], "nsfw_content_detected": [false]});
        assert_eq!(extract_primary_image(&response, SHAPE).unwrap(), "QUJD");
    }

    #[test]
    fn extracts_from_bare_list() {
        let response = json!(["QUJD"]);
        assert_eq!(extract_primary_image(&response, SHAPE).unwrap(), "QUJD");
    }

    #[test]
    fn both_shapes_extract_identically() {
        let wrapped = json!({"images": ["QUJD"]});
        let bare = json!(["QUJD"]);
        assert_eq!(
            extract_primary_image(&wrapped, SHAPE).unwrap(),
            extract_primary_image(&bare, SHAPE).unwrap()
        );
    }

    #[test]
    fn missing_wrapper_key_is_unexpected_result() {
        let response = json!({"outputs": ["QUJD"]});
        let err = extract_primary_image(&response, SHAPE).unwrap_err();
        assert!(matches!(err, ToolError::UnexpectedResultType(_)));
    }

    #[test]
    fn empty_image_list_is_unexpected_result() {
        let err = extract_primary_image(&json!({"images": []}), SHAPE).unwrap_err();
        assert!(matches!(err, ToolError::UnexpectedResultType(_)));
    }

    #[test]
    fn non_string_entry_is_unexpected_result() {
        let err = extract_primary_image(&json!({"images": [42]}), SHAPE).unwrap_err();
        assert!(matches!(err, ToolError::UnexpectedResultType(_)));
    }

    #[test]
    fn scalar_response_is_unexpected_result() {
        let err = extract_primary_image(&json!("QUJD"), SHAPE).unwrap_err();
        assert!(matches!(err, ToolError::UnexpectedResultType(_)));
    }

    #[test]
    fn every_family_declares_a_shape() {
        for family in [
            ModelFamily::StableDiffusion,
            ModelFamily::StableDiffusionXl,
            ModelFamily::StableDiffusion3,
        ] {
            assert_eq!(family.result_shape().wrapper_key, "images");
        }
    }
}
