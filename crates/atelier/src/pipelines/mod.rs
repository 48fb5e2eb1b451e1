//! Generation tool registries, one per model family.
//!
//! Each family module declares its tools as parameter descriptor tables
//! mirroring the underlying pipelines' call signatures; everything the
//! caller supplies is forwarded verbatim to the backend. The handler body is
//! shared: resolve image artifact references, run the pipeline, extract the
//! primary image, store it, hand back its artifact reference.

pub mod stable_diffusion;
pub mod stable_diffusion_3;
pub mod stable_diffusion_xl;

use std::sync::Arc;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use easel::{Arguments, OpaqueType, ParamSpec, ToolDef, ValueSchema, WireForm};
use serde_json::Value;

use crate::artifacts::ArtifactStore;
use crate::backend::{
    extract_primary_image, DiffusionBackend, GenerationJob, GenerationMode, ModelFamily,
};

/// An image buffer held by the server; crosses the wire as an artifact hash.
pub const IMAGE: OpaqueType = OpaqueType {
    format: "image-artifact",
    wire: WireForm::StringRef,
};

/// A device-resident tensor; cannot cross the wire at all.
pub const TENSOR: OpaqueType = OpaqueType {
    format: "tensor-handle",
    wire: WireForm::Forbidden,
};

/// Pseudo-random generator state; crosses the wire as an integer seed.
pub const RNG: OpaqueType = OpaqueType {
    format: "rng-seed",
    wire: WireForm::IntegerRef,
};

/// Shared dependencies of every generation tool.
pub struct PipelineContext {
    pub backend: Arc<dyn DiffusionBackend>,
    pub store: ArtifactStore,
}

/// Build one generation tool: declared parameters plus the shared handler.
///
/// `image_params` names the parameters whose artifact references must be
/// resolved to image payloads before the job is forwarded.
pub(crate) fn generation_tool(
    ctx: Arc<PipelineContext>,
    name: &str,
    description: &str,
    family: ModelFamily,
    mode: GenerationMode,
    image_params: &'static [&'static str],
    params: impl IntoIterator<Item = ParamSpec>,
) -> ToolDef {
    ToolDef::new(
        name,
        description,
        ValueSchema::Opaque(IMAGE),
        move |args| run_generation(ctx.clone(), family, mode, image_params, args),
    )
    .params(params)
}

/// The shared handler body for all nine generation tools.
async fn run_generation(
    ctx: Arc<PipelineContext>,
    family: ModelFamily,
    mode: GenerationMode,
    image_params: &'static [&'static str],
    mut args: Arguments,
) -> anyhow::Result<Value> {
    for name in image_params {
        inline_image(&ctx.store, &mut args, name)?;
    }

    let raw = ctx
        .backend
        .run(GenerationJob {
            family,
            mode,
            parameters: args,
        })
        .await
        .with_context(|| format!("{} {}", family.slug(), mode.slug()))?;

    let encoded = extract_primary_image(&raw, family.result_shape())?;
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .context("runner returned undecodable image data")?;

    let hash = ctx.store.write(&bytes, "image/png")?;
    tracing::debug!(artifact = %hash, "stored generated image");
    Ok(Value::String(hash))
}

/// Swap an artifact reference for the image payload the runner expects.
/// Null (omitted optional image) passes through untouched.
fn inline_image(store: &ArtifactStore, args: &mut Arguments, name: &str) -> anyhow::Result<()> {
    let Some(hash) = args.get(name).and_then(Value::as_str).map(str::to_string) else {
        return Ok(());
    };
    let bytes = store
        .read(&hash)?
        .with_context(|| format!("image artifact `{}` not found", hash))?;
    args.insert(name.to_string(), Value::String(BASE64.encode(bytes)));
    Ok(())
}

// --- Parameter constructors shared across the family tables ---

pub(crate) fn model_param() -> ParamSpec {
    ParamSpec::new("model_id_or_path", ValueSchema::String)
        .describe("Hub id or local path of the pretrained pipeline")
}

pub(crate) fn prompt_param() -> ParamSpec {
    ParamSpec::new(
        "prompt",
        ValueSchema::scalar_or_list(ValueSchema::String),
    )
    .describe("Prompt(s) to guide generation")
}

pub(crate) fn optional_prompt(name: &str) -> ParamSpec {
    ParamSpec::new(
        name,
        ValueSchema::nullable(ValueSchema::scalar_or_list(ValueSchema::String)),
    )
}

pub(crate) fn image_param(name: &str, description: &str) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::Opaque(IMAGE)).describe(description)
}

pub(crate) fn optional_image(name: &str) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::nullable(ValueSchema::Opaque(IMAGE)))
}

pub(crate) fn tensor_param(name: &str) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::nullable(ValueSchema::Opaque(TENSOR)))
}

pub(crate) fn tensor_list_param(name: &str) -> ParamSpec {
    ParamSpec::new(
        name,
        ValueSchema::nullable(ValueSchema::list(ValueSchema::Opaque(TENSOR))),
    )
}

pub(crate) fn generator_param() -> ParamSpec {
    ParamSpec::new(
        "generator",
        ValueSchema::nullable(ValueSchema::scalar_or_list(ValueSchema::Opaque(RNG))),
    )
    .describe("Seed(s) for deterministic generation")
}

pub(crate) fn nullable_int(name: &str) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::nullable(ValueSchema::Integer))
}

pub(crate) fn nullable_float(name: &str) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::nullable(ValueSchema::Float))
}

pub(crate) fn int_with_default(name: &str, default: i64) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::Integer).with_default(default)
}

pub(crate) fn float_with_default(name: &str, default: f64) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::Float).with_default(default)
}

pub(crate) fn int_list_param(name: &str) -> ParamSpec {
    ParamSpec::new(
        name,
        ValueSchema::nullable(ValueSchema::list(ValueSchema::Integer)),
    )
}

pub(crate) fn float_list_param(name: &str) -> ParamSpec {
    ParamSpec::new(
        name,
        ValueSchema::nullable(ValueSchema::list(ValueSchema::Float)),
    )
}

/// `(width, height)` pairs the XL pipelines take for micro-conditioning.
pub(crate) fn size_pair(name: &str) -> ParamSpec {
    ParamSpec::new(
        name,
        ValueSchema::nullable(ValueSchema::list(ValueSchema::Integer)),
    )
    .describe("Pixel pair [width, height]")
}

pub(crate) fn attention_kwargs(name: &str) -> ParamSpec {
    ParamSpec::new(name, ValueSchema::nullable(ValueSchema::Object))
}

pub(crate) fn output_type_param() -> ParamSpec {
    ParamSpec::new("output_type", ValueSchema::nullable(ValueSchema::String)).with_default("pil")
}

pub(crate) fn return_dict_param() -> ParamSpec {
    ParamSpec::new("return_dict", ValueSchema::Boolean)
        .with_default(true)
        .describe("Return the structured pipeline output instead of the bare tuple")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use easel::ToolError;
    use serde_json::{json, Map};
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::backend::BackendError;

    struct FakeBackend {
        response: Value,
        seen: Mutex<Vec<(ModelFamily, GenerationMode, Map<String, Value>)>>,
    }

    impl FakeBackend {
        fn returning(response: Value) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn last_parameters(&self) -> Map<String, Value> {
            self.seen.lock().unwrap().last().unwrap().2.clone()
        }
    }

    #[async_trait]
    impl DiffusionBackend for FakeBackend {
        async fn run(&self, job: GenerationJob) -> Result<Value, BackendError> {
            self.seen
                .lock()
                .unwrap()
                .push((job.family, job.mode, job.parameters));
            Ok(self.response.clone())
        }
    }

    fn context(response: Value) -> (TempDir, Arc<FakeBackend>, Arc<PipelineContext>) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let backend = Arc::new(FakeBackend::returning(response));
        let ctx = Arc::new(PipelineContext {
            backend: backend.clone(),
            store,
        });
        (dir, backend, ctx)
    }

    fn png_base64() -> String {
        BASE64.encode(b"fake png bytes")
    }

    #[tokio::test]
    async fn text_to_image_stores_the_output() {
        let (_dir, _backend, ctx) = context(json!({"images": [png_base64()]}));
        let registry = stable_diffusion::registry(ctx.clone()).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("a lighthouse at dusk"));

        let value = registry
            .dispatch("stable_diffusion_text_to_image", args)
            .await
            .unwrap();
        let hash = value.as_str().unwrap();
        assert_eq!(ctx.store.read(hash).unwrap().unwrap(), b"fake png bytes");
    }

    #[tokio::test]
    async fn defaults_are_forwarded_verbatim() {
        let (_dir, backend, ctx) = context(json!({"images": [png_base64()]}));
        let registry = stable_diffusion::registry(ctx).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("a lighthouse"));
        registry
            .dispatch("stable_diffusion_text_to_image", args)
            .await
            .unwrap();

        let sent = backend.last_parameters();
        assert_eq!(sent["num_inference_steps"], json!(50));
        assert_eq!(sent["guidance_scale"], json!(7.5));
        assert_eq!(sent["return_dict"], json!(true));
        assert_eq!(sent["output_type"], json!("pil"));
        // Prompt was lifted into a list by the scalar-or-list coercion.
        assert_eq!(sent["prompt"], json!(["a lighthouse"]));
        // Omitted nullable parameters travel as explicit nulls.
        assert_eq!(sent["height"], Value::Null);
    }

    #[tokio::test]
    async fn bare_list_response_extracts_identically() {
        let (_dir, _backend, ctx) = context(json!([png_base64()]));
        let registry = stable_diffusion::registry(ctx.clone()).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("a lighthouse"));
        args.insert("return_dict".to_string(), json!(false));

        let value = registry
            .dispatch("stable_diffusion_text_to_image", args)
            .await
            .unwrap();
        assert!(ctx.store.read(value.as_str().unwrap()).unwrap().is_some());
    }

    #[tokio::test]
    async fn img2img_inlines_the_input_artifact() {
        let (_dir, backend, ctx) = context(json!({"images": [png_base64()]}));
        let input_hash = ctx.store.write(b"input image", "image/png").unwrap();
        let registry = stable_diffusion::registry(ctx).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("repaint it"));
        args.insert("image".to_string(), json!(input_hash));

        registry
            .dispatch("stable_diffusion_img2img", args)
            .await
            .unwrap();

        let sent = backend.last_parameters();
        assert_eq!(sent["image"], json!(BASE64.encode(b"input image")));
    }

    #[tokio::test]
    async fn missing_input_artifact_fails_the_operation() {
        let (_dir, _backend, ctx) = context(json!({"images": [png_base64()]}));
        let registry = stable_diffusion::registry(ctx).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("repaint it"));
        args.insert(
            "image".to_string(),
            json!("00000000000000000000000000000000"),
        );

        let err = registry
            .dispatch("stable_diffusion_img2img", args)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn tensor_parameters_cannot_cross_the_wire() {
        let (_dir, _backend, ctx) = context(json!({"images": [png_base64()]}));
        let registry = stable_diffusion::registry(ctx).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("a lighthouse"));
        args.insert("latents".to_string(), json!({"shape": [1, 4, 64, 64]}));

        let err = registry
            .dispatch("stable_diffusion_text_to_image", args)
            .await
            .unwrap_err();
        match err {
            ToolError::InvalidArgument(msg) => {
                assert!(msg.contains("cannot be supplied over the wire"))
            }
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn seed_generator_is_accepted_as_integer() {
        let (_dir, backend, ctx) = context(json!({"images": [png_base64()]}));
        let registry = stable_diffusion::registry(ctx).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("a lighthouse"));
        args.insert("generator".to_string(), json!(1234));

        registry
            .dispatch("stable_diffusion_text_to_image", args)
            .await
            .unwrap();
        assert_eq!(backend.last_parameters()["generator"], json!([1234]));
    }

    #[tokio::test]
    async fn runner_without_images_is_unexpected_result() {
        let (_dir, _backend, ctx) = context(json!({"images": []}));
        let registry = stable_diffusion::registry(ctx).unwrap();

        let mut args = Arguments::new();
        args.insert("model_id_or_path".to_string(), json!("sd15"));
        args.insert("prompt".to_string(), json!("a lighthouse"));

        let err = registry
            .dispatch("stable_diffusion_text_to_image", args)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnexpectedResultType(_)));
    }
}
