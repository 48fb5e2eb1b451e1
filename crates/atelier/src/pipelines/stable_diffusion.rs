//! Stable Diffusion (v1/v2) tools.

use std::sync::Arc;

use easel::{Registry, ToolDef, ToolError};

use super::{
    attention_kwargs, float_list_param, float_with_default, generation_tool, generator_param,
    image_param, int_list_param, int_with_default, model_param, nullable_float, nullable_int,
    optional_image, optional_prompt, output_type_param, prompt_param, return_dict_param,
    tensor_list_param, tensor_param, PipelineContext,
};
use crate::backend::{GenerationMode, ModelFamily};

pub fn registry(ctx: Arc<PipelineContext>) -> Result<Registry, ToolError> {
    let mut registry = Registry::new("stable_diffusion");
    registry.register(text_to_image(ctx.clone()))?;
    registry.register(img2img(ctx.clone()))?;
    registry.register(inpaint(ctx))?;
    Ok(registry)
}

fn text_to_image(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_text_to_image",
        "Generate an image from a prompt using Stable Diffusion",
        ModelFamily::StableDiffusion,
        GenerationMode::TextToImage,
        &["ip_adapter_image"],
        vec![
            model_param(),
            prompt_param(),
            nullable_int("height"),
            nullable_int("width"),
            int_with_default("num_inference_steps", 50),
            int_list_param("timesteps"),
            float_list_param("sigmas"),
            float_with_default("guidance_scale", 7.5),
            optional_prompt("negative_prompt"),
            nullable_int("num_images_per_prompt").with_default(1),
            float_with_default("eta", 0.0),
            generator_param(),
            tensor_param("latents"),
            tensor_param("prompt_embeds"),
            tensor_param("negative_prompt_embeds"),
            optional_image("ip_adapter_image"),
            tensor_list_param("ip_adapter_image_embeds"),
            output_type_param(),
            return_dict_param(),
            attention_kwargs("cross_attention_kwargs"),
            float_with_default("guidance_rescale", 0.0),
            nullable_int("clip_skip"),
        ],
    )
}

fn img2img(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_img2img",
        "Generate an image from a prompt and input image using Stable Diffusion",
        ModelFamily::StableDiffusion,
        GenerationMode::ImageToImage,
        &["image", "ip_adapter_image"],
        vec![
            model_param(),
            prompt_param(),
            image_param("image", "Starting image for the diffusion process"),
            float_with_default("strength", 0.8),
            nullable_int("num_inference_steps").with_default(50),
            int_list_param("timesteps"),
            float_list_param("sigmas"),
            nullable_float("guidance_scale").with_default(7.5),
            optional_prompt("negative_prompt"),
            nullable_int("num_images_per_prompt").with_default(1),
            nullable_float("eta").with_default(0.0),
            generator_param(),
            tensor_param("prompt_embeds"),
            tensor_param("negative_prompt_embeds"),
            optional_image("ip_adapter_image"),
            tensor_list_param("ip_adapter_image_embeds"),
            output_type_param(),
            return_dict_param(),
            attention_kwargs("cross_attention_kwargs"),
            nullable_int("clip_skip"),
        ],
    )
}

fn inpaint(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_inpaint",
        "Inpaint an image using Stable Diffusion",
        ModelFamily::StableDiffusion,
        GenerationMode::Inpaint,
        &["image", "mask_image", "ip_adapter_image"],
        vec![
            model_param(),
            prompt_param(),
            image_param("image", "Image to inpaint"),
            image_param("mask_image", "Mask marking the region to repaint"),
            tensor_param("masked_image_latents"),
            nullable_int("height"),
            nullable_int("width"),
            nullable_int("padding_mask_crop"),
            float_with_default("strength", 1.0),
            int_with_default("num_inference_steps", 50),
            int_list_param("timesteps"),
            float_list_param("sigmas"),
            float_with_default("guidance_scale", 7.5),
            optional_prompt("negative_prompt"),
            nullable_int("num_images_per_prompt").with_default(1),
            float_with_default("eta", 0.0),
            generator_param(),
            tensor_param("latents"),
            tensor_param("prompt_embeds"),
            tensor_param("negative_prompt_embeds"),
            optional_image("ip_adapter_image"),
            tensor_list_param("ip_adapter_image_embeds"),
            output_type_param(),
            return_dict_param(),
            attention_kwargs("cross_attention_kwargs"),
            nullable_int("clip_skip"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::backend::{BackendError, DiffusionBackend, GenerationJob};
    use async_trait::async_trait;
    use serde_json::Value;

    struct NullBackend;

    #[async_trait]
    impl DiffusionBackend for NullBackend {
        async fn run(&self, _job: GenerationJob) -> Result<Value, BackendError> {
            Err(BackendError::Timeout)
        }
    }

    fn test_registry() -> Registry {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(PipelineContext {
            backend: Arc::new(NullBackend),
            store: ArtifactStore::new(dir.path()).unwrap(),
        });
        registry(ctx).unwrap()
    }

    #[test]
    fn exposes_the_three_operations() {
        let names: Vec<String> = test_registry()
            .descriptors()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "stable_diffusion_text_to_image",
                "stable_diffusion_img2img",
                "stable_diffusion_inpaint",
            ]
        );
    }

    #[test]
    fn inpaint_requires_image_and_mask() {
        let tools = test_registry().descriptors();
        let inpaint = serde_json::to_value(&tools[2]).unwrap();
        let required = inpaint["inputSchema"]["required"].as_array().unwrap();
        let required: Vec<&str> = required.iter().filter_map(Value::as_str).collect();
        assert_eq!(required, vec!["model_id_or_path", "prompt", "image", "mask_image"]);
    }

    #[test]
    fn schema_documents_opaque_formats() {
        let tools = test_registry().descriptors();
        let t2i = serde_json::to_value(&tools[0]).unwrap();
        let props = &t2i["inputSchema"]["properties"];
        assert_eq!(props["latents"]["format"], "tensor-handle");
        assert_eq!(props["latents"]["type"], serde_json::json!(["object", "null"]));
        assert_eq!(t2i["outputSchema"]["format"], "image-artifact");
        assert_eq!(props["num_inference_steps"]["default"], 50);
        assert_eq!(props["guidance_scale"]["default"], 7.5);
    }
}
