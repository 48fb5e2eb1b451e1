//! Stable Diffusion XL tools.
//!
//! The XL pipelines add a second text encoder (`prompt_2`), pooled embeds,
//! and micro-conditioning size pairs on top of the base parameter set.

use std::sync::Arc;

use easel::{Registry, ToolDef, ToolError};
use serde_json::json;

use super::{
    attention_kwargs, float_list_param, float_with_default, generation_tool, generator_param,
    image_param, int_list_param, int_with_default, model_param, nullable_float, nullable_int,
    optional_image, optional_prompt, output_type_param, prompt_param, return_dict_param,
    size_pair, tensor_list_param, tensor_param, PipelineContext,
};
use crate::backend::{GenerationMode, ModelFamily};

pub fn registry(ctx: Arc<PipelineContext>) -> Result<Registry, ToolError> {
    let mut registry = Registry::new("stable_diffusion_xl");
    registry.register(text_to_image(ctx.clone()))?;
    registry.register(img2img(ctx.clone()))?;
    registry.register(inpaint(ctx))?;
    Ok(registry)
}

/// Micro-conditioning pairs shared by every XL tool.
fn micro_conditioning() -> Vec<easel::ParamSpec> {
    vec![
        size_pair("original_size"),
        size_pair("crops_coords_top_left").with_default(json!([0, 0])),
        size_pair("target_size"),
        size_pair("negative_original_size"),
        size_pair("negative_crops_coords_top_left").with_default(json!([0, 0])),
        size_pair("negative_target_size"),
    ]
}

fn text_to_image(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_xl_text_to_image",
        "Generate an image from a prompt using Stable Diffusion XL",
        ModelFamily::StableDiffusionXl,
        GenerationMode::TextToImage,
        &["ip_adapter_image"],
        [
            vec![
                model_param(),
                prompt_param(),
                optional_prompt("prompt_2"),
                nullable_int("height"),
                nullable_int("width"),
                int_with_default("num_inference_steps", 50),
                int_list_param("timesteps"),
                float_list_param("sigmas"),
                nullable_float("denoising_end"),
                float_with_default("guidance_scale", 5.0),
                optional_prompt("negative_prompt"),
                optional_prompt("negative_prompt_2"),
                nullable_int("num_images_per_prompt").with_default(1),
                float_with_default("eta", 0.0),
                generator_param(),
                tensor_param("latents"),
                tensor_param("prompt_embeds"),
                tensor_param("negative_prompt_embeds"),
                tensor_param("pooled_prompt_embeds"),
                tensor_param("negative_pooled_prompt_embeds"),
                optional_image("ip_adapter_image"),
                tensor_list_param("ip_adapter_image_embeds"),
                output_type_param(),
                return_dict_param(),
                attention_kwargs("cross_attention_kwargs"),
                float_with_default("guidance_rescale", 0.0),
            ],
            micro_conditioning(),
            vec![nullable_int("clip_skip")],
        ]
        .into_iter()
        .flatten(),
    )
}

fn img2img(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_xl_img2img",
        "Generate an image from a prompt and input image using Stable Diffusion XL",
        ModelFamily::StableDiffusionXl,
        GenerationMode::ImageToImage,
        &["image", "ip_adapter_image"],
        [
            vec![
                model_param(),
                prompt_param(),
                image_param("image", "Starting image for the diffusion process"),
                optional_prompt("prompt_2"),
                float_with_default("strength", 0.3),
                int_with_default("num_inference_steps", 50),
                int_list_param("timesteps"),
                float_list_param("sigmas"),
                nullable_float("denoising_start"),
                nullable_float("denoising_end"),
                float_with_default("guidance_scale", 5.0),
                optional_prompt("negative_prompt"),
                optional_prompt("negative_prompt_2"),
                nullable_int("num_images_per_prompt").with_default(1),
                float_with_default("eta", 0.0),
                generator_param(),
                tensor_param("latents"),
                tensor_param("prompt_embeds"),
                tensor_param("negative_prompt_embeds"),
                tensor_param("pooled_prompt_embeds"),
                tensor_param("negative_pooled_prompt_embeds"),
                optional_image("ip_adapter_image"),
                tensor_list_param("ip_adapter_image_embeds"),
                output_type_param(),
                return_dict_param(),
                attention_kwargs("cross_attention_kwargs"),
                float_with_default("guidance_rescale", 0.0),
            ],
            micro_conditioning(),
            vec![
                float_with_default("aesthetic_score", 6.0),
                float_with_default("negative_aesthetic_score", 2.5),
                nullable_int("clip_skip"),
            ],
        ]
        .into_iter()
        .flatten(),
    )
}

fn inpaint(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_xl_inpaint",
        "Inpaint an image using Stable Diffusion XL",
        ModelFamily::StableDiffusionXl,
        GenerationMode::Inpaint,
        &["image", "mask_image", "ip_adapter_image"],
        [
            vec![
                model_param(),
                prompt_param(),
                image_param("image", "Image to inpaint"),
                image_param("mask_image", "Mask marking the region to repaint"),
                optional_prompt("prompt_2"),
                tensor_param("masked_image_latents"),
                nullable_int("height"),
                nullable_int("width"),
                nullable_int("padding_mask_crop"),
                float_with_default("strength", 0.9999),
                int_with_default("num_inference_steps", 50),
                int_list_param("timesteps"),
                float_list_param("sigmas"),
                nullable_float("denoising_start"),
                nullable_float("denoising_end"),
                float_with_default("guidance_scale", 7.5),
                optional_prompt("negative_prompt"),
                optional_prompt("negative_prompt_2"),
                nullable_int("num_images_per_prompt").with_default(1),
                float_with_default("eta", 0.0),
                generator_param(),
                tensor_param("latents"),
                tensor_param("prompt_embeds"),
                tensor_param("negative_prompt_embeds"),
                tensor_param("pooled_prompt_embeds"),
                tensor_param("negative_pooled_prompt_embeds"),
                optional_image("ip_adapter_image"),
                tensor_list_param("ip_adapter_image_embeds"),
                output_type_param(),
                return_dict_param(),
                attention_kwargs("cross_attention_kwargs"),
                float_with_default("guidance_rescale", 0.0),
            ],
            micro_conditioning(),
            vec![
                float_with_default("aesthetic_score", 6.0),
                float_with_default("negative_aesthetic_score", 2.5),
                nullable_int("clip_skip"),
            ],
        ]
        .into_iter()
        .flatten(),
    )
}
