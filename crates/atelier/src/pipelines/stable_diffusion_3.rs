//! Stable Diffusion 3 tools.
//!
//! SD3 runs three text encoders (`prompt` through `prompt_3`), drops the
//! timestep/eta knobs, and adds skip-layer guidance and the `mu` shift.
//! Its inpaint pipeline takes `masked_image_latents` as an image, unlike the
//! tensor the other families expect.

use std::sync::Arc;

use easel::{Registry, ToolDef, ToolError};

use super::{
    attention_kwargs, float_list_param, float_with_default, generation_tool, generator_param,
    image_param, int_list_param, int_with_default, model_param, nullable_float, nullable_int,
    optional_image, optional_prompt, output_type_param, prompt_param, return_dict_param,
    tensor_param, PipelineContext,
};
use crate::backend::{GenerationMode, ModelFamily};

pub fn registry(ctx: Arc<PipelineContext>) -> Result<Registry, ToolError> {
    let mut registry = Registry::new("stable_diffusion_3");
    registry.register(text_to_image(ctx.clone()))?;
    registry.register(img2img(ctx.clone()))?;
    registry.register(inpaint(ctx))?;
    Ok(registry)
}

fn text_to_image(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_3_text_to_image",
        "Generate an image from a prompt using Stable Diffusion 3",
        ModelFamily::StableDiffusion3,
        GenerationMode::TextToImage,
        &["ip_adapter_image"],
        vec![
            model_param(),
            prompt_param(),
            optional_prompt("prompt_2"),
            optional_prompt("prompt_3"),
            nullable_int("height"),
            nullable_int("width"),
            int_with_default("num_inference_steps", 28),
            float_list_param("sigmas"),
            float_with_default("guidance_scale", 7.0),
            optional_prompt("negative_prompt"),
            optional_prompt("negative_prompt_2"),
            optional_prompt("negative_prompt_3"),
            nullable_int("num_images_per_prompt").with_default(1),
            generator_param(),
            tensor_param("latents"),
            tensor_param("prompt_embeds"),
            tensor_param("negative_prompt_embeds"),
            tensor_param("pooled_prompt_embeds"),
            tensor_param("negative_pooled_prompt_embeds"),
            optional_image("ip_adapter_image"),
            tensor_param("ip_adapter_image_embeds"),
            output_type_param(),
            return_dict_param(),
            attention_kwargs("joint_attention_kwargs"),
            nullable_int("clip_skip"),
            int_with_default("max_sequence_length", 256),
            int_list_param("skip_guidance_layers"),
            float_with_default("skip_layer_guidance_scale", 2.8),
            float_with_default("skip_layer_guidance_stop", 0.2),
            float_with_default("skip_layer_guidance_start", 0.01),
            nullable_float("mu"),
        ],
    )
}

fn img2img(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_3_img2img",
        "Generate an image from a prompt and input image using Stable Diffusion 3",
        ModelFamily::StableDiffusion3,
        GenerationMode::ImageToImage,
        &["image", "ip_adapter_image"],
        vec![
            model_param(),
            prompt_param(),
            image_param("image", "Starting image for the diffusion process"),
            optional_prompt("prompt_2"),
            optional_prompt("prompt_3"),
            nullable_int("height"),
            nullable_int("width"),
            float_with_default("strength", 0.6),
            int_with_default("num_inference_steps", 50),
            float_list_param("sigmas"),
            float_with_default("guidance_scale", 7.0),
            optional_prompt("negative_prompt"),
            optional_prompt("negative_prompt_2"),
            optional_prompt("negative_prompt_3"),
            nullable_int("num_images_per_prompt").with_default(1),
            generator_param(),
            tensor_param("latents"),
            tensor_param("prompt_embeds"),
            tensor_param("negative_prompt_embeds"),
            tensor_param("pooled_prompt_embeds"),
            tensor_param("negative_pooled_prompt_embeds"),
            output_type_param(),
            optional_image("ip_adapter_image"),
            tensor_param("ip_adapter_image_embeds"),
            return_dict_param(),
            attention_kwargs("joint_attention_kwargs"),
            nullable_int("clip_skip"),
            int_with_default("max_sequence_length", 256),
            nullable_float("mu"),
        ],
    )
}

fn inpaint(ctx: Arc<PipelineContext>) -> ToolDef {
    generation_tool(
        ctx,
        "stable_diffusion_3_inpaint",
        "Inpaint an image using Stable Diffusion 3",
        ModelFamily::StableDiffusion3,
        GenerationMode::Inpaint,
        &["image", "mask_image", "masked_image_latents", "ip_adapter_image"],
        vec![
            model_param(),
            prompt_param(),
            image_param("image", "Image to inpaint"),
            image_param("mask_image", "Mask marking the region to repaint"),
            optional_prompt("prompt_2"),
            optional_prompt("prompt_3"),
            optional_image("masked_image_latents"),
            nullable_int("height"),
            nullable_int("width"),
            nullable_int("padding_mask_crop"),
            float_with_default("strength", 0.6),
            int_with_default("num_inference_steps", 50),
            float_list_param("sigmas"),
            float_with_default("guidance_scale", 7.0),
            optional_prompt("negative_prompt"),
            optional_prompt("negative_prompt_2"),
            optional_prompt("negative_prompt_3"),
            nullable_int("num_images_per_prompt").with_default(1),
            generator_param(),
            tensor_param("latents"),
            tensor_param("prompt_embeds"),
            tensor_param("negative_prompt_embeds"),
            tensor_param("pooled_prompt_embeds"),
            tensor_param("negative_pooled_prompt_embeds"),
            optional_image("ip_adapter_image"),
            tensor_param("ip_adapter_image_embeds"),
            output_type_param(),
            return_dict_param(),
            attention_kwargs("joint_attention_kwargs"),
            nullable_int("clip_skip"),
            int_with_default("max_sequence_length", 256),
            nullable_float("mu"),
        ],
    )
}
