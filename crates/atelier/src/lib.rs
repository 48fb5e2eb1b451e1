//! atelier - composed MCP server for pretrained image-generation pipelines.
//!
//! Three model families (Stable Diffusion, SDXL, SD3) are served as tool
//! registries built on [`easel`], merged with a sidecar tool server reached
//! over stdio, and exposed over streamable HTTP. Image bytes never ride the
//! tool protocol: callers exchange artifact hashes through the web routes.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod pipelines;
pub mod web;

use std::sync::Arc;

use easel::{Composite, ToolError};

use crate::pipelines::PipelineContext;

/// Mount the three family registries into a fresh composite.
///
/// The sidecar proxy, when configured, is mounted on top by the caller;
/// mount failures at startup are fatal by design.
pub fn build_composite(ctx: Arc<PipelineContext>) -> Result<Composite, ToolError> {
    let mut composite = Composite::new("atelier");
    composite.mount(Arc::new(pipelines::stable_diffusion::registry(ctx.clone())?))?;
    composite.mount(Arc::new(pipelines::stable_diffusion_xl::registry(ctx.clone())?))?;
    composite.mount(Arc::new(pipelines::stable_diffusion_3::registry(ctx)?))?;
    Ok(composite)
}
