pub mod color_pass;
pub mod draw;
pub mod picking;
pub mod program;
pub mod renderer;
pub mod shaders;
pub mod shadow_pass;
pub mod soft;
pub mod target;
pub mod uniforms;

pub use color_pass::ColorPass;
pub use picking::{PickingService, StencilReadback, StencilSource};
pub use program::ShaderProgram;
pub use renderer::Renderer;
pub use shadow_pass::ShadowPass;
pub use soft::{ObjectStats, SoftRenderer, SoftTarget};
pub use target::{ClearValues, PixelOrigin, RenderTarget, TargetDesc, TargetKind, Viewport};

use crate::error::RenderError;

/// Runs `build` inside a validation error scope so that an invalid resource
/// becomes a [`RenderError::ResourceCreation`] naming `what`.
pub(crate) fn checked<T>(
    device: &wgpu::Device,
    what: &'static str,
    build: impl FnOnce() -> T,
) -> Result<T, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(RenderError::creation(what, err)),
        None => Ok(value),
    }
}
