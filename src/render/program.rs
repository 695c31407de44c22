use log::debug;

use super::checked;
use crate::error::RenderError;

/// Compiled WGSL module.
///
/// Compilation failures surface as [`RenderError::ResourceCreation`] instead
/// of the device's uncaptured-error panic.
pub struct ShaderProgram {
    module: wgpu::ShaderModule,
}

impl ShaderProgram {
    pub fn compile(
        device: &wgpu::Device,
        label: &'static str,
        source: &str,
    ) -> Result<Self, RenderError> {
        let module = checked(device, label, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        debug!("compiled shader {label}");
        Ok(Self { module })
    }

    pub fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }
}
