use std::sync::Arc;

use glam::Vec2;
use log::{debug, info};
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::color_pass::ColorPass;
use super::draw::{Draw, MeshBuffers};
use super::picking::{PickingService, StencilReadback, StencilSource};
use super::shadow_pass::ShadowPass;
use super::target::{PixelOrigin, RenderTarget};
use super::uniforms::{FrameUniform, ObjectUniform, ObjectUniforms};
use crate::app::AppContext;
use crate::error::RenderError;
use crate::object::SceneObject;

/// wgpu renderer: shadow pass into a depth-only target, then the lit color
/// pass into the window surface with object identifiers in the stencil.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    main_target: RenderTarget,
    shadow_target: RenderTarget,
    object_uniforms: ObjectUniforms,
    shadow_pass: ShadowPass,
    color_pass: ColorPass,
    meshes: Vec<MeshBuffers>,
    readback: StencilReadback,
    picking: PickingService,
}

impl Renderer {
    /// Initializes the device, both render targets and both passes, and
    /// uploads every mesh of `ctx`.
    pub async fn new(window: Arc<Window>, ctx: &AppContext) -> Result<Self, RenderError> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(RenderError::creation("surface", "window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| RenderError::creation("surface", err))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::creation("GPU adapter", err))?;

        let required_features = wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        if !adapter.features().contains(required_features) {
            return Err(RenderError::MissingFeature(required_features));
        }

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("renderer-device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .map_err(|err| RenderError::creation("GPU device", err))?;
        info!("using adapter {}", adapter.get_info().name);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::creation("surface", "no supported surface format"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let main_target = RenderTarget::create_color_target(&device, size.width, size.height)?;
        let shadow_target = RenderTarget::create_shadow_target(&device, ctx.shadow_resolution)?;
        let object_uniforms = ObjectUniforms::new(&device);
        let shadow_pass = ShadowPass::new(&device, &object_uniforms)?;
        let color_pass = ColorPass::new(&device, surface_format, &object_uniforms, &shadow_target)?;

        let meshes = ctx
            .objects
            .meshes()
            .iter()
            .enumerate()
            .map(|(index, mesh)| MeshBuffers::from_mesh(&device, mesh, &format!("mesh-{index}")))
            .collect::<Vec<_>>();
        debug!("uploaded {} mesh(es)", meshes.len());

        let readback = StencilReadback::new(&device);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            main_target,
            shadow_target,
            object_uniforms,
            shadow_pass,
            color_pass,
            meshes,
            readback,
            picking: PickingService::new(),
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Reconfigures the surface and reallocates the main target. Zero-sized
    /// windows (minimized) are ignored.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) -> Result<(), RenderError> {
        if new_size.width == 0 || new_size.height == 0 {
            return Ok(());
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.main_target =
            RenderTarget::create_color_target(&self.device, new_size.width, new_size.height)?;
        Ok(())
    }

    /// Renders one frame: shadow pass, then color pass, in a single submission.
    pub fn render(&self, ctx: &AppContext) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut draws = Vec::with_capacity(ctx.objects.objects().len());
        for object in ctx.objects.objects() {
            let Some(mesh) = self.meshes.get(object.mesh).filter(|m| m.index_count() > 0)
            else {
                continue;
            };
            let uniform = ObjectUniform::from_object(object, ctx.display_color(object));
            self.object_uniforms.write(&self.queue, object.id, &uniform);
            draws.push(Draw {
                id: object.id,
                mesh,
                uniform_offset: self.object_uniforms.offset(object.id),
            });
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });
        self.shadow_pass.encode(
            &self.queue,
            &mut encoder,
            &self.shadow_target,
            ctx.light_camera(),
            &self.object_uniforms,
            &draws,
        );
        let frame = FrameUniform::new(
            ctx.view_camera(),
            ctx.light_camera(),
            &ctx.lighting,
            &ctx.shadows,
        );
        self.color_pass.encode(
            &self.queue,
            &mut encoder,
            &self.main_target,
            &view,
            &frame,
            &ctx.lighting,
            &self.object_uniforms,
            &draws,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Returns the object visible under a window position (physical pixels).
    pub fn pick<'a>(
        &self,
        ctx: &'a AppContext,
        position: Vec2,
    ) -> Result<Option<&'a SceneObject>, RenderError> {
        self.picking
            .pick(self, &ctx.objects, position, (self.size.width, self.size.height))
    }
}

impl StencilSource for Renderer {
    fn size(&self) -> (u32, u32) {
        let desc = self.main_target.desc();
        (desc.width(), desc.height())
    }

    fn origin(&self) -> PixelOrigin {
        self.main_target.origin()
    }

    fn read_stencil(&self, x: u32, y: u32) -> Result<u8, RenderError> {
        self.readback
            .read(&self.device, &self.queue, &self.main_target, x, y)
    }
}
