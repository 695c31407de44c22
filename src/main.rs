use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{error, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton as WinitMouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, KeyCode as WinitKeyCode, NamedKey as WinitNamedKey, PhysicalKey};
use winit::window::{Window, WindowId};

use penumbra::render::ObjectStats;
use penumbra::{
    AppContext, FilterPattern, KeyCode, MouseButton, NamedKey, PickingService, Renderer, Scene,
    ShadowAlgorithm, SoftRenderer,
};

const USAGE: &str = "Usage: penumbra [scene.xml] [--summary-only] [--pick X,Y] \
    [--algorithm hard|pcf|pcss] [--pattern grid|poisson|rotated] [--samples N] \
    [--filter-radius R] [--light-width W] [--shadow-resolution N] [--size WxH] \
    [--animate-light]";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let mut scene = match &options.scene {
        Some(path) => Scene::load(path)?,
        None => Scene::demo(),
    };
    options.apply(&mut scene);

    let (width, height) = options.size;
    let mut ctx = AppContext::from_scene(&scene, width as f32 / height as f32)?;
    ctx.animate_light = options.animate_light;

    println!("Loaded scene with {} object(s)", ctx.objects.objects().len());
    let shadows = &ctx.shadows;
    println!(
        "Shadows: {}, {} pattern, {} sample(s), filter radius {:.4}, light width {:.4}, shadow map {}x{}",
        shadows.algorithm(),
        shadows.pattern(),
        shadows.sample_count(),
        shadows.filter_radius(),
        shadows.light_width(),
        ctx.shadow_resolution,
        ctx.shadow_resolution
    );

    if options.summary_only {
        run_headless(&ctx, &options)
    } else {
        match run_interactive(ctx.clone(), &options) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    run_headless(&ctx, &options)
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// Renders one frame on the CPU and prints what is visible.
fn run_headless(ctx: &AppContext, options: &CliOptions) -> Result<()> {
    let (width, height) = options.size;
    let mut renderer = SoftRenderer::new(width, height, ctx.shadow_resolution)?;
    renderer.render(ctx);
    println!("Rendered {width}x{height} frame on the CPU");
    print_stats(&renderer.object_stats(&ctx.objects));

    if let Some(position) = options.pick {
        let picked =
            PickingService::new().pick(&renderer, &ctx.objects, position, (width, height))?;
        match picked {
            Some(object) => println!("Picked: {} (id {})", object.name, object.id),
            None => println!("Picked: none"),
        }
    }
    Ok(())
}

fn print_stats(stats: &[ObjectStats]) {
    for entry in stats {
        match entry.mean_shadow {
            Some(shadow) => println!(
                " - [{}] {}: {} px, mean shadow {:.3}",
                entry.id, entry.name, entry.coverage, shadow
            ),
            None => println!(" - [{}] {}: not visible", entry.id, entry.name),
        }
    }
}

fn run_interactive(ctx: AppContext, options: &CliOptions) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer {
        pending: Some(ctx),
        size: options.size,
        state: None,
        failure: None,
    };
    event_loop
        .run_app(&mut viewer)
        .context("event loop terminated with error")?;

    match viewer.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Viewer {
    pending: Option<AppContext>,
    size: (u32, u32),
    state: Option<ViewerState>,
    failure: Option<anyhow::Error>,
}

struct ViewerState {
    renderer: Renderer,
    ctx: AppContext,
    last_frame: Instant,
}

impl Viewer {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<ViewerState> {
        let mut ctx = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("viewer already initialized"))?;
        let (width, height) = self.size;
        let attributes = Window::default_attributes()
            .with_title("Penumbra")
            .with_inner_size(LogicalSize::new(width as f64, height as f64));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let size = window.inner_size();
        ctx.resize(size.width, size.height);

        let renderer = block_on(Renderer::new(Arc::clone(&window), &ctx))?;
        info!("window ready at {}x{}", size.width, size.height);
        Ok(ViewerState {
            renderer,
            ctx,
            last_frame: Instant::now(),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => self.state = Some(state),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let result = match self.state.as_mut() {
            Some(state) if window_id == state.renderer.window_id() => {
                state.process_event(event_loop, event)
            }
            _ => return,
        };
        if let Err(err) = result {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.renderer.window().request_redraw();
        }
    }
}

impl ViewerState {
    fn process_event(&mut self, event_loop: &ActiveEventLoop, event: WindowEvent) -> Result<()> {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                self.renderer.resize(size)?;
                self.ctx.resize(size.width, size.height);
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = self.renderer.window().inner_size();
                self.renderer.resize(size)?;
                self.ctx.resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(event_loop, &event),
            WindowEvent::MouseInput { state, button, .. } => {
                self.handle_mouse_button(state, button)?;
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                self.ctx.input.set_mouse_position(position);
            }
            WindowEvent::RedrawRequested => self.redraw()?,
            _ => {}
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.ctx.update(delta);

        if let Err(err) = self.renderer.render(&self.ctx) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.renderer.window().inner_size();
                    self.renderer.resize(size)?;
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    warn!("Surface timeout; retrying next frame");
                }
                other => {
                    warn!("Surface error: {other}; retrying next frame");
                }
            }
        }
        Ok(())
    }

    fn handle_keyboard(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let Some(key) = map_key(event) else {
            return;
        };
        match event.state {
            ElementState::Pressed => {
                self.ctx.input.set_key_down(key);
                if event.repeat {
                    return;
                }
                if key == KeyCode::Named(NamedKey::Escape) {
                    event_loop.exit();
                } else {
                    self.ctx.handle_key(key);
                }
            }
            ElementState::Released => self.ctx.input.set_key_up(key),
        }
    }

    fn handle_mouse_button(&mut self, state: ElementState, button: WinitMouseButton) -> Result<()> {
        let button = match button {
            WinitMouseButton::Left => MouseButton::Left,
            WinitMouseButton::Right => MouseButton::Right,
            WinitMouseButton::Middle => MouseButton::Middle,
            _ => return Ok(()),
        };
        match state {
            ElementState::Pressed => {
                self.ctx.input.set_mouse_button_down(button);
                if button == MouseButton::Right {
                    self.renderer.window().set_cursor_visible(false);
                }
            }
            ElementState::Released => {
                self.ctx.input.set_mouse_button_up(button);
                match button {
                    MouseButton::Right => self.renderer.window().set_cursor_visible(true),
                    MouseButton::Left => {
                        let position = self.ctx.input.mouse_position();
                        let picked = self.renderer.pick(&self.ctx, position)?.cloned();
                        self.ctx.select(picked.as_ref());
                    }
                    MouseButton::Middle => {}
                }
            }
        }
        Ok(())
    }
}

fn map_key(event: &KeyEvent) -> Option<KeyCode> {
    match event.physical_key {
        PhysicalKey::Code(WinitKeyCode::ControlLeft) => {
            return Some(KeyCode::Named(NamedKey::LeftCtrl))
        }
        PhysicalKey::Code(WinitKeyCode::Space) => return Some(KeyCode::Named(NamedKey::Space)),
        _ => {}
    }
    match &event.logical_key {
        Key::Named(WinitNamedKey::Tab) => Some(KeyCode::Named(NamedKey::Tab)),
        Key::Named(WinitNamedKey::Escape) => Some(KeyCode::Named(NamedKey::Escape)),
        Key::Named(WinitNamedKey::ArrowLeft) => Some(KeyCode::Named(NamedKey::ArrowLeft)),
        Key::Named(WinitNamedKey::ArrowRight) => Some(KeyCode::Named(NamedKey::ArrowRight)),
        Key::Named(WinitNamedKey::ArrowUp) => Some(KeyCode::Named(NamedKey::ArrowUp)),
        Key::Named(WinitNamedKey::ArrowDown) => Some(KeyCode::Named(NamedKey::ArrowDown)),
        Key::Named(WinitNamedKey::PageUp) => Some(KeyCode::Named(NamedKey::PageUp)),
        Key::Named(WinitNamedKey::PageDown) => Some(KeyCode::Named(NamedKey::PageDown)),
        Key::Character(text) => text.chars().next().map(KeyCode::character),
        _ => None,
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    scene: Option<PathBuf>,
    summary_only: bool,
    pick: Option<Vec2>,
    algorithm: Option<ShadowAlgorithm>,
    pattern: Option<FilterPattern>,
    samples: Option<i64>,
    filter_radius: Option<f32>,
    light_width: Option<f32>,
    shadow_resolution: Option<u32>,
    size: (u32, u32),
    animate_light: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            scene: None,
            summary_only: false,
            pick: None,
            algorithm: None,
            pattern: None,
            samples: None,
            filter_radius: None,
            light_width: None,
            shadow_resolution: None,
            size: (1280, 720),
            animate_light: false,
        }
    }
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--animate-light" => options.animate_light = true,
                "--pick" => {
                    let (x, y) = parse_pair(&value(&mut args, &arg)?, ',', &arg)?;
                    options.pick = Some(Vec2::new(x, y));
                }
                "--algorithm" => options.algorithm = Some(value(&mut args, &arg)?.parse()?),
                "--pattern" => options.pattern = Some(value(&mut args, &arg)?.parse()?),
                "--samples" => options.samples = Some(parse_number(&mut args, &arg)?),
                "--filter-radius" => options.filter_radius = Some(parse_number(&mut args, &arg)?),
                "--light-width" => options.light_width = Some(parse_number(&mut args, &arg)?),
                "--shadow-resolution" => {
                    options.shadow_resolution = Some(parse_number(&mut args, &arg)?);
                }
                "--size" => {
                    let (width, height) = parse_pair(&value(&mut args, &arg)?, 'x', &arg)?;
                    if width == 0 || height == 0 {
                        return Err(anyhow!("--size must be positive, got {width}x{height}"));
                    }
                    options.size = (width, height);
                }
                "--help" | "-h" => return Err(anyhow!(USAGE)),
                flag if flag.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {flag}\n{USAGE}"));
                }
                path => {
                    if let Some(existing) = &options.scene {
                        return Err(anyhow!(
                            "Unexpected argument: {path} (scene already set to {})",
                            existing.display()
                        ));
                    }
                    options.scene = Some(PathBuf::from(path));
                }
            }
        }
        Ok(options)
    }

    /// Overrides scene settings with the ones given on the command line.
    fn apply(&self, scene: &mut Scene) {
        let shadows = &mut scene.shadows;
        if let Some(algorithm) = self.algorithm {
            shadows.set_algorithm(algorithm);
        }
        if let Some(pattern) = self.pattern {
            shadows.set_pattern(pattern);
        }
        if let Some(samples) = self.samples {
            shadows.set_sample_count(samples);
        }
        if let Some(radius) = self.filter_radius {
            shadows.set_filter_radius(radius);
        }
        if let Some(width) = self.light_width {
            shadows.set_light_width(width);
        }
        if let Some(resolution) = self.shadow_resolution {
            scene.shadow_resolution = resolution;
        }
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
}

fn parse_number<T>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = value(args, flag)?;
    raw.parse()
        .map_err(|err| anyhow!("invalid value `{raw}` for {flag}: {err}"))
}

fn parse_pair<T>(raw: &str, separator: char, flag: &str) -> Result<(T, T)>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let (first, second) = raw
        .split_once(separator)
        .ok_or_else(|| anyhow!("{flag} expects two values separated by `{separator}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<T>()
            .map_err(|err| anyhow!("invalid value `{raw}` for {flag}: {err}"))
    };
    Ok((parse(first)?, parse(second)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_overrides() {
        let options = parse(&[
            "scene.xml",
            "--summary-only",
            "--algorithm",
            "pcss",
            "--pattern",
            "rotated",
            "--samples",
            "200",
            "--pick",
            "10,20.5",
            "--size",
            "320x200",
        ])
        .unwrap();
        assert_eq!(options.scene, Some(PathBuf::from("scene.xml")));
        assert!(options.summary_only);
        assert_eq!(options.algorithm, Some(ShadowAlgorithm::Pcss));
        assert_eq!(options.pattern, Some(FilterPattern::RotatedPoisson));
        assert_eq!(options.pick, Some(Vec2::new(10.0, 20.5)));
        assert_eq!(options.size, (320, 200));

        let mut scene = Scene::demo();
        options.apply(&mut scene);
        assert_eq!(scene.shadows.sample_count(), penumbra::config::MAX_SAMPLE_COUNT);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--samples"]).is_err());
        assert!(parse(&["--size", "0x10"]).is_err());
        assert!(parse(&["--pick", "12"]).is_err());
        assert!(parse(&["--algorithm", "soft"]).is_err());
        assert!(parse(&["a.xml", "b.xml"]).is_err());
    }
}
