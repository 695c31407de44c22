use glam::{Vec2, Vec3};
use log::info;

use crate::camera::{Camera, CameraRig};
use crate::config::{FilterPattern, LightingConfig, ShadowAlgorithm, ShadowConfig};
use crate::error::RenderError;
use crate::input::{InputState, KeyCode, MouseButton, NamedKey, PointerTracker};
use crate::object::{ObjectId, ObjectSet, SceneObject};
use crate::scene::Scene;

/// Brightness added to the selected object's color.
const SELECTION_HIGHLIGHT: f32 = 0.25;

const TRANSLATE_STEP: f32 = 0.1;
const ROTATE_STEP_DEGREES: f32 = 5.0;
const SCALE_STEP: f32 = 0.05;
const MIN_SCALE: f32 = 0.01;
const COLOR_STEP: f32 = 0.05;
const FOV_STEP_DEGREES: f32 = 5.0;
const MIN_FOV_DEGREES: f32 = 10.0;
const MAX_FOV_DEGREES: f32 = 120.0;

/// What the arrow and page keys change on the selected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Translate,
    Rotate,
    Scale,
}

/// Which color the channel keys edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorTarget {
    #[default]
    Selected,
    Ambient,
    Diffuse,
}

impl ColorTarget {
    fn next(self) -> Self {
        match self {
            Self::Selected => Self::Ambient,
            Self::Ambient => Self::Diffuse,
            Self::Diffuse => Self::Selected,
        }
    }
}

/// Everything one frame reads: cameras, objects, lighting and shadow settings,
/// plus the input state that drives them.
///
/// Updated once per frame before any pass is recorded.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub rig: CameraRig,
    pub objects: ObjectSet,
    pub lighting: LightingConfig,
    pub shadows: ShadowConfig,
    pub shadow_resolution: u32,
    pub selected: Option<ObjectId>,
    pub edit_mode: EditMode,
    pub color_target: ColorTarget,
    pub animate_light: bool,
    pub input: InputState,
    pub pointer: PointerTracker,
}

impl AppContext {
    /// Builds the cameras and loads every object of `scene`.
    ///
    /// The light camera keeps a square aspect whatever the window shape.
    pub fn from_scene(scene: &Scene, aspect_ratio: f32) -> Result<Self, RenderError> {
        let rig = CameraRig::new(
            scene.camera.build(aspect_ratio),
            scene.light.camera.build(1.0),
        );
        Ok(Self {
            rig,
            objects: scene.instantiate()?,
            lighting: scene.light.lighting,
            shadows: scene.shadows,
            shadow_resolution: scene.shadow_resolution,
            selected: None,
            edit_mode: EditMode::default(),
            color_target: ColorTarget::default(),
            animate_light: false,
            input: InputState::new(),
            pointer: PointerTracker::new(),
        })
    }

    /// Camera the color pass renders from.
    pub fn view_camera(&self) -> &Camera {
        self.rig.active()
    }

    pub fn light_camera(&self) -> &Camera {
        &self.rig.light
    }

    /// Advances the active camera from held keys and right-button drags, and
    /// moves the light when its animation is on.
    pub fn update(&mut self, delta_seconds: f32) {
        let look = if self.input.is_mouse_button_down(MouseButton::Right) {
            self.pointer
                .look_delta(self.input.mouse_position(), delta_seconds)
        } else {
            self.pointer.reset();
            Vec2::ZERO
        };
        let displacement = self.input.displacement(delta_seconds);
        if displacement != Vec3::ZERO || look != Vec2::ZERO {
            self.rig.active_mut().apply_movement(displacement, look);
        }
        if self.animate_light {
            self.rig.light.animate(delta_seconds);
        }
    }

    /// Recomputes the viewer projection after the window changed size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.rig.viewer.update_projection(width as f32 / height as f32);
    }

    /// Applies a key press. Returns `true` when the key changed any setting.
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        if let Some(direction) = nudge_direction(key) {
            return self.nudge_selected(direction);
        }
        if let Some(delta) = color_delta(key) {
            return self.adjust_color(delta);
        }
        let mode = match key {
            KeyCode::Character('M') => Some(EditMode::Translate),
            KeyCode::Character('R') => Some(EditMode::Rotate),
            KeyCode::Character('Z') => Some(EditMode::Scale),
            _ => None,
        };
        if let Some(mode) = mode {
            self.edit_mode = mode;
            info!("edit mode: {mode:?}");
            return true;
        }
        match key {
            KeyCode::Character('C') => {
                self.color_target = self.color_target.next();
                info!("editing color: {:?}", self.color_target);
                return true;
            }
            KeyCode::Character('9') => return self.adjust_fov(-FOV_STEP_DEGREES),
            KeyCode::Character('0') => return self.adjust_fov(FOV_STEP_DEGREES),
            _ => {}
        }

        let shadows = &mut self.shadows;
        match key {
            KeyCode::Named(NamedKey::Tab) => {
                self.rig.active = self.rig.active.toggled();
                info!("active camera: {:?}", self.rig.active);
                return true;
            }
            KeyCode::Character('L') => {
                self.animate_light = !self.animate_light;
                info!("light animation {}", if self.animate_light { "on" } else { "off" });
                return true;
            }
            KeyCode::Character('1') => shadows.set_algorithm(ShadowAlgorithm::Hard),
            KeyCode::Character('2') => shadows.set_algorithm(ShadowAlgorithm::Pcf),
            KeyCode::Character('3') => shadows.set_algorithm(ShadowAlgorithm::Pcss),
            KeyCode::Character('4') => shadows.set_pattern(FilterPattern::RegularGrid),
            KeyCode::Character('5') => shadows.set_pattern(FilterPattern::PoissonDisk),
            KeyCode::Character('6') => shadows.set_pattern(FilterPattern::RotatedPoisson),
            KeyCode::Character('+') | KeyCode::Character('=') => shadows.adjust_sample_count(1),
            KeyCode::Character('-') => shadows.adjust_sample_count(-1),
            KeyCode::Character('[') => shadows.adjust_filter_radius(-0.001),
            KeyCode::Character(']') => shadows.adjust_filter_radius(0.001),
            KeyCode::Character(',') => shadows.adjust_light_width(-0.01),
            KeyCode::Character('.') => shadows.adjust_light_width(0.01),
            _ => return false,
        }
        info!(
            "shadows: {} / {}, {} samples, radius {:.3}, light width {:.2}",
            shadows.algorithm(),
            shadows.pattern(),
            shadows.sample_count(),
            shadows.filter_radius(),
            shadows.light_width()
        );
        true
    }

    fn selected_mut(&mut self) -> Option<&mut SceneObject> {
        let id = self.selected?;
        self.objects
            .objects_mut()
            .iter_mut()
            .find(|object| object.id == id)
    }

    /// Moves, turns or resizes the selected object along `direction`,
    /// depending on the edit mode.
    fn nudge_selected(&mut self, direction: Vec3) -> bool {
        let mode = self.edit_mode;
        let Some(object) = self.selected_mut() else {
            return false;
        };
        let transform = &mut object.transform;
        match mode {
            EditMode::Translate => transform.position += direction * TRANSLATE_STEP,
            EditMode::Rotate => transform.rotation += direction * ROTATE_STEP_DEGREES,
            EditMode::Scale => {
                transform.scale =
                    (transform.scale + direction * SCALE_STEP).max(Vec3::splat(MIN_SCALE));
            }
        }
        info!(
            "{}: position {:.2} rotation {:.1} scale {:.2}",
            object.name, transform.position, transform.rotation, transform.scale
        );
        true
    }

    fn adjust_color(&mut self, delta: Vec3) -> bool {
        let target = self.color_target;
        let color = match target {
            ColorTarget::Selected => match self.selected_mut() {
                Some(object) => &mut object.color,
                None => return false,
            },
            ColorTarget::Ambient => &mut self.lighting.ambient,
            ColorTarget::Diffuse => &mut self.lighting.diffuse,
        };
        *color = (*color + delta).clamp(Vec3::ZERO, Vec3::ONE);
        info!("{target:?} color: {:.2}", *color);
        true
    }

    /// Widens or narrows the active camera and rebuilds its projection.
    fn adjust_fov(&mut self, delta_degrees: f32) -> bool {
        let camera = self.rig.active_mut();
        let fov = (camera.fov_y.to_degrees() + delta_degrees).clamp(MIN_FOV_DEGREES, MAX_FOV_DEGREES);
        camera.fov_y = fov.to_radians();
        camera.update_projection(camera.aspect_ratio());
        info!("{:?} field of view: {fov:.0} degrees", self.rig.active);
        true
    }

    /// Records the result of a pick.
    pub fn select(&mut self, picked: Option<&SceneObject>) {
        match picked {
            Some(object) => info!("selected {} (id {})", object.name, object.id),
            None => info!("selection cleared"),
        }
        self.selected = picked.map(|object| object.id);
    }

    /// Color an object is drawn with, brightened when selected.
    pub fn display_color(&self, object: &SceneObject) -> Vec3 {
        if self.selected == Some(object.id) {
            (object.color + Vec3::splat(SELECTION_HIGHLIGHT)).min(Vec3::ONE)
        } else {
            object.color
        }
    }
}

fn nudge_direction(key: KeyCode) -> Option<Vec3> {
    match key {
        KeyCode::Named(NamedKey::ArrowLeft) => Some(Vec3::NEG_X),
        KeyCode::Named(NamedKey::ArrowRight) => Some(Vec3::X),
        KeyCode::Named(NamedKey::PageUp) => Some(Vec3::Y),
        KeyCode::Named(NamedKey::PageDown) => Some(Vec3::NEG_Y),
        KeyCode::Named(NamedKey::ArrowUp) => Some(Vec3::NEG_Z),
        KeyCode::Named(NamedKey::ArrowDown) => Some(Vec3::Z),
        _ => None,
    }
}

/// Y/H, U/J and I/K raise and lower red, green and blue.
fn color_delta(key: KeyCode) -> Option<Vec3> {
    let delta = match key {
        KeyCode::Character('Y') => Vec3::X,
        KeyCode::Character('H') => Vec3::NEG_X,
        KeyCode::Character('U') => Vec3::Y,
        KeyCode::Character('J') => Vec3::NEG_Y,
        KeyCode::Character('I') => Vec3::Z,
        KeyCode::Character('K') => Vec3::NEG_Z,
        _ => return None,
    };
    Some(delta * COLOR_STEP)
}
