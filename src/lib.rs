//! Single-light shadow-mapping viewer.
//!
//! A scene is drawn in two passes: depth from the light into a shadow map,
//! then a lit color pass that filters the shadow map with hard, PCF or PCSS
//! shadows and stamps every object's identifier into the stencil buffer so
//! that clicks can be resolved back to objects. The GPU path lives in
//! [`render::Renderer`]; [`render::SoftRenderer`] runs the same passes on
//! the CPU for headless use and tests.

pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod input;
pub mod mesh;
pub mod obj;
pub mod object;
pub mod raster;
pub mod render;
pub mod scene;
pub mod shadow;
pub mod stl;

pub use app::AppContext;
pub use camera::{Camera, CameraRig, CameraRole};
pub use config::{FilterPattern, LightingConfig, ShadowAlgorithm, ShadowConfig};
pub use error::RenderError;
pub use input::{InputState, KeyCode, MouseButton, NamedKey, PointerTracker};
pub use mesh::{MeshData, Vertex};
pub use object::{ObjectId, ObjectSet, SceneObject, Transform};
pub use render::{PickingService, Renderer, SoftRenderer};
pub use scene::Scene;
