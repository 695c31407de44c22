use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while building the rendering pipeline or loading assets.
///
/// Every variant is treated as unrecoverable by the application: it reports
/// the diagnostic and exits. Per-frame rendering never produces one.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    #[error("GPU adapter lacks required feature {0:?}")]
    MissingFeature(wgpu::Features),

    #[error("failed to load {}: {reason}", path.display())]
    AssetLoad { path: PathBuf, reason: String },

    #[error("scene holds more than {limit} pickable objects")]
    ObjectLimit { limit: usize },

    #[error("stencil readback failed: {0}")]
    Readback(String),
}

impl RenderError {
    pub(crate) fn creation(what: &'static str, reason: impl ToString) -> Self {
        Self::ResourceCreation {
            what,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn asset(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::AssetLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_resource() {
        let err = RenderError::creation("shadow target", "zero-sized");
        assert_eq!(err.to_string(), "failed to create shadow target: zero-sized");

        let err = RenderError::asset("models/plane.stl", "not found");
        assert_eq!(err.to_string(), "failed to load models/plane.stl: not found");
    }
}
