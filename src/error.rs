use crate::binding::BindingStrategy;

/// Errors raised while building an [`IndirectDrawOrchestrator`](crate::IndirectDrawOrchestrator).
///
/// Every variant is fatal for the orchestrator being constructed. Render-time problems are
/// never reported through this type: they degrade to no-ops or skipped geometry classes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("at least one color render target is required")]
    NoColorTargets,

    #[error("render target {index} uses {format:?}, which is not a color-renderable format")]
    InvalidColorTarget {
        index: usize,
        format: wgpu::TextureFormat,
    },

    #[error("depth target uses {0:?}, which has no depth aspect")]
    InvalidDepthTarget(wgpu::TextureFormat),

    #[error("device is missing features {missing:?} required by the {strategy:?} binding strategy")]
    MissingFeatures {
        strategy: BindingStrategy,
        missing: wgpu::Features,
    },

    #[error("instance buffer holds {capacity} instances but {required} are required")]
    InstanceCapacity { capacity: u64, required: u64 },

    #[error("instance buffer of {size} bytes exceeds the device's storage binding limit of {limit} bytes")]
    InstanceBufferTooLarge { size: u64, limit: u64 },

    #[error("shared binding layout is incompatible: {0}")]
    IncompatibleLayout(String),

    #[error("GPU resource creation failed: {0}")]
    Device(#[source] wgpu::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
