//! GPU-driven indirect drawing of instanced ivy geometry on wgpu.
//!
//! A producer stage (typically a compute pass) fills an argument buffer and per-instance
//! transforms. [`IndirectDrawOrchestrator`] turns them into one `draw_indexed_indirect` call
//! per geometry class, without reading anything back to the CPU.

pub use wgpu;

mod argument_buffer;
mod binding;
mod draw_args;
mod error;
mod instance;
mod orchestrator;
mod pipeline;
mod surface;
mod util;

pub use argument_buffer::{
    ArgumentOwnership, ArgumentProtocol, ArgumentState, ReadableArguments, StagedRecords,
    Transition,
};
pub use binding::{
    selector_stride, BindingLayout, BindingStrategy, ClassBinding, DrawSelector, FrameUniforms,
    LayoutOwnership, FRAME_GROUP, INSTANCE_GROUP, SELECTOR_GROUP,
};
pub use draw_args::{GeometryClass, IndexedDrawRecord, ARGUMENT_BUFFER_SIZE, GEOMETRY_CLASS_COUNT};
pub use error::{Error, Result};
pub use instance::{InstanceLayout, InstanceRange, InstanceRecord};
pub use orchestrator::{
    pass_commands, plan_frame, Diagnostics, FrameInputs, FramePlan, FrameStats, GpuContext,
    IndirectDrawOrchestrator, OrchestratorConfig, PassCommand, PassCommands, SubDraw,
};
pub use pipeline::{
    build_shader_source, validate_targets, RasterState, RenderTargets, NORMAL_SLOT, POSITION_SLOT,
};
pub use surface::{resolve_surface, SkipReason, SurfaceDescriptor, TableBounds, ValidSurface};
pub use util::{translation_matrix, IDENTITY_MATRIX};
