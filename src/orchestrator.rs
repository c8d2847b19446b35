//! The indirect draw orchestrator: owns the argument buffer, the binding layout and the
//! pipeline, and turns a frame's surface references into indirect draws.
//!
//! # Example
//!
//! ```rust,no_run
//! use ivy_indirect::{
//!     FrameInputs, GeometryClass, GpuContext, IndirectDrawOrchestrator, OrchestratorConfig,
//!     RenderTargets, SurfaceDescriptor,
//! };
//!
//! # async fn frame(
//! #     gpu: GpuContext,
//! #     pass: &mut wgpu::RenderPass<'_>,
//! #     positions: &wgpu::Buffer,
//! #     normals: &wgpu::Buffer,
//! #     indices: &wgpu::Buffer,
//! # ) -> ivy_indirect::Result<()> {
//! let targets = RenderTargets::new(
//!     &[wgpu::TextureFormat::Rgba8Unorm],
//!     wgpu::TextureFormat::Depth32Float,
//! );
//! let mut orchestrator =
//!     IndirectDrawOrchestrator::new(gpu, targets, OrchestratorConfig::default(), None).await?;
//!
//! let vertex_buffers = [positions, normals];
//! let index_buffers = [indices];
//! let surfaces = [SurfaceDescriptor::new(0, 1, 0, 36)];
//! let inputs = FrameInputs::new(&vertex_buffers, &index_buffers, &surfaces)
//!     .with_surface(GeometryClass::Leaf, 0);
//!
//! orchestrator.render(pass, &inputs);
//! # Ok(())
//! # }
//! ```

mod construction;
mod metrics;
mod planning;
mod rendering;
mod types;

pub use metrics::FrameStats;
pub use planning::{pass_commands, plan_frame, FramePlan, PassCommand, PassCommands, SubDraw};
pub use types::{Diagnostics, FrameInputs, GpuContext, OrchestratorConfig};

use types::{Notice, NoticeLog};

use std::sync::Arc;

use smallvec::SmallVec;

use crate::argument_buffer::{ArgumentBuffer, ArgumentProtocol, ArgumentState};
use crate::binding::{BindingLayout, FrameBinding, LayoutOwnership};
use crate::draw_args::{GeometryClass, IndexedDrawRecord, GEOMETRY_CLASS_COUNT};
use crate::pipeline::RenderTargets;
use crate::surface::SkipReason;

/// Argument buffer storage, decided by [`ArgumentOwnership`](crate::ArgumentOwnership).
enum ArgumentStore {
    Owned(ArgumentBuffer),
    /// The buffer arrives with every frame; only its protocol state lives here.
    External(ArgumentProtocol),
}

impl ArgumentStore {
    fn protocol(&self) -> &ArgumentProtocol {
        match self {
            ArgumentStore::Owned(arguments) => arguments.protocol(),
            ArgumentStore::External(protocol) => protocol,
        }
    }
}

pub struct IndirectDrawOrchestrator {
    gpu: GpuContext,
    config: OrchestratorConfig,
    targets: RenderTargets,
    layout: LayoutOwnership,
    frame: FrameBinding,
    pipeline: wgpu::RenderPipeline,
    arguments: ArgumentStore,
    frames_rendered: u64,
    notices: NoticeLog,
    last_frame: FrameStats,
    lifetime: FrameStats,
    last_skipped: SmallVec<[(GeometryClass, SkipReason); GEOMETRY_CLASS_COUNT]>,
}

impl IndirectDrawOrchestrator {
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn binding_layout(&self) -> &BindingLayout {
        &self.layout
    }

    /// `true` when the binding layout was supplied by a frame-level owner.
    pub fn shares_binding_layout(&self) -> bool {
        !self.layout.is_owned()
    }

    /// The layout as an `Arc`, when it is shared.
    pub fn shared_binding_layout(&self) -> Option<Arc<BindingLayout>> {
        match &self.layout {
            LayoutOwnership::Owned(_) => None,
            LayoutOwnership::Shared(layout) => Some(Arc::clone(layout)),
        }
    }

    pub fn argument_state(&self) -> ArgumentState {
        self.arguments.protocol().state()
    }

    pub fn argument_transitions(&self) -> u64 {
        self.arguments.protocol().transitions()
    }

    /// The owned argument buffer. `None` with external ownership.
    pub fn argument_buffer(&self) -> Option<&wgpu::Buffer> {
        match &self.arguments {
            ArgumentStore::Owned(arguments) => Some(arguments.buffer()),
            ArgumentStore::External(_) => None,
        }
    }

    /// CPU mirror of the owned argument buffer. `None` with external ownership.
    pub fn argument_records(&self) -> Option<&[IndexedDrawRecord; GEOMETRY_CLASS_COUNT]> {
        match &self.arguments {
            ArgumentStore::Owned(arguments) => Some(arguments.records()),
            ArgumentStore::External(_) => None,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_frame
    }

    pub fn lifetime_stats(&self) -> FrameStats {
        self.lifetime
    }

    /// Classes skipped by the last rendered frame and why.
    pub fn last_skipped(&self) -> &[(GeometryClass, SkipReason)] {
        &self.last_skipped
    }
}
