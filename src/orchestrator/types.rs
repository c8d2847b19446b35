use std::sync::Arc;

use crate::argument_buffer::ArgumentOwnership;
use crate::binding::BindingStrategy;
use crate::draw_args::{GeometryClass, GEOMETRY_CLASS_COUNT};
use crate::pipeline::RasterState;
use crate::surface::SurfaceDescriptor;
use crate::util::IDENTITY_MATRIX;

/// How much per-frame narration an orchestrator logs at `debug` level.
///
/// Construction is always logged at `info`. Frames not covered by this setting still log at
/// `trace`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Diagnostics {
    Quiet,
    /// Narrate only the first rendered frame.
    #[default]
    FirstFrame,
    EveryFrame,
}

impl Diagnostics {
    /// Whether the frame rendered after `frames_rendered` earlier frames logs at `debug`.
    pub fn narrates(self, frames_rendered: u64) -> bool {
        match self {
            Diagnostics::Quiet => false,
            Diagnostics::FirstFrame => frames_rendered == 0,
            Diagnostics::EveryFrame => true,
        }
    }

    /// Whether a render-time notice logs at `debug`. `FirstFrame` reports each kind of notice
    /// on its first occurrence only.
    pub fn narrates_notice(self, first_occurrence: bool) -> bool {
        match self {
            Diagnostics::Quiet => false,
            Diagnostics::FirstFrame => first_occurrence,
            Diagnostics::EveryFrame => true,
        }
    }
}

/// Render-time conditions that are reported without recording a frame's draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notice {
    IndirectUnsupported,
    MissingArgumentBuffer,
    IgnoredArgumentOverride,
}

/// Which [`Notice`]s an orchestrator has already reported.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NoticeLog {
    reported: u8,
}

impl NoticeLog {
    /// Marks `notice` as reported and returns whether this was its first occurrence.
    pub(crate) fn first(&mut self, notice: Notice) -> bool {
        let bit = 1u8 << notice as u8;
        let first = self.reported & bit == 0;
        self.reported |= bit;
        first
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Prefix for every GPU object label.
    pub label: String,
    pub strategy: BindingStrategy,
    pub argument_ownership: ArgumentOwnership,
    /// Instances drawn per geometry class. Class ranges are assigned contiguously.
    pub instances_per_class: u32,
    /// Capacity, in records, of each instance buffer.
    pub max_instances: u32,
    pub raster: RasterState,
    pub diagnostics: Diagnostics,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            label: "ivy_indirect".to_string(),
            strategy: BindingStrategy::default(),
            argument_ownership: ArgumentOwnership::default(),
            instances_per_class: 2,
            max_instances: 1000,
            raster: RasterState::default(),
            diagnostics: Diagnostics::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_strategy(mut self, strategy: BindingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_argument_ownership(mut self, argument_ownership: ArgumentOwnership) -> Self {
        self.argument_ownership = argument_ownership;
        self
    }

    pub fn with_instances_per_class(mut self, instances_per_class: u32) -> Self {
        self.instances_per_class = instances_per_class;
        self
    }

    pub fn with_max_instances(mut self, max_instances: u32) -> Self {
        self.max_instances = max_instances;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: Option<wgpu::Face>) -> Self {
        self.raster.cull_mode = cull_mode;
        self
    }

    pub fn with_front_face(mut self, front_face: wgpu::FrontFace) -> Self {
        self.raster.front_face = front_face;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Device, queue and the adapter capabilities the orchestrator checks at render time.
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub downlevel_flags: wgpu::DownlevelFlags,
}

impl GpuContext {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        downlevel_flags: wgpu::DownlevelFlags,
    ) -> Self {
        Self {
            device,
            queue,
            downlevel_flags,
        }
    }

    pub fn from_adapter(
        adapter: &wgpu::Adapter,
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    ) -> Self {
        Self::new(device, queue, adapter.get_downlevel_capabilities().flags)
    }

    pub fn supports_indirect(&self) -> bool {
        self.downlevel_flags
            .contains(wgpu::DownlevelFlags::INDIRECT_EXECUTION)
    }
}

/// Everything one `render` call reads. Buffers are borrowed for the call only.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub frame_transform: [[f32; 4]; 4],
    /// Required with [`ArgumentOwnership::External`], ignored otherwise.
    pub argument_buffer: Option<&'a wgpu::Buffer>,
    pub vertex_buffers: &'a [&'a wgpu::Buffer],
    pub index_buffers: &'a [&'a wgpu::Buffer],
    pub surfaces: &'a [SurfaceDescriptor],
    /// Surface table entry per geometry class, in class order.
    pub surface_indices: [Option<usize>; GEOMETRY_CLASS_COUNT],
    /// Replaces the layout's own instance arrays for this frame.
    pub instance_buffers: Option<&'a [&'a wgpu::Buffer]>,
}

impl<'a> FrameInputs<'a> {
    pub fn new(
        vertex_buffers: &'a [&'a wgpu::Buffer],
        index_buffers: &'a [&'a wgpu::Buffer],
        surfaces: &'a [SurfaceDescriptor],
    ) -> Self {
        Self {
            frame_transform: IDENTITY_MATRIX,
            argument_buffer: None,
            vertex_buffers,
            index_buffers,
            surfaces,
            surface_indices: [None; GEOMETRY_CLASS_COUNT],
            instance_buffers: None,
        }
    }

    pub fn with_frame_transform(mut self, frame_transform: [[f32; 4]; 4]) -> Self {
        self.frame_transform = frame_transform;
        self
    }

    pub fn with_argument_buffer(mut self, argument_buffer: &'a wgpu::Buffer) -> Self {
        self.argument_buffer = Some(argument_buffer);
        self
    }

    pub fn with_surface(mut self, class: GeometryClass, surface_index: usize) -> Self {
        self.surface_indices[class.index()] = Some(surface_index);
        self
    }

    pub fn with_instance_buffers(mut self, instance_buffers: &'a [&'a wgpu::Buffer]) -> Self {
        self.instance_buffers = Some(instance_buffers);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_draws_two_instances_per_class_with_selector() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.instances_per_class, 2);
        assert_eq!(config.max_instances, 1000);
        assert_eq!(config.strategy, BindingStrategy::ArraySelector);
        assert_eq!(config.argument_ownership, ArgumentOwnership::Owned);
        assert_eq!(config.raster.cull_mode, None);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = OrchestratorConfig::default()
            .with_label("ivy_minimal")
            .with_strategy(BindingStrategy::SingleSlot)
            .with_instances_per_class(1)
            .with_cull_mode(Some(wgpu::Face::Back))
            .with_front_face(wgpu::FrontFace::Cw)
            .with_diagnostics(Diagnostics::Quiet);

        assert_eq!(config.label, "ivy_minimal");
        assert_eq!(config.strategy, BindingStrategy::SingleSlot);
        assert_eq!(config.instances_per_class, 1);
        assert_eq!(config.raster.cull_mode, Some(wgpu::Face::Back));
        assert_eq!(config.raster.front_face, wgpu::FrontFace::Cw);
        assert_eq!(config.diagnostics, Diagnostics::Quiet);
    }

    #[test]
    fn first_frame_diagnostics_narrate_once() {
        assert!(Diagnostics::FirstFrame.narrates(0));
        assert!(!Diagnostics::FirstFrame.narrates(1));
        assert!(Diagnostics::EveryFrame.narrates(7));
        assert!(!Diagnostics::Quiet.narrates(0));
    }

    #[test]
    fn first_frame_diagnostics_report_each_notice_once() {
        let mut notices = NoticeLog::default();
        let mut narrated = Vec::new();
        for notice in [
            Notice::MissingArgumentBuffer,
            Notice::MissingArgumentBuffer,
            Notice::IgnoredArgumentOverride,
            Notice::MissingArgumentBuffer,
        ] {
            narrated.push(Diagnostics::FirstFrame.narrates_notice(notices.first(notice)));
        }
        assert_eq!(narrated, vec![true, false, true, false]);

        assert!(!Diagnostics::Quiet.narrates_notice(true));
        assert!(Diagnostics::EveryFrame.narrates_notice(notices.first(Notice::IgnoredArgumentOverride)));
        assert!(notices.first(Notice::IndirectUnsupported));
    }

    #[test]
    fn frame_inputs_start_without_surfaces() {
        let inputs = FrameInputs::new(&[], &[], &[]).with_surface(GeometryClass::Stem, 4);
        assert_eq!(inputs.surface_indices, [None, Some(4)]);
        assert!(inputs.argument_buffer.is_none());
        assert_eq!(inputs.frame_transform, IDENTITY_MATRIX);
    }
}
