use super::*;

use crate::argument_buffer::ArgumentOwnership;
use crate::error::{Error, Result};
use crate::instance::InstanceLayout;
use crate::pipeline::{create_indirect_pipeline, validate_targets};

impl IndirectDrawOrchestrator {
    /// Builds the pipeline, the argument buffer and, unless `shared_layout` is given, the
    /// binding layout.
    ///
    /// Any failure is fatal: nothing is kept from a partially built orchestrator. wgpu
    /// validation and out-of-memory errors raised while creating resources are captured with
    /// error scopes and returned as [`Error::Device`].
    pub async fn new(
        gpu: GpuContext,
        targets: RenderTargets,
        config: OrchestratorConfig,
        shared_layout: Option<Arc<BindingLayout>>,
    ) -> Result<Self> {
        let device_features = gpu.device.features();
        validate_targets(&targets, device_features)?;

        let instance_layout = InstanceLayout::contiguous(config.instances_per_class)?;

        let mut required = config.strategy.required_features();
        if instance_layout.uses_first_instance() {
            required |= wgpu::Features::INDIRECT_FIRST_INSTANCE;
        }
        let missing = required.difference(device_features);
        if !missing.is_empty() {
            return Err(Error::MissingFeatures {
                strategy: config.strategy,
                missing,
            });
        }

        if let Some(shared) = &shared_layout {
            check_shared_layout(shared, &config, &instance_layout)?;
        }

        gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let built = build_resources(&gpu.device, &targets, &config, instance_layout, shared_layout);

        let validation_error = gpu.device.pop_error_scope().await;
        let out_of_memory_error = gpu.device.pop_error_scope().await;
        if let Some(error) = validation_error.or(out_of_memory_error) {
            return Err(Error::Device(error));
        }
        let (layout, frame, pipeline, arguments) = built?;

        tracing::info!(
            label = %config.label,
            strategy = ?config.strategy,
            ownership = ?config.argument_ownership,
            instances_per_class = config.instances_per_class,
            color_targets = targets.color_formats.len(),
            shared_layout = !layout.is_owned(),
            "indirect draw orchestrator ready"
        );

        Ok(Self {
            gpu,
            config,
            targets,
            layout,
            frame,
            pipeline,
            arguments,
            frames_rendered: 0,
            notices: NoticeLog::default(),
            last_frame: FrameStats::default(),
            lifetime: FrameStats::default(),
            last_skipped: SmallVec::new(),
        })
    }
}

fn check_shared_layout(
    shared: &BindingLayout,
    config: &OrchestratorConfig,
    instance_layout: &InstanceLayout,
) -> Result<()> {
    if shared.strategy() != config.strategy {
        return Err(Error::IncompatibleLayout(format!(
            "layout uses {:?} but {:?} was configured",
            shared.strategy(),
            config.strategy
        )));
    }
    if shared.instance_layout() != instance_layout {
        return Err(Error::IncompatibleLayout(format!(
            "layout reserves {} instances but {} per class were configured",
            shared.instance_layout().total(),
            config.instances_per_class
        )));
    }
    Ok(())
}

fn build_resources(
    device: &wgpu::Device,
    targets: &RenderTargets,
    config: &OrchestratorConfig,
    instance_layout: InstanceLayout,
    shared_layout: Option<Arc<BindingLayout>>,
) -> Result<(LayoutOwnership, FrameBinding, wgpu::RenderPipeline, ArgumentStore)> {
    let layout = match shared_layout {
        Some(shared) => LayoutOwnership::Shared(shared),
        None => LayoutOwnership::Owned(BindingLayout::new(
            device,
            config.strategy,
            instance_layout,
            config.max_instances,
        )?),
    };

    let frame = FrameBinding::new(device, &layout, &config.label);
    let pipeline = create_indirect_pipeline(device, &layout, targets, config.raster, &config.label);

    let arguments = match config.argument_ownership {
        ArgumentOwnership::Owned => ArgumentStore::Owned(ArgumentBuffer::new(device)),
        ArgumentOwnership::External => ArgumentStore::External(ArgumentProtocol::new()),
    };

    Ok((layout, frame, pipeline, arguments))
}
