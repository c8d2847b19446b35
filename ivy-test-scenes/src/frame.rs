use ivy_indirect::{wgpu, FrameInputs, IndirectDrawOrchestrator, RenderTargets};

use crate::gpu::HeadlessGpu;

/// Color and depth textures matching a [`RenderTargets`] description.
pub struct OffscreenTargets {
    pub color: Vec<wgpu::Texture>,
    pub color_views: Vec<wgpu::TextureView>,
    pub depth_view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl OffscreenTargets {
    pub fn new(device: &wgpu::Device, targets: &RenderTargets, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let create_texture = |label: &str, format: wgpu::TextureFormat, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let color: Vec<wgpu::Texture> = targets
            .color_formats
            .iter()
            .map(|format| {
                create_texture(
                    "ivy_test_color",
                    *format,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                )
            })
            .collect();
        let color_views = color
            .iter()
            .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();
        let depth = create_texture(
            "ivy_test_depth",
            targets.depth_format,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            color,
            color_views,
            depth_view,
            width,
            height,
        }
    }
}

/// Encodes one pass that clears every target, lets the orchestrator record into it and
/// submits it.
pub fn render_frame(
    gpu: &HeadlessGpu,
    orchestrator: &mut IndirectDrawOrchestrator,
    targets: &OffscreenTargets,
    inputs: &FrameInputs<'_>,
) {
    record_frame(gpu, targets, |pass| orchestrator.render(pass, inputs));
}

/// Encodes one pass that clears every target, hands it to `record` and submits it, so
/// several orchestrators can share one submission.
pub fn record_frame(
    gpu: &HeadlessGpu,
    targets: &OffscreenTargets,
    record: impl FnOnce(&mut wgpu::RenderPass<'_>),
) {
    let mut encoder = gpu
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ivy_test_frame_encoder"),
        });

    {
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = targets
            .color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ivy_test_frame_pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        record(&mut pass);
    }

    gpu.queue().submit(std::iter::once(encoder.finish()));
    let _ = gpu.device().poll(wgpu::PollType::Wait);
}

fn map_readback_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Option<Vec<u8>> {
    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::Wait);
    receiver.recv().ok()?.ok()?;

    let mapped_range = buffer_slice.get_mapped_range();
    let bytes = mapped_range.to_vec();
    drop(mapped_range);
    buffer.unmap();
    Some(bytes)
}

/// Copies `size` bytes of `source` (which needs `COPY_SRC`) back to the CPU.
pub fn read_buffer(gpu: &HeadlessGpu, source: &wgpu::Buffer, size: u64) -> Option<Vec<u8>> {
    let staging = gpu.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("ivy_test_readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ivy_test_readback_encoder"),
        });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    gpu.queue().submit(std::iter::once(encoder.finish()));

    map_readback_buffer(gpu.device(), &staging)
}

/// Reads back color target `index`, which must use a 4-byte-per-texel format. Rows are
/// returned tightly packed.
pub fn read_color_target(gpu: &HeadlessGpu, targets: &OffscreenTargets, index: usize) -> Option<Vec<u8>> {
    let texture = targets.color.get(index)?;
    let unpadded_bytes_per_row = targets.width * 4;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let staging = gpu.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("ivy_test_color_readback"),
        size: (padded_bytes_per_row * targets.height) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ivy_test_color_readback_encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(targets.height),
            },
        },
        wgpu::Extent3d {
            width: targets.width,
            height: targets.height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue().submit(std::iter::once(encoder.finish()));

    let padded = map_readback_buffer(gpu.device(), &staging)?;
    let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * targets.height) as usize);
    for row in padded.chunks(padded_bytes_per_row as usize) {
        pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
    }
    Some(pixels)
}
