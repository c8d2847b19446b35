//! The one render pipeline every indirect sub-draw goes through.
//!
//! The WGSL module is assembled from shared declarations, a strategy-specific preamble that
//! defines `instance_transform`, the vertex entry point and a fragment entry point generated
//! for the caller's render targets.

use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::binding::{BindingLayout, BindingStrategy};
use crate::error::{Error, Result};

/// Vertex stream slots. Positions and normals come from separate buffers.
pub const POSITION_SLOT: u32 = 0;
pub const NORMAL_SLOT: u32 = 1;

const VERTEX_STRIDE: wgpu::BufferAddress = 3 * std::mem::size_of::<f32>() as wgpu::BufferAddress;

/// Color attachments plus the depth attachment of the pass the orchestrator records into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargets {
    pub color_formats: SmallVec<[wgpu::TextureFormat; 4]>,
    pub depth_format: wgpu::TextureFormat,
}

impl RenderTargets {
    pub fn new(color_formats: &[wgpu::TextureFormat], depth_format: wgpu::TextureFormat) -> Self {
        Self {
            color_formats: SmallVec::from_slice(color_formats),
            depth_format,
        }
    }

    /// Albedo, normal, AO/roughness/metallic and motion vectors, in that order.
    pub fn gbuffer(
        albedo: wgpu::TextureFormat,
        normal: wgpu::TextureFormat,
        aorm: wgpu::TextureFormat,
        motion: wgpu::TextureFormat,
        depth: wgpu::TextureFormat,
    ) -> Self {
        Self::new(&[albedo, normal, aorm, motion], depth)
    }
}

/// Rasterizer state, fixed for the lifetime of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterState {
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
        }
    }
}

/// Checks every attachment format before any GPU object is created.
pub fn validate_targets(targets: &RenderTargets, device_features: wgpu::Features) -> Result<()> {
    if targets.color_formats.is_empty() {
        return Err(Error::NoColorTargets);
    }

    for (index, format) in targets.color_formats.iter().copied().enumerate() {
        let renderable = format
            .guaranteed_format_features(device_features)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT);
        if format.is_depth_stencil_format() || !format.has_color_aspect() || !renderable {
            return Err(Error::InvalidColorTarget { index, format });
        }
    }

    if !targets.depth_format.has_depth_aspect() {
        return Err(Error::InvalidDepthTarget(targets.depth_format));
    }

    Ok(())
}

const SHARED_DECLARATIONS: &str = r#"
struct FrameUniforms {
    view_projection: mat4x4<f32>,
};

struct InstanceRecord {
    transform: mat4x4<f32>,
};

struct DrawSelector {
    instance_buffer: u32,
    instance_base: u32,
    _padding: vec2<u32>,
};

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
};

@group(0) @binding(0) var<uniform> frame: FrameUniforms;
"#;

const SINGLE_SLOT_PREAMBLE: &str = r#"
@group(1) @binding(0) var<storage, read> instances: array<InstanceRecord>;

fn instance_transform(instance_index: u32) -> mat4x4<f32> {
    return instances[instance_index].transform;
}
"#;

const PER_CALL_REBIND_PREAMBLE: &str = r#"
@group(1) @binding(0) var<storage, read> instances: array<InstanceRecord>;
@group(1) @binding(1) var<uniform> selector: DrawSelector;

fn instance_transform(instance_index: u32) -> mat4x4<f32> {
    return instances[instance_index - selector.instance_base].transform;
}
"#;

const ARRAY_SELECTOR_PREAMBLE: &str = r#"
struct InstanceArray {
    records: array<InstanceRecord>,
};

@group(1) @binding(0) var<storage, read> instance_arrays: binding_array<InstanceArray, 2>;
@group(2) @binding(0) var<uniform> selector: DrawSelector;

fn instance_transform(instance_index: u32) -> mat4x4<f32> {
    return instance_arrays[selector.instance_buffer].records[instance_index - selector.instance_base].transform;
}
"#;

const VERTEX_MAIN: &str = r#"
@vertex
fn vs_main(input: VertexInput, @builtin(instance_index) instance_index: u32) -> VertexOutput {
    let model = instance_transform(instance_index);
    var out: VertexOutput;
    out.clip_position = frame.view_projection * model * vec4<f32>(input.position, 1.0);
    out.normal = normalize((model * vec4<f32>(input.normal, 0.0)).xyz);
    return out;
}
"#;

fn strategy_preamble(strategy: BindingStrategy) -> &'static str {
    match strategy {
        BindingStrategy::SingleSlot => SINGLE_SLOT_PREAMBLE,
        BindingStrategy::PerCallRebind => PER_CALL_REBIND_PREAMBLE,
        BindingStrategy::ArraySelector => ARRAY_SELECTOR_PREAMBLE,
    }
}

fn output_type(format: wgpu::TextureFormat) -> &'static str {
    match format.sample_type(None, None) {
        Some(wgpu::TextureSampleType::Uint) => "vec4<u32>",
        Some(wgpu::TextureSampleType::Sint) => "vec4<i32>",
        _ => "vec4<f32>",
    }
}

/// Value written to color target `index`. Integer targets are cleared to zero.
fn output_value(index: usize, ty: &str) -> &'static str {
    match (ty, index) {
        ("vec4<f32>", 0) => "vec4<f32>(0.18, 0.55, 0.14, 1.0)",
        ("vec4<f32>", 1) => "vec4<f32>(input.normal * 0.5 + vec3<f32>(0.5), 1.0)",
        ("vec4<f32>", 2) => "vec4<f32>(1.0, 0.8, 0.0, 1.0)",
        ("vec4<f32>", _) => "vec4<f32>(0.0)",
        ("vec4<u32>", _) => "vec4<u32>(0u)",
        _ => "vec4<i32>(0)",
    }
}

fn fragment_main(targets: &RenderTargets) -> String {
    let mut source = String::from("\nstruct FragmentOutput {\n");
    for (index, format) in targets.color_formats.iter().enumerate() {
        let _ = writeln!(
            source,
            "    @location({index}) target{index}: {},",
            output_type(*format)
        );
    }
    source.push_str("};\n\n@fragment\nfn fs_main(input: VertexOutput) -> FragmentOutput {\n");
    source.push_str("    var out: FragmentOutput;\n");
    for (index, format) in targets.color_formats.iter().enumerate() {
        let value = output_value(index, output_type(*format));
        let _ = writeln!(source, "    out.target{index} = {value};");
    }
    source.push_str("    return out;\n}\n");
    source
}

pub fn build_shader_source(strategy: BindingStrategy, targets: &RenderTargets) -> String {
    format!(
        "{SHARED_DECLARATIONS}{}{VERTEX_MAIN}{}",
        strategy_preamble(strategy),
        fragment_main(targets)
    )
}

fn depth_state(format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

pub(crate) fn create_indirect_pipeline(
    device: &wgpu::Device,
    layout: &BindingLayout,
    targets: &RenderTargets,
    raster: RasterState,
    label: &str,
) -> wgpu::RenderPipeline {
    let source = build_shader_source(layout.strategy(), targets);
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{label}_shader")),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let bind_group_layouts = layout.bind_group_layouts();
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label}_pipeline_layout")),
        bind_group_layouts: &bind_group_layouts,
        push_constant_ranges: &[],
    });

    let position_attributes = [wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: POSITION_SLOT,
    }];
    let normal_attributes = [wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: NORMAL_SLOT,
    }];
    let vertex_buffers = [
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &position_attributes,
        },
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &normal_attributes,
        },
    ];

    let color_targets: SmallVec<[Option<wgpu::ColorTargetState>; 4]> = targets
        .color_formats
        .iter()
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{label}_pipeline")),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &vertex_buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &color_targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: raster.front_face,
            cull_mode: raster.cull_mode,
            ..Default::default()
        },
        depth_stencil: Some(depth_state(targets.depth_format)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    fn gbuffer() -> RenderTargets {
        RenderTargets::gbuffer(
            TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Rg16Float,
            TextureFormat::Depth32Float,
        )
    }

    #[test]
    fn gbuffer_targets_validate() {
        assert!(validate_targets(&gbuffer(), wgpu::Features::empty()).is_ok());
    }

    #[test]
    fn empty_color_targets_are_rejected() {
        let targets = RenderTargets::new(&[], TextureFormat::Depth32Float);
        assert!(matches!(
            validate_targets(&targets, wgpu::Features::empty()),
            Err(Error::NoColorTargets)
        ));
    }

    #[test]
    fn depth_format_as_color_target_is_rejected() {
        let targets = RenderTargets::new(
            &[TextureFormat::Rgba8Unorm, TextureFormat::Depth24Plus],
            TextureFormat::Depth32Float,
        );
        assert!(matches!(
            validate_targets(&targets, wgpu::Features::empty()),
            Err(Error::InvalidColorTarget { index: 1, .. })
        ));
    }

    #[test]
    fn color_format_as_depth_target_is_rejected() {
        let targets = RenderTargets::new(&[TextureFormat::Rgba8Unorm], TextureFormat::Rgba8Unorm);
        assert!(matches!(
            validate_targets(&targets, wgpu::Features::empty()),
            Err(Error::InvalidDepthTarget(TextureFormat::Rgba8Unorm))
        ));
    }

    #[test]
    fn compressed_color_target_is_rejected() {
        let targets = RenderTargets::new(&[TextureFormat::Bc1RgbaUnorm], TextureFormat::Depth32Float);
        assert!(matches!(
            validate_targets(&targets, wgpu::Features::TEXTURE_COMPRESSION_BC),
            Err(Error::InvalidColorTarget { index: 0, .. })
        ));
    }

    #[test]
    fn shader_declares_one_output_per_target() {
        let source = build_shader_source(BindingStrategy::ArraySelector, &gbuffer());
        for index in 0..4 {
            assert!(source.contains(&format!("@location({index}) target{index}: vec4<f32>")));
        }
        assert!(!source.contains("@location(4)"));
    }

    #[test]
    fn integer_targets_get_integer_outputs() {
        let targets = RenderTargets::new(
            &[TextureFormat::Rgba8Unorm, TextureFormat::R32Uint, TextureFormat::Rg16Sint],
            TextureFormat::Depth32Float,
        );
        let source = build_shader_source(BindingStrategy::SingleSlot, &targets);
        assert!(source.contains("target1: vec4<u32>"));
        assert!(source.contains("out.target1 = vec4<u32>(0u);"));
        assert!(source.contains("target2: vec4<i32>"));
    }

    #[test]
    fn preamble_follows_strategy() {
        let targets = gbuffer();
        let single = build_shader_source(BindingStrategy::SingleSlot, &targets);
        let rebind = build_shader_source(BindingStrategy::PerCallRebind, &targets);
        let array = build_shader_source(BindingStrategy::ArraySelector, &targets);

        assert!(!single.contains("var<uniform> selector"));
        assert!(rebind.contains("@group(1) @binding(1) var<uniform> selector"));
        assert!(array.contains("binding_array<InstanceArray, 2>"));
        assert!(array.contains("@group(2) @binding(0) var<uniform> selector"));

        for source in [single, rebind, array] {
            assert_eq!(source.matches("fn instance_transform").count(), 1);
            assert!(source.contains("@builtin(instance_index)"));
        }
    }

    #[test]
    fn default_raster_state_draws_both_faces() {
        let raster = RasterState::default();
        assert_eq!(raster.cull_mode, None);
        assert_eq!(raster.front_face, wgpu::FrontFace::Ccw);
    }
}
