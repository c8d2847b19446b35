//! Resource slots shared by every sub-draw and the strategies for selecting instance data.
//!
//! Group layout:
//! - group 0: per-frame transform uniform.
//! - group 1: instance data. One shared array (`SingleSlot`), one bind group per class that
//!   also carries the class's selector (`PerCallRebind`), or a `binding_array` holding every
//!   class's array (`ArraySelector`).
//! - group 2 (`ArraySelector` only): the selector uniform, bound with a dynamic offset.

use std::num::NonZeroU32;
use std::ops::Deref;
use std::sync::Arc;

use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use crate::draw_args::{GeometryClass, GEOMETRY_CLASS_COUNT};
use crate::error::Result;
use crate::instance::{InstanceBuffers, InstanceLayout, InstanceRecord};
use crate::util::{align_to, IDENTITY_MATRIX};

pub const FRAME_GROUP: u32 = 0;
pub const INSTANCE_GROUP: u32 = 1;
pub const SELECTOR_GROUP: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BindingStrategy {
    /// One instance array shared by all classes, bound once.
    SingleSlot,
    /// One instance array per class, rebound into the same slot before every sub-draw.
    PerCallRebind,
    /// Every class's instance array resident as a `binding_array`, bound once per frame, with
    /// a selector constant picked per sub-draw.
    #[default]
    ArraySelector,
}

impl BindingStrategy {
    pub fn instance_slot_count(self) -> usize {
        match self {
            BindingStrategy::SingleSlot => 1,
            BindingStrategy::PerCallRebind | BindingStrategy::ArraySelector => {
                GEOMETRY_CLASS_COUNT
            }
        }
    }

    pub fn required_features(self) -> wgpu::Features {
        match self {
            BindingStrategy::SingleSlot | BindingStrategy::PerCallRebind => {
                wgpu::Features::empty()
            }
            BindingStrategy::ArraySelector => {
                wgpu::Features::BUFFER_BINDING_ARRAY
                    | wgpu::Features::STORAGE_RESOURCE_BINDING_ARRAY
            }
        }
    }

    /// Whether sub-draws read a [`DrawSelector`]. `SingleSlot` indexes its shared array with
    /// the raw instance index and needs none.
    pub fn uses_selectors(self) -> bool {
        !matches!(self, BindingStrategy::SingleSlot)
    }

    /// Whether the instance bind group is shared by every sub-draw of a frame.
    pub fn binds_instances_once(self) -> bool {
        !matches!(self, BindingStrategy::PerCallRebind)
    }

    /// What has to be bound right before drawing `class`.
    pub fn class_binding(self, class: GeometryClass, selector_stride: u64) -> ClassBinding {
        match self {
            BindingStrategy::SingleSlot => ClassBinding::Shared,
            BindingStrategy::PerCallRebind => ClassBinding::InstanceGroup(class),
            BindingStrategy::ArraySelector => ClassBinding::Selector {
                dynamic_offset: (class.index() as u64 * selector_stride) as u32,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassBinding {
    /// Nothing beyond the per-frame bindings.
    Shared,
    /// Rebind the class's own instance group.
    InstanceGroup(GeometryClass),
    /// Rebind the selector group at this dynamic offset.
    Selector { dynamic_offset: u32 },
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawSelector {
    /// Element of the instance binding array to read.
    pub instance_buffer: u32,
    /// Subtracted from `instance_index` to get the element inside that array.
    pub instance_base: u32,
    _padding: [u32; 2],
}

impl DrawSelector {
    pub const SIZE: wgpu::BufferAddress = std::mem::size_of::<Self>() as wgpu::BufferAddress;

    pub fn new(instance_buffer: u32, instance_base: u32) -> Self {
        Self {
            instance_buffer,
            instance_base,
            _padding: [0; 2],
        }
    }
}

/// Distance between selector slots, honoring the device's dynamic-offset alignment.
pub fn selector_stride(min_uniform_buffer_offset_alignment: u32) -> u64 {
    align_to(DrawSelector::SIZE, min_uniform_buffer_offset_alignment as u64)
}

/// Selector slots for every class, laid out at `stride` bytes apart.
pub(crate) fn selector_bytes(
    strategy: BindingStrategy,
    instance_layout: &InstanceLayout,
    stride: u64,
) -> Vec<u8> {
    let mut bytes = vec![0u8; (stride * GEOMETRY_CLASS_COUNT as u64) as usize];
    for class in GeometryClass::ALL {
        let instance_buffer = match strategy {
            BindingStrategy::SingleSlot => 0,
            BindingStrategy::PerCallRebind | BindingStrategy::ArraySelector => {
                class.index() as u32
            }
        };
        let selector = DrawSelector::new(instance_buffer, instance_layout.range(class).start);
        let offset = (class.index() as u64 * stride) as usize;
        bytes[offset..offset + DrawSelector::SIZE as usize]
            .copy_from_slice(bytemuck::bytes_of(&selector));
    }
    bytes
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub view_projection: [[f32; 4]; 4],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view_projection: IDENTITY_MATRIX,
        }
    }
}

fn uniform_entry(binding: u32, has_dynamic_offset: bool, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

fn instance_storage_entry(binding: u32, count: Option<NonZeroU32>) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(InstanceRecord::SIZE),
        },
        count,
    }
}

/// Bind group layouts, instance data and selectors for one binding strategy.
///
/// Can be built once and shared by several orchestrators through an `Arc`. Nothing in it is
/// written per frame; each orchestrator keeps its own frame uniform buffer.
pub struct BindingLayout {
    strategy: BindingStrategy,
    instance_layout: InstanceLayout,
    max_instances: u32,
    frame_layout: wgpu::BindGroupLayout,
    instance_group_layout: wgpu::BindGroupLayout,
    selector_layout: Option<wgpu::BindGroupLayout>,
    selector_buffer: Option<wgpu::Buffer>,
    selector_stride: u64,
    selector_bind_group: Option<wgpu::BindGroup>,
    instance_buffers: InstanceBuffers,
    instance_bind_groups: SmallVec<[wgpu::BindGroup; GEOMETRY_CLASS_COUNT]>,
}

impl BindingLayout {
    pub fn new(
        device: &wgpu::Device,
        strategy: BindingStrategy,
        instance_layout: InstanceLayout,
        max_instances: u32,
    ) -> Result<Self> {
        let instance_buffers =
            InstanceBuffers::new(device, strategy, &instance_layout, max_instances)?;

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ivy_frame_bgl"),
            entries: &[uniform_entry(0, false, std::mem::size_of::<FrameUniforms>() as u64)],
        });

        let instance_group_layout = match strategy {
            BindingStrategy::SingleSlot => {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("ivy_instance_bgl"),
                    entries: &[instance_storage_entry(0, None)],
                })
            }
            BindingStrategy::PerCallRebind => {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("ivy_instance_rebind_bgl"),
                    entries: &[
                        instance_storage_entry(0, None),
                        uniform_entry(1, false, DrawSelector::SIZE),
                    ],
                })
            }
            BindingStrategy::ArraySelector => {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("ivy_instance_array_bgl"),
                    entries: &[instance_storage_entry(
                        0,
                        NonZeroU32::new(GEOMETRY_CLASS_COUNT as u32),
                    )],
                })
            }
        };

        let selector_layout = (strategy == BindingStrategy::ArraySelector).then(|| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("ivy_selector_bgl"),
                entries: &[uniform_entry(0, true, DrawSelector::SIZE)],
            })
        });

        let stride = selector_stride(device.limits().min_uniform_buffer_offset_alignment);
        let selector_buffer = strategy.uses_selectors().then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Ivy_DrawSelectors"),
                contents: &selector_bytes(strategy, &instance_layout, stride),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        });

        let selector_bind_group = selector_layout
            .as_ref()
            .zip(selector_buffer.as_ref())
            .map(|(selector_layout, selector_buffer)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("ivy_selector_bind_group"),
                    layout: selector_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: selector_buffer,
                            offset: 0,
                            size: wgpu::BufferSize::new(DrawSelector::SIZE),
                        }),
                    }],
                })
            });

        let mut layout = Self {
            strategy,
            instance_layout,
            max_instances,
            frame_layout,
            instance_group_layout,
            selector_layout,
            selector_buffer,
            selector_stride: stride,
            selector_bind_group,
            instance_buffers,
            instance_bind_groups: SmallVec::new(),
        };

        layout.instance_bind_groups = {
            let buffers: SmallVec<[&wgpu::Buffer; GEOMETRY_CLASS_COUNT]> =
                layout.instance_buffers.buffers().iter().collect();
            layout.create_instance_bind_groups(device, &buffers)
        };

        Ok(layout)
    }

    pub fn strategy(&self) -> BindingStrategy {
        self.strategy
    }

    pub fn instance_layout(&self) -> &InstanceLayout {
        &self.instance_layout
    }

    pub fn max_instances(&self) -> u32 {
        self.max_instances
    }

    pub fn selector_stride(&self) -> u64 {
        self.selector_stride
    }

    /// Instance arrays created for this layout. The producer stage writes into these.
    pub fn instance_buffers(&self) -> &[wgpu::Buffer] {
        self.instance_buffers.buffers()
    }

    pub fn bind_group_layouts(&self) -> SmallVec<[&wgpu::BindGroupLayout; 3]> {
        let mut layouts: SmallVec<[&wgpu::BindGroupLayout; 3]> =
            SmallVec::from_slice(&[&self.frame_layout, &self.instance_group_layout]);
        if let Some(selector_layout) = &self.selector_layout {
            layouts.push(selector_layout);
        }
        layouts
    }

    pub(crate) fn frame_layout(&self) -> &wgpu::BindGroupLayout {
        &self.frame_layout
    }

    /// Whether the selector uniform exists, which only `SingleSlot` goes without.
    pub fn has_selectors(&self) -> bool {
        self.selector_buffer.is_some()
    }

    pub(crate) fn selector_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.selector_bind_group.as_ref()
    }

    pub(crate) fn instance_bind_groups(&self) -> &[wgpu::BindGroup] {
        &self.instance_bind_groups
    }

    /// Builds instance bind groups over `buffers`, which must hold
    /// [`BindingStrategy::instance_slot_count`] entries.
    pub(crate) fn create_instance_bind_groups(
        &self,
        device: &wgpu::Device,
        buffers: &[&wgpu::Buffer],
    ) -> SmallVec<[wgpu::BindGroup; GEOMETRY_CLASS_COUNT]> {
        debug_assert_eq!(buffers.len(), self.strategy.instance_slot_count());

        match self.strategy {
            BindingStrategy::SingleSlot => buffers
                .iter()
                .map(|buffer| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("ivy_instance_bind_group"),
                        layout: &self.instance_group_layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        }],
                    })
                })
                .collect(),
            BindingStrategy::PerCallRebind => GeometryClass::ALL
                .iter()
                .zip(buffers.iter())
                .filter_map(|(class, buffer)| {
                    let selector_buffer = self.selector_buffer.as_ref()?;
                    let label = format!("ivy_instance_bind_group_{}", class.label());
                    Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&label),
                        layout: &self.instance_group_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: buffer.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                    buffer: selector_buffer,
                                    offset: class.index() as u64 * self.selector_stride,
                                    size: wgpu::BufferSize::new(DrawSelector::SIZE),
                                }),
                            },
                        ],
                    }))
                })
                .collect(),
            BindingStrategy::ArraySelector => {
                let bindings: SmallVec<[wgpu::BufferBinding; GEOMETRY_CLASS_COUNT]> = buffers
                    .iter()
                    .map(|buffer| buffer.as_entire_buffer_binding())
                    .collect();
                std::iter::once(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("ivy_instance_array_bind_group"),
                    layout: &self.instance_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::BufferArray(&bindings),
                    }],
                }))
                .collect()
            }
        }
    }
}

/// Per-frame transform uniform of one orchestrator.
///
/// `queue.write_buffer` lands before the submission runs, so it holds one transform per
/// submission.
pub(crate) struct FrameBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl FrameBinding {
    pub(crate) fn new(device: &wgpu::Device, layout: &BindingLayout, label: &str) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_FrameUniforms")),
            contents: bytemuck::bytes_of(&FrameUniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}_frame_bind_group")),
            layout: layout.frame_layout(),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self { buffer, bind_group }
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub(crate) fn write(&self, queue: &wgpu::Queue, uniforms: &FrameUniforms) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniforms));
    }
}

/// A binding layout either owned by one orchestrator or shared by a frame-level owner.
///
/// Dropping an `Owned` layout releases its GPU objects; dropping a `Shared` one only
/// releases this reference.
pub enum LayoutOwnership {
    Owned(BindingLayout),
    Shared(Arc<BindingLayout>),
}

impl LayoutOwnership {
    pub fn is_owned(&self) -> bool {
        matches!(self, LayoutOwnership::Owned(_))
    }
}

impl Deref for LayoutOwnership {
    type Target = BindingLayout;

    fn deref(&self) -> &BindingLayout {
        match self {
            LayoutOwnership::Owned(layout) => layout,
            LayoutOwnership::Shared(layout) => layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_is_sixteen_bytes() {
        assert_eq!(DrawSelector::SIZE, 16);
    }

    #[test]
    fn selector_stride_honors_device_alignment() {
        assert_eq!(selector_stride(256), 256);
        assert_eq!(selector_stride(64), 64);
        assert_eq!(selector_stride(16), 16);
        assert_eq!(selector_stride(4), 16);
    }

    #[test]
    fn selector_slots_point_at_class_arrays_and_bases() {
        let layout = InstanceLayout::contiguous(2).unwrap();
        let bytes = selector_bytes(BindingStrategy::ArraySelector, &layout, 256);
        assert_eq!(bytes.len(), 512);

        let leaf: &DrawSelector = bytemuck::from_bytes(&bytes[0..16]);
        let stem: &DrawSelector = bytemuck::from_bytes(&bytes[256..272]);
        assert_eq!(*leaf, DrawSelector::new(0, 0));
        assert_eq!(*stem, DrawSelector::new(1, 2));
    }

    #[test]
    fn single_slot_selectors_all_read_the_shared_array() {
        let layout = InstanceLayout::contiguous(3).unwrap();
        let bytes = selector_bytes(BindingStrategy::SingleSlot, &layout, 16);
        let stem: &DrawSelector = bytemuck::from_bytes(&bytes[16..32]);
        assert_eq!(*stem, DrawSelector::new(0, 3));
    }

    #[test]
    fn class_binding_follows_strategy() {
        assert_eq!(
            BindingStrategy::SingleSlot.class_binding(GeometryClass::Stem, 256),
            ClassBinding::Shared
        );
        assert_eq!(
            BindingStrategy::PerCallRebind.class_binding(GeometryClass::Stem, 256),
            ClassBinding::InstanceGroup(GeometryClass::Stem)
        );
        assert_eq!(
            BindingStrategy::ArraySelector.class_binding(GeometryClass::Stem, 256),
            ClassBinding::Selector {
                dynamic_offset: 256
            }
        );
    }

    #[test]
    fn only_array_selector_needs_binding_arrays() {
        assert!(BindingStrategy::SingleSlot.required_features().is_empty());
        assert!(BindingStrategy::PerCallRebind.required_features().is_empty());
        assert!(BindingStrategy::ArraySelector
            .required_features()
            .contains(wgpu::Features::BUFFER_BINDING_ARRAY));
    }

    #[test]
    fn only_single_slot_goes_without_selectors() {
        assert!(!BindingStrategy::SingleSlot.uses_selectors());
        assert!(BindingStrategy::PerCallRebind.uses_selectors());
        assert!(BindingStrategy::ArraySelector.uses_selectors());
    }

    #[test]
    fn instance_slot_counts() {
        assert_eq!(BindingStrategy::SingleSlot.instance_slot_count(), 1);
        assert_eq!(BindingStrategy::PerCallRebind.instance_slot_count(), 2);
        assert_eq!(BindingStrategy::ArraySelector.instance_slot_count(), 2);
        assert!(BindingStrategy::ArraySelector.binds_instances_once());
        assert!(!BindingStrategy::PerCallRebind.binds_instances_once());
    }
}
