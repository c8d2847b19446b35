//! Per-instance data and the instance ranges assigned to each geometry class.
//!
//! Ranges are assigned contiguously in class order: with `k` instances per class the leaf
//! owns `[0, k)` and the stem owns `[k, 2k)`. The ranges are reserved for every configured
//! class whether or not it draws this frame, so the producer stage can rely on fixed
//! offsets.

use smallvec::SmallVec;

use crate::binding::BindingStrategy;
use crate::draw_args::{GeometryClass, GEOMETRY_CLASS_COUNT};
use crate::error::{Error, Result};
use crate::util::{translation_matrix, IDENTITY_MATRIX};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRecord {
    pub transform: [[f32; 4]; 4],
}

impl InstanceRecord {
    pub const SIZE: wgpu::BufferAddress = std::mem::size_of::<Self>() as wgpu::BufferAddress;

    pub const IDENTITY: Self = Self {
        transform: IDENTITY_MATRIX,
    };

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            transform: translation_matrix(x, y, z),
        }
    }
}

impl Default for InstanceRecord {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Half-open range of instance indices `[start, start + count)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InstanceRange {
    pub start: u32,
    pub count: u32,
}

impl InstanceRange {
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceLayout {
    ranges: [InstanceRange; GEOMETRY_CLASS_COUNT],
}

impl InstanceLayout {
    /// Fails with [`Error::InstanceCapacity`] when the ranges of all classes together do not
    /// fit in `u32` instance indices.
    pub fn contiguous(instances_per_class: u32) -> Result<Self> {
        let overflow = || Error::InstanceCapacity {
            capacity: u32::MAX as u64,
            required: instances_per_class as u64 * GEOMETRY_CLASS_COUNT as u64,
        };

        let mut ranges = [InstanceRange::default(); GEOMETRY_CLASS_COUNT];
        let mut next: u32 = 0;
        for range in &mut ranges {
            *range = InstanceRange {
                start: next,
                count: instances_per_class,
            };
            next = next.checked_add(instances_per_class).ok_or_else(overflow)?;
        }

        Ok(Self { ranges })
    }

    pub fn range(&self, class: GeometryClass) -> InstanceRange {
        self.ranges[class.index()]
    }

    pub fn total(&self) -> u32 {
        self.ranges.iter().map(|range| range.count).sum()
    }

    pub fn max_class_count(&self) -> u32 {
        self.ranges.iter().map(|range| range.count).max().unwrap_or(0)
    }

    /// Whether any draw starts past instance zero, which needs `INDIRECT_FIRST_INSTANCE`.
    pub fn uses_first_instance(&self) -> bool {
        self.ranges
            .iter()
            .any(|range| range.count > 0 && range.start > 0)
    }

    /// Illustrative transforms for `range`: instances spread along X, two units apart,
    /// starting at -3 for instance zero.
    pub fn seed_transforms(range: InstanceRange) -> impl Iterator<Item = InstanceRecord> {
        (range.start..range.end())
            .map(|instance| InstanceRecord::translation(-3.0 + 2.0 * instance as f32, 0.0, 0.0))
    }
}

/// Byte size of an instance array holding `max_instances` records, checked against the
/// device's storage binding limit before anything is allocated.
pub(crate) fn instance_buffer_size(max_instances: u32, limits: &wgpu::Limits) -> Result<u64> {
    let size = max_instances as u64 * InstanceRecord::SIZE;
    let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if size > limit {
        return Err(Error::InstanceBufferTooLarge { size, limit });
    }
    Ok(size)
}

/// GPU instance arrays, one shared array or one per class depending on the strategy.
pub struct InstanceBuffers {
    buffers: SmallVec<[wgpu::Buffer; GEOMETRY_CLASS_COUNT]>,
}

impl InstanceBuffers {
    pub(crate) fn new(
        device: &wgpu::Device,
        strategy: BindingStrategy,
        layout: &InstanceLayout,
        max_instances: u32,
    ) -> Result<Self> {
        let required = match strategy {
            BindingStrategy::SingleSlot => layout.total(),
            BindingStrategy::PerCallRebind | BindingStrategy::ArraySelector => {
                layout.max_class_count()
            }
        };
        if required > max_instances || max_instances == 0 {
            return Err(Error::InstanceCapacity {
                capacity: max_instances as u64,
                required: required as u64,
            });
        }
        let size = instance_buffer_size(max_instances, &device.limits())?;

        let buffers = match strategy {
            BindingStrategy::SingleSlot => {
                let everything = InstanceRange {
                    start: 0,
                    count: layout.total(),
                };
                let seeds = InstanceLayout::seed_transforms(everything);
                std::iter::once(create_instance_buffer(device, "Ivy_InstanceBuffer", size, seeds))
                    .collect()
            }
            BindingStrategy::PerCallRebind | BindingStrategy::ArraySelector => GeometryClass::ALL
                .iter()
                .map(|class| {
                    let seeds = InstanceLayout::seed_transforms(layout.range(*class));
                    let label = format!("Ivy_InstanceBuffer_{}", class.label());
                    create_instance_buffer(device, &label, size, seeds)
                })
                .collect(),
        };

        Ok(Self { buffers })
    }

    pub fn buffers(&self) -> &[wgpu::Buffer] {
        &self.buffers
    }
}

/// Creates a zeroed array of `size` bytes and uploads `seeds` at its start.
fn create_instance_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
    seeds: impl Iterator<Item = InstanceRecord>,
) -> wgpu::Buffer {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: true,
    });
    {
        let mut mapped = buffer.slice(..).get_mapped_range_mut();
        for (slot, record) in mapped
            .chunks_exact_mut(InstanceRecord::SIZE as usize)
            .zip(seeds)
        {
            slot.copy_from_slice(bytemuck::bytes_of(&record));
        }
    }
    buffer.unmap();
    buffer
}
