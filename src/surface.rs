//! Read-only surface descriptors and their validation against the geometry buffer tables.

/// Maps one mesh to slots in the caller's vertex and index buffer tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceDescriptor {
    pub position_slot: u32,
    pub normal_slot: u32,
    pub index_slot: u32,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
}

impl SurfaceDescriptor {
    pub fn new(position_slot: u32, normal_slot: u32, index_slot: u32, index_count: u32) -> Self {
        Self {
            position_slot,
            normal_slot,
            index_slot,
            index_count,
            index_format: wgpu::IndexFormat::Uint32,
        }
    }

    pub fn with_index_format(mut self, index_format: wgpu::IndexFormat) -> Self {
        self.index_format = index_format;
        self
    }
}

/// Sizes of the tables a descriptor's slots index into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableBounds {
    pub vertex_buffers: usize,
    pub index_buffers: usize,
    pub surfaces: usize,
}

/// Why a geometry class was left out of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSurface,
    SurfaceOutOfRange { index: usize },
    PositionSlotOutOfRange { slot: u32 },
    NormalSlotOutOfRange { slot: u32 },
    IndexSlotOutOfRange { slot: u32 },
}

/// A descriptor whose slots were checked against the tables of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidSurface {
    pub surface_index: usize,
    pub descriptor: SurfaceDescriptor,
}

fn slot_in_range(slot: u32, len: usize) -> bool {
    (slot as usize) < len
}

pub fn resolve_surface(
    surface_index: Option<usize>,
    surfaces: &[SurfaceDescriptor],
    bounds: TableBounds,
) -> Result<ValidSurface, SkipReason> {
    let surface_index = surface_index.ok_or(SkipReason::NoSurface)?;
    if surface_index >= bounds.surfaces {
        return Err(SkipReason::SurfaceOutOfRange {
            index: surface_index,
        });
    }
    let descriptor = *surfaces
        .get(surface_index)
        .ok_or(SkipReason::SurfaceOutOfRange {
            index: surface_index,
        })?;

    if !slot_in_range(descriptor.position_slot, bounds.vertex_buffers) {
        return Err(SkipReason::PositionSlotOutOfRange {
            slot: descriptor.position_slot,
        });
    }
    if !slot_in_range(descriptor.normal_slot, bounds.vertex_buffers) {
        return Err(SkipReason::NormalSlotOutOfRange {
            slot: descriptor.normal_slot,
        });
    }
    if !slot_in_range(descriptor.index_slot, bounds.index_buffers) {
        return Err(SkipReason::IndexSlotOutOfRange {
            slot: descriptor.index_slot,
        });
    }

    Ok(ValidSurface {
        surface_index,
        descriptor,
    })
}
