//! Binary contract of the indirect argument buffer.
//!
//! One [`IndexedDrawRecord`] per geometry class, packed back to back. The producer stage
//! and the indirect draw path both address record `i` at `i * IndexedDrawRecord::SIZE`.

use bytemuck::{Pod, Zeroable};

/// Number of geometry classes drawn through one orchestrator.
pub const GEOMETRY_CLASS_COUNT: usize = 2;

/// Logical mesh category with its own draw record and instance range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryClass {
    Leaf,
    Stem,
}

impl GeometryClass {
    /// All classes in draw order.
    pub const ALL: [GeometryClass; GEOMETRY_CLASS_COUNT] = [GeometryClass::Leaf, GeometryClass::Stem];

    pub const fn index(self) -> usize {
        match self {
            GeometryClass::Leaf => 0,
            GeometryClass::Stem => 1,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            GeometryClass::Leaf => "leaf",
            GeometryClass::Stem => "stem",
        }
    }

    /// Byte offset of this class's record inside the argument buffer.
    pub const fn argument_offset(self) -> wgpu::BufferAddress {
        self.index() as wgpu::BufferAddress * IndexedDrawRecord::SIZE
    }
}

/// Parameters of one indexed draw, laid out exactly as `draw_indexed_indirect` reads them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct IndexedDrawRecord {
    pub index_count_per_instance: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
    pub start_instance_location: u32,
}

impl IndexedDrawRecord {
    pub const SIZE: wgpu::BufferAddress = std::mem::size_of::<Self>() as wgpu::BufferAddress;

    pub const fn new(
        index_count_per_instance: u32,
        instance_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
        start_instance_location: u32,
    ) -> Self {
        Self {
            index_count_per_instance,
            instance_count,
            start_index_location,
            base_vertex_location,
            start_instance_location,
        }
    }

    pub fn as_wgpu_args(&self) -> wgpu::util::DrawIndexedIndirectArgs {
        wgpu::util::DrawIndexedIndirectArgs {
            index_count: self.index_count_per_instance,
            instance_count: self.instance_count,
            first_index: self.start_index_location,
            base_vertex: self.base_vertex_location,
            first_instance: self.start_instance_location,
        }
    }
}

/// Size of an argument buffer holding one record per geometry class.
pub const ARGUMENT_BUFFER_SIZE: wgpu::BufferAddress =
    IndexedDrawRecord::SIZE * GEOMETRY_CLASS_COUNT as wgpu::BufferAddress;
