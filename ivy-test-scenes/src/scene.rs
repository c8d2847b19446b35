use ivy_indirect::{wgpu, SurfaceDescriptor};

use crate::expectations::PixelExpectation;
use crate::geometry::GeometryFixture;

pub const CANVAS_WIDTH: u32 = 64;
pub const CANVAS_HEIGHT: u32 = 64;

pub const LEAF_SURFACE: usize = 0;
pub const STEM_SURFACE: usize = 1;

/// Scales the seeded instance row (x from -3 to 3) into clip space and pushes it into the
/// depth range.
pub fn overview_transform() -> [[f32; 4]; 4] {
    [
        [0.2, 0.0, 0.0, 0.0],
        [0.0, 0.2, 0.0, 0.0],
        [0.0, 0.0, 0.2, 0.0],
        [0.0, 0.0, 0.5, 1.0],
    ]
}

/// Leaf cube and stem prism laid out in buffer tables the way a mesh loader would.
///
/// Vertex table: leaf positions, leaf normals, stem positions, stem normals.
/// Index table: leaf indices, stem indices.
pub struct IvyScene {
    pub leaf: GeometryFixture,
    pub stem: GeometryFixture,
}

impl IvyScene {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            leaf: GeometryFixture::leaf_cube(device),
            stem: GeometryFixture::stem_prism(device),
        }
    }

    pub fn vertex_buffers(&self) -> [&wgpu::Buffer; 4] {
        [
            &self.leaf.positions,
            &self.leaf.normals,
            &self.stem.positions,
            &self.stem.normals,
        ]
    }

    pub fn index_buffers(&self) -> [&wgpu::Buffer; 2] {
        [&self.leaf.indices, &self.stem.indices]
    }

    pub fn surfaces(&self) -> Vec<SurfaceDescriptor> {
        vec![
            SurfaceDescriptor::new(0, 1, 0, self.leaf.index_count),
            SurfaceDescriptor::new(2, 3, 1, self.stem.index_count),
        ]
    }

    /// Pixel centers of the four seeded instances on the middle row, in class order.
    pub fn instance_pixels() -> [(u32, u32); 4] {
        let row = CANVAS_HEIGHT / 2;
        [-0.6f32, -0.2, 0.2, 0.6].map(|x| {
            let column = ((x + 1.0) * 0.5 * CANVAS_WIDTH as f32) as u32;
            (column, row)
        })
    }

    /// Albedo where a class is drawn, cleared pixels where it is not.
    pub fn expectations(leaf_drawn: bool, stem_drawn: bool) -> Vec<PixelExpectation> {
        let pixels = Self::instance_pixels();
        let labels = ["leaf_0", "leaf_1", "stem_0", "stem_1"];

        pixels
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(instance, ((x, y), label))| {
                let drawn = if instance < 2 { leaf_drawn } else { stem_drawn };
                if drawn {
                    PixelExpectation::albedo(*x, *y, label)
                } else {
                    PixelExpectation::cleared(*x, *y, label)
                }
            })
            .collect()
    }

    /// Corner pixel no instance reaches.
    pub fn background_expectation() -> PixelExpectation {
        PixelExpectation::cleared(1, 1, "background")
    }
}
