use ivy_indirect::wgpu;
use ivy_indirect::wgpu::util::DeviceExt;

/// Separate position, normal and index buffers for one mesh.
pub struct GeometryFixture {
    pub positions: wgpu::Buffer,
    pub normals: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub index_count: u32,
}

impl GeometryFixture {
    fn upload(
        device: &wgpu::Device,
        label: &str,
        positions: &[[f32; 3]],
        indices: &[u32],
    ) -> Self {
        let normals: Vec<[f32; 3]> = positions.iter().map(|position| normalize(*position)).collect();

        Self {
            positions: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}_positions")),
                contents: bytemuck::cast_slice(positions),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            normals: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}_normals")),
                contents: bytemuck::cast_slice(&normals),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}_indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: indices.len() as u32,
        }
    }

    /// Unit cube centered on the origin: 8 vertices, 36 indices.
    pub fn leaf_cube(device: &wgpu::Device) -> Self {
        let h = 0.5;
        let positions = [
            [-h, -h, -h],
            [h, -h, -h],
            [h, h, -h],
            [-h, h, -h],
            [-h, -h, h],
            [h, -h, h],
            [h, h, h],
            [-h, h, h],
        ];
        let indices = [
            0, 1, 2, 0, 2, 3, // back
            4, 6, 5, 4, 7, 6, // front
            0, 4, 5, 0, 5, 1, // bottom
            3, 2, 6, 3, 6, 7, // top
            0, 3, 7, 0, 7, 4, // left
            1, 5, 6, 1, 6, 2, // right
        ];
        Self::upload(device, "leaf_cube", &positions, &indices)
    }

    /// Triangular prism along Y: 6 vertices, 24 indices.
    pub fn stem_prism(device: &wgpu::Device) -> Self {
        let h = 0.5;
        let positions = [
            [-h, -h, -h],
            [h, -h, -h],
            [0.0, -h, h],
            [-h, h, -h],
            [h, h, -h],
            [0.0, h, h],
        ];
        let indices = [
            0, 2, 1, // bottom cap
            3, 4, 5, // top cap
            0, 1, 4, 0, 4, 3, //
            1, 2, 5, 1, 5, 4, //
            2, 0, 3, 2, 3, 5, //
        ];
        Self::upload(device, "stem_prism", &positions, &indices)
    }
}

fn normalize([x, y, z]: [f32; 3]) -> [f32; 3] {
    let length = (x * x + y * y + z * z).sqrt();
    if length == 0.0 {
        return [0.0, 0.0, 1.0];
    }
    [x / length, y / length, z / length]
}
