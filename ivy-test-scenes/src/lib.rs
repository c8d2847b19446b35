pub mod expectations;
pub mod frame;
pub mod geometry;
pub mod gpu;
pub mod scene;

pub use expectations::{check_pixels, PixelExpectation};
pub use frame::{read_buffer, read_color_target, record_frame, render_frame, OffscreenTargets};
pub use geometry::GeometryFixture;
pub use gpu::{try_headless_gpu, HeadlessGpu};
pub use scene::{overview_transform, IvyScene, CANVAS_HEIGHT, CANVAS_WIDTH, LEAF_SURFACE, STEM_SURFACE};
