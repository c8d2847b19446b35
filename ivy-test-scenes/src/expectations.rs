/// Albedo written by the indirect pipeline into an `Rgba8Unorm` target.
pub const ALBEDO_RGBA: [u8; 4] = [46, 140, 36, 255];

/// A single pixel-color expectation to validate after rendering.
pub struct PixelExpectation {
    pub x: u32,
    pub y: u32,
    pub expected: [u8; 4],
    /// Per-channel tolerance for comparison (default 3).
    pub tolerance: u8,
    /// Human-readable label for failure messages.
    pub label: &'static str,
}

impl PixelExpectation {
    pub fn new(x: u32, y: u32, expected: [u8; 4], label: &'static str) -> Self {
        Self {
            x,
            y,
            expected,
            tolerance: 3,
            label,
        }
    }

    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn albedo(x: u32, y: u32, label: &'static str) -> Self {
        Self::new(x, y, ALBEDO_RGBA, label)
    }

    /// Expect the clear color (transparent black).
    pub fn cleared(x: u32, y: u32, label: &'static str) -> Self {
        Self::new(x, y, [0, 0, 0, 0], label)
    }
}

/// Validates pixel expectations against tightly packed RGBA8 rows.
///
/// Returns a list of human-readable failure descriptions. An empty list means
/// all expectations passed.
pub fn check_pixels(
    pixel_data: &[u8],
    width: u32,
    height: u32,
    expectations: &[PixelExpectation],
) -> Vec<String> {
    let mut failures = Vec::new();
    let stride = (width as usize) * 4;

    for expectation in expectations {
        if expectation.x >= width || expectation.y >= height {
            failures.push(format!(
                "[{}] pixel ({},{}) is outside canvas {}x{}",
                expectation.label, expectation.x, expectation.y, width, height,
            ));
            continue;
        }

        let offset = (expectation.y as usize) * stride + (expectation.x as usize) * 4;
        let Some(actual) = pixel_data.get(offset..offset + 4) else {
            failures.push(format!(
                "[{}] pixel ({},{}) is out of bounds (buffer len {})",
                expectation.label,
                expectation.x,
                expectation.y,
                pixel_data.len(),
            ));
            continue;
        };

        let within_tolerance = actual
            .iter()
            .zip(expectation.expected)
            .all(|(actual, expected)| actual.abs_diff(expected) <= expectation.tolerance);
        if !within_tolerance {
            failures.push(format!(
                "[{}] pixel ({},{}): expected {:?}, got {:?}",
                expectation.label, expectation.x, expectation.y, expectation.expected, actual,
            ));
        }
    }

    failures
}
