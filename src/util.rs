/// Column-major 4×4 identity, the layout WGSL's `mat4x4<f32>` expects.
pub const IDENTITY_MATRIX: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

pub fn translation_matrix(x: f32, y: f32, z: f32) -> [[f32; 4]; 4] {
    let mut matrix = IDENTITY_MATRIX;
    matrix[3] = [x, y, z, 1.0];
    matrix
}

/// Rounds `value` up to the next multiple of `alignment`. An alignment of 0 is treated as 1.
#[inline(always)]
pub fn align_to(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_rounds_up_to_multiple() {
        assert_eq!(align_to(16, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(16, 16), 16);
        assert_eq!(align_to(0, 16), 0);
    }

    #[test]
    fn align_to_tolerates_zero_alignment() {
        assert_eq!(align_to(20, 0), 20);
    }

    #[test]
    fn translation_lives_in_last_column() {
        let matrix = translation_matrix(-3.0, 0.5, 2.0);
        assert_eq!(matrix[3], [-3.0, 0.5, 2.0, 1.0]);
        assert_eq!(matrix[0], IDENTITY_MATRIX[0]);
    }
}
