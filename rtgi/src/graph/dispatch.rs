use glam::{uvec3, UVec2, UVec3};

/// Invokes a kernel once per element of a `size`-long grid.
pub fn dispatch_1d(size: u32, mut kernel: impl FnMut(UVec3)) {
    for x in 0..size {
        kernel(uvec3(x, 0, 0));
    }
}

/// Invokes a kernel once per element of a `size`-sized grid, row by row.
pub fn dispatch_2d(size: UVec2, mut kernel: impl FnMut(UVec3)) {
    for y in 0..size.y {
        for x in 0..size.x {
            kernel(uvec3(x, y, 0));
        }
    }
}
