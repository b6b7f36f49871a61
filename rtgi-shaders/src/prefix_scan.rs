//! Three-stage inclusive prefix scan over up to `SEGMENT_SIZE²` elements:
//! every segment is scanned on its own, then the segment totals are scanned,
//! then each segment gets the total of all preceding segments added.

use rtgi_gpu::prelude::*;

/// Number of segments (and invocations of [`scan_segment()`] and
/// [`merge()`]) needed for `len` elements.
pub fn segments(len: usize) -> u32 {
    div_round_up(len as u32, SEGMENT_SIZE)
}

/// Stage one: inclusive scan of segment `global_id.x`.
pub fn scan_segment(global_id: UVec3, data: &mut [u32]) {
    let Some(segment) = segment_range(global_id.x, data.len()) else {
        return;
    };

    let mut acc = 0u32;

    for value in &mut data[segment] {
        acc = acc.wrapping_add(*value);
        *value = acc;
    }
}

/// Stage two: inclusive scan of the segment totals; single invocation.
pub fn scan_segment_sums(global_id: UVec3, data: &[u32], sums: &mut [u32]) {
    if global_id.x != 0 {
        return;
    }

    let mut acc = 0u32;

    for segment in 0..segments(data.len()) {
        if let Some(range) = segment_range(segment, data.len()) {
            acc = acc.wrapping_add(data[range.end - 1]);
            sums[segment as usize] = acc;
        }
    }
}

/// Stage three: adds the total of all preceding segments to every element
/// of segment `global_id.x`.
pub fn merge(global_id: UVec3, data: &mut [u32], sums: &[u32]) {
    let segment = global_id.x;

    if segment == 0 {
        return;
    }

    let Some(range) = segment_range(segment, data.len()) else {
        return;
    };

    let carry = sums[segment as usize - 1];

    for value in &mut data[range] {
        *value = value.wrapping_add(carry);
    }
}

fn segment_range(segment: u32, len: usize) -> Option<core::ops::Range<usize>> {
    let start = segment as usize * SEGMENT_SIZE as usize;

    if start >= len {
        return None;
    }

    Some(start..(start + SEGMENT_SIZE as usize).min(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(data: &mut [u32]) {
        let segments = segments(data.len());
        let mut sums = vec![0; SEGMENT_SIZE as usize];

        for s in 0..segments {
            scan_segment(uvec3(s, 0, 0), data);
        }

        scan_segment_sums(UVec3::ZERO, data, &mut sums);

        for s in 0..segments {
            merge(uvec3(s, 0, 0), data, &sums);
        }
    }

    #[test]
    fn matches_serial_scan() {
        for len in [0, 1, 1023, 1024, 1025, 4097, MAX_SURFEL_CELLS as usize] {
            let input: Vec<u32> = (0..len as u32)
                .map(|i| i.wrapping_mul(2654435761) >> 29)
                .collect();

            let expected: Vec<u32> = input
                .iter()
                .scan(0u32, |acc, &v| {
                    *acc += v;
                    Some(*acc)
                })
                .collect();

            let mut actual = input.clone();

            scan(&mut actual);

            assert_eq!(expected, actual, "len = {len}");
        }
    }

    #[test]
    fn segment_boundaries() {
        assert_eq!(0, segments(0));
        assert_eq!(1, segments(1));
        assert_eq!(1, segments(1024));
        assert_eq!(2, segments(1025));
        assert_eq!(1024, segments(1024 * 1024));
    }
}
