//! Columnar accumulators. The lane-based implementations process 8 (32-bit)
//! or 4 (64-bit) elements per step with a scalar tail, matching the scalar
//! reference exactly; integer sums wrap. An AVX2 path is available behind
//! the `simd` feature and a runtime capability check.

/// Scalar reference: wrapping sum of `i32`.
pub fn sum_i32_scalar(values: &[i32]) -> i32 {
    values.iter().fold(0i32, |acc, v| acc.wrapping_add(*v))
}

/// Scalar reference: wrapping sum of `i64`.
pub fn sum_i64_scalar(values: &[i64]) -> i64 {
    values.iter().fold(0i64, |acc, v| acc.wrapping_add(*v))
}

/// 8-lane wrapping sum of `i32`.
pub fn sum_i32(values: &[i32]) -> i32 {
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    if std::arch::is_x86_feature_detected!("avx2") {
        // Safety: the AVX2 capability was just checked.
        return unsafe { avx2::sum_i32(values) };
    }
    let mut lanes = [0i32; 8];
    let mut blocks = values.chunks_exact(8);
    for block in &mut blocks {
        for (lane, v) in lanes.iter_mut().zip(block) {
            *lane = lane.wrapping_add(*v);
        }
    }
    let mut acc = lanes.iter().fold(0i32, |a, v| a.wrapping_add(*v));
    for v in blocks.remainder() {
        acc = acc.wrapping_add(*v);
    }
    acc
}

/// 4-lane wrapping sum of `i64`.
pub fn sum_i64(values: &[i64]) -> i64 {
    let mut lanes = [0i64; 4];
    let mut blocks = values.chunks_exact(4);
    for block in &mut blocks {
        for (lane, v) in lanes.iter_mut().zip(block) {
            *lane = lane.wrapping_add(*v);
        }
    }
    let mut acc = lanes.iter().fold(0i64, |a, v| a.wrapping_add(*v));
    for v in blocks.remainder() {
        acc = acc.wrapping_add(*v);
    }
    acc
}

/// Float sums stay sequential so results do not depend on lane order.
pub fn sum_f32(values: &[f32]) -> f32 {
    values.iter().sum()
}

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
mod avx2 {
    use std::arch::x86_64::*;

    #[target_feature(enable = "avx2")]
    pub unsafe fn sum_i32(values: &[i32]) -> i32 {
        let mut acc = _mm256_setzero_si256();
        let mut blocks = values.chunks_exact(8);
        for block in &mut blocks {
            let v = _mm256_loadu_si256(block.as_ptr() as *const __m256i);
            acc = _mm256_add_epi32(acc, v);
        }
        let mut lanes = [0i32; 8];
        _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, acc);
        let mut total = lanes.iter().fold(0i32, |a, v| a.wrapping_add(*v));
        for v in blocks.remainder() {
            total = total.wrapping_add(*v);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lane_sum_matches_scalar_on_tails() {
        for len in 0..40usize {
            let values: Vec<i32> = (0..len as i32).map(|v| v * 3 - 7).collect();
            assert_eq!(sum_i32(&values), sum_i32_scalar(&values), "len={len}");
        }
    }

    #[test]
    fn integer_sum_wraps() {
        let values = vec![i32::MAX, 1];
        assert_eq!(sum_i32(&values), i32::MIN);
        let values = vec![i64::MAX, 2];
        assert_eq!(sum_i64(&values), i64::MIN + 1);
    }

    proptest! {
        #[test]
        fn i32_lane_equals_scalar(values in prop::collection::vec(any::<i32>(), 0..200)) {
            prop_assert_eq!(sum_i32(&values), sum_i32_scalar(&values));
        }

        #[test]
        fn i64_lane_equals_scalar(values in prop::collection::vec(any::<i64>(), 0..100)) {
            prop_assert_eq!(sum_i64(&values), sum_i64_scalar(&values));
        }
    }
}
