//! Portable versions of the GPU bit intrinsics the compressed traversal is
//! written against.

/// Index of the most significant set bit. Undefined for zero, which callers
/// never pass.
#[inline]
pub fn find_msb(x: u32) -> u32 {
    31 - x.leading_zeros()
}

#[inline]
pub fn popc(x: u32) -> u32 {
    x.count_ones()
}

/// Byte `i` (0 = least significant) of `x`.
#[inline]
pub fn extract_byte(x: u32, i: u32) -> u32 {
    (x >> (i * 8)) & 0xff
}

/// Replicates the sign bit of every byte across that byte.
#[inline]
pub fn sign_extend_s8x4(x: u32) -> u32 {
    let mut r = 0;
    for i in 0..4 {
        if (x >> (i * 8 + 7)) & 1 != 0 {
            r |= 0xff << (i * 8);
        }
    }
    r
}
