//! # 12-bit Word Packing
//!
//! Packs groups of four 12-bit values into three 16-bit words, LSB first:
//!
//! ```text
//! Word 0: A[0:11]  | B[0:3]
//! Word 1: B[4:11]  | C[0:7]
//! Word 2: C[8:11]  | D[0:11]
//! ```
//!
//! The same codec carries channel updates and parameter records. Callers
//! guarantee the input length is a multiple of 4 and that every value fits in
//! 12 bits; high bits are masked off rather than reported.

/// Mask for the significant bits of one value
const MASK_12BIT: u16 = 0x0FFF;

/// Input values per packed group
pub const GROUP_VALUES: usize = 4;

/// Output words per packed group
pub const GROUP_WORDS: usize = 3;

/// Largest input the cache holds (parameter body: 11 words padded to 12)
const CACHE_CAPACITY: usize = 12;

/// Packed word count for `values` input values
pub fn packed_len(values: usize) -> usize {
    values.div_ceil(GROUP_VALUES) * GROUP_WORDS
}

/// Pack 12-bit values into 16-bit words
///
/// # Arguments
///
/// * `values` - Input values, length a multiple of 4
///
/// # Returns
///
/// * `Vec<u16>` - `values.len() / 4 * 3` packed words
///
/// # Examples
///
/// ```
/// use rc_link::wire::bitpack::{pack, unpack};
///
/// let values = [1000u16, 2000, 3000, 4000];
/// let packed = pack(&values);
/// assert_eq!(packed.len(), 3);
/// assert_eq!(unpack(&packed), values.to_vec());
/// ```
pub fn pack(values: &[u16]) -> Vec<u16> {
    let mut out = vec![0u16; packed_len(values.len())];
    pack_into(values, &mut out);
    out
}

/// Pack into a caller-provided buffer, returning the number of words written
///
/// `out` must hold at least `packed_len(values.len())` words.
pub fn pack_into(values: &[u16], out: &mut [u16]) -> usize {
    let mut written = 0;
    for (group, words) in values
        .chunks_exact(GROUP_VALUES)
        .zip(out.chunks_exact_mut(GROUP_WORDS))
    {
        let a = group[0] & MASK_12BIT;
        let b = group[1] & MASK_12BIT;
        let c = group[2] & MASK_12BIT;
        let d = group[3] & MASK_12BIT;

        words[0] = a | (b << 12);
        words[1] = (b >> 4) | (c << 8);
        words[2] = (c >> 8) | (d << 4);
        written += GROUP_WORDS;
    }
    written
}

/// Unpack 16-bit words into 12-bit values
///
/// Exact inverse of [`pack`]; `words.len()` must be a multiple of 3.
pub fn unpack(words: &[u16]) -> Vec<u16> {
    let mut out = vec![0u16; words.len() / GROUP_WORDS * GROUP_VALUES];
    unpack_into(words, &mut out);
    out
}

/// Unpack into a caller-provided buffer, returning the number of values written
pub fn unpack_into(words: &[u16], out: &mut [u16]) -> usize {
    let mut written = 0;
    for (w, values) in words
        .chunks_exact(GROUP_WORDS)
        .zip(out.chunks_exact_mut(GROUP_VALUES))
    {
        values[0] = w[0] & MASK_12BIT;
        values[1] = (w[0] >> 12) | ((w[1] & 0x00FF) << 4);
        values[2] = (w[1] >> 8) | ((w[2] & 0x000F) << 8);
        values[3] = w[2] >> 4;
        written += GROUP_VALUES;
    }
    written
}

/// Packed output cached behind a dirty flag
///
/// The producer calls [`PackCache::load`]; the flag is raised only when the
/// input differs from what was last packed, and [`PackCache::packed`] clears
/// it after repacking. Unchanged input costs a comparison, not a repack.
#[derive(Debug, Clone)]
pub struct PackCache {
    source: [u16; CACHE_CAPACITY],
    source_len: usize,
    packed: [u16; CACHE_CAPACITY],
    packed_len: usize,
    dirty: bool,
    repacks: u64,
}

impl Default for PackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PackCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self {
            source: [0; CACHE_CAPACITY],
            source_len: 0,
            packed: [0; CACHE_CAPACITY],
            packed_len: 0,
            dirty: false,
            repacks: 0,
        }
    }

    /// Load new input, zero-padded up to a multiple of 4
    ///
    /// Input longer than 12 values is truncated.
    pub fn load(&mut self, values: &[u16]) {
        let len = values.len().min(CACHE_CAPACITY);
        let padded = len.div_ceil(GROUP_VALUES) * GROUP_VALUES;

        let mut next = [0u16; CACHE_CAPACITY];
        for (dst, &src) in next.iter_mut().zip(&values[..len]) {
            *dst = src & MASK_12BIT;
        }

        if padded != self.source_len || next[..padded] != self.source[..padded] {
            self.source = next;
            self.source_len = padded;
            self.dirty = true;
        }
    }

    /// Whether new input awaits packing
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Packed words for the loaded input
    pub fn packed(&mut self) -> &[u16] {
        if self.dirty {
            self.packed_len = pack_into(&self.source[..self.source_len], &mut self.packed);
            self.dirty = false;
            self.repacks += 1;
        }
        &self.packed[..self.packed_len]
    }

    /// Number of times the cache actually repacked
    pub fn repacks(&self) -> u64 {
        self.repacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_length() {
        assert_eq!(pack(&[0u16; 4]).len(), 3);
        assert_eq!(pack(&[0u16; 8]).len(), 6);
        assert_eq!(pack(&[0u16; 12]).len(), 9);
        assert!(pack(&[]).is_empty());
    }

    #[test]
    fn test_packed_len_rounds_up_per_group() {
        assert_eq!(packed_len(0), 0);
        assert_eq!(packed_len(1), 3);
        assert_eq!(packed_len(4), 3);
        assert_eq!(packed_len(5), 6);
        assert_eq!(packed_len(8), 6);
        assert_eq!(packed_len(11), 9);
    }

    #[test]
    fn test_pack_all_max() {
        // 4 × 12 bits of ones fill 3 words completely
        assert_eq!(pack(&[0x0FFF; 4]), vec![0xFFFF; 3]);
    }

    #[test]
    fn test_pack_bit_layout() {
        let packed = pack(&[0x0ABC, 0x0DEF, 0x0123, 0x0456]);
        assert_eq!(packed[0], 0xFABC); // A | B[0:3] << 12
        assert_eq!(packed[1], 0x23DE); // B[4:11] | C[0:7] << 8
        assert_eq!(packed[2], 0x4561); // C[8:11] | D << 4
    }

    #[test]
    fn test_pack_masks_high_bits() {
        let packed = pack(&[0xF001, 0, 0, 0]);
        assert_eq!(unpack(&packed), vec![0x0001, 0, 0, 0]);
    }

    #[test]
    fn test_round_trip_boundaries() {
        let cases: [[u16; 8]; 4] = [
            [0; 8],
            [4095; 8],
            [0, 4095, 0, 4095, 4095, 0, 4095, 0],
            [1, 2048, 1500, 1000, 2000, 3, 4094, 777],
        ];
        for values in cases {
            assert_eq!(unpack(&pack(&values)), values.to_vec(), "values {:?}", values);
        }
    }

    #[test]
    fn test_round_trip_sweep() {
        // Every value in range passes through each of the four group slots
        let values: Vec<u16> = (0..=4095u16).collect();
        assert_eq!(unpack(&pack(&values)), values);

        let shifted: Vec<u16> = (0..4096u16).map(|v| (v * 7 + 3) & 0x0FFF).collect();
        assert_eq!(unpack(&pack(&shifted)), shifted);
    }

    #[test]
    fn test_cache_skips_repack_when_clean() {
        let mut cache = PackCache::new();
        cache.load(&[1, 2, 3, 4]);
        assert!(cache.is_dirty());
        let first = cache.packed().to_vec();
        assert!(!cache.is_dirty());
        assert_eq!(cache.repacks(), 1);

        cache.load(&[1, 2, 3, 4]);
        assert!(!cache.is_dirty());
        assert_eq!(cache.packed(), &first[..]);
        assert_eq!(cache.repacks(), 1);

        cache.load(&[1, 2, 3, 5]);
        assert!(cache.is_dirty());
        cache.packed();
        assert_eq!(cache.repacks(), 2);
    }

    #[test]
    fn test_cache_pads_to_group() {
        let mut cache = PackCache::new();
        cache.load(&[100, 200, 300, 400, 500]);
        let packed = cache.packed().to_vec();
        assert_eq!(packed.len(), 6);
        assert_eq!(unpack(&packed), vec![100, 200, 300, 400, 500, 0, 0, 0]);
    }

    #[test]
    fn test_cache_length_change_is_dirty() {
        let mut cache = PackCache::new();
        cache.load(&[7, 0, 0, 0]);
        cache.packed();
        // Same leading values, one more group
        cache.load(&[7, 0, 0, 0, 0]);
        assert!(cache.is_dirty());
        assert_eq!(cache.packed().len(), 6);
    }
}
