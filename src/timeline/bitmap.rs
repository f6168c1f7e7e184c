//! Bit-index arithmetic for the membership bitmap
//!
//! Bits live in `u32` words so the bitmap can share one buffer with the
//! slot → item map. Bit `n` is bit `n % 32` of word `n / 32`.

/// Bits per word
pub const WORD_BITS: usize = u32::BITS as usize;

/// Number of words needed to hold `bits` bits
#[inline]
pub const fn words_for(bits: usize) -> usize {
    (bits + WORD_BITS - 1) / WORD_BITS
}

/// Word index and mask of `bit`
#[inline]
pub const fn locate(bit: usize) -> (usize, u32) {
    (bit / WORD_BITS, 1u32 << (bit % WORD_BITS))
}

/// Read one bit; bits past the end read as unset
#[inline]
pub fn get(words: &[u32], bit: usize) -> bool {
    let (word, mask) = locate(bit);
    words.get(word).map(|w| w & mask != 0).unwrap_or(false)
}

/// Write one bit. Panics if `bit` is past the end of `words`.
#[inline]
pub fn set(words: &mut [u32], bit: usize, on: bool) {
    let (word, mask) = locate(bit);
    if on {
        words[word] |= mask;
    } else {
        words[word] &= !mask;
    }
}

/// Position of the first set bit at or after `from`
pub fn next_set_bit(words: &[u32], from: usize) -> Option<usize> {
    let (mut word, _) = locate(from);
    if word >= words.len() {
        return None;
    }
    // Mask off the bits below `from` in its own word
    let mut current = words[word] & (u32::MAX << (from % WORD_BITS));
    loop {
        if current != 0 {
            return Some(word * WORD_BITS + current.trailing_zeros() as usize);
        }
        word += 1;
        if word >= words.len() {
            return None;
        }
        current = words[word];
    }
}

/// Number of set bits
pub fn count_ones(words: &[u32]) -> usize {
    words.iter().map(|w| w.count_ones() as usize).sum()
}

/// Iterator over set-bit positions, ascending
#[derive(Debug, Clone)]
pub struct SetBits<'a> {
    words: &'a [u32],
    word: usize,
    current: u32,
}

impl<'a> SetBits<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            word: 0,
            current: words.first().copied().unwrap_or(0),
        }
    }
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word += 1;
            if self.word >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word];
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1; // Clear lowest bit
        Some(self.word * WORD_BITS + bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_words_for() {
        assert_eq!(words_for(0), 0);
        assert_eq!(words_for(1), 1);
        assert_eq!(words_for(32), 1);
        assert_eq!(words_for(33), 2);
    }

    #[test]
    fn test_set_get_across_word_boundary() {
        let mut words = vec![0u32; 2];
        set(&mut words, 31, true);
        set(&mut words, 32, true);
        assert_eq!(words, vec![1 << 31, 1]);
        assert!(get(&words, 31));
        assert!(get(&words, 32));
        assert!(!get(&words, 33));
        assert!(!get(&words, 500));
        set(&mut words, 31, false);
        assert_eq!(words[0], 0);
    }

    #[test]
    fn test_next_set_bit() {
        let mut words = vec![0u32; 3];
        for bit in [3, 40, 95] {
            set(&mut words, bit, true);
        }
        assert_eq!(next_set_bit(&words, 0), Some(3));
        assert_eq!(next_set_bit(&words, 3), Some(3));
        assert_eq!(next_set_bit(&words, 4), Some(40));
        assert_eq!(next_set_bit(&words, 41), Some(95));
        assert_eq!(next_set_bit(&words, 96), None);
        assert_eq!(next_set_bit(&[], 0), None);
    }

    #[test]
    fn test_set_bits_iterator() {
        let mut words = vec![0u32; 4];
        for bit in [0, 31, 64, 127] {
            set(&mut words, bit, true);
        }
        let bits: Vec<_> = SetBits::new(&words).collect();
        assert_eq!(bits, vec![0, 31, 64, 127]);
        assert_eq!(count_ones(&words), 4);
        assert_eq!(SetBits::new(&[]).count(), 0);
    }

    proptest! {
        #[test]
        fn prop_scan_matches_reference(bits in proptest::collection::btree_set(0usize..256, 0..40)) {
            let mut words = vec![0u32; words_for(256)];
            for &bit in &bits {
                set(&mut words, bit, true);
            }
            let scanned: Vec<_> = SetBits::new(&words).collect();
            let expected: Vec<_> = bits.iter().copied().collect();
            prop_assert_eq!(&scanned, &expected);

            let mut walked = Vec::new();
            let mut from = 0;
            while let Some(bit) = next_set_bit(&words, from) {
                walked.push(bit);
                from = bit + 1;
            }
            prop_assert_eq!(walked, expected);
        }
    }
}
