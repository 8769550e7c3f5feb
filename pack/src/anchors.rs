// The anchor detector holds its entire 48-byte sliding window inside a single 64-bit
// value: each inserted byte shifts the value left by one bit and XORs in at the
// bottom, so after 48 inserts every window byte still contributes at least one bit.
// An offset is an anchor when the value agrees with the mask on all of the mask's
// bits. The masks only test bit positions 7 through 55: the bottom 7 bits have not
// yet accumulated a whole byte and the top bits belong to bytes already leaving the
// window.

// Bytes covered by the sliding window.
pub const WINDOW_LEN: usize = 48;

// Legal range for the number of mask bits. More bits means rarer anchors and larger
// chunks: the chance of an anchor at any one offset is 1 in 2^mask_bits.
pub const MIN_MASK_BITS: u32 = 6;
pub const MAX_MASK_BITS: u32 = 15;

// One pre-selected mask per mask-bits value, 6 through 15. These constants are part
// of the chunk namespace: changing a single bit moves every anchor, so they are
// embedded verbatim rather than derived.
const MASK_TABLE: [u64; 10] = [
    0x0000001010482080, // 6
    0x0000081010482080, // 7
    0x0000821010482080, // 8
    0x0000821110482080, // 9
    0x0000823110482080, // 10
    0x00008A3110482080, // 11
    0x00008A3110483080, // 12
    0x00008A3110583080, // 13
    0x00008A3110583280, // 14
    0x00008A3114583280, // 15
];

pub(crate) fn mask_value(mask_bits: u32) -> Option<u64> {
    if (MIN_MASK_BITS..=MAX_MASK_BITS).contains(&mask_bits) {
        Some(MASK_TABLE[(mask_bits - MIN_MASK_BITS) as usize])
    } else {
        None
    }
}

// Lazily yields the anchor offsets of a scan range in increasing order. The offset
// reported for a match is the position of the oldest byte in the window, which is
// where the next chunk would begin. The last 48 offsets of the range can never be
// anchors because the window would reach past the range's end.
pub struct Anchors<'a> {
    buf: &'a [u8],
    mask: u64,
    hash: u64,
    pos: usize,
    end: usize,
}

impl<'a> Anchors<'a> {
    pub(crate) fn new(buf: &'a [u8], start: usize, end: usize, mask: u64) -> Anchors<'a> {
        // A range that does not fit the buffer or is shorter than the window cannot
        // contain an anchor.
        if end > buf.len() || start > end || end - start < WINDOW_LEN {
            return Anchors {
                buf,
                mask,
                hash: 0,
                pos: 0,
                end: 0,
            };
        }

        // Warm-up: the window is not full until 48 bytes went in.
        let mut hash = 0u64;
        for &b in &buf[start..start + WINDOW_LEN] {
            hash = (hash << 1) ^ u64::from(b);
        }

        Anchors {
            buf,
            mask,
            hash,
            pos: start + WINDOW_LEN,
            end,
        }
    }
}

impl Iterator for Anchors<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        // The hash is tested before each insert, so the window under test always
        // ends right before `pos`.
        while self.pos < self.end {
            let hit = self.hash & self.mask == self.mask;
            let at = self.pos - WINDOW_LEN;
            self.hash = (self.hash << 1) ^ u64::from(self.buf[self.pos]);
            self.pos += 1;
            if hit {
                return Some(at);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill_bytes(&mut data);
        data
    }

    #[test]
    fn test_mask_table_shape() {
        // Each mask must have exactly `mask_bits` bits set, all of them between bit
        // 7 and bit 55 so that only full window bytes take part in the comparison.
        let envelope: u64 = ((1 << 56) - 1) & !((1 << 7) - 1);
        for bits in MIN_MASK_BITS..=MAX_MASK_BITS {
            let mask = mask_value(bits).unwrap();
            assert_eq!(mask.count_ones(), bits, "mask for {} bits", bits);
            assert_eq!(mask & !envelope, 0, "mask for {} bits leaves the envelope", bits);
        }
        assert_eq!(mask_value(5), None);
        assert_eq!(mask_value(16), None);
    }

    #[test]
    fn test_short_range_has_no_anchors() {
        let data = random_bytes(47, 1);
        let mask = mask_value(6).unwrap();
        assert_eq!(Anchors::new(&data, 0, data.len(), mask).count(), 0);

        // A range reaching past the buffer is rejected outright.
        assert_eq!(Anchors::new(&data, 0, data.len() + 1, mask).count(), 0);
    }

    #[test]
    fn test_constant_input_has_no_anchors() {
        // All-zero input keeps the hash at zero forever, and a zero hash can never
        // agree with a non-empty mask.
        let data = vec![0u8; 4096];
        for bits in MIN_MASK_BITS..=MAX_MASK_BITS {
            let mask = mask_value(bits).unwrap();
            assert_eq!(Anchors::new(&data, 0, data.len(), mask).count(), 0);
        }
    }

    #[test]
    fn test_anchors_are_deterministic() {
        let data = random_bytes(256 * 1024, 2);
        let mask = mask_value(8).unwrap();

        let first: Vec<usize> = Anchors::new(&data, 0, data.len(), mask).collect();
        let second: Vec<usize> = Anchors::new(&data, 0, data.len(), mask).collect();
        assert!(!first.is_empty(), "expected anchors in 256 KiB of random data");
        assert_eq!(first, second);

        // Anchors are in increasing order and never within the final window.
        for pair in first.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(*first.last().unwrap() + WINDOW_LEN < data.len());
    }

    #[test]
    fn test_appending_preserves_prefix_anchors() {
        // Growing the buffer may add anchors near the old end but must never remove
        // or move the ones already found.
        let data = random_bytes(64 * 1024, 3);
        let mask = mask_value(6).unwrap();

        let full: Vec<usize> = Anchors::new(&data, 0, data.len(), mask).collect();
        let half: Vec<usize> = Anchors::new(&data[..data.len() / 2], 0, data.len() / 2, mask).collect();
        assert!(!half.is_empty());
        assert_eq!(half[..], full[..half.len()]);
    }

    #[test]
    fn test_denser_mask_finds_fewer_anchors() {
        let data = random_bytes(512 * 1024, 4);
        let sparse = Anchors::new(&data, 0, data.len(), mask_value(6).unwrap()).count();
        let dense = Anchors::new(&data, 0, data.len(), mask_value(12).unwrap()).count();
        assert!(
            sparse > dense,
            "6-bit mask found {} anchors, 12-bit mask found {}",
            sparse,
            dense
        );
    }
}
