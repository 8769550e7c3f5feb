//! PACK content-defined chunking.
//!
//! The sliding window lives in a single 64-bit value: every inserted byte shifts the
//! value left by one bit and XORs in at the bottom, and the value is compared against
//! a pre-selected mask whose bits are spread so that each of the 48 window bytes takes
//! part in the comparison. Offsets where the masked value equals the mask are anchors,
//! and anchors cut a stream into chunks whose boundaries move with the content, so
//! equal data found at different offsets still produces equal chunks. Each chunk is
//! then named by a 64-bit code combining its length with a truncated cryptographic
//! digest, and those codes are all the dedup and overlap reports ever compare.

pub mod anchors;
pub mod chunker;
pub mod code;
pub mod dedup;
pub mod error;
pub mod fileutils;
pub mod index;

pub use anchors::{Anchors, MAX_MASK_BITS, MIN_MASK_BITS, WINDOW_LEN};
pub use chunker::{ChunkSpans, PackChunking, Span, FILE_BLOCK_LEN};
pub use code::ChunkCode;
pub use dedup::{DedupAccumulator, FileDedup};
pub use error::Error;
pub use index::ChunkLocations;

use md5::Md5;
use sha1::{Digest, Sha1};

// Which digest names the chunks. The choice is fixed when the chunker is built;
// changing it between runs renames every chunk, so two runs with different
// algorithms share nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fingerprint {
    #[default]
    Sha1,
    Md5,
}

// Hash a chunk's bytes and keep the 64 least significant bits of the digest,
// assembled from the first eight digest bytes. Only 45 of those bits survive into
// the chunk code.
pub fn fingerprint64(fingerprint: Fingerprint, data: &[u8]) -> u64 {
    let mut low = [0u8; 8];
    match fingerprint {
        Fingerprint::Sha1 => low.copy_from_slice(&Sha1::digest(data)[..8]),
        Fingerprint::Md5 => low.copy_from_slice(&Md5::digest(data)[..8]),
    }
    u64::from_le_bytes(low)
}
