use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Raised at construction only; a chunker with an illegal mask can never exist,
    // so it can never emit an anchor either.
    #[error("mask bits must be between 6 and 15, got {0}")]
    InvalidMaskBits(u32),

    #[error("read block of {block} bytes is too small to fit a maximum chunk of {max_chunk} bytes plus the hash window")]
    BlockTooSmall { block: usize, max_chunk: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
