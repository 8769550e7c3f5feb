use std::path::Path;

use crate::anchors::{mask_value, Anchors, WINDOW_LEN};
use crate::code::ChunkCode;
use crate::error::Error;
use crate::fileutils;
use crate::{fingerprint64, Fingerprint};

// Chunk size bounds derived from the number of mask bits. The minimum filters away
// pathologically short chunks that would blow up the code tables; the maximum bounds
// the worst case and guarantees progress across long anchor-free stretches.
const MIN_CHUNK_DIVIDER: usize = 4;
const MAX_CHUNK_FACTOR: usize = 4;

// Default read block for whole-file chunking. Big enough to hold several maximum
// chunks for every legal mask-bits value.
pub const FILE_BLOCK_LEN: usize = 1_000_000;

// A PACK chunker for one specific number of mask bits. All derived sizes are
// computed once here; the instance itself is immutable and cheap to share.
#[derive(Debug, Clone)]
pub struct PackChunking {
    mask_bits: u32,
    mask_value: u64,
    min_chunk: usize,
    max_chunk: usize,
    avg_chunk: usize,
    fingerprint: Fingerprint,
}

// One chunk inside a scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl PackChunking {
    pub fn new(mask_bits: u32) -> Result<PackChunking, Error> {
        let mask_value = mask_value(mask_bits).ok_or(Error::InvalidMaskBits(mask_bits))?;
        let base = 1usize << mask_bits;
        Ok(PackChunking {
            mask_bits,
            mask_value,
            min_chunk: base / MIN_CHUNK_DIVIDER,
            max_chunk: base * MAX_CHUNK_FACTOR,
            avg_chunk: base + base / MIN_CHUNK_DIVIDER,
            fingerprint: Fingerprint::default(),
        })
    }

    // Select the digest that names the chunks. SHA-1 is the default; MD5 is the
    // faster alternative. Must not change within a run.
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> PackChunking {
        self.fingerprint = fingerprint;
        self
    }

    pub fn mask_bits(&self) -> u32 {
        self.mask_bits
    }

    pub fn min_chunk_size(&self) -> usize {
        self.min_chunk
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk
    }

    // Not the exact average, because the cut-off at the maximum also pulls on the
    // real mean, but close enough while the maximum stays high.
    pub fn avg_chunk_size(&self) -> usize {
        self.avg_chunk
    }

    // Anchors expected in a buffer of the given size if no chunk size limits
    // applied. The last 47 offsets cannot host an anchor, hence the correction.
    pub fn expected_anchor_count(&self, buffer_len: usize) -> usize {
        if buffer_len < WINDOW_LEN {
            return 0;
        }
        (buffer_len - WINDOW_LEN + 1) / (1usize << self.mask_bits)
    }

    // Chunks expected in a buffer of the given size with the minimum applied but
    // no maximum.
    pub fn expected_chunk_count(&self, buffer_len: usize) -> usize {
        if buffer_len < WINDOW_LEN {
            return 0;
        }
        (buffer_len - WINDOW_LEN + 1) / self.avg_chunk
    }

    // Scan a range of the buffer for anchors, without any chunk size limits.
    pub fn anchors<'a>(&self, buf: &'a [u8], start: usize, end: usize) -> Anchors<'a> {
        Anchors::new(buf, start, end, self.mask_value)
    }

    pub fn anchor_count(&self, buf: &[u8], start: usize, end: usize) -> usize {
        self.anchors(buf, start, end).count()
    }

    // Cut a range of the buffer into chunk spans. The range is assumed to begin at
    // a chunk boundary. With `emit_tail` false a trailing chunk shorter than the
    // maximum is withheld so it can be re-cut when more data arrives; with
    // `emit_tail` true only a tail below the minimum is withheld.
    pub fn spans<'a>(&self, buf: &'a [u8], start: usize, end: usize, emit_tail: bool) -> ChunkSpans<'a> {
        ChunkSpans::new(self, buf, start, end, emit_tail)
    }

    // Cut a range of the buffer and append the resulting chunk codes to `out`.
    // Returns the offset right after the last emitted chunk, which is where
    // processing of further data should resume.
    pub fn chunks_into(
        &self,
        out: &mut Vec<ChunkCode>,
        buf: &[u8],
        start: usize,
        end: usize,
        emit_tail: bool,
    ) -> usize {
        let mut spans = self.spans(buf, start, end, emit_tail);
        for span in &mut spans {
            let digest = fingerprint64(self.fingerprint, &buf[span.start..span.start + span.len]);
            out.push(ChunkCode::pack(digest, span.len));
        }
        spans.resume_offset()
    }

    // Chunk a whole file, streaming it through the caller's read block so only one
    // block of the file is ever in memory. The block is borrowed rather than owned
    // so callers can reuse a single allocation across many files.
    //
    // With `emit_tail` false the final sub-maximum tail of the file is dropped,
    // which keeps chunk boundaries independent of where the file ends. Pass true
    // when every byte has to be represented.
    pub fn file_chunks(
        &self,
        path: &Path,
        block: &mut [u8],
        emit_tail: bool,
    ) -> Result<Vec<ChunkCode>, Error> {
        // Every read must be able to hold at least one maximum chunk and a warm
        // window behind it, otherwise the cut loop cannot make progress.
        if block.len() < self.max_chunk + WINDOW_LEN {
            return Err(Error::BlockTooSmall {
                block: block.len(),
                max_chunk: self.max_chunk,
            });
        }

        let mut codes = Vec::new();
        let mut offset = 0u64;
        loop {
            let read = fileutils::read_block(path, offset, block)?;
            if read == 0 {
                break;
            }

            let next = self.chunks_into(&mut codes, block, 0, read, false);

            if read < block.len() {
                // End of file. The remainder past the last cut is dropped unless
                // the caller asked for the tail.
                if emit_tail {
                    self.chunks_into(&mut codes, block, next, read, true);
                }
                break;
            }

            offset += next as u64;
        }

        Ok(codes)
    }
}

// Applies the chunk cutting rules to an anchor stream: anchors closer than the
// minimum to the previous cut are skipped, a gap longer than the maximum forces a
// cut at exactly the maximum, and the end of the range is handled according to the
// tail policy. Once the iterator is exhausted, `resume_offset` tells where the next
// scan should pick up.
pub struct ChunkSpans<'a> {
    anchors: Anchors<'a>,
    next_anchor: Option<usize>,
    prev: usize,
    end: usize,
    min_chunk: usize,
    max_chunk: usize,
    emit_tail: bool,
    done: bool,
}

impl<'a> ChunkSpans<'a> {
    fn new(
        chunking: &PackChunking,
        buf: &'a [u8],
        start: usize,
        end: usize,
        emit_tail: bool,
    ) -> ChunkSpans<'a> {
        // A range shorter than the window yields nothing at all, not even a forced
        // tail; the resume offset stays at the range start.
        let valid = end <= buf.len() && start <= end && end - start >= WINDOW_LEN;
        let mut anchors = chunking.anchors(buf, start, end);
        let next_anchor = if valid { anchors.next() } else { None };
        ChunkSpans {
            anchors,
            next_anchor,
            prev: start,
            end,
            min_chunk: chunking.min_chunk,
            max_chunk: chunking.max_chunk,
            emit_tail,
            done: !valid,
        }
    }

    // Offset right after the last emitted chunk. Bytes from here to the end of the
    // range were not covered and must be re-presented together with any further
    // data. Meaningful once the iterator has returned None.
    pub fn resume_offset(&self) -> usize {
        self.prev
    }
}

impl Iterator for ChunkSpans<'_> {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.done {
            return None;
        }
        loop {
            match self.next_anchor {
                // The next anchor is in reach: either cut there or skip it.
                Some(anchor) if anchor <= self.prev + self.max_chunk => {
                    // Anchors closer than the minimum are discarded. This also
                    // drops anchors left behind by a forced cut.
                    if anchor < self.prev + self.min_chunk {
                        self.next_anchor = self.anchors.next();
                        continue;
                    }
                    let span = Span {
                        start: self.prev,
                        len: anchor - self.prev,
                    };
                    self.prev = anchor;
                    self.next_anchor = self.anchors.next();
                    return Some(span);
                }
                // No anchor in reach: cut at the maximum length or at the end of
                // the range.
                _ => {
                    let cut = (self.prev + self.max_chunk).min(self.end);
                    let len = cut - self.prev;
                    // A trailing remnant below the minimum is never emitted.
                    if len < self.min_chunk {
                        self.done = true;
                        return None;
                    }
                    // A short tail is left for the next read unless this range is
                    // the end of the stream.
                    if len < self.max_chunk && !self.emit_tail {
                        self.done = true;
                        return None;
                    }
                    self.prev = cut;
                    return Some(Span {
                        start: cut - len,
                        len,
                    });
                }
            }
        }
    }
}
