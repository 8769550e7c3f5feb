// Shared plumbing for the similarity tools: lexing the mask-bits argument, table
// number formatting, the report pipelines behind the estimator and overlap
// binaries, and the block-aligned gzip driver.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use pack::{fileutils, ChunkCode, ChunkLocations, DedupAccumulator, PackChunking};
use regex::Regex;
use tracing::warn;

// Files outside this size range are not analyzed: tiny files chunk into almost
// nothing and huge ones would dominate every total.
pub const MIN_FILE_SIZE: u64 = 1_000;
pub const MAX_FILE_SIZE: u64 = 4_000_000_000;

// Parse the mask-bits argument: a single value like "8" or an inclusive range like
// "8-9". Returns None when the argument does not parse or leaves the legal range.
pub fn parse_mask_bits_range(arg: &str) -> Option<(u32, u32)> {
    let re = Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap();
    let caps = re.captures(arg)?;

    let lo: u32 = caps.get(1)?.as_str().parse().ok()?;
    let hi: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => lo,
    };
    if lo < pack::MIN_MASK_BITS || hi > pack::MAX_MASK_BITS || hi < lo {
        return None;
    }
    Some((lo, hi))
}

// Format a count with thousands separators so the report columns stay readable.
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// One row of the dedup estimate: a file's chunk statistics and how many of its
// bytes repeat chunks from earlier in the same file or from previous files.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub name: String,
    pub file_size: u64,
    pub chunk_count: u64,
    pub chunked_bytes: u64,
    pub self_bytes: u64,
    pub glob_bytes: u64,
}

impl FileReport {
    pub fn avg_chunk(&self) -> u64 {
        if self.chunk_count == 0 {
            0
        } else {
            self.file_size / self.chunk_count
        }
    }

    // Average over the bytes that actually went into chunks, leaving out the
    // dropped tail that the plain average silently includes.
    pub fn avg_cut(&self) -> u64 {
        if self.chunk_count == 0 {
            0
        } else {
            self.chunked_bytes / self.chunk_count
        }
    }

    pub fn dedup_ratio(&self) -> f64 {
        if self.file_size == 0 {
            0.0
        } else {
            (self.self_bytes + self.glob_bytes) as f64 * 100.0 / self.file_size as f64
        }
    }
}

// The dedup estimate for one mask-bits value: one row per processed file plus the
// totals that close the table.
#[derive(Debug, Clone)]
pub struct DedupReport {
    pub files: Vec<FileReport>,
    pub total_size: u64,
    pub total_chunks: u64,
    pub total_cut_bytes: u64,
    pub total_self_bytes: u64,
    pub total_glob_bytes: u64,
}

impl DedupReport {
    pub fn total_avg_chunk(&self) -> u64 {
        if self.total_chunks == 0 {
            0
        } else {
            self.total_size / self.total_chunks
        }
    }

    pub fn total_avg_cut(&self) -> u64 {
        if self.total_chunks == 0 {
            0
        } else {
            self.total_cut_bytes / self.total_chunks
        }
    }

    pub fn total_dedup_ratio(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.total_self_bytes + self.total_glob_bytes) as f64 * 100.0 / self.total_size as f64
        }
    }
}

// Run the estimator pipeline for one mask-bits value: chunk every file in the
// given order through the shared read block and classify its chunks against all
// the files before it. The order is part of the result, because the first file to
// contain a chunk claims it. Files that cannot be read are skipped with a warning
// and leave no row.
pub fn estimate_dedup(chunking: &PackChunking, files: &[PathBuf], block: &mut [u8]) -> DedupReport {
    let mut accumulator = DedupAccumulator::new();
    let mut reports = Vec::new();
    let mut total_cut_bytes = 0u64;

    for file in files {
        let chunks = match chunking.file_chunks(file, block, false) {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!("skipping {}: {}", file.display(), err);
                continue;
            }
        };
        let file_size = match fileutils::file_size(file) {
            Ok(size) => size,
            Err(err) => {
                warn!("cannot stat {}: {}", file.display(), err);
                0
            }
        };

        let dedup = accumulator.add_file(file_size, &chunks);
        let chunked_bytes: u64 = chunks.iter().map(|code| code.length() as u64).sum();
        total_cut_bytes += chunked_bytes;

        reports.push(FileReport {
            name: file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_size,
            chunk_count: chunks.len() as u64,
            chunked_bytes,
            self_bytes: dedup.self_bytes,
            glob_bytes: dedup.glob_bytes,
        });
    }

    DedupReport {
        files: reports,
        total_size: accumulator.total_size(),
        total_chunks: accumulator.total_chunks(),
        total_cut_bytes,
        total_self_bytes: accumulator.total_self_bytes(),
        total_glob_bytes: accumulator.total_glob_bytes(),
    }
}

// One row of the overlap analysis, together with the file's chunk list so the
// caller can ask the index for the overlapping locations afterwards.
#[derive(Debug, Clone)]
pub struct OverlapReport {
    pub name: String,
    pub file_size: u64,
    pub new_chunks: u64,
    pub overlap_bytes: u64,
    pub chunks: Vec<ChunkCode>,
}

impl OverlapReport {
    pub fn chunk_count(&self) -> u64 {
        self.chunks.len() as u64
    }

    pub fn avg_chunk(&self) -> u64 {
        if self.chunks.is_empty() {
            0
        } else {
            self.file_size / self.chunks.len() as u64
        }
    }

    pub fn overlap_ratio(&self) -> f64 {
        if self.file_size == 0 {
            0.0
        } else {
            self.overlap_bytes as f64 * 100.0 / self.file_size as f64
        }
    }
}

// Run one file through the overlap pipeline: chunk it, measure how many of its
// bytes the index has already seen in earlier files, then record it in the index.
// Returns None, with a warning, when the file cannot be read.
pub fn analyze_file_overlap(
    chunking: &PackChunking,
    index: &mut ChunkLocations,
    file: &Path,
    block: &mut [u8],
) -> Option<OverlapReport> {
    let chunks = match chunking.file_chunks(file, block, false) {
        Ok(chunks) => chunks,
        Err(err) => {
            warn!("skipping {}: {}", file.display(), err);
            return None;
        }
    };
    let file_size = match fileutils::file_size(file) {
        Ok(size) => size,
        Err(err) => {
            warn!("cannot stat {}: {}", file.display(), err);
            0
        }
    };

    let overlap_bytes = index.overlap_size(&chunks);
    let new_chunks = index.add_file(file, &chunks) as u64;

    Some(OverlapReport {
        name: file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size,
        new_chunks,
        overlap_bytes,
        chunks,
    })
}

// Compress a whole buffer into a gzip stream whose deflate blocks align with the
// PACK chunk boundaries. Flushing after each chunk terminates the current deflate
// block, so two inputs sharing chunks produce identical compressed blocks for the
// shared content. Returns the number of chunks written.
pub fn compress_pack_blocks<W: Write>(buf: &[u8], mask_bits: u32, out: W) -> Result<usize> {
    let chunking = PackChunking::new(mask_bits)?;
    let mut chunks = Vec::new();
    chunking.chunks_into(&mut chunks, buf, 0, buf.len(), true);

    let mut gz = GzEncoder::new(out, Compression::default());
    let mut offset = 0;
    for chunk in &chunks {
        gz.write_all(&buf[offset..offset + chunk.length()])?;
        // The key trick: the flush terminates the current deflate block, so the
        // next chunk starts a fresh one.
        gz.flush()?;
        offset += chunk.length();
    }
    // A remnant below the minimum chunk size is not in the chunk list but still
    // belongs in the stream, or decompression could not restore the input.
    if offset < buf.len() {
        gz.write_all(&buf[offset..])?;
    }
    gz.finish()?;

    Ok(chunks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Read;

    // Letters with spaces sprinkled in, so the compressor produces an encoded
    // stream rather than stored blocks of raw input.
    fn sample_text(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|_| {
                if rng.gen_range(0..6) == 0 {
                    b' '
                } else {
                    rng.gen_range(b'a'..=b'z')
                }
            })
            .collect()
    }

    #[test]
    fn test_parse_single_value() {
        assert_eq!(parse_mask_bits_range("6"), Some((6, 6)));
        assert_eq!(parse_mask_bits_range("15"), Some((15, 15)));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_mask_bits_range("8-9"), Some((8, 9)));
        assert_eq!(parse_mask_bits_range("6-15"), Some((6, 15)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_mask_bits_range("5"), None);
        assert_eq!(parse_mask_bits_range("16"), None);
        assert_eq!(parse_mask_bits_range("9-8"), None);
        assert_eq!(parse_mask_bits_range("8-"), None);
        assert_eq!(parse_mask_bits_range("-8"), None);
        assert_eq!(parse_mask_bits_range("eight"), None);
        assert_eq!(parse_mask_bits_range(""), None);
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(1_130_034), "1,130,034");
        assert_eq!(thousands(4_000_000_000), "4,000,000,000");
    }

    // A directory of `count` byte-identical copies named copy1..copyN, which sort
    // in creation order.
    fn corpus_dir(name: &str, content: &[u8], count: usize) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "similarity_corpus_{}_{}",
            std::process::id(),
            name
        ));
        std::fs::create_dir_all(&dir).unwrap();
        for i in 1..=count {
            std::fs::write(dir.join(format!("copy{}", i)), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_estimate_dedup_five_copies_exact_numbers() {
        // Five byte-identical copies of a 1,130,034-byte file with 6 mask bits.
        // All-zero content keeps every expected number derivable by hand: zeros
        // never anchor, so cuts are forced every 256 bytes. Each 1,000,000-byte
        // read emits 3,906 chunks and holds back 64 bytes; the final 130,098-byte
        // read emits 508 more and drops a 50-byte tail, for 4,414 identical
        // chunks per file.
        let content = vec![0u8; 1_130_034];
        let dir = corpus_dir("five_copies", &content, 5);
        let files = fileutils::list_dir_files_sorted(&dir, MIN_FILE_SIZE, MAX_FILE_SIZE).unwrap();
        assert_eq!(files.len(), 5);

        let chunking = PackChunking::new(6).unwrap();
        let mut block = vec![0u8; pack::FILE_BLOCK_LEN];
        let report = estimate_dedup(&chunking, &files, &mut block);
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(report.files.len(), 5);
        for file in &report.files {
            assert_eq!(file.file_size, 1_130_034);
            assert_eq!(file.chunk_count, 4_414);
            assert_eq!(file.chunked_bytes, 1_129_984);
            assert_eq!(file.self_bytes, 1_129_728);
            assert_eq!(file.avg_chunk(), 256);
            assert_eq!(file.avg_cut(), 256);
        }
        assert_eq!(report.files[0].glob_bytes, 0);
        for file in &report.files[1..] {
            assert_eq!(file.glob_bytes, 256);
        }

        assert_eq!(report.total_size, 5_650_170);
        assert_eq!(report.total_chunks, 22_070);
        assert_eq!(report.total_self_bytes, 5_648_640);
        assert_eq!(report.total_glob_bytes, 1_024);
        let ratio = report.total_dedup_ratio();
        assert!((ratio - 99.991).abs() < 0.001, "total ratio was {}", ratio);
    }

    #[test]
    fn test_estimate_dedup_copies_share_everything_after_the_first() {
        // The same corpus shape with content that actually anchors: the absolute
        // numbers depend on the content, but the relations between the rows do
        // not.
        let content = sample_text(300_000, 21);
        let dir = corpus_dir("identical_content", &content, 3);
        let files = fileutils::list_dir_files_sorted(&dir, MIN_FILE_SIZE, MAX_FILE_SIZE).unwrap();

        let chunking = PackChunking::new(6).unwrap();
        let mut block = vec![0u8; pack::FILE_BLOCK_LEN];
        let report = estimate_dedup(&chunking, &files, &mut block);
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(report.files.len(), 3);
        let first = &report.files[0];
        assert!(first.chunk_count > 1_000);
        assert_eq!(first.glob_bytes, 0);

        // Every later copy repeats the first one's chunks: identical counts and
        // self bytes, and global dedup on every chunked byte not already
        // self-deduped.
        for file in &report.files[1..] {
            assert_eq!(file.chunk_count, first.chunk_count);
            assert_eq!(file.chunked_bytes, first.chunked_bytes);
            assert_eq!(file.self_bytes, first.self_bytes);
            assert_eq!(file.glob_bytes, file.chunked_bytes - file.self_bytes);
        }

        assert_eq!(report.total_chunks, 3 * first.chunk_count);
        assert_eq!(report.total_self_bytes, 3 * first.self_bytes);
        assert_eq!(report.total_glob_bytes, 2 * report.files[1].glob_bytes);
        assert_eq!(report.total_size, 3 * first.file_size);
    }

    #[test]
    fn test_analyze_overlap_second_file_is_all_overlap() {
        // Two distinct files of equal content: the second overlaps the first on
        // every chunked byte and contributes nothing new to the index.
        let content = sample_text(100_000, 22);
        let dir = corpus_dir("overlap_pair", &content, 2);
        let files = fileutils::list_dir_files_sorted(&dir, MIN_FILE_SIZE, MAX_FILE_SIZE).unwrap();
        assert_eq!(files.len(), 2);

        let chunking = PackChunking::new(6).unwrap();
        let mut block = vec![0u8; pack::FILE_BLOCK_LEN];
        let mut index = ChunkLocations::new();

        let first = analyze_file_overlap(&chunking, &mut index, &files[0], &mut block).unwrap();
        let second = analyze_file_overlap(&chunking, &mut index, &files[1], &mut block).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(first.chunk_count() > 100);
        assert_eq!(first.overlap_bytes, 0);
        assert!(first.new_chunks > 0);

        let second_chunked: u64 = second.chunks.iter().map(|code| code.length() as u64).sum();
        assert_eq!(second.chunks, first.chunks);
        assert_eq!(second.overlap_bytes, second_chunked);
        assert_eq!(second.new_chunks, 0);

        // A file that cannot be read yields no row.
        assert!(analyze_file_overlap(&chunking, &mut index, Path::new("/nonexistent/overlap"), &mut block).is_none());
    }

    #[test]
    fn test_gzip_round_trips() {
        let data = sample_text(1_000_000, 7);
        let mut compressed = Vec::new();
        let chunks = compress_pack_blocks(&data, 10, &mut compressed).unwrap();
        assert!(chunks > 0);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_tiny_input_round_trips_as_one_block() {
        // Too small to chunk at all: everything travels as the trailing remnant.
        let data = sample_text(40, 8);
        let mut compressed = Vec::new();
        let chunks = compress_pack_blocks(&data, 6, &mut compressed).unwrap();
        assert_eq!(chunks, 0);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_deflate_blocks_align_with_chunks() {
        let data = sample_text(64 * 1024, 11);
        let mut compressed = Vec::new();
        let chunks = compress_pack_blocks(&data, 10, &mut compressed).unwrap();
        assert!(chunks > 0);

        // Every flush ends the current deflate block with an empty stored block,
        // visible in the stream as the 00 00 FF FF marker.
        const MARKER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];
        let markers = compressed.windows(4).filter(|w| *w == MARKER).count();
        assert_eq!(markers, chunks);
    }
}
