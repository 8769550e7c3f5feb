use std::collections::HashSet;

use crate::code::ChunkCode;

// What one file contributed to the dedup estimate. Self bytes belong to chunks seen
// earlier in the same file; global bytes belong to chunks whose first occurrence in
// this file was already known from a previous file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileDedup {
    pub self_bytes: u64,
    pub glob_bytes: u64,
}

impl FileDedup {
    pub fn dedup_bytes(&self) -> u64 {
        self.self_bytes + self.glob_bytes
    }
}

// Running cross-file dedup accounting. Files have to be fed in a fixed order: the
// first file that contains a chunk claims it and contributes nothing to the global
// count, so reordering the files changes every report line after the first.
#[derive(Debug, Default)]
pub struct DedupAccumulator {
    global: HashSet<ChunkCode>,
    total_size: u64,
    total_chunks: u64,
    total_self: u64,
    total_glob: u64,
}

impl DedupAccumulator {
    pub fn new() -> DedupAccumulator {
        DedupAccumulator::default()
    }

    // Classify one file's chunks against the files seen so far and fold the file
    // into the running totals. A repeat within the file counts as self dedup even
    // when the chunk is also known globally; only the first occurrence in the file
    // can count as global dedup.
    pub fn add_file(&mut self, file_size: u64, chunks: &[ChunkCode]) -> FileDedup {
        let mut seen_in_file = HashSet::new();
        let mut dedup = FileDedup::default();

        for &code in chunks {
            let len = code.length() as u64;
            if !seen_in_file.insert(code) {
                dedup.self_bytes += len;
                continue;
            }
            if self.global.contains(&code) {
                dedup.glob_bytes += len;
            }
        }

        self.global.extend(seen_in_file);
        self.total_size += file_size;
        self.total_chunks += chunks.len() as u64;
        self.total_self += dedup.self_bytes;
        self.total_glob += dedup.glob_bytes;
        dedup
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn total_self_bytes(&self) -> u64 {
        self.total_self
    }

    pub fn total_glob_bytes(&self) -> u64 {
        self.total_glob
    }

    // Distinct chunks across all files so far.
    pub fn distinct_chunks(&self) -> usize {
        self.global.len()
    }
}
