use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::code::ChunkCode;

// Global record of which files contain which chunks, kept for overlap diagnostics.
// No file contents are held: a chunk code maps to the set of (file, offset) pairs
// where that chunk was seen.
#[derive(Debug, Default)]
pub struct ChunkLocations {
    locations: HashMap<ChunkCode, HashSet<(PathBuf, u64)>>,
}

impl ChunkLocations {
    pub fn new() -> ChunkLocations {
        ChunkLocations::default()
    }

    // Record every chunk of a file, walking the list with a byte cursor so each
    // occurrence is stored with its offset. Returns how many chunks were new to the
    // index; duplicates within the file count once.
    pub fn add_file(&mut self, path: &Path, chunks: &[ChunkCode]) -> usize {
        let mut new_chunks = 0;
        let mut offset = 0u64;

        for &code in chunks {
            let files = self.locations.entry(code).or_insert_with(|| {
                new_chunks += 1;
                HashSet::new()
            });
            files.insert((path.to_path_buf(), offset));
            offset += code.length() as u64;
        }

        new_chunks
    }

    // Bytes of the given chunk list that already appear somewhere in the index.
    pub fn overlap_size(&self, chunks: &[ChunkCode]) -> u64 {
        let mut total = 0;
        for code in chunks {
            if self.locations.contains_key(code) {
                total += code.length() as u64;
            }
        }
        total
    }

    // Print every chunk of the list that the index already knows, together with all
    // the places it was seen. Gives up after `max_chunks` overlapping chunks so a
    // pathological corpus does not flood the console.
    pub fn print_overlaps(&self, chunks: &[ChunkCode], mut max_chunks: usize) {
        println!("    serial  hash         size    offset1   offset2   file2");
        println!("    ------- ------------ ------- --------- --------- -------------------");

        let mut offset = 0u64;
        for (serial, code) in chunks.iter().enumerate() {
            if let Some(files) = self.locations.get(code) {
                if max_chunks == 0 {
                    println!("   ...");
                    return;
                }
                for (file, other_offset) in files {
                    println!(
                        "    {:7} {} {:9} {:9} {}",
                        serial + 1,
                        code,
                        offset,
                        other_offset,
                        file.display()
                    );
                }
                max_chunks -= 1;
            }
            offset += code.length() as u64;
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
