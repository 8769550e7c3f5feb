// Per-file overlap report: how many bytes of each file's chunks were already seen
// in earlier files, tracked through the chunk location index. Optionally dumps the
// exact (file, offset) locations of the first overlapping chunks.

use std::path::Path;
use std::process;

use clap::{Arg, Command};
use pack::{fileutils, ChunkLocations, PackChunking, FILE_BLOCK_LEN};
use similarity::{analyze_file_overlap, parse_mask_bits_range, thousands, MAX_FILE_SIZE, MIN_FILE_SIZE};

fn print_usage() {
    println!(
        "Usage: <dir-name> <chunk-bits ({}-{})> [print-overlap-chunks (1+)]",
        pack::MIN_MASK_BITS,
        pack::MAX_MASK_BITS
    );
    println!("   chunk-bits: can be a range like \"8-9\".");
    println!("   print-overlap-chunks: optional. Will print a list of overlap chunks according to the specified count.");
}

fn main() {
    tracing_subscriber::fmt().init();

    let matches = Command::new("sim_analysis")
        .about("Report chunk overlaps between the files of a directory")
        .arg(
            Arg::new("dir")
                .help("Directory with the files to analyze")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("mask-bits")
                .help("Number of mask bits (6-15), or a range like \"8-9\"")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("print-overlap-chunks")
                .help("Print the locations of up to this many overlapping chunks per file")
                .index(3),
        )
        .try_get_matches();
    let matches = match matches {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            process::exit(-1);
        }
    };

    let dir = Path::new(matches.get_one::<String>("dir").map(String::as_str).unwrap_or(""));
    let Some((bits_lo, bits_hi)) = matches
        .get_one::<String>("mask-bits")
        .and_then(|arg| parse_mask_bits_range(arg))
    else {
        print_usage();
        process::exit(-1);
    };
    let print_overlap_chunks = match matches.get_one::<String>("print-overlap-chunks") {
        Some(arg) => match arg.parse::<usize>() {
            Ok(count) => count,
            Err(_) => {
                print_usage();
                process::exit(-1);
            }
        },
        None => 0,
    };

    println!("Directory: {}", dir.display());

    let files = match fileutils::list_dir_files_sorted(dir, MIN_FILE_SIZE, MAX_FILE_SIZE) {
        Ok(files) if !files.is_empty() => files,
        Ok(_) => {
            println!(
                "No files in dir \"{}\" (after filtering min-max)",
                dir.display()
            );
            process::exit(-2);
        }
        Err(err) => {
            println!("No files in dir \"{}\": {}", dir.display(), err);
            process::exit(-2);
        }
    };

    let Ok(chunking) = PackChunking::new(bits_lo) else {
        print_usage();
        process::exit(-1);
    };
    println!("Mask bits: {}", bits_lo);
    println!(
        "Average chunk size: {} (not considering the max)",
        thousands(chunking.avg_chunk_size() as u64)
    );
    println!(
        "Chunk size range: {} - {}",
        thousands(chunking.min_chunk_size() as u64),
        thousands(chunking.max_chunk_size() as u64)
    );
    println!(
        "Processed file size range: {} - {}",
        thousands(MIN_FILE_SIZE),
        thousands(MAX_FILE_SIZE)
    );

    println!("\nLegend\n------");
    println!("name - original file name (no path)");
    println!("size - file size (bytes)");
    println!("chunks - number of chunks (see mask bits above)");
    println!("new_chunks - number of unique chunks not found in any file before (count by unique hash)");
    println!("overlap_bytes - overlapping bytes with previous files (does not consider identical chunks within the current file)");
    println!("overlap_ratio - redundancy ratio when comparing with all previous files (see overlap_bytes)");

    println!("\nserial        size bits avg_chunk    chunks   new_chunks overlap_bytes overlap_ratio name");

    let mut block = vec![0u8; FILE_BLOCK_LEN];

    for bits in bits_lo..=bits_hi {
        let Ok(chunking) = PackChunking::new(bits) else {
            print_usage();
            process::exit(-1);
        };
        let mut index = ChunkLocations::new();
        let mut serial = 0;

        for file in &files {
            let Some(report) = analyze_file_overlap(&chunking, &mut index, file, &mut block)
            else {
                continue;
            };

            serial += 1;
            println!(
                "{:<6} {:>11} {:>4} {:>9} {:>9} {:>12} {:>13} {:>12.2}% {}",
                serial,
                thousands(report.file_size),
                bits,
                thousands(report.avg_chunk()),
                thousands(report.chunk_count()),
                thousands(report.new_chunks),
                thousands(report.overlap_bytes),
                report.overlap_ratio(),
                report.name
            );

            if print_overlap_chunks > 0 && report.overlap_bytes > 0 {
                index.print_overlaps(&report.chunks, print_overlap_chunks);
            }
        }
    }
}
