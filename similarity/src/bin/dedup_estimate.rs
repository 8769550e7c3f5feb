// Estimates how many bytes content-defined deduplication would save across the
// files of a directory. Files are processed in sorted-path order; that order is part
// of the output's meaning, because the first file to contain a chunk claims it.

use std::path::Path;
use std::process;

use clap::{Arg, Command};
use pack::{fileutils, PackChunking, FILE_BLOCK_LEN};
use similarity::{estimate_dedup, parse_mask_bits_range, thousands, MAX_FILE_SIZE, MIN_FILE_SIZE};

fn print_usage() {
    println!(
        "Usage: <dir-name> <chunk-bits ({}-{})>",
        pack::MIN_MASK_BITS,
        pack::MAX_MASK_BITS
    );
    println!("   chunk-bits: can be a range like \"8-9\".");
}

fn main() {
    tracing_subscriber::fmt().init();

    let matches = Command::new("dedup_estimate")
        .about("Estimate cross-file deduplication savings with PACK chunking")
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

    // The preamble describes the first mask-bits value; rows carry their own.
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
    println!("file_name - original file name (no path)");
    println!("file_size - file size (bytes)");
    println!("chunks - number of chunks (see mask bits above)");
    println!("avg_chunk - file size divided by the number of chunks");
    println!("avg_cut - chunked bytes divided by the number of chunks (ignores the dropped tail)");
    println!("self_bytes - bytes of chunks already seen earlier in the same file");
    println!("glob_bytes - bytes of chunks first seen in a previous file");
    println!("dedup_ratio - (self_bytes + glob_bytes) relative to the file size");

    println!(
        "\nserial     file_size bits avg_chunk   avg_cut    chunks    self_bytes    glob_bytes dedup_ratio file_name"
    );

    // One read block shared by every file and every mask-bits round.
    let mut block = vec![0u8; FILE_BLOCK_LEN];

    for bits in bits_lo..=bits_hi {
        let Ok(chunking) = PackChunking::new(bits) else {
            print_usage();
            process::exit(-1);
        };
        let report = estimate_dedup(&chunking, &files, &mut block);

        for (serial, file) in report.files.iter().enumerate() {
            println!(
                "{:<6} {:>13} {:>4} {:>9} {:>9} {:>9} {:>13} {:>13} {:>10.3}% {}",
                serial + 1,
                thousands(file.file_size),
                bits,
                thousands(file.avg_chunk()),
                thousands(file.avg_cut()),
                thousands(file.chunk_count),
                thousands(file.self_bytes),
                thousands(file.glob_bytes),
                file.dedup_ratio(),
                file.name
            );
        }

        println!(
            "total  {:>13} {:>4} {:>9} {:>9} {:>9} {:>13} {:>13} {:>10.3}% -",
            thousands(report.total_size),
            bits,
            thousands(report.total_avg_chunk()),
            thousands(report.total_avg_cut()),
            thousands(report.total_chunks),
            thousands(report.total_self_bytes),
            thousands(report.total_glob_bytes),
            report.total_dedup_ratio()
        );
    }
}
