// Compresses a file or a directory of files with gzip while restarting the deflate
// block at every PACK chunk boundary. One output file per input and per mask-bits
// value, named <input>.pack-<bits>bits.gz. Already-compressed inputs (gz/zip/rar)
// are skipped.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Arg, Command};
use memmap2::Mmap;
use pack::fileutils;
use similarity::{compress_pack_blocks, parse_mask_bits_range, thousands, MAX_FILE_SIZE, MIN_FILE_SIZE};
use tracing::warn;

fn print_usage() {
    println!(
        "Compress a given file or directory with gzip while restarting every block. \
         The compression uses the deflate algorithm. Output is written to output file(s). \
         Does not process gz/zip/rar files."
    );
    println!(
        "Usage: <filename/dir> <chunk-bits ({}-{})>",
        pack::MIN_MASK_BITS,
        pack::MAX_MASK_BITS
    );
    println!("   <filename/dir> - Existing input file name or a directory to process, full path or relative.");
    println!("   <chunk-bits> - can be a range like \"8-9\".");
}

fn main() {
    tracing_subscriber::fmt().init();

    let matches = Command::new("gzip_pack")
        .about("Gzip files with deflate blocks aligned to PACK chunk boundaries")
        .arg(
            Arg::new("input")
                .help("Input file, or directory whose files to process")
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

    let input = matches.get_one::<String>("input").map(String::as_str).unwrap_or("");
    let Some((bits_lo, bits_hi)) = matches
        .get_one::<String>("mask-bits")
        .and_then(|arg| parse_mask_bits_range(arg))
    else {
        print_usage();
        process::exit(-1);
    };

    let path = Path::new(input);
    let files: Vec<PathBuf> = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        match fileutils::list_dir_files_sorted(path, MIN_FILE_SIZE, MAX_FILE_SIZE) {
            Ok(files) if !files.is_empty() => files,
            _ => {
                println!("Could not find the file or directory '{}'", input);
                process::exit(-2);
            }
        }
    };

    println!("\nsize-in        size-out bits     chunks avg_chunk avg_compr  ratio name");

    for file in &files {
        // Skip compressed files, and especially the outputs of this program.
        let name = file.to_string_lossy();
        if name.ends_with(".gz") || name.ends_with(".zip") || name.ends_with(".rar") {
            continue;
        }

        let handle = match File::open(file) {
            Ok(handle) => handle,
            Err(err) => {
                eprintln!("Failed to read '{}': {}", file.display(), err);
                continue;
            }
        };
        let input_size = handle.metadata().map(|meta| meta.len()).unwrap_or(0);
        if input_size == 0 {
            eprintln!("Failed to read '{}'", file.display());
            continue;
        }
        let mapped = match unsafe { Mmap::map(&handle) } {
            Ok(mapped) => mapped,
            Err(err) => {
                eprintln!("Failed to read '{}': {}", file.display(), err);
                continue;
            }
        };

        for bits in bits_lo..=bits_hi {
            let out_name = format!("{}.pack-{}bits.gz", file.display(), bits);
            let out = match File::create(&out_name) {
                Ok(out) => out,
                Err(err) => {
                    warn!("cannot create {}: {}", out_name, err);
                    continue;
                }
            };

            let chunks = match compress_pack_blocks(&mapped, bits, out) {
                Ok(chunks) => chunks as u64,
                Err(err) => {
                    warn!("failed to compress {}: {}", file.display(), err);
                    continue;
                }
            };

            let out_size = fileutils::file_size(Path::new(&out_name)).unwrap_or(0);
            let avg_chunk = if chunks == 0 { 0 } else { input_size / chunks };
            let avg_compr = if chunks == 0 { 0 } else { out_size / chunks };
            let ratio = out_size as f64 * 100.0 / input_size as f64;

            println!(
                "{:<11} {:>11} {:>4} {:>10} {:>9} {:>9} {:>5.2}% {}",
                thousands(input_size),
                thousands(out_size),
                bits,
                thousands(chunks),
                thousands(avg_chunk),
                thousands(avg_compr),
                ratio,
                out_name
            );
        }
    }
}
