#[cfg(not(feature = "cli"))]
compile_error!("The `pg_hexedit` binary requires the `cli` feature. Build with `--features cli`.");

use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::process;

use pghex::cli;
use pghex::cli::app::{Cli, ColorMode, Commands};
use pghex::HexeditError;

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {} // colored auto-detects tty
    }

    let writer_result: Result<Box<dyn Write>, HexeditError> = match &cli.output {
        Some(path) => File::create(path)
            .map(|f| Box::new(f) as Box<dyn Write>)
            .map_err(|e| HexeditError::Io(format!("Cannot create {}: {}", path, e))),
        None => Ok(Box::new(std::io::stdout()) as Box<dyn Write>),
    };

    let mut writer = match writer_result {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Tags {
            file,
            range,
            checksum,
            skip_leaf,
            after_lsn,
            segment_size,
            segment_number,
            block_size,
            attrs,
            json,
        } => cli::tags::execute(
            &cli::tags::TagsOptions {
                file,
                range,
                checksum,
                skip_leaf,
                after_lsn,
                segment_size,
                segment_number,
                block_size,
                attrs,
                json,
                mmap: cli.mmap,
            },
            &mut writer,
        ),

        Commands::Classify {
            file,
            range,
            segment_number,
            block_size,
            json,
        } => cli::classify::execute(
            &cli::classify::ClassifyOptions {
                file,
                range,
                segment_number,
                block_size,
                json,
                mmap: cli.mmap,
            },
            &mut writer,
        ),

        Commands::Checksum {
            file,
            verbose,
            nonzero,
            segment_number,
            segment_size,
            block_size,
            json,
        } => cli::checksum::execute(
            &cli::checksum::ChecksumOptions {
                file,
                verbose,
                nonzero,
                segment_number,
                segment_size,
                block_size,
                json,
                mmap: cli.mmap,
            },
            &mut writer,
        ),

        Commands::Dump {
            file,
            block,
            offset,
            length,
            raw,
            tags,
            block_size,
        } => cli::dump::execute(
            &cli::dump::DumpOptions {
                file,
                block,
                offset,
                length,
                raw,
                tags,
                block_size,
                mmap: cli.mmap,
            },
            &mut writer,
        ),

        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::generate(shell, &mut cmd, "pg_hexedit", &mut writer);
            Ok(())
        }
    };

    if let Err(e) = writer.flush() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
