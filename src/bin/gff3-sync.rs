//! CLI wrapper around [`gff3::SyncInserter`]: reads one or more GFF3 files
//! and writes the same content with `###` markers re-synthesized at every
//! safe position.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use gff3::SyncInserter;

#[derive(ClapParser, Debug)]
#[command(name = "gff3-sync", about = "Insert ### sync markers into GFF3 files")]
struct Args {
    /// GFF3 input files, concatenated in order.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn run(args: Args) -> Result<(), gff3::SyncError> {
    let mut inserter = SyncInserter::new();
    for path in args.paths {
        inserter = inserter.add_path(path);
    }
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    inserter.run(&mut lock)?;
    lock.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    simple_logger::SimpleLogger::new().env().init().ok();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("gff3-sync failed: {err}");
            eprintln!("gff3-sync: {err}");
            ExitCode::FAILURE
        }
    }
}
