use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

use patcher_core::config::PatchData;
use patcher_core::{patch, PatchOptions};

#[derive(Debug, Parser)]
#[command(name = "mars-patcher", version, about = "Metroid Fusion ROM patcher")]
struct Args {
    /// Unmodified North American Metroid Fusion ROM.
    rom_path: PathBuf,

    /// Where to write the patched ROM.
    out_path: PathBuf,

    /// Patch data JSON describing the changes.
    patch_data_path: PathBuf,

    /// Directory with locations.json, the main hub assets and IPS patches.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Check the patch data file and exit without touching the ROM.
    #[arg(long, default_value_t = false)]
    validate_only: bool,
}

fn init_logging(verbose: bool) -> Result<(), fern::InitError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(err) = init_logging(args.verbose) {
        eprintln!("Failed to initialise logging: {err}");
    }

    if args.validate_only {
        match PatchData::load(&args.patch_data_path) {
            Ok(_) => println!("{} is valid", args.patch_data_path.display()),
            Err(err) => {
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    let options = PatchOptions {
        input_path: args.rom_path,
        output_path: args.out_path,
        patch_data_path: args.patch_data_path,
        data_dir: args.data_dir,
    };

    let mut status = |message: &str| println!("{message}");
    if let Err(err) = patch(&options, &mut status) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
