//! vdrive CLI - Access disk images through a virtual 1541.
//!
//! Usage:
//!   vdrive <command> IMAGE [args...]
//!
//! Examples:
//!   vdrive dir games.d64                 # Show the directory
//!   vdrive dir games.d64 "m*" --json     # Matching entries as JSON
//!   vdrive load games.d64 menu menu.prg  # Copy a file out of the image
//!   vdrive save games.d64 menu.prg menu  # Copy a file into the image
//!   vdrive cmd games.d64 "s:old*"        # Send a DOS command
//!   vdrive format blank.d81 work 01 --d81

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{debug, LevelFilter};

use vdrive_core::{
    decode_listing, st, to_petscii, Drive, DriveConfig, IecBus, ImageType, MemoryImage,
};

/// Virtual 1541 drive CLI
#[derive(Parser, Debug)]
#[command(name = "vdrive")]
#[command(about = "Access Commodore disk images through a virtual 1541")]
struct Args {
    /// Drive configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable bus and trap tracing
    #[arg(short, long, global = true)]
    trace: bool,

    /// Mount the image write protected
    #[arg(long, global = true)]
    read_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the directory listing
    Dir {
        image: PathBuf,
        /// Name pattern, may contain * and ?
        pattern: Option<String>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read a file from the image
    Load {
        image: PathBuf,
        name: String,
        out: PathBuf,
    },
    /// Write a host file into the image
    Save {
        image: PathBuf,
        input: PathBuf,
        name: String,
        /// Replace an existing file (@ prefix)
        #[arg(long)]
        replace: bool,
        /// Store as SEQ instead of PRG
        #[arg(long)]
        seq: bool,
    },
    /// Send a DOS command on channel 15
    Cmd { image: PathBuf, command: String },
    /// Print the error channel
    Status { image: PathBuf },
    /// Create a blank image
    Format {
        out: PathBuf,
        name: String,
        id: String,
        /// Create a 1581 (D81) image instead of D64
        #[arg(long)]
        d81: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.trace {
        logger.filter_level(LevelFilter::Trace);
    }
    logger.init();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run a command. Returns whether the drive reported success.
fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => DriveConfig::from_path(path)?,
        None => DriveConfig::default(),
    };
    if args.read_only {
        config.write_protect = true;
    }

    match args.command {
        Command::Dir {
            image,
            pattern,
            json,
        } => {
            let mut bus = mount(&config, &image)?;
            let mut name = b"$".to_vec();
            if let Some(pattern) = pattern {
                name.extend_from_slice(b"0:");
                name.extend(petscii_name(&pattern));
            }
            let (program, _) = bus.load(&name);
            let lines = decode_listing(&program);
            if json {
                println!("{}", serde_json::to_string_pretty(&lines)?);
            } else {
                for line in &lines {
                    println!("{} {}", line.blocks, line.text.to_uppercase());
                }
            }
            Ok(finish(&mut bus))
        }
        Command::Load { image, name, out } => {
            let mut bus = mount(&config, &image)?;
            let (data, status) = bus.load(&petscii_name(&name));
            if status & st::EOF != 0 {
                std::fs::write(&out, &data)?;
                println!("{} bytes written to {}", data.len(), out.display());
            }
            Ok(finish(&mut bus))
        }
        Command::Save {
            image,
            input,
            name,
            replace,
            seq,
        } => {
            let data = std::fs::read(&input)?;
            let mut bus = mount(&config, &image)?;
            let mut target = Vec::new();
            if replace {
                target.extend_from_slice(b"@0:");
            }
            target.extend(petscii_name(&name));
            if seq {
                target.extend_from_slice(b",S,W");
            }
            bus.save(&target, &data);
            Ok(finish(&mut bus))
        }
        Command::Cmd { image, command } => {
            let mut bus = mount(&config, &image)?;
            bus.command(&to_petscii(&command.to_ascii_lowercase()));
            Ok(finish(&mut bus))
        }
        Command::Status { image } => {
            let mut bus = mount(&config, &image)?;
            Ok(finish(&mut bus))
        }
        Command::Format { out, name, id, d81 } => {
            let kind = if d81 { ImageType::D81 } else { ImageType::D64 };
            let image =
                MemoryImage::blank(kind, &name.to_ascii_uppercase(), &id.to_ascii_uppercase())?;
            std::fs::write(&out, image.as_bytes())?;
            println!("Created {:?} image {}", kind, out.display());
            Ok(true)
        }
    }
}

/// Mount an image on a fresh drive and attach it to the bus.
fn mount(config: &DriveConfig, path: &Path) -> Result<IecBus<File>, Box<dyn std::error::Error>> {
    let mut drive = Drive::new(config);
    drive.mount_path(path)?;
    debug!("Mounted {} as device {}", path.display(), config.device);
    Ok(IecBus::new(drive))
}

/// Host names are typed in ASCII; unshifted PETSCII letters are uppercase.
fn petscii_name(name: &str) -> Vec<u8> {
    to_petscii(&name.to_ascii_lowercase())
}

/// Print the error channel. Returns whether it reported success.
fn finish(bus: &mut IecBus<File>) -> bool {
    let ok = bus.drive().error().code.is_ok();
    let message = bus.read_status();
    if ok {
        println!("{}", message);
    } else {
        eprintln!("{}", message);
    }
    ok
}
