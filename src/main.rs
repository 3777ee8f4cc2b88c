//! wearlink: capture and configuration inspector.
//!
//! ```text
//! wearlink decode   BADCFE0280...EF     frames + commands from a hex capture
//! wearlink firmware ./update.bin 1.2.3  header kind and install checksum
//! wearlink caps     xiaomi_watch_s1     capability table entry as JSON
//! wearlink config   ./link.json         validate a LinkConfig file
//! ```
//!
//! Set `RUST_LOG=debug` to see the reassembler and codec at work.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;

use wearlink::app::commands::Command;
use wearlink::config::{Capabilities, LinkConfig};
use wearlink::firmware::FirmwareImage;
use wearlink::link::codec::DataType;
use wearlink::link::reassembly::StreamReassembler;

#[derive(Parser)]
#[command(name = "wearlink")]
#[command(about = "Inspect wearable protocol captures and configuration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a hex capture of stream bytes (reads stdin when no args)
    Decode { hex: Vec<String> },
    /// Inspect a firmware or watchface file
    Firmware {
        path: PathBuf,
        #[arg(default_value = "unknown")]
        version: String,
    },
    /// Print the capability table entry for a model id or device name
    Caps { model: String },
    /// Validate a LinkConfig JSON file (prints the defaults when omitted)
    Config { path: Option<PathBuf> },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Commands::Decode { hex } => decode(hex),
        Commands::Firmware { path, version } => firmware(&path, version),
        Commands::Caps { model } => caps(&model),
        Commands::Config { path } => config(path),
    }
}

fn decode(args: Vec<String>) -> Result<()> {
    let text = if args.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading capture from stdin")?;
        buf
    } else {
        args.concat()
    };
    let cleaned: String = text
        .chars()
        .filter(char::is_ascii_hexdigit)
        .collect();
    let bytes = hex::decode(&cleaned).context("capture is not valid hex")?;

    let mut reassembler = StreamReassembler::new();
    let frames = reassembler.push(&bytes);
    info!("{} bytes -> {} frames", bytes.len(), frames.len());

    for frame in &frames {
        println!(
            "frame ch={:?} flag={} needs_response={} opcode={} serial={} type={:?} len={}",
            frame.channel,
            frame.flag,
            frame.needs_response,
            frame.opcode,
            frame.serial,
            frame.data_type,
            frame.payload.len()
        );
        if frame.data_type == DataType::Encrypted {
            println!("  (encrypted, {} bytes)", frame.payload.len());
            continue;
        }
        match Command::from_bytes(&frame.payload) {
            Ok(cmd) => println!("  {}/{} {:?}", cmd.kind, cmd.subtype, cmd.body),
            Err(_) => println!("  raw {}", hex::encode(&frame.payload)),
        }
    }

    if reassembler.buffered() > 0 {
        println!("{} trailing bytes buffered", reassembler.buffered());
    }
    if reassembler.discarded_bytes() > 0 || reassembler.dropped_frames() > 0 {
        println!(
            "{} bytes discarded, {} malformed frames dropped",
            reassembler.discarded_bytes(),
            reassembler.dropped_frames()
        );
    }
    Ok(())
}

fn firmware(path: &Path, version: String) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let image = FirmwareImage::from_bytes(bytes, version)
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
    println!("kind:    {:?}", image.kind());
    println!("version: {}", image.version());
    println!("size:    {}", image.bytes().len());
    println!("md5:     {}", image.md5_hex());
    if !image.is_firmware() {
        println!("not installable as firmware");
    }
    Ok(())
}

fn caps(model: &str) -> Result<()> {
    let id = Capabilities::model_for_name(model).unwrap_or(model);
    let Some(caps) = Capabilities::for_model(id) else {
        bail!("unknown model {model}");
    };
    println!("{}", serde_json::to_string_pretty(&caps)?);
    Ok(())
}

fn config(path: Option<PathBuf>) -> Result<()> {
    let Some(path) = path else {
        println!("{}", serde_json::to_string_pretty(&LinkConfig::default())?);
        return Ok(());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let config: LinkConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    println!("ok, locale {}", config.resolved_locale());
    Ok(())
}
