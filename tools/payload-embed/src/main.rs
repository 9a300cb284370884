//! Packs a raw payload blob into a Rust source file for embedding in
//! descriptor tables.
//!
//! The firmware serves its payload as trailing bytes of a configuration
//! descriptor, so the blob has to end up inside the compiled image as a
//! plain byte array. This tool turns `stage1.bin` into a module exporting
//! `PAYLOAD`, `PAYLOAD_LEN` and `PAYLOAD_PAD`, with the blob optionally
//! zero-padded to a fixed size so descriptor lengths stay stable across
//! payload revisions.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(version, about = "Pack a raw payload blob into a Rust source file")]
struct Args {
    /// Raw payload to embed.
    input: PathBuf,

    /// Output Rust source file.
    #[arg(short, long)]
    output: PathBuf,

    /// Identifier prefix for the generated constants.
    #[arg(long, default_value = "PAYLOAD")]
    name: String,

    /// Zero-pad the payload up to this total size.
    #[arg(long)]
    pad_to: Option<usize>,

    /// Bytes per emitted line.
    #[arg(long, default_value_t = 8)]
    width: usize,
}

fn is_valid_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render(name: &str, source: &str, bytes: &[u8], pad: usize, width: usize) -> String {
    let total = bytes.len() + pad;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "//! @generated by payload-embed from {source} ({total} bytes, {pad} bytes padding)."
    );
    let _ = writeln!(out, "//! Do not edit; regenerate with:");
    let _ = writeln!(out, "//!");
    let _ = writeln!(out, "//! ```text");
    let _ = writeln!(out, "//! payload-embed {source} --name {name} -o <path>");
    let _ = writeln!(out, "//! ```");
    let _ = writeln!(out);
    let _ = writeln!(out, "pub const {name}_LEN: usize = {total};");
    let _ = writeln!(out, "pub const {name}_PAD: usize = {pad};");
    let _ = writeln!(out);
    let _ = writeln!(out, "pub const {name}: [u8; {name}_LEN] = [");

    let mut line = String::new();
    for (i, byte) in bytes
        .iter()
        .copied()
        .chain(std::iter::repeat(0u8).take(pad))
        .enumerate()
    {
        let _ = write!(line, "0x{byte:02x},");
        if (i + 1) % width == 0 {
            let _ = writeln!(out, "    {}", line.replace(',', ", ").trim_end());
            line.clear();
        }
    }
    if !line.is_empty() {
        let _ = writeln!(out, "    {}", line.replace(',', ", ").trim_end());
    }
    let _ = writeln!(out, "];");
    out
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !is_valid_ident(&args.name) {
        bail!("`{}` is not a valid Rust identifier", args.name);
    }
    if args.width == 0 {
        bail!("--width must be at least 1");
    }

    let bytes = fs::read(&args.input)
        .with_context(|| format!("reading payload {}", args.input.display()))?;
    if bytes.is_empty() {
        bail!("payload {} is empty", args.input.display());
    }

    let pad = match args.pad_to {
        Some(target) => target
            .checked_sub(bytes.len())
            .with_context(|| {
                format!(
                    "payload is {} bytes but --pad-to asked for {target}",
                    bytes.len()
                )
            })?,
        None => 0,
    };

    let source = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());

    let rendered = render(&args.name, &source, &bytes, pad, args.width);
    fs::write(&args.output, rendered)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "{}: {} bytes ({} padding)",
        args.output.display(),
        bytes.len() + pad,
        pad
    );
    Ok(())
}
