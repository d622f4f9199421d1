#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::*;
use structopt::StructOpt;

use bzstream::{CompressConfig, DecompressConfig, Reader, Writer};

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, StructOpt)]
#[structopt(name = "bzstream", about = "Compress or decompress bzip2 streams")]
struct Opt {
    /// Decompress instead of compress.
    #[structopt(short, long)]
    decompress: bool,

    /// Compression block size, in hundreds of kilobytes (1-9).
    #[structopt(short, long, default_value = "9")]
    block_size: u32,

    /// Decompress with the slower, lower-memory engine mode.
    #[structopt(short, long)]
    small: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace).
    #[structopt(short, parse(from_occurrences))]
    verbose: usize,

    /// Input file; standard input when omitted.
    #[structopt(parse(from_os_str))]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    stderrlog::new()
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Off)
        .init()
        .context("failed to initialize logging")?;

    let mut input: Box<dyn Read> = match &opt.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut output = stdout.lock();

    if opt.decompress {
        info!("decompressing");
        let config = DecompressConfig { small: opt.small };
        let mut reader = Reader::with_config(input, config);
        io::copy(&mut reader, &mut output).context("decompression failed")?;
    } else {
        info!("compressing");
        let config = CompressConfig {
            block_size_100k: opt.block_size,
            work_factor: 0,
        };
        let mut writer = Writer::with_config(output, config)?;
        io::copy(&mut input, &mut writer).context("compression failed")?;
        writer.close()?;
    }
    Ok(())
}
