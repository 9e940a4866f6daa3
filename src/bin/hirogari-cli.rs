use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use hirogari_decoder::{DecodeService, Opts};

#[tokio::main]
async fn main() -> Result<()> {
    hirogari_decoder::init_logging();
    let params = Params::parse();

    let service = DecodeService::new(params.opts()).context("invalid decoder options")?;
    let decoded = service
        .decode_result(
            Some(params.protocol.as_str()),
            Some(params.file_path.as_str()),
            Some(params.baud_rate.as_str()),
        )
        .await?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if params.json {
        serde_json::to_writer_pretty(&mut out, &decoded)?;
        writeln!(out)?;
    } else {
        write!(out, "{}", decoded.result)?;
    }
    out.flush()?;

    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "hirogari-cli")]
#[command(about = "Decode AX.25 packets from a recording with Dire Wolf's atest")]
struct Params {
    /// Recording to decode (usually a WAV file).
    #[arg(short = 'f', long = "file")]
    file_path: String,

    /// Baud rate passed to `atest -B`.
    #[arg(short = 'b', long = "baud", default_value = "1200")]
    baud_rate: String,

    #[arg(short = 'p', long = "protocol", default_value = "ax25")]
    protocol: String,

    /// Engine executable to run instead of the platform default.
    #[arg(short = 'd', long = "decoder")]
    decoder: Option<PathBuf>,

    /// Working directory for the engine process.
    #[arg(long = "decoder-dir")]
    decoder_dir: Option<PathBuf>,

    /// Seconds to wait for the engine before killing it (0 waits forever).
    #[arg(short = 't', long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,

    /// Print the result and any degradations as JSON.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

impl Params {
    fn opts(&self) -> Opts {
        Opts {
            program: self.decoder.clone(),
            working_dir: self.decoder_dir.clone(),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        }
    }
}
