use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rlz_lib::config::{self, CompressConfig, DecompressConfig};
use rlz_lib::error::exit_code;
use rlz_lib::io::listener::{InfoListener, Listener};

#[derive(Parser)]
#[command(name = "rlz")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Block-oriented lossless compression", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file or stream
    Compress(CompressArgs),
    /// Decompress an rlz container
    Decompress(DecompressArgs),
}

#[derive(Parser)]
struct CompressArgs {
    /// Input file, or STDIN
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output file, STDOUT, or NONE to discard
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Block size in bytes; accepts K/M suffixes (e.g. 4M)
    #[arg(short, long, default_value = "4M")]
    block: String,

    /// Transform chain, names joined by '+' (e.g. RLT+ROLZ)
    #[arg(short, long, default_value = "ROLZ")]
    transform: String,

    /// Entropy codec (NONE, FPAQ, ANS0, CM, TPAQ, ANS1, TPAQX)
    #[arg(short, long, default_value = "ANS0")]
    entropy: String,

    /// Number of parallel jobs
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Overwrite the output file if it exists
    #[arg(short = 'f', long)]
    overwrite: bool,

    /// Verbosity (0..5)
    #[arg(short, long, default_value_t = 1)]
    verbose: u8,

    /// Store a CRC32 per block
    #[arg(short = 'x', long)]
    checksum: bool,

    /// Write a CPU profile to this file (accepted, not built in)
    #[arg(long, value_name = "FILE")]
    cpu_prof: Option<PathBuf>,
}

#[derive(Parser)]
struct DecompressArgs {
    /// Input file, or STDIN
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output file, STDOUT, or NONE to discard
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Number of parallel jobs
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Overwrite the output file if it exists
    #[arg(short = 'f', long)]
    overwrite: bool,

    /// Verbosity (0..5)
    #[arg(short, long, default_value_t = 1)]
    verbose: u8,

    /// First block ordinal to emit
    #[arg(long, value_name = "BLOCK")]
    from: Option<usize>,

    /// Block ordinal to stop before
    #[arg(long, value_name = "BLOCK")]
    to: Option<usize>,

    /// Write a CPU profile to this file (accepted, not built in)
    #[arg(long, value_name = "FILE")]
    cpu_prof: Option<PathBuf>,
}

/// A CLI-level failure carrying its exit code.
#[derive(Debug)]
struct CliFailure {
    code: i32,
    msg: String,
}

impl CliFailure {
    fn new(code: i32, msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self {
            code,
            msg: msg.into(),
        })
    }
}

impl fmt::Display for CliFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for CliFailure {}

/// Parse a block size with optional K/M suffix.
fn parse_block_size(s: &str) -> Result<usize> {
    let s = s.trim();
    let (digits, mult) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1024),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };
    let value: usize = digits
        .parse()
        .map_err(|_| CliFailure::new(exit_code::BLOCK_SIZE, format!("invalid block size: '{s}'")))?;
    let size = value
        .checked_mul(mult)
        .ok_or_else(|| CliFailure::new(exit_code::BLOCK_SIZE, format!("block size overflow: '{s}'")))?;
    if !(config::MIN_BLOCK_SIZE..=config::MAX_BLOCK_SIZE).contains(&size) {
        return Err(CliFailure::new(
            exit_code::BLOCK_SIZE,
            format!(
                "block size must be in [{}..{}], got {size}",
                config::MIN_BLOCK_SIZE,
                config::MAX_BLOCK_SIZE
            ),
        ));
    }
    Ok(size)
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if config::is_stdio_path(path) {
        return Ok(Box::new(std::io::stdin().lock()));
    }
    let file = std::fs::File::open(path).map_err(|e| {
        CliFailure::new(
            exit_code::OPEN_FILE,
            format!("cannot open {}: {e}", path.display()),
        )
    })?;
    Ok(Box::new(std::io::BufReader::with_capacity(
        1 << 20,
        file,
    )))
}

fn open_output(path: &Path, overwrite: bool) -> Result<Box<dyn Write + Send>> {
    if config::is_none_path(path) {
        return Ok(Box::new(std::io::sink()));
    }
    if config::is_stdio_path(path) {
        return Ok(Box::new(std::io::stdout()));
    }
    if path.is_dir() {
        return Err(CliFailure::new(
            exit_code::OUTPUT_IS_DIR,
            format!("output {} is a directory", path.display()),
        ));
    }
    if path.exists() && !overwrite {
        return Err(CliFailure::new(
            exit_code::OVERWRITE_FILE,
            format!(
                "output {} exists; pass --overwrite to replace it",
                path.display()
            ),
        ));
    }
    let file = std::fs::File::create(path).map_err(|e| {
        CliFailure::new(
            exit_code::CREATE_FILE,
            format!("cannot create {}: {e}", path.display()),
        )
    })?;
    Ok(Box::new(std::io::BufWriter::with_capacity(1 << 20, file)))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "info",
        2 | 3 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

fn validate_jobs(jobs: usize) -> Result<()> {
    if jobs == 0 || jobs > config::MAX_JOBS {
        return Err(CliFailure::new(
            exit_code::INVALID_PARAM,
            format!("jobs must be in [1..{}], got {jobs}", config::MAX_JOBS),
        ));
    }
    Ok(())
}

fn listeners_for(verbose: u8) -> Vec<Box<dyn Listener>> {
    if verbose >= 4 {
        vec![Box::new(InfoListener)]
    } else {
        Vec::new()
    }
}

fn run_compress(args: CompressArgs) -> Result<()> {
    validate_jobs(args.jobs)?;
    if let Some(prof) = &args.cpu_prof {
        warn!(
            "CPU profiling is not built into this binary; ignoring {}",
            prof.display()
        );
    }

    let cfg = CompressConfig {
        input: args.input.clone(),
        output: args.output.clone(),
        block_size: parse_block_size(&args.block)?,
        transform: args.transform,
        entropy: args.entropy,
        jobs: args.jobs,
        overwrite: args.overwrite,
        verbosity: args.verbose,
        checksum: args.checksum,
    };

    let mut input = open_input(&cfg.input)?;
    let mut output = open_output(&cfg.output, cfg.overwrite)?;
    let listeners = listeners_for(args.verbose);

    let summary = rlz_lib::io::compress_stream(&mut *input, &mut *output, &cfg, &listeners)
        .context("compression failed")?;

    if summary.bytes_in > 0 {
        info!(
            "compressed {} bytes to {} bytes ({:.2}%) in {} blocks",
            summary.bytes_in,
            summary.bytes_out,
            100.0 * summary.bytes_out as f64 / summary.bytes_in as f64,
            summary.blocks
        );
    }
    Ok(())
}

fn run_decompress(args: DecompressArgs) -> Result<()> {
    validate_jobs(args.jobs)?;
    if let Some(prof) = &args.cpu_prof {
        warn!(
            "CPU profiling is not built into this binary; ignoring {}",
            prof.display()
        );
    }

    let cfg = DecompressConfig {
        input: args.input.clone(),
        output: args.output.clone(),
        jobs: args.jobs,
        overwrite: args.overwrite,
        verbosity: args.verbose,
        from: args.from,
        to: args.to,
    };

    let mut input = open_input(&cfg.input)?;
    let mut output = open_output(&cfg.output, cfg.overwrite)?;
    let listeners = listeners_for(args.verbose);

    let summary = rlz_lib::io::decompress_stream(&mut *input, &mut *output, &cfg, &listeners)
        .context("decompression failed")?;

    info!(
        "decompressed {} bytes to {} bytes in {} blocks",
        summary.bytes_in, summary.bytes_out, summary.blocks
    );
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli) = err.downcast_ref::<CliFailure>() {
        return cli.code;
    }
    if let Some(lib) = err.downcast_ref::<rlz_lib::Error>() {
        return lib.exit_code();
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return exit_code::WRITE_FILE;
    }
    exit_code::UNKNOWN
}

fn main() {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Compress(a) => a.verbose,
        Commands::Decompress(a) => a.verbose,
    };
    init_tracing(verbose);

    let result = match cli.command {
        Commands::Compress(args) => run_compress(args),
        Commands::Decompress(args) => run_decompress(args),
    };

    if let Err(err) = result {
        let code = exit_code_for(&err);
        eprintln!("rlz: {err:#}");
        std::process::exit(code);
    }
}
