//! emx-filetype CLI
//!
//! Detect file types the way a client does before adding files, and
//! translate line endings to and from the server form.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emx_filetype::{
    negotiate, parse_server_level, Charset, FileTypeInference, InferenceConfig, LineEndingMode,
    LineEndingReader, LineEndingWriter,
};
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "emx-filetype")]
#[command(version)]
#[command(about = "Client-side file type detection and line ending tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (debug logging; RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Infer file types and negotiate the server type for each file
    Detect {
        /// Files and directories to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Client charset (e.g. utf8, utf16, shiftjis, winansi, none)
        #[arg(long)]
        charset: Option<String>,

        /// The server runs in Unicode mode
        #[arg(long)]
        unicode_server: bool,

        /// Bytes to inspect per file (negative: default)
        #[arg(long, allow_hyphen_values = true)]
        scan_size: Option<i64>,

        /// Server protocol level (xfiles)
        #[arg(long, allow_hyphen_values = true)]
        server_level: Option<String>,

        /// Use this type instead of the inferred one where allowed
        #[arg(short = 't', long)]
        force_type: Option<String>,

        /// Files larger than this many bytes use the compressed type
        #[arg(long)]
        max_size: Option<u64>,
    },

    /// Convert local line endings to the server form
    Normalize {
        /// Line ending mode (lf, cr, crlf, lfcrlf, local, unix, mac, win, share)
        #[arg(short = 'l', long)]
        line_end: LineEndingMode,

        /// Input file (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Convert server line endings to a local convention
    Localize {
        /// Line ending mode (lf, cr, crlf, lfcrlf, local, unix, mac, win, share)
        #[arg(short = 'l', long)]
        line_end: LineEndingMode,

        /// Input file (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Detect {
            paths,
            charset,
            unicode_server,
            scan_size,
            server_level,
            force_type,
            max_size,
        } => {
            let charset = match charset {
                Some(label) => Charset::for_label(&label)
                    .with_context(|| format!("Invalid --charset: {}", label))?,
                None => None,
            };
            let config = InferenceConfig {
                scan_size: scan_size.and_then(|n| usize::try_from(n).ok()),
                unicode_server,
                charset,
            };
            let level = parse_server_level(server_level.as_deref())
                .context("Invalid --server-level")?;

            let detector = Detector {
                engine: FileTypeInference::new(config),
                level,
                force_type,
                max_size,
            };
            detector.run(&paths)?;
        }
        Commands::Normalize {
            line_end,
            input,
            output,
        } => {
            normalize(line_end, input, output)?;
        }
        Commands::Localize {
            line_end,
            input,
            output,
        } => {
            localize(line_end, input, output)?;
        }
    }

    Ok(())
}

struct Detector {
    engine: FileTypeInference,
    level: i32,
    force_type: Option<String>,
    max_size: Option<u64>,
}

impl Detector {
    fn run(&self, paths: &[PathBuf]) -> Result<()> {
        let mut blocked = 0usize;

        for path in paths {
            if is_real_dir(path) {
                for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(err) => {
                            log::warn!("Skipping unreadable entry: {}", err);
                            continue;
                        }
                    };
                    if entry.file_type().is_dir() {
                        continue;
                    }
                    blocked += self.detect(entry.path())?;
                }
            } else {
                blocked += self.detect(path)?;
            }
        }

        if blocked > 0 {
            anyhow::bail!("{} file(s) cannot be added", blocked);
        }
        Ok(())
    }

    /// Returns 1 if the file cannot be added
    fn detect(&self, path: &Path) -> Result<usize> {
        let inferred = self.engine.classify(path);
        let oversized = match self.max_size {
            Some(limit) => fs::metadata(path).map(|m| m.len() > limit).unwrap_or(false),
            None => false,
        };

        let display = path.display().to_string();
        let outcome = negotiate::resolve(
            &display,
            inferred,
            self.force_type.as_deref(),
            oversized,
            self.level,
        )
        .with_context(|| format!("Failed to negotiate type for: {}", display))?;

        println!(
            "{}  {}  {}",
            display,
            inferred,
            outcome.wire_type.as_deref().unwrap_or("-")
        );

        match outcome.diagnostic {
            Some(diagnostic) => {
                eprintln!("{}", diagnostic);
                Ok(usize::from(diagnostic.is_blocking()))
            }
            None => Ok(0),
        }
    }
}

/// A directory that is not reached through a symlink
fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

fn open_input(input: Option<&Path>) -> Result<Box<dyn Read>> {
    match input {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("Failed to read: {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to write: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn normalize(mode: LineEndingMode, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let source = open_input(input.as_deref())?;
    let mut sink = open_output(output.as_deref())?;

    let mut reader = LineEndingReader::new(source, mode)?;
    let written = reader.copy_to(&mut sink).context("Failed to normalize line endings")?;
    sink.flush()?;

    log::debug!("normalized {} bytes from {} line endings", written, reader.mode());
    Ok(())
}

fn localize(mode: LineEndingMode, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let mut source = open_input(input.as_deref())?;
    let sink = open_output(output.as_deref())?;

    let mut writer = LineEndingWriter::new(sink, mode)?;
    let copied = io::copy(&mut source, &mut writer).context("Failed to localize line endings")?;
    writer.flush()?;

    log::debug!("localized {} bytes to {} line endings", copied, mode);
    Ok(())
}
