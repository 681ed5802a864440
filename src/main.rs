use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;
use ustar_light::{Options, append, create, extract, list, update};

#[derive(Parser)]
#[command(name = "ustar_light", version)]
#[command(about = "Create, list, extract and append ustar archives", long_about = None)]
struct Cli {
    #[command(flatten)]
    mode: Mode,

    /// Archive file
    #[arg(short = 'f', long = "file", value_name = "ARCHIVE")]
    archive: PathBuf,

    /// Resolve input files and extract into this directory
    #[arg(short = 'C', long = "directory", value_name = "DIR", default_value = ".")]
    directory: PathBuf,

    /// Long listing with -t, progress messages otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Do not restore modification times on extract
    #[arg(short = 'm', long = "touch")]
    touch: bool,

    /// Files to add
    files: Vec<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Mode {
    /// Create a new archive
    #[arg(short = 'c', long)]
    create: bool,

    /// Append files to the archive
    #[arg(short = 'r', long)]
    append: bool,

    /// List archive contents
    #[arg(short = 't', long)]
    list: bool,

    /// Update archive if file is newer (not supported)
    #[arg(short = 'u', long)]
    update: bool,

    /// Extract the archive
    #[arg(short = 'x', long)]
    extract: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ustar_light: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "ustar_light=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let options = Options {
        directory: cli.directory.clone(),
        preserve_mtime: !cli.touch,
    };
    let mode = &cli.mode;

    if mode.create {
        create(&cli.archive, &cli.files, &options)?;
    } else if mode.append {
        if cli.files.is_empty() {
            bail!("No files specified for append");
        }
        append(&cli.archive, &cli.files, &options)?;
    } else if mode.list {
        let mut out = io::stdout().lock();
        for header in list(&cli.archive)? {
            let header = header?;
            if cli.verbose {
                writeln!(out, "{}", header.long_listing())?;
            } else {
                out.write_all(header.name.as_os_str().as_bytes())?;
                out.write_all(b"\n")?;
            }
        }
    } else if mode.update {
        update(&cli.archive, &cli.files, &options)?;
    } else if mode.extract {
        let report = extract(&cli.archive, &options)?;
        if !report.is_complete() {
            bail!(
                "{}: {} of {} entries could not be extracted",
                cli.archive.display(),
                report.failures.len(),
                report.failures.len() + report.extracted.len()
            );
        }
    }
    Ok(())
}
