use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pwned_index::SharedIndex;
use pwned_index::gcs::{DEFAULT_FALSE_POSITIVE_RATE, DEFAULT_INDEX_GRANULARITY};
use pwned_server::{
    CheckResponse, CheckService, Error, IndexFormat, ServeArgs, ServerConfig, build_gcs_file,
    load_index, server,
};
use secrecy::SecretString;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pwned-server", version)]
#[command(about = "Check passwords and SHA-1 digests against a breached-credentials corpus")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP check API
    Serve(ServeArgs),
    /// Build a GCS index file from a text corpus
    Create(CreateArgs),
    /// Check passwords or hex digests and print the results as JSON
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Text corpus, one hex digest per line (an optional `:count` suffix is ignored)
    #[arg(short, long)]
    input: PathBuf,

    /// GCS file to write
    #[arg(short, long)]
    output: PathBuf,

    /// False positive rate, 1 in P
    #[arg(short = 'p', long, default_value_t = DEFAULT_FALSE_POSITIVE_RATE)]
    probability: u64,

    /// Values per index seek point
    #[arg(short = 'g', long, default_value_t = DEFAULT_INDEX_GRANULARITY)]
    granularity: u64,

    /// Overwrite an existing output file
    #[arg(long)]
    force: bool,

    /// Disable progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Index to query
    #[arg(short, long, env = "PWNED_INDEX")]
    index: PathBuf,

    #[arg(long, value_enum, default_value_t = IndexFormat::Auto)]
    format: IndexFormat,

    /// Accept a prefix directory that lacks some prefix files
    #[arg(long)]
    allow_partial: bool,

    /// Values are hex SHA-1 digests rather than passwords
    #[arg(long)]
    hashed: bool,

    /// Prompt for values until end of input, hiding typed passwords
    #[arg(short = 'I', long, conflicts_with = "value")]
    interactive: bool,

    /// Value to check. Read from stdin when omitted, which keeps it out of the shell history.
    value: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            init_tracing(args.verbose);
            let config = ServerConfig::try_from(args)?;
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(server::serve(config))
        }
        Command::Create(args) => {
            init_tracing(false);
            create(args)
        }
        Command::Query(args) => {
            init_tracing(false);
            query(args)
        }
    }
}

fn create(args: CreateArgs) -> Result<(), Error> {
    if args.output.exists() && !args.force {
        return Err(Error::FileExists { path: args.output });
    }

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} lines ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    };

    let started = Instant::now();
    let summary =
        build_gcs_file(&args.input, &args.output, args.probability, args.granularity, &progress)?;
    progress.finish_and_clear();

    println!(
        "Wrote {} items ({} encoded, {} seek points) to {:?}: {} bytes in {:.1}s",
        summary.items,
        summary.encoded,
        summary.seek_points,
        args.output,
        summary.bytes_written,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn query(args: QueryArgs) -> Result<(), Error> {
    let index = load_index(&args.index, args.format, args.allow_partial)?;
    let service = CheckService::new(SharedIndex::new(index));

    if args.interactive {
        return query_interactive(&service, args.hashed);
    }

    let value = match args.value {
        Some(value) => value,
        None => read_line(&mut io::stdin().lock())?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no value given on stdin")
        })?,
    };
    print_json(&check(&service, args.hashed, value)?)
}

fn query_interactive(service: &CheckService, hashed: bool) -> Result<(), Error> {
    info!("running interactive session, end input (^D) to exit");
    let mut stdin = io::stdin().lock();
    loop {
        let value = if hashed {
            eprint!("SHA-1 hex digest: ");
            read_line(&mut stdin)?
        } else {
            match rpassword::prompt_password("Password: ") {
                Ok(value) => Some(value),
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => None,
                Err(err) => return Err(err.into()),
            }
        };
        let Some(value) = value else {
            info!("goodbye");
            return Ok(());
        };
        if value.is_empty() {
            warn!("please enter a value");
            continue;
        }

        match check(service, hashed, value) {
            Ok(response) => print_json(&response)?,
            Err(err) => error!(error = %err, "check failed"),
        }
    }
}

fn check(service: &CheckService, hashed: bool, value: String) -> Result<CheckResponse, Error> {
    let response = if hashed {
        service.check_hash_hex(&value)?
    } else {
        service.check_password(&SecretString::from(value))?
    };
    Ok(response)
}

/// Reads one line without its line ending. `None` at end of input.
fn read_line(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(len);
    Ok(Some(line))
}

fn print_json(response: &CheckResponse) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(response).map_err(io::Error::other)?;
    println!("{json}");
    Ok(())
}
