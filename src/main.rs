use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Debug, Parser)]
#[clap(name = "diosgen")]
#[clap(about = "Generates PIC14/16 assembly for the DiOS cooperative event-queue scheduler.")]
struct Cli {
    /// The description file to compile. Pass "-" to read from stdin.
    input: PathBuf,

    /// Where to write the generated assembly. Defaults to stdout.
    #[clap(short, long, value_parser)]
    output: Option<PathBuf>,

    /// Increase log verbosity. May be repeated (-v, -vv, -vvv).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let srcname = cli.input.to_string_lossy().into_owned();
    log::info!("compiling {srcname}");

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout()),
    };

    if srcname == "-" {
        let reader = BufReader::new(io::stdin());
        diosgen::run(reader, "<stdin>", &mut out)?;
    } else {
        let file = File::open(&cli.input).with_context(|| format!("opening {}", cli.input.display()))?;
        diosgen::run(BufReader::new(file), &srcname, &mut out)?;
    }

    log::debug!("done");
    Ok(())
}
