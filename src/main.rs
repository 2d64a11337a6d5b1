//! `tmplguard`: escape a template from a file or stdin and print the result.

use anyhow::{Context as _, Result};
use autoescape::{Autoescaper, EscapeConfig, LineCol, TokenFmt};
use clap::Parser;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "tmplguard")]
#[command(about = "Attach contextual escapers to every action in an HTML template")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print one line per action (context and escaper chain) to stderr
    #[arg(long)]
    report: bool,

    /// Print the token stream to stderr
    #[arg(long)]
    tokens: bool,

    /// Template to read; stdin when omitted or `-`
    input: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<EscapeConfig> {
    let Some(path) = path else {
        return Ok(EscapeConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EscapeConfig::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))
}

fn read_input(path: Option<&PathBuf>) -> Result<(String, String)> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok((path.display().to_string(), source))
        }
        _ => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("failed to read stdin")?;
            Ok(("<stdin>".to_string(), source))
        }
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    let (name, source) = read_input(args.input.as_ref())?;
    log::info!("escaping {name} ({} bytes)", source.len());

    let stages = match Autoescaper::new(config).stages(&source) {
        Ok(stages) => stages,
        Err(err) => {
            eprintln!("{name}: {}", err.diagnostic(&source));
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut stderr = io::stderr().lock();
    if args.tokens {
        let lines = TokenFmt::new(&stages.tokenized.output)
            .format_all(&stages.tokenized.tokens)
            .context("failed to format tokens")?;
        for line in lines {
            writeln!(stderr, "{line}")?;
        }
    }
    if args.report {
        for action in &stages.escaped.actions {
            let at = LineCol::of(&source, action.span.start);
            writeln!(stderr, "{name}:{at}: {action}")?;
        }
        let stats = stages.tokenized.stats;
        writeln!(
            stderr,
            "{} actions, {} escaped, {} tokens, {} rewrites",
            stages.escaped.actions.len(),
            stages.escaped.escaped_count(),
            stats.tokens_emitted,
            stats.rewrites
        )?;
    }

    io::stdout()
        .lock()
        .write_all(stages.escaped.text.as_bytes())
        .context("failed to write output")?;
    Ok(ExitCode::SUCCESS)
}
