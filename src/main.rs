use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pkmod::logger::setup_log;
use pkmod::prelude::*;

#[derive(Parser)]
#[command(name = "pkmod")]
#[command(version)]
#[command(about = "Parse and simulate block-structured PK/PD model files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and compile a model, then print its declarations
    Inspect {
        /// Model file
        #[arg(value_name = "MODEL")]
        model: PathBuf,

        /// Print the parsed model as JSON
        #[arg(long)]
        json: bool,

        /// Debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Simulate a model and write the output table as CSV
    Simulate {
        /// Model file; may also be given in the settings file
        #[arg(value_name = "MODEL")]
        model: Option<PathBuf>,

        /// TOML settings file
        #[arg(short, long, value_name = "SETTINGS")]
        settings: Option<PathBuf>,

        /// Parameter override, repeatable
        #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_key_val)]
        params: Vec<(String, f64)>,

        /// Initial value override, repeatable
        #[arg(short, long = "init", value_name = "NAME=VALUE", value_parser = parse_key_val)]
        init: Vec<(String, f64)>,

        #[arg(long)]
        start: Option<f64>,

        #[arg(long)]
        end: Option<f64>,

        /// Output interval
        #[arg(long)]
        delta: Option<f64>,

        #[arg(long)]
        rtol: Option<f64>,

        #[arg(long)]
        atol: Option<f64>,

        /// Output CSV file (defaults to standard output)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Debug logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for '{}': {}", name.trim(), e))?;
    Ok((name.trim().to_string(), value))
}

fn log_level(verbose: bool, configured: &str) -> &str {
    if verbose {
        "debug"
    } else {
        configured
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            model,
            json,
            verbose,
        } => {
            setup_log(log_level(verbose, "info"))?;
            let compiled = Model::from_path(&model)
                .with_context(|| format!("Failed to load model {}", model.display()))?;
            if json {
                println!("{}", compiled.file().to_json()?);
            } else {
                print_summary(&compiled);
            }
        }
        Commands::Simulate {
            model,
            settings,
            params,
            init,
            start,
            end,
            delta,
            rtol,
            atol,
            output,
            verbose,
        } => {
            let settings = match &settings {
                Some(path) => Settings::from_file(path)
                    .with_context(|| format!("Failed to read settings {}", path.display()))?,
                None => Settings::from_env()?,
            };
            setup_log(log_level(verbose, &settings.log.level))?;

            let Some(path) = model.or_else(|| settings.model.clone()) else {
                bail!("No model file given on the command line or in the settings");
            };
            let compiled = Model::from_path(&path)
                .with_context(|| format!("Failed to load model {}", path.display()))?;

            let mut overrides = settings.overrides(compiled.file())?;
            overrides.params.extend(params);
            overrides.init.extend(init);
            overrides.start = start.or(overrides.start);
            overrides.end = end.or(overrides.end);
            overrides.delta = delta.or(overrides.delta);
            overrides.rtol = rtol.or(overrides.rtol);
            overrides.atol = atol.or(overrides.atol);

            let result = compiled
                .simulate(&overrides)
                .with_context(|| format!("Simulation of {} failed", path.display()))?;

            match output.or_else(|| settings.output.path.clone()) {
                Some(out) => result.to_csv_path(out)?,
                None => result.write_csv(std::io::stdout().lock())?,
            }
        }
    }
    Ok(())
}

fn print_summary(model: &Model) {
    let file = model.file();
    if let Some(problem) = &file.problem {
        println!("{}\n", problem);
    }
    println!("Parameters:");
    for p in &file.parameters {
        println!("  {:<12} {}", p.name, p.value);
    }
    println!("Compartments:");
    for c in &file.compartments {
        println!("  {:<12} {}", c.name, c.initial);
    }
    if !model.derived().is_empty() {
        println!("Derived: {}", model.derived().join(", "));
    }
    if !model.outputs().is_empty() {
        println!("Outputs: {}", model.outputs().join(", "));
    }
    let s = model.settings();
    println!(
        "Settings: start={} end={} delta={} rtol={} atol={}",
        s.start, s.end, s.delta, s.rtol, s.atol
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(parse_key_val("CL=2.5"), Ok(("CL".to_string(), 2.5)));
        assert_eq!(parse_key_val(" KA = 1e-1 "), Ok(("KA".to_string(), 0.1)));
        assert!(parse_key_val("CL").is_err());
        assert!(parse_key_val("CL=abc").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
