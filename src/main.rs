use clap::{Arg, Command};
use tracing_subscriber::EnvFilter;

use mixdesign::app_logic;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("mixdesign")
        .version("0.1.0")
        .about("Concrete mix design: aggregate blending, strength prediction and TS EN 206 compliance")
        .arg(
            Arg::new("run")
                .short('r')
                .long("run")
                .value_name("DESIGN_YAML")
                .help("Design session file to run")
                .required(true),
        )
        .arg(
            Arg::new("records")
                .long("records")
                .value_name("POOL_CSV")
                .help("Batch pool CSV; overrides the session's records path"),
        )
        .arg(
            Arg::new("tables")
                .long("tables")
                .value_name("TABLES_TOML")
                .help("Standard tables TOML; overrides the built-in tables"),
        )
        .after_help("The design report is printed to stdout as JSON. Set RUST_LOG to adjust logging.")
        .get_matches();

    let config = matches
        .get_one::<String>("run")
        .ok_or_else(|| anyhow::anyhow!("--run is required"))?;
    let records = matches.get_one::<String>("records").map(String::as_str);
    let tables = matches.get_one::<String>("tables").map(String::as_str);

    let report = app_logic::run(config, records, tables)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
