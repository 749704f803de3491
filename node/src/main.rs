use anyhow::{Context, Result};
use mora_node::commands::{self, Command};
use mora_node::{engine, Config};
use tracing::{info, Level};

fn init_tracing(level: Level, json: bool) -> Result<()> {
    // Stdout carries command results; logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))
}

fn main() {
    if let Err(err) = main_result() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn main_result() -> Result<()> {
    let matches = commands::cli().get_matches();
    let dry_run = matches.get_flag("dry-run");

    // Load config
    let config_file = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let config_contents = std::fs::read_to_string(config_file)
        .with_context(|| format!("Could not read config file {config_file}"))?;
    let config: Config =
        serde_yaml::from_str(&config_contents).context("Could not parse config file")?;
    let config = config.validate().context("Invalid config")?;
    let command = Command::from_matches(&matches)?;

    if dry_run {
        println!("{config}");
        if let Some(command) = &command {
            println!("command: {command:?}");
        }
        println!("config ok");
        return Ok(());
    }

    init_tracing(config.log_level, config.json_logs)?;
    info!(config_file = %config_file, "loaded config file");

    let Some(command) = command else {
        anyhow::bail!("no subcommand given (try --help)");
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Could not start runtime")?;
    runtime.block_on(async {
        let engine = engine::build(&config)?;
        let output = commands::run(&engine, command).await?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        info!(metrics = ?engine.metrics(), "command finished");
        Ok::<(), anyhow::Error>(())
    })
}
