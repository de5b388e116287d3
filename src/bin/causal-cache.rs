use argh::FromArgs;
use ::causal_cache::{config::Config, nodes::causal_cache};
use eyre::Context;
use std::{fs, path::PathBuf};

#[derive(FromArgs)]
/// Causal consistency cache node
struct Args {
    #[argh(positional)]
    config_file: PathBuf,
}

fn main() -> eyre::Result<()> {
    if let Err(err) = set_up_logger() {
        eprintln!(
            "{:?}",
            eyre::Error::new(err).wrap_err("failed to set up logger")
        );
    }

    let args: Args = argh::from_env();

    let config: Config = serde_yaml::from_str(
        &fs::read_to_string(&args.config_file).context("failed to read config file")?,
    )
    .context("failed to parse config file")?;

    let node_id = std::env::var("CAUSAL_CACHE_NODE_ID")
        .unwrap_or_else(|_| format!("cache-{}", uuid::Uuid::new_v4()));

    causal_cache::run(&config, node_id)
}

fn set_up_logger() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file("causal-cache.log")?)
        .apply()?;
    Ok(())
}
