use clap::Parser;
use k_archivist::backup::backup_config::BackupConfig;
use k_archivist::backup::logging::init_logging;
use k_archivist::backup::process::ProcessCommandRunner;
use k_archivist::backup::result_error::error::Error;
use k_archivist::backup::result_error::result::Result;
use k_archivist::backup::result_error::AddMsg;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use validator::Validate;

/// Archive named file sets with external tools and mirror them to a remote store
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
    /// Log debug output too
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: &Path) -> Result<BackupConfig> {
    let config = File::open(path)
        .map_err(Error::from)
        .and_then(|f| serde_yml::from_reader::<_, BackupConfig>(f).map_err(Error::from))
        .add_msg(format!("Parse YAML config failed: {:?}", path))?;
    config
        .validate()
        .map_err(Error::from)
        .add_msg(format!("Config validation failed: {:?}", path))?;
    Ok(config)
}

fn run(config: &BackupConfig) -> Result<()> {
    let runner = ProcessCommandRunner;
    match config.cron() {
        Some(_) => config.start_loop(&runner, config.remote_connector()),
        None => config
            .run_once(&runner, config.remote_connector())
            .map(|_| ()),
    }
}

fn main() {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_max_level(level).init();
            error!("{e}");
            exit(1);
        }
    };

    if let Err(e) = init_logging(config.log_file(), level) {
        eprintln!("{e}");
        exit(1);
    }

    if let Err(e) = run(&config) {
        error!("{e}");
        exit(1);
    }
}
