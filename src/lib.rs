//! # k-archivist
//!
//! Scheduled, multi-target backups driven by external tools.
//!
//! ## Features
//!
//! - **Archive Sets**: Named groups of files and directories, one dated archive each
//! - **Database Export**: Firebird `gbak` export of selected inputs before archiving
//! - **Compression**: 7-Zip compatible archiver, bounded number of sets at a time
//! - **Remote Sync**: FTP upload of every archive into a dated remote directory
//! - **Retention**: Removal of the previous dated directory, locally and remotely
//! - **Scheduling**: Optional cron-based loop
//!
//! ## Quick Start
//!
//! ```no_run
//! use k_archivist::backup::backup_config::BackupConfig;
//! use k_archivist::backup::process::ProcessCommandRunner;
//!
//! // Load configuration from YAML file
//! let config: BackupConfig = serde_yml::from_reader(std::fs::File::open("config.yml")?)?;
//!
//! // Run once, uploading to the configured remote if any
//! let report = config.run_once(&ProcessCommandRunner, config.remote_connector())?;
//! println!("{} archives", report.produced.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
