use crate::backup::archive::pipeline::SetPipeline;
use crate::backup::archive::{ArchiveSetConfig, ProducedArchive};
use crate::backup::compress::ArchiverConfig;
use crate::backup::function_path;
use crate::backup::logging::DEFAULT_LOG_FILE;
use crate::backup::preprocess::ProcessorsConfig;
use crate::backup::process::CommandRunner;
use crate::backup::relocate::relocate_dir;
use crate::backup::remote::{RemoteConfig, RemoteConnector, RemoteSyncReport};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::purge_oldest_local;
use crate::backup::run_context::RunContext;
use crate::backup::scheduler::Scheduler;
use crate::backup::validate::{
    validate_archive_set_names, validate_cron_str, validate_dir_exist_or_created,
    validate_valid_archive_base_name,
};
use bon::Builder;
use chrono::{DateTime, Local, TimeZone};
use function_name::named;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use validator::{Validate, ValidationError};

static DEFAULT_MAX_PROCESS_COUNT: usize = 4;
static DEFAULT_DEST_PREFIX: &str = "backup";
static BANNER_WIDTH: usize = 80;

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_backup_config))]
pub struct BackupConfig {
    /// Root under which each run creates its dated directory
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into)]
    #[getset(get = "pub")]
    dest_dir: PathBuf,
    #[serde(default = "default_dest_prefix")]
    #[builder(default = default_dest_prefix(), into)]
    #[validate(custom(function = validate_valid_archive_base_name))]
    #[getset(get = "pub")]
    dest_prefix: String,
    /// Where the dated directory is moved once the run is over
    #[builder(into)]
    #[getset(get = "pub")]
    final_dir: Option<PathBuf>,
    /// Purge the most recent previous dated directory, locally and remotely
    #[serde(default)]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    reset_backup_dir: bool,
    /// Number of archive sets processed at the same time
    #[serde(default = "default_max_process_count")]
    #[builder(default = DEFAULT_MAX_PROCESS_COUNT)]
    #[validate(range(min = 1))]
    #[getset(get_copy = "pub")]
    max_process_count: usize,
    /// Runs forever on this schedule when set, otherwise once
    #[validate(custom(function = validate_cron_str))]
    #[builder(into)]
    #[getset(get = "pub")]
    cron: Option<String>,
    #[serde(default = "default_log_file")]
    #[builder(default = default_log_file(), into)]
    #[getset(get = "pub")]
    log_file: PathBuf,
    #[serde(default)]
    #[builder(default)]
    #[validate(nested)]
    #[getset(get = "pub")]
    archiver: ArchiverConfig,
    #[serde(default)]
    #[builder(default)]
    #[validate(nested)]
    #[getset(get = "pub")]
    processors: ProcessorsConfig,
    #[builder(default, into)]
    #[validate(nested)]
    #[getset(get = "pub")]
    archive_sets: BTreeMap<String, ArchiveSetConfig>,
    #[validate(nested)]
    #[getset(get = "pub")]
    remote: Option<RemoteConfig>,
}

fn default_dest_prefix() -> String {
    DEFAULT_DEST_PREFIX.to_string()
}

fn default_max_process_count() -> usize {
    DEFAULT_MAX_PROCESS_COUNT
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

fn validate_backup_config(config: &BackupConfig) -> std::result::Result<(), ValidationError> {
    validate_archive_set_names(&config.archive_sets)?;
    if let Some(final_dir) = &config.final_dir {
        let same_dir = |a: &Path, b: &Path| match (a.canonicalize(), b.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        };
        if same_dir(final_dir, &config.dest_dir) {
            return Err(ValidationError::new("InvalidFinalDir")
                .with_message("final_dir must differ from dest_dir".into()));
        }
    }
    config
        .archive_sets
        .iter()
        .flat_map(|(name, set)| set.include().iter().map(move |entry| (name, entry)))
        .filter_map(|(name, entry)| entry.pre_process().map(|spec| (name, spec)))
        .try_for_each(|(name, spec)| {
            config.processors.resolve(spec.processor()).map(|_| ()).map_err(|e| {
                ValidationError::new("InvalidProcessor")
                    .with_message(format!("archive set {:?}: {}", name, e).into())
            })
        })
}

/// Outcome of one successful run.
#[derive(Debug)]
pub struct RunReport {
    pub produced: Vec<ProducedArchive>,
    /// `None` when no remote is configured
    pub remote: Option<RemoteSyncReport>,
    pub relocated_to: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Next cron tick strictly after `after`.
pub fn next_tick<Tz: TimeZone>(cron: &str, after: &DateTime<Tz>) -> Result<DateTime<Tz>> {
    cron_parser::parse(cron, after).map_err(|e| Error::cron_parse(cron, format!("{:?}", e)))
}

impl BackupConfig {
    /// Connector of the configured remote store, if any.
    pub fn remote_connector(&self) -> Option<&dyn RemoteConnector> {
        self.remote
            .as_ref()
            .map(|remote| remote.store() as &dyn RemoteConnector)
    }

    pub fn run_once(
        &self,
        runner: &dyn CommandRunner,
        connector: Option<&dyn RemoteConnector>,
    ) -> Result<RunReport> {
        self.run_at(Local::now(), runner, connector)
    }

    /// Executes one run as if started at `started_at`.
    ///
    /// Only fatal pipeline errors and local filesystem failures end up in
    /// `Err`. Archives produced before a fatal error stay on disk.
    #[named]
    pub fn run_at(
        &self,
        started_at: DateTime<Local>,
        runner: &dyn CommandRunner,
        connector: Option<&dyn RemoteConnector>,
    ) -> Result<RunReport> {
        let clock = Instant::now();
        let context = RunContext::new(
            started_at,
            self.dest_dir.clone(),
            self.dest_prefix.as_str(),
            self.max_process_count,
        );
        info!("{}", "=".repeat(BANNER_WIDTH));
        info!(
            "archivation started {} {}",
            started_at.format("%Y-%m-%d"),
            started_at.format("%H:%M:%S")
        );

        if self.reset_backup_dir {
            purge_oldest_local(&self.dest_dir, &self.dest_prefix, context.anchor_date())
                .add_fn_name(function_path!())?;
        }

        let dated_dir = context.dated_dir();
        std::fs::create_dir_all(&dated_dir)
            .map_err(Error::from)
            .add_msg(format!("Cannot create archive dir {:?}", dated_dir))?;

        let pipeline = SetPipeline {
            context: &context,
            archiver: &self.archiver,
            processors: &self.processors,
            runner,
        };
        let produced = Scheduler::new(context.max_process_count())?
            .run(pipeline, &self.archive_sets)
            .add_fn_name(function_path!())?;
        info!("{} archives produced in {:?}", produced.len(), dated_dir);

        let remote = match (&self.remote, connector) {
            (Some(remote), Some(connector)) => {
                Some(remote.sync(connector, &context, &produced, self.reset_backup_dir))
            }
            (Some(_), None) => {
                tracing::warn!("Remote configured but no connector available, upload skipped");
                None
            }
            (None, _) => None,
        };

        let relocated_to = match &self.final_dir {
            Some(final_dir) => Some(relocate_dir(&dated_dir, final_dir)?),
            None => None,
        };

        let elapsed = clock.elapsed();
        info!(
            "archivation finished {}, in {:.1?}",
            Local::now().to_rfc3339(),
            elapsed
        );
        Ok(RunReport {
            produced,
            remote,
            relocated_to,
            elapsed,
        })
    }

    /// Runs on every tick of `cron` until a run fails.
    pub fn start_loop(
        &self,
        runner: &dyn CommandRunner,
        connector: Option<&dyn RemoteConnector>,
    ) -> Result<()> {
        let cron = self
            .cron
            .as_deref()
            .ok_or_else(|| Error::cron_parse("", "no cron expression configured"))?;
        loop {
            let now = Local::now();
            let next = next_tick(cron, &now)?;
            info!("Sleeping until {}", next);
            std::thread::sleep((next - now).to_std().unwrap_or_default());
            self.run_once(runner, connector)
                .add_msg(format!("Scheduled run of {} failed", next))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::{DetailedIncludeEntry, PreprocessSpec};
    use crate::backup::preprocess::gbak::GbakConfig;
    use crate::backup::process::fake::{simulate_tools, Invocation, ScriptedRunner};
    use crate::backup::process::CommandOutput;
    use crate::backup::remote::fake::FakeStore;
    use crate::backup::remote::ftp::FtpConfig;
    use chrono::{Timelike, Utc};
    use tempfile::TempDir;

    fn started_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 1, 0, 0).unwrap()
    }

    fn write_files(root: &Path, names: &[&str]) {
        std::fs::create_dir_all(root).unwrap();
        for name in names {
            std::fs::write(root.join(name), name).unwrap();
        }
    }

    fn set(root: &Path, include: &[&str]) -> ArchiveSetConfig {
        ArchiveSetConfig::builder()
            .root_dir(root)
            .include(include.iter().map(|s| (*s).into()).collect::<Vec<_>>())
            .build()
    }

    fn ftp_remote(enabled: bool) -> RemoteConfig {
        let ftp = FtpConfig::builder()
            .host("localhost")
            .user("backup")
            .password("secret")
            .build();
        RemoteConfig::builder().enabled(enabled).store(ftp).build()
    }

    #[test]
    fn test_config_from_yaml() {
        let dest = TempDir::new().unwrap();
        let yaml = format!(
            r#"
dest_dir: {dest}/out
dest_prefix: nightly
final_dir: {dest}/final
reset_backup_dir: true
max_process_count: 2
cron: "0 2 * * *"
archiver: {{ archive_ext: 7z, level: 7 }}
processors:
  fb3: {{ bin_path: /opt/firebird/bin, user: SYSDBA, password: masterkey }}
archive_sets:
  accounting:
    root_dir: /srv/accounting
    sub_dirs: true
    include:
      - reports
      - file_name: db/main.fdb
        pre_process: {{ processor: fb3, new_ext: .fbk }}
    exclude: ["*.tmp"]
remote:
  type: ftp
  host: ftp.example.com
  dir: /backups
  user: backup
  password: secret
"#,
            dest = dest.path().display()
        );
        let config: BackupConfig = serde_yml::from_str(&yaml).unwrap();

        assert!(config.validate().is_ok());
        assert!(dest.path().join("out").is_dir());
        assert_eq!(config.dest_prefix(), "nightly");
        assert_eq!(config.max_process_count(), 2);
        assert!(config.reset_backup_dir());
        assert_eq!(config.archiver().level(), 7);
        assert_eq!(config.archive_sets().len(), 1);
        assert!(config.remote().as_ref().unwrap().enabled());
        assert!(config.remote_connector().is_some());
        assert!(!format!("{:?}", config).contains("masterkey"));
    }

    #[test]
    fn test_config_defaults() {
        let dest = TempDir::new().unwrap();
        let yaml = format!("dest_dir: {}\narchive_sets: {{}}\n", dest.path().display());
        let config: BackupConfig = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(config.dest_prefix(), "backup");
        assert_eq!(config.max_process_count(), 4);
        assert_eq!(config.log_file(), Path::new("./log.txt"));
        assert!(!config.reset_backup_dir());
        assert!(config.cron().is_none());
        assert!(config.remote_connector().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_failures() {
        let dest = TempDir::new().unwrap();
        let base = || BackupConfig::builder().dest_dir(dest.path());

        assert!(base().max_process_count(0).build().validate().is_err());
        assert!(base().cron("every day").build().validate().is_err());
        assert!(base().dest_prefix("a/b").build().validate().is_err());

        let mut sets = BTreeMap::new();
        sets.insert("bad/name".to_string(), set(dest.path(), &["x"]));
        assert!(base().archive_sets(sets).build().validate().is_err());
    }

    #[test]
    fn test_final_dir_equal_to_dest_dir_is_rejected() {
        let dest = TempDir::new().unwrap();
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .final_dir(dest.path().join("."))
            .build();
        assert!(config.validate().is_err());

        let fin = TempDir::new().unwrap();
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .final_dir(fin.path())
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unresolvable_processor_is_rejected_before_run() {
        let dest = TempDir::new().unwrap();
        let exported = |processor: &str| {
            let entry = DetailedIncludeEntry::builder()
                .file_name("main.fdb")
                .pre_process(PreprocessSpec::builder().processor(processor).new_ext(".fbk").build())
                .build();
            let mut sets = BTreeMap::new();
            sets.insert(
                "db".to_string(),
                ArchiveSetConfig::builder()
                    .root_dir(dest.path())
                    .include(vec![entry.into()])
                    .build(),
            );
            sets
        };
        let fb3 = ProcessorsConfig::builder()
            .fb3(
                GbakConfig::builder()
                    .bin_path("/opt/firebird/bin")
                    .user("SYSDBA")
                    .password("masterkey")
                    .build(),
            )
            .build();
        let with = |processor: &str| {
            BackupConfig::builder()
                .dest_dir(dest.path())
                .processors(fb3.clone())
                .archive_sets(exported(processor))
                .build()
        };

        assert!(with("fb3").validate().is_ok());
        let unknown = with("mssql").validate().unwrap_err().to_string();
        assert!(unknown.contains("mssql"));
        let unconfigured = with("fb25").validate().unwrap_err().to_string();
        assert!(unconfigured.contains("fb25"));
    }

    #[test]
    fn test_two_sets_missing_root_and_three_entries() {
        let dest = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        write_files(&src.path().join("b"), &["one.txt", "two.txt", "three.txt"]);
        let mut sets = BTreeMap::new();
        sets.insert("a".to_string(), set(&src.path().join("a"), &["x.txt"]));
        sets.insert(
            "b".to_string(),
            set(&src.path().join("b"), &["one.txt", "two.txt", "three.txt"]),
        );
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .max_process_count(1)
            .archive_sets(sets)
            .build();
        let runner = ScriptedRunner::new(simulate_tools);

        let report = config.run_at(started_at(), &runner, None).unwrap();

        let archive = dest.path().join("backup-2024-03-07/b.2024-03-07.7z");
        assert_eq!(report.produced, vec![ProducedArchive::new(&archive, "b.2024-03-07.7z")]);
        let compress_calls = runner
            .calls()
            .into_iter()
            .filter(|c| c.program_name() == "7z")
            .count();
        assert_eq!(compress_calls, 3);
        assert_eq!(std::fs::read_to_string(&archive).unwrap().lines().count(), 3);
        assert!(report.remote.is_none());
        assert!(report.relocated_to.is_none());
    }

    #[test]
    fn test_disabled_remote_never_connects() {
        let dest = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        write_files(src.path(), &["doc.txt"]);
        let mut sets = BTreeMap::new();
        sets.insert("docs".to_string(), set(src.path(), &["doc.txt"]));
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .archive_sets(sets)
            .remote(ftp_remote(false))
            .build();
        let store = FakeStore::default();

        let report = config
            .run_at(started_at(), &ScriptedRunner::new(simulate_tools), Some(&store))
            .unwrap();

        assert_eq!(report.produced.len(), 1);
        assert!(report.remote.unwrap().skipped);
        assert_eq!(store.connects(), 0);
    }

    #[test]
    fn test_remote_connect_failure_keeps_local_archives() {
        let dest = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        write_files(src.path(), &["doc.txt"]);
        let mut sets = BTreeMap::new();
        sets.insert("docs".to_string(), set(src.path(), &["doc.txt"]));
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .archive_sets(sets)
            .remote(ftp_remote(true))
            .build();
        let store = FakeStore::default();
        store.refuse_connect();

        let report = config
            .run_at(started_at(), &ScriptedRunner::new(simulate_tools), Some(&store))
            .unwrap();

        assert!(report.remote.unwrap().skipped);
        assert_eq!(report.produced.len(), 1);
        assert!(report.produced[0].path().is_file());
    }

    #[test]
    fn test_remote_receives_uploads() {
        let dest = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        write_files(src.path(), &["doc.txt"]);
        let mut sets = BTreeMap::new();
        sets.insert("docs".to_string(), set(src.path(), &["doc.txt"]));
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .archive_sets(sets)
            .remote(ftp_remote(true))
            .build();
        let store = FakeStore::default();

        let report = config
            .run_at(started_at(), &ScriptedRunner::new(simulate_tools), Some(&store))
            .unwrap();

        assert_eq!(report.remote.unwrap().uploaded, vec!["docs.2024-03-07.7z".to_string()]);
        assert!(store.has_file("/backup-2024-03-07/docs.2024-03-07.7z"));
    }

    #[test]
    fn test_reset_purges_previous_dir_before_run() {
        let dest = TempDir::new().unwrap();
        let previous = dest.path().join("backup-2024-03-06");
        let older = dest.path().join("backup-2024-03-01");
        std::fs::create_dir_all(&previous).unwrap();
        std::fs::create_dir_all(&older).unwrap();
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .reset_backup_dir(true)
            .build();

        config
            .run_at(started_at(), &ScriptedRunner::new(simulate_tools), None)
            .unwrap();

        assert!(!previous.exists());
        assert!(older.exists());
        assert!(dest.path().join("backup-2024-03-07").is_dir());
    }

    #[test]
    fn test_final_dir_relocation() {
        let dest = TempDir::new().unwrap();
        let fin = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        write_files(src.path(), &["doc.txt"]);
        let mut sets = BTreeMap::new();
        sets.insert("docs".to_string(), set(src.path(), &["doc.txt"]));
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .final_dir(fin.path())
            .archive_sets(sets)
            .build();

        let report = config
            .run_at(started_at(), &ScriptedRunner::new(simulate_tools), None)
            .unwrap();

        let target = fin.path().canonicalize().unwrap().join("backup-2024-03-07");
        assert_eq!(report.relocated_to.as_deref(), Some(target.as_path()));
        assert!(target.join("docs.2024-03-07.7z").is_file());
        assert!(!dest.path().join("backup-2024-03-07").exists());
    }

    #[test]
    fn test_fatal_export_fails_the_run() {
        let dest = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        write_files(src.path(), &["main.fdb"]);
        let entry = DetailedIncludeEntry::builder()
            .file_name("main.fdb")
            .pre_process(PreprocessSpec::builder().processor("fb3").new_ext(".fbk").build())
            .build();
        let mut sets = BTreeMap::new();
        sets.insert(
            "db".to_string(),
            ArchiveSetConfig::builder()
                .root_dir(src.path())
                .include(vec![entry.into()])
                .build(),
        );
        let processors = ProcessorsConfig::builder()
            .fb3(
                GbakConfig::builder()
                    .bin_path("/opt/firebird/bin")
                    .user("SYSDBA")
                    .password("masterkey")
                    .build(),
            )
            .build();
        let config = BackupConfig::builder()
            .dest_dir(dest.path())
            .processors(processors)
            .archive_sets(sets)
            .build();
        let runner = ScriptedRunner::new(|invocation: &Invocation| {
            if invocation.program_name() == "gbak" {
                Ok(CommandOutput::failure(1, "I/O error during open"))
            } else {
                simulate_tools(invocation)
            }
        });

        let err = config.run_at(started_at(), &runner, None).unwrap_err();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("I/O error during open"));
        assert!(!src.path().join("main.fb3.fbk").exists());
    }

    #[test]
    fn test_next_tick() {
        let after = Utc.with_ymd_and_hms(2024, 3, 7, 1, 30, 0).unwrap();
        let next = next_tick("0 2 * * *", &after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 7, 2, 0, 0).unwrap());
        assert_eq!(next.minute(), 0);
        assert!(next_tick("nonsense", &after).is_err());
    }

    #[test]
    fn test_start_loop_requires_cron() {
        let dest = TempDir::new().unwrap();
        let config = BackupConfig::builder().dest_dir(dest.path()).build();
        let err = config
            .start_loop(&ScriptedRunner::new(simulate_tools), None)
            .unwrap_err();
        assert!(err.to_string().contains("no cron expression"));
    }
}
