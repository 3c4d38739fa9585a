//! Scheduler configuration.
//!
//! Options come from the command line (or `HDFS_MESOS_*` environment
//! variables), then from a `hdfs-mesos.properties` defaults file in the
//! working directory, then from built-in defaults. Everything is validated
//! once, before the scheduler starts.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use hdfs_mesos_api::MIN_MASTER_VERSION;
use hdfs_mesos_reconcile::{Period, DEFAULT_MAX_TRIES, DEFAULT_RECONCILE_PERIOD};
use semver::Version;

use crate::node::NodeTemplates;
use crate::storage::StorageUri;

/// Defaults file looked up in the working directory.
pub const DEFAULTS_FILE: &str = "hdfs-mesos.properties";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("api required")]
    ApiRequired,

    #[error("master required")]
    MasterRequired,

    #[error("invalid storage")]
    InvalidStorage,

    #[error("invalid driver")]
    InvalidDriver,

    #[error("invalid framework-timeout")]
    InvalidFrameworkTimeout,

    #[error("invalid reconcile-period")]
    InvalidReconcilePeriod,

    #[error("invalid reconcile-max-tries")]
    InvalidReconcileMaxTries,
}

/// Mesos scheduler API flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverVersion {
    /// Native driver.
    #[default]
    V0,
    /// HTTP API.
    V1,
}

impl FromStr for DriverVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v0" => Ok(Self::V0),
            "v1" => Ok(Self::V1),
            _ => Err(ConfigError::InvalidDriver),
        }
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V0 => f.write_str("v0"),
            Self::V1 => f.write_str("v1"),
        }
    }
}

/// Settings the scheduler core itself reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Needs given to newly added nodes.
    pub templates: NodeTemplates,
    pub reconcile_period: Period,
    pub reconcile_max_tries: u32,
    /// Masters older than this are refused.
    pub min_master_version: Version,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            templates: NodeTemplates::default(),
            reconcile_period: DEFAULT_RECONCILE_PERIOD,
            reconcile_max_tries: DEFAULT_MAX_TRIES,
            min_master_version: MIN_MASTER_VERSION,
        }
    }
}

/// Validated scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Binding host:port for the http/artifact server.
    pub api: String,
    pub storage: StorageUri,
    pub debug: bool,
    pub driver: DriverVersion,
    /// Mesos master address(es).
    pub master: String,
    pub user: Option<String>,
    pub principal: Option<String>,
    pub secret: Option<String>,
    pub framework_name: String,
    pub framework_role: String,
    /// Failover timeout.
    pub framework_timeout: Period,
    pub jar_mask: String,
    pub hadoop_mask: String,
    pub jre_mask: Option<String>,
    pub scheduler: SchedulerSettings,
}

impl Config {
    pub const DEFAULT_STORAGE: &'static str = "file:hdfs-mesos.json";
    pub const DEFAULT_FRAMEWORK_NAME: &'static str = "hdfs";
    pub const DEFAULT_FRAMEWORK_ROLE: &'static str = "*";
    pub const DEFAULT_FRAMEWORK_TIMEOUT: &'static str = "30d";
    pub const DEFAULT_JAR_MASK: &'static str = "hdfs-mesos-.*jar";
    pub const DEFAULT_HADOOP_MASK: &'static str = "hadoop-.*gz";
}

/// `key=value` defaults, as read from a properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults(BTreeMap<String, String>);

impl Defaults {
    /// Parse properties text. `#` and `!` start comment lines; keys and
    /// values are separated by the first `=` or `:`.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .map(|line| match line.find(['=', ':']) {
                Some(at) => (line[..at].trim(), line[at + 1..].trim()),
                None => (line, ""),
            })
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self(entries)
    }

    /// Load `path`; a missing file yields empty defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read defaults from {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Command line of the scheduler.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "hdfs-mesos-scheduler")]
#[command(about = "Run HDFS name nodes and data nodes on Mesos", long_about = None)]
pub struct SchedulerArgs {
    /// Binding host:port for http/artifact server.
    #[arg(long, env = "HDFS_MESOS_API")]
    pub api: Option<String>,

    /// Storage for cluster state, e.g. file:hdfs-mesos.json or
    /// zk:master:2181/hdfs-mesos. Default: file:hdfs-mesos.json.
    #[arg(long, env = "HDFS_MESOS_STORAGE")]
    pub storage: Option<String>,

    /// Enable debug logging. Default: false.
    #[arg(long, env = "HDFS_MESOS_DEBUG")]
    pub debug: Option<bool>,

    /// Mesos driver version (v0, v1). Default: v0.
    #[arg(long, env = "HDFS_MESOS_DRIVER")]
    pub driver: Option<String>,

    /// Mesos master address(es).
    #[arg(long, env = "HDFS_MESOS_MASTER")]
    pub master: Option<String>,

    /// Mesos user.
    #[arg(long, env = "HDFS_MESOS_USER")]
    pub user: Option<String>,

    /// Principal (username) used to register the framework.
    #[arg(long, env = "HDFS_MESOS_PRINCIPAL")]
    pub principal: Option<String>,

    /// Secret (password) used to register the framework.
    #[arg(long, env = "HDFS_MESOS_SECRET")]
    pub secret: Option<String>,

    /// Framework name. Default: hdfs.
    #[arg(long, env = "HDFS_MESOS_FRAMEWORK_NAME")]
    pub framework_name: Option<String>,

    /// Framework role. Default: *.
    #[arg(long, env = "HDFS_MESOS_FRAMEWORK_ROLE")]
    pub framework_role: Option<String>,

    /// Framework failover timeout. Default: 30d.
    #[arg(long, env = "HDFS_MESOS_FRAMEWORK_TIMEOUT")]
    pub framework_timeout: Option<String>,

    /// hdfs-mesos jar mask. Default: hdfs-mesos-.*jar.
    #[arg(long, env = "HDFS_MESOS_JAR")]
    pub jar: Option<String>,

    /// Hadoop archive mask. Default: hadoop-.*gz.
    #[arg(long, env = "HDFS_MESOS_HADOOP")]
    pub hadoop: Option<String>,

    /// JRE archive mask (jre*.zip).
    #[arg(long, env = "HDFS_MESOS_JRE")]
    pub jre: Option<String>,

    /// Time between reconciliation tries. Default: 30s.
    #[arg(long, env = "HDFS_MESOS_RECONCILE_PERIOD")]
    pub reconcile_period: Option<String>,

    /// Reconciliation tries before giving up on a task. Default: 3.
    #[arg(long, env = "HDFS_MESOS_RECONCILE_MAX_TRIES")]
    pub reconcile_max_tries: Option<String>,
}

impl SchedulerArgs {
    /// Fill gaps from `defaults` and validate.
    pub fn resolve(self, defaults: &Defaults) -> Result<Config, ConfigError> {
        let pick = |value: Option<String>, key: &str| {
            value.or_else(|| defaults.get(key).map(str::to_string))
        };

        let api = pick(self.api, "api").ok_or(ConfigError::ApiRequired)?;

        let storage = pick(self.storage, "storage")
            .as_deref()
            .unwrap_or(Config::DEFAULT_STORAGE)
            .parse::<StorageUri>()
            .map_err(|_| ConfigError::InvalidStorage)?;

        // Anything but "true", in any case, is false.
        let debug = self.debug.unwrap_or_else(|| {
            defaults
                .get("debug")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        });

        let driver = match pick(self.driver, "driver") {
            Some(driver) => driver.parse()?,
            None => DriverVersion::default(),
        };

        let master = pick(self.master, "master")
            .ok_or(ConfigError::MasterRequired)?;

        let framework_timeout = pick(self.framework_timeout, "framework-timeout")
            .as_deref()
            .unwrap_or(Config::DEFAULT_FRAMEWORK_TIMEOUT)
            .parse::<Period>()
            .map_err(|_| ConfigError::InvalidFrameworkTimeout)?;

        let reconcile_period = match pick(self.reconcile_period, "reconcile-period") {
            Some(period) => period
                .parse::<Period>()
                .map_err(|_| ConfigError::InvalidReconcilePeriod)?,
            None => DEFAULT_RECONCILE_PERIOD,
        };

        let reconcile_max_tries = match pick(self.reconcile_max_tries, "reconcile-max-tries") {
            Some(tries) => tries
                .parse::<u32>()
                .ok()
                .filter(|&t| t > 0)
                .ok_or(ConfigError::InvalidReconcileMaxTries)?,
            None => DEFAULT_MAX_TRIES,
        };

        Ok(Config {
            api,
            storage,
            debug,
            driver,
            master,
            user: pick(self.user, "user"),
            principal: pick(self.principal, "principal"),
            secret: pick(self.secret, "secret"),
            framework_name: pick(self.framework_name, "framework-name")
                .unwrap_or_else(|| Config::DEFAULT_FRAMEWORK_NAME.to_string()),
            framework_role: pick(self.framework_role, "framework-role")
                .unwrap_or_else(|| Config::DEFAULT_FRAMEWORK_ROLE.to_string()),
            framework_timeout,
            jar_mask: pick(self.jar, "jar")
                .unwrap_or_else(|| Config::DEFAULT_JAR_MASK.to_string()),
            hadoop_mask: pick(self.hadoop, "hadoop")
                .unwrap_or_else(|| Config::DEFAULT_HADOOP_MASK.to_string()),
            jre_mask: pick(self.jre, "jre"),
            scheduler: SchedulerSettings {
                reconcile_period,
                reconcile_max_tries,
                ..SchedulerSettings::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn args(extra: &[&str]) -> SchedulerArgs {
        let argv = ["hdfs-mesos-scheduler"].iter().chain(extra);
        SchedulerArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_resolve_defaults() {
        let config = args(&["--api", "http://h:7000", "--master", "m:5050"])
            .resolve(&Defaults::default())
            .unwrap();

        assert_eq!(config.api, "http://h:7000");
        assert_eq!(config.storage, StorageUri::File("hdfs-mesos.json".into()));
        assert!(!config.debug);
        assert_eq!(config.driver, DriverVersion::V0);
        assert_eq!(config.framework_name, "hdfs");
        assert_eq!(config.framework_role, "*");
        assert_eq!(
            config.framework_timeout.as_duration(),
            Duration::from_secs(30 * 24 * 3600)
        );
        assert_eq!(config.jar_mask, "hdfs-mesos-.*jar");
        assert_eq!(config.hadoop_mask, "hadoop-.*gz");
        assert_eq!(config.jre_mask, None);
        assert_eq!(config.scheduler, SchedulerSettings::default());
        assert_eq!(config.scheduler.min_master_version, Version::new(0, 23, 0));
    }

    #[test]
    fn test_resolve_from_defaults_file() {
        let defaults = Defaults::parse(
            "# scheduler defaults\n\
             api=http://h:7000\n\
             master: m:5050\n\
             ! legacy comment\n\
             debug=TRUE\n\
             driver=v1\n\
             storage=zk:m1:2181,m2:2181/hdfs-mesos\n\
             reconcile-period=1m\n",
        );
        let config = args(&["--driver", "v0"]).resolve(&defaults).unwrap();

        assert_eq!(config.master, "m:5050");
        assert!(config.debug);
        assert_eq!(config.driver, DriverVersion::V0);
        assert!(matches!(config.storage, StorageUri::Zk { .. }));
        assert_eq!(
            config.scheduler.reconcile_period.as_duration(),
            Duration::from_secs(60)
        );
    }

    #[rstest]
    #[case(&["--master", "m"], ConfigError::ApiRequired)]
    #[case(&["--api", "a"], ConfigError::MasterRequired)]
    #[case(
        &["--api", "a", "--master", "m", "--storage", "xyz"],
        ConfigError::InvalidStorage
    )]
    #[case(
        &["--api", "a", "--master", "m", "--driver", "v2"],
        ConfigError::InvalidDriver
    )]
    #[case(
        &["--api", "a", "--master", "m", "--framework-timeout", "soon"],
        ConfigError::InvalidFrameworkTimeout
    )]
    #[case(
        &["--api", "a", "--master", "m", "--reconcile-period", "1x"],
        ConfigError::InvalidReconcilePeriod
    )]
    #[case(
        &["--api", "a", "--master", "m", "--reconcile-max-tries", "0"],
        ConfigError::InvalidReconcileMaxTries
    )]
    fn test_resolve_errors(#[case] argv: &[&str], #[case] expected: ConfigError) {
        let err = args(argv).resolve(&Defaults::default()).unwrap_err();
        assert_eq!(err, expected);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ConfigError::ApiRequired.to_string(), "api required");
        assert_eq!(
            ConfigError::InvalidFrameworkTimeout.to_string(),
            "invalid framework-timeout"
        );
    }

    #[test]
    fn test_defaults_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let defaults = Defaults::load(dir.path().join(DEFAULTS_FILE)).unwrap();
        assert_eq!(defaults, Defaults::default());
    }

    #[test]
    fn test_defaults_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULTS_FILE);
        fs::write(&path, "api = http://h:7000\nuser=hdfs\n").unwrap();

        let defaults = Defaults::load(&path).unwrap();
        assert_eq!(defaults.get("api"), Some("http://h:7000"));
        assert_eq!(defaults.get("user"), Some("hdfs"));
        assert_eq!(defaults.get("jre"), None);
    }
}
