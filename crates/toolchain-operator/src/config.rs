//! Command line and environment configuration

use std::time::Duration;

use clap::{Args, FromArgMatches, Parser, Subcommand};
use thiserror::Error;

use toolchain_common::telemetry::{LogFormat, TelemetryError};

/// Toolchain operator - tracks the liveness of remote clusters
#[derive(Parser, Debug)]
#[command(name = "toolchain-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print the ToolchainCluster CRD and exit
    #[arg(long)]
    pub crd: bool,

    /// What to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Operator subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ToolchainCluster controller (default mode)
    Controller(ControllerArgs),
}

/// Flags of the `controller` subcommand
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Seconds between health checks of a cluster
    #[arg(long, env = "TOOLCHAIN_REQUEUE_AFTER_SECS", default_value_t = 10)]
    pub requeue_after_secs: u64,

    /// Seconds before a single health check gives up
    #[arg(long, env = "TOOLCHAIN_HEALTH_TIMEOUT_SECS", default_value_t = 10)]
    pub health_timeout_secs: u64,

    /// Only watch ToolchainClusters in this namespace (all namespaces if unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Log line format: json or text
    #[arg(long, env = "TOOLCHAIN_LOG_FORMAT", default_value = "json")]
    pub log_format: String,
}

impl ControllerArgs {
    /// Controller flags from the environment alone, for when no subcommand is given
    pub fn from_env() -> Result<Self, clap::Error> {
        let matches = Self::augment_args(clap::Command::new("controller"))
            .try_get_matches_from(["controller"])?;
        Self::from_arg_matches(&matches)
    }
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            requeue_after_secs: 10,
            health_timeout_secs: 10,
            namespace: None,
            log_format: LogFormat::default().to_string(),
        }
    }
}

/// Invalid configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A duration flag was zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The watch namespace flag was set to an empty string
    #[error("namespace must not be empty when set")]
    EmptyNamespace,

    /// Unknown log format
    #[error(transparent)]
    LogFormat(#[from] TelemetryError),
}

/// Validated operator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Interval between health checks of a reachable cluster
    pub requeue_after: Duration,
    /// Upper bound for one health check, also used for remote client timeouts
    pub health_timeout: Duration,
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Log line format
    pub log_format: LogFormat,
}

impl TryFrom<ControllerArgs> for OperatorConfig {
    type Error = ConfigError;

    fn try_from(args: ControllerArgs) -> Result<Self, Self::Error> {
        if args.requeue_after_secs == 0 {
            return Err(ConfigError::ZeroDuration("requeue-after-secs"));
        }
        if args.health_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("health-timeout-secs"));
        }
        if matches!(args.namespace.as_deref(), Some(ns) if ns.trim().is_empty()) {
            return Err(ConfigError::EmptyNamespace);
        }

        Ok(Self {
            requeue_after: Duration::from_secs(args.requeue_after_secs),
            health_timeout: Duration::from_secs(args.health_timeout_secs),
            namespace: args.namespace,
            log_format: args.log_format.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("toolchain-operator").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn crd_flag_without_subcommand() {
        let cli = parse(&["--crd"]);
        assert!(cli.crd);
        assert!(cli.command.is_none());
    }

    #[test]
    fn controller_flags_are_parsed() {
        let cli = parse(&[
            "controller",
            "--requeue-after-secs",
            "30",
            "--health-timeout-secs",
            "3",
            "--namespace",
            "toolchain-host-operator",
            "--log-format",
            "text",
        ]);

        let Some(Commands::Controller(args)) = cli.command else {
            panic!("expected controller subcommand");
        };
        let config = OperatorConfig::try_from(args).unwrap();
        assert_eq!(config.requeue_after, Duration::from_secs(30));
        assert_eq!(config.health_timeout, Duration::from_secs(3));
        assert_eq!(config.namespace.as_deref(), Some("toolchain-host-operator"));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn defaults_are_valid() {
        let config = OperatorConfig::try_from(ControllerArgs::default()).unwrap();
        assert_eq!(config.requeue_after, Duration::from_secs(10));
        assert_eq!(config.health_timeout, Duration::from_secs(10));
        assert!(config.namespace.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[rstest]
    #[case::zero_requeue(
        ControllerArgs { requeue_after_secs: 0, ..Default::default() },
        "requeue-after-secs must be greater than zero"
    )]
    #[case::zero_health_timeout(
        ControllerArgs { health_timeout_secs: 0, ..Default::default() },
        "health-timeout-secs must be greater than zero"
    )]
    #[case::blank_namespace(
        ControllerArgs { namespace: Some(" ".to_string()), ..Default::default() },
        "namespace must not be empty when set"
    )]
    #[case::unknown_log_format(
        ControllerArgs { log_format: "xml".to_string(), ..Default::default() },
        "unknown log format 'xml' (expected json or text)"
    )]
    fn invalid_arguments_are_rejected(#[case] args: ControllerArgs, #[case] expected: &str) {
        let err = OperatorConfig::try_from(args).unwrap_err();
        assert_eq!(err.to_string(), expected);
    }
}
