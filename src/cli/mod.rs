use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::apply::CleanupPolicy;
use crate::config::ReleaseBundleConfig;
use crate::manifest::SchemaVersion;

pub mod commands;

#[derive(Parser)]
#[command(name = "release-bundle")]
#[command(about = "Export releases into portable bundles and apply them elsewhere")]
#[command(long_about = "release-bundle packages a successful release (version, images, tags) into a \
                       self-describing archive with 'create', and recreates it under another application \
                       with 'apply'. Use 'inspect' to check a bundle offline.")]
pub struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true, help = "Emit structured JSON logs on stderr")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a bundle from a successful release
    Create {
        /// Id of the release to export
        release_id: u64,
        /// Write the bundle to this file instead of stdout
        #[arg(short, long, help = "Output file (defaults to stdout)")]
        output: Option<PathBuf>,
        /// Schema label to write into the bundle
        #[arg(long, help = "Manifest schema label: v1, v2 or v3")]
        schema: Option<SchemaVersion>,
    },
    /// Recreate the release in a bundle under another application
    Apply {
        /// Id of the destination application
        application_id: u64,
        /// Path of the bundle file
        bundle: PathBuf,
        /// Overwrite an existing successful release with the same identity
        #[arg(long, help = "Replace an existing release with the same version or commit")]
        force: bool,
        /// Version to give the new release instead of the manifest's
        #[arg(long, help = "Semantic version overriding the one in the manifest")]
        release_version: Option<String>,
        /// Schema to read the manifest with
        #[arg(long, help = "Manifest schema: v1, v2 or v3 (defaults to the bundle label)")]
        schema: Option<SchemaVersion>,
        /// What to remove from a stale release when forcing
        #[arg(long, help = "Cleanup policy for --force: join_rows_only or cascade")]
        cleanup_policy: Option<CleanupPolicy>,
    },
    /// Read and validate a bundle without contacting the remote store
    Inspect {
        /// Path of the bundle file
        bundle: PathBuf,
        /// Schema to read the manifest with
        #[arg(long, help = "Manifest schema: v1, v2 or v3 (defaults to the bundle label)")]
        schema: Option<SchemaVersion>,
    },
}

impl Commands {
    /// Whether the command talks to the remote store
    pub fn needs_remote(&self) -> bool {
        !matches!(self, Commands::Inspect { .. })
    }
}

/// Configuration to run `command` with.
///
/// Offline commands (and the usage screen) fall back to defaults when the
/// configuration files cannot be loaded.
pub fn effective_config(
    command: Option<&Commands>,
    loaded: Result<ReleaseBundleConfig>,
) -> Result<ReleaseBundleConfig> {
    match loaded {
        Ok(config) => Ok(config),
        Err(e) if command.is_some_and(Commands::needs_remote) => Err(e),
        Err(e) => {
            eprintln!("⚠️  Ignoring configuration: {e}");
            Ok(ReleaseBundleConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_parses_all_flags() {
        let cli = Cli::try_parse_from([
            "release-bundle",
            "apply",
            "12",
            "release.tar",
            "--force",
            "--release-version",
            "2.0.0",
            "--schema",
            "v3",
            "--cleanup-policy",
            "cascade",
            "--json-logs",
        ])
        .unwrap();

        assert!(cli.json_logs);
        match cli.command {
            Some(Commands::Apply {
                application_id,
                bundle,
                force,
                release_version,
                schema,
                cleanup_policy,
            }) => {
                assert_eq!(application_id, 12);
                assert_eq!(bundle, PathBuf::from("release.tar"));
                assert!(force);
                assert_eq!(release_version.as_deref(), Some("2.0.0"));
                assert_eq!(schema, Some(SchemaVersion::Revisioned));
                assert_eq!(cleanup_policy, Some(CleanupPolicy::Cascade));
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_unknown_schema_is_rejected() {
        assert!(Cli::try_parse_from(["release-bundle", "inspect", "b.tar", "--schema", "v9"]).is_err());
    }

    #[test]
    fn test_broken_config_only_blocks_remote_commands() {
        let inspect = Commands::Inspect {
            bundle: PathBuf::from("b.tar"),
            schema: None,
        };
        let config = effective_config(Some(&inspect), Err(anyhow::anyhow!("bad toml"))).unwrap();
        assert_eq!(config.apply.schema, SchemaVersion::default());
        assert!(effective_config(None, Err(anyhow::anyhow!("bad toml"))).is_ok());

        let create = Commands::Create {
            release_id: 1,
            output: None,
            schema: None,
        };
        let err = effective_config(Some(&create), Err(anyhow::anyhow!("bad toml"))).unwrap_err();
        assert_eq!(err.to_string(), "bad toml");
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["release-bundle"]).unwrap();
        assert!(cli.command.is_none());
    }
}
