//! # cdn-publish CLI interface
//!
//! Argument parsing and command routing. Every command resolves its options (flag or
//! environment variable, then the `--config` file, then built-in defaults) and hands
//! over to a handler in [`crate::commands`]. All non-trivial logic lives in
//! `cdn-publish-core`.
//!
//! For programmatic or integration use, call [`run_with`] with a constructed [`Cli`],
//! a working directory and a [`Reporter`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use cdn_publish_core::error::CdnError;
use cdn_publish_core::report::{ConsoleReporter, Reporter};
use clap::{Args, Parser, Subcommand};

use crate::commands::{self, RunContext};
use crate::load_config::load_optional_config;

pub const UNAUTHORIZED_MESSAGE: &str = "HTTP response returned UNAUTHORIZED. Either missing or wrong access key in option -k or --storage-access-key|--api-key";

/// CLI for cdn-publish: publish packages to edge storage and manage pull zones.
#[derive(Parser, Debug)]
#[clap(
    name = "cdn-publish",
    version,
    about = "A client for the CDN storage and pull-zone API"
)]
pub struct Cli {
    /// Optional YAML file with defaults for every command
    #[clap(long, global = true, env = "CDN_CONFIG")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// The key to access the edge storage API
    #[clap(short = 'k', long = "storage-access-key", env = "CDN_STORAGE_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// Which storage zone to query
    #[clap(short = 's', long = "storage-zone-name", env = "CDN_STORAGE_ZONE_NAME")]
    pub zone_name: Option<String>,

    /// Base url to make API calls to [default: https://storage.bunnycdn.com]
    #[clap(short = 'u', long = "base-url", env = "CDN_STORAGE_BASE_URL")]
    pub base_url: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ApiArgs {
    /// The key to access the pull-zone API
    #[clap(short = 'k', long = "access-key", alias = "api-key", env = "CDN_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// Base url to make API calls to [default: https://api.bunny.net]
    #[clap(short = 'u', long = "base-url", env = "CDN_API_BASE_URL")]
    pub base_url: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UploadTuning {
    /// Compute SHA-256 checksums and let the server verify them
    #[clap(long)]
    pub checksum: bool,

    /// Number of files uploaded concurrently [default: 40]
    #[clap(short = 'b', long = "batch-size")]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PublishArgs {
    #[clap(flatten)]
    pub storage: StorageArgs,

    #[clap(flatten)]
    pub tuning: UploadTuning,

    /// Location of the package.json file
    #[clap(short = 'p', long)]
    pub project: Option<String>,

    /// Scope of the package; defaults to the `@scope/name` of package.json
    #[clap(long)]
    pub scope: Option<String>,

    /// Replace an existing version; a value also replaces the package.json version
    /// (useful for tags like `latest`)
    #[clap(long = "override-version", num_args = 0..=1, value_name = "TAG")]
    pub override_version: Option<Option<String>>,

    /// File matchers; defaults to the `files` of package.json
    pub files: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UploadArgs {
    #[clap(flatten)]
    pub storage: StorageArgs,

    #[clap(flatten)]
    pub tuning: UploadTuning,

    /// A directory to prepend to all pushed files
    #[clap(short = 'd', long)]
    pub dest: String,

    /// File matchers, directories or globs
    pub files: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push an npm-style package to the storage
    Publish(PublishArgs),

    /// Upload files under a directory of the storage
    Upload(UploadArgs),

    /// List the content of a remote directory
    List {
        #[clap(flatten)]
        storage: StorageArgs,
        dir: String,
    },

    /// Print the content of a remote file
    Get {
        #[clap(flatten)]
        storage: StorageArgs,
        file: String,
    },

    /// Delete a remote file or directory
    Delete {
        #[clap(flatten)]
        storage: StorageArgs,
        /// Do not fail when the delete fails
        #[clap(long)]
        avoid_throwing: bool,
        dir: String,
    },

    /// Pull zone related commands
    Pullzone {
        #[clap(subcommand)]
        command: PullzoneCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum PullzoneCommands {
    /// List the available pull zones
    List {
        #[clap(flatten)]
        api: ApiArgs,
        /// Query string to filter the results
        #[clap(short = 's', long)]
        search: Option<String>,
    },

    /// Purge every pull zone, or only `--zone`
    Purge {
        #[clap(flatten)]
        api: ApiArgs,
        /// Purge only this zone id
        #[clap(short = 'z', long)]
        zone: Option<u64>,
    },
}

/// Runs a parsed command in the current directory, printing to stdout.
pub async fn run(cli: Cli) -> Result<()> {
    let working_dir = std::env::current_dir()?;
    run_with(cli, working_dir, Arc::new(ConsoleReporter)).await
}

pub async fn run_with(cli: Cli, working_dir: PathBuf, reporter: Arc<dyn Reporter>) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_optional_config(cli.config.as_deref())?;
    let ctx = RunContext {
        working_dir,
        reporter,
        config,
    };

    let result = match cli.command {
        Commands::Publish(args) => commands::publish(args, &ctx).await,
        Commands::Upload(args) => commands::upload(args, &ctx).await,
        Commands::List { storage, dir } => commands::list(&storage, &dir, &ctx).await,
        Commands::Get { storage, file } => commands::get(&storage, &file, &ctx).await,
        Commands::Delete {
            storage,
            avoid_throwing,
            dir,
        } => commands::delete(&storage, &dir, avoid_throwing, &ctx).await,
        Commands::Pullzone { command } => match command {
            PullzoneCommands::List { api, search } => {
                commands::pullzone_list(&api, search.as_deref(), &ctx).await
            }
            PullzoneCommands::Purge { api, zone } => {
                commands::pullzone_purge(&api, zone, &ctx).await
            }
        },
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

/// User-facing rendering of a failed command.
pub fn describe_error(err: &anyhow::Error) -> String {
    let Some(cdn) = err.downcast_ref::<CdnError>() else {
        return format!("{err:#}");
    };
    if cdn.is_unauthorized() {
        return UNAUTHORIZED_MESSAGE.to_string();
    }
    let mut out = format!("{}: {}", cdn.kind(), cdn.message());
    if let Some(cause) = cdn.cause() {
        out.push_str(&format!("\n  caused by {}: {}", cause.kind(), cause.message()));
    }
    if let Some(response) = cdn.response() {
        if !response.body.is_empty() {
            out.push_str(&format!("\n  response ({}): {}", response.status, response.body));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdn_publish_core::error::{ErrorKind, ResponseInfo};

    #[test]
    fn override_version_accepts_an_optional_tag() {
        let cli = Cli::try_parse_from(["cdn-publish", "publish", "-k", "k", "--override-version"])
            .unwrap();
        match cli.command {
            Commands::Publish(args) => assert_eq!(args.override_version, Some(None)),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "cdn-publish",
            "publish",
            "--override-version",
            "latest",
        ])
        .unwrap();
        match cli.command {
            Commands::Publish(args) => {
                assert_eq!(args.override_version, Some(Some("latest".to_string())))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn upload_requires_a_destination() {
        assert!(Cli::try_parse_from(["cdn-publish", "upload", "a.txt"]).is_err());
        let cli = Cli::try_parse_from(["cdn-publish", "upload", "-d", "assets", "a.txt", "b/"])
            .unwrap();
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.dest, "assets");
                assert_eq!(args.files, vec!["a.txt", "b/"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn pullzone_purge_parses_zone_id() {
        let cli =
            Cli::try_parse_from(["cdn-publish", "pullzone", "purge", "--api-key", "k", "-z", "12"])
                .unwrap();
        match cli.command {
            Commands::Pullzone {
                command: PullzoneCommands::Purge { api, zone },
            } => {
                assert_eq!(api.access_key.as_deref(), Some("k"));
                assert_eq!(zone, Some(12));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unauthorized_errors_get_a_dedicated_message() {
        let err = CdnError::wrap(
            ErrorKind::UnableToGetFile,
            "unable to retrieve file",
            CdnError::new(ErrorKind::ResponseNotOk, "response not ok").with_response(
                ResponseInfo {
                    status: 401,
                    body: String::new(),
                },
            ),
        );
        assert_eq!(describe_error(&anyhow::Error::new(err)), UNAUTHORIZED_MESSAGE);
    }

    #[test]
    fn other_errors_show_kind_cause_and_body() {
        let err = CdnError::wrap(
            ErrorKind::UnableToGetFile,
            "unable to retrieve file",
            CdnError::new(ErrorKind::ResponseNotOk, "response not ok").with_response(
                ResponseInfo {
                    status: 404,
                    body: "Object Not Found".into(),
                },
            ),
        );
        let text = describe_error(&anyhow::Error::new(err));
        assert!(text.starts_with("UnableToGetFile: unable to retrieve file"));
        assert!(text.contains("caused by ResponseNotOk"));
        assert!(text.contains("response (404): Object Not Found"));
    }
}
