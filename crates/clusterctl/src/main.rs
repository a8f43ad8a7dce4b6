use admin::{
    AdminResult, AdminSession, EditAuthParamsRequest, ExpelRequest, JoinRequest, ProbeRequest,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{AuthParams, ClientConfig, Inventory, Outcome};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Once;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let format =
            std::env::var("CLUSTERCTL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

        if format.eq_ignore_ascii_case("json") {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter.clone())
                .with_target(true)
                .with_writer(std::io::stderr)
                .json()
                .flatten_event(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
    });
}

#[derive(Parser)]
#[command(name = "clusterctl")]
#[command(about = "Cluster administration utility", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// YAML client configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Base URL of the control instance (overrides config and environment)
    #[arg(long, global = true)]
    admin_url: Option<String>,
    /// Console socket of the local instance
    #[arg(long, global = true)]
    console_socket: Option<PathBuf>,
    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Admin(AdminCommand),
    /// Inspect a YAML inventory without contacting the cluster
    Inventory {
        #[command(subcommand)]
        command: InventoryCommand,
    },
}

#[derive(Subcommand)]
enum AdminCommand {
    /// Register an instance with the control instance
    Probe {
        /// Advertise URI of the instance (host:port)
        uri: String,
    },
    /// Join an instance to a replicaset
    Join(JoinArgs),
    /// Expel an instance from the cluster
    Expel {
        /// Instance UUID
        uuid: String,
    },
    /// Check the health of the local instance
    Health,
    /// Check whether a snapshot is being written
    SnapshotState,
    /// Print the replicaset topology
    Topology,
    /// Read or edit session authentication settings
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Bootstrap vshard routing
    BootstrapVshard,
}

#[derive(Args)]
struct JoinArgs {
    /// Advertise URI of the instance (host:port)
    uri: String,
    /// Comma-separated roles to enable on the replicaset
    #[arg(long, value_delimiter = ',')]
    roles: Option<Vec<String>>,
    #[arg(long)]
    replicaset: Option<String>,
    #[arg(long)]
    replicaset_uuid: Option<Uuid>,
    #[arg(long)]
    instance_uuid: Option<Uuid>,
    #[arg(long)]
    vshard_group: Option<String>,
    #[arg(long)]
    zone: Option<String>,
    /// Replicaset weight for vshard rebalancing
    #[arg(long)]
    weight: Option<f64>,
}

impl JoinArgs {
    fn into_request(self) -> AdminResult<JoinRequest> {
        // `--roles ""` is an explicitly empty list.
        let roles = self.roles.map(|roles| match roles.as_slice() {
            [only] if only.is_empty() => Vec::new(),
            _ => roles,
        });
        let mut request = JoinRequest::new(&self.uri, roles)?;
        if let Some(alias) = self.replicaset {
            request = request.with_replicaset_alias(alias);
        }
        if let Some(uuid) = self.replicaset_uuid {
            request = request.with_replicaset_uuid(uuid);
        }
        if let Some(uuid) = self.instance_uuid {
            request = request.with_instance_uuid(uuid);
        }
        if let Some(group) = self.vshard_group {
            request = request.with_vshard_group(group);
        }
        if let Some(zone) = self.zone {
            request = request.with_zone(zone);
        }
        if let Some(weight) = self.weight {
            request = request.with_weight(weight)?;
        }
        Ok(request)
    }
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Print the current settings
    Get,
    /// Update only the given settings
    Edit {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        cookie_max_age: Option<u64>,
        #[arg(long)]
        cookie_renew_age: Option<u64>,
    },
}

#[derive(Subcommand)]
enum InventoryCommand {
    /// Instance names per machine, expelled instances omitted
    Group {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Replicaset roles and members
    Replicasets {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Render the config section of one instance
    Render {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        app: String,
        #[arg(long)]
        instance: String,
    },
}

/// File, then environment, then command-line flags.
fn resolve_config(cli: &ConnectionArgs) -> Result<ClientConfig> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(url) = &cli.admin_url {
        config.admin_url = url.clone();
    }
    if let Some(path) = &cli.console_socket {
        config.console_socket = Some(path.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

fn dispatch(session: &AdminSession, command: AdminCommand) -> AdminResult<Outcome> {
    Ok(match command {
        AdminCommand::Probe { uri } => session.probe(&ProbeRequest::new(&uri)?),
        AdminCommand::Join(args) => session.set_roles(&args.into_request()?),
        AdminCommand::Expel { uuid } => session.expel(&ExpelRequest::new(&uuid)?),
        AdminCommand::Health => session.check_health(),
        AdminCommand::SnapshotState => session.check_snapshot_state(),
        AdminCommand::Topology => session.get_topology(),
        AdminCommand::Auth {
            command: AuthCommand::Get,
        } => session.get_auth_params(),
        AdminCommand::Auth {
            command:
                AuthCommand::Edit {
                    enabled,
                    cookie_max_age,
                    cookie_renew_age,
                },
        } => session.edit_auth_params(&EditAuthParamsRequest::new(AuthParams {
            enabled,
            cookie_max_age,
            cookie_renew_age,
        })?),
        AdminCommand::BootstrapVshard => session.bootstrap_vshard(),
    })
}

fn load_inventory(path: &Path) -> Result<Inventory> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read inventory {}", path.display()))?;
    Ok(Inventory::from_yaml(&text)?)
}

fn run_inventory_command(command: InventoryCommand) -> Result<()> {
    match command {
        InventoryCommand::Group { file } => {
            let inventory = load_inventory(&file)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&inventory.group_by_machine())?
            );
        }
        InventoryCommand::Replicasets { file } => {
            let inventory = load_inventory(&file)?;
            println!("{}", serde_json::to_string_pretty(&inventory.replicasets()?)?);
        }
        InventoryCommand::Render {
            file,
            app,
            instance,
        } => {
            let inventory = load_inventory(&file)?;
            print!("{}", inventory.render_instance_config(&app, &instance)?);
        }
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Inventory { command } => {
            run_inventory_command(command)?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Admin(command) => command,
    };

    let config = resolve_config(&cli.connection)?;
    tracing::debug!(admin_url = %config.admin_url, console = ?config.console_socket, "resolved client config");
    let outcome = match AdminSession::from_config(&config) {
        Ok(session) => dispatch(&session, command).unwrap_or_else(Outcome::from),
        Err(err) => Outcome::from(err),
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
