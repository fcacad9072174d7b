//! Trunk CLI commands
//!
//! Handles: pbxadm trunk list/show/add/update/remove

use clap::{Args, Subcommand};

use pbxadm_core::entity::{NewTrunk, TrunkSummary, TrunkUpdate};
use pbxadm_core::EntityRegistry;

use super::{yes_no, Output};

/// Trunk commands
#[derive(Subcommand)]
pub enum TrunkCommands {
    /// List all trunks
    List,
    /// Show one trunk
    Show {
        /// Trunk name
        name: String,
    },
    /// Add a trunk
    Add(TrunkAddArgs),
    /// Change a trunk
    Update(TrunkUpdateArgs),
    /// Remove a trunk and all of its stanzas
    Remove {
        /// Trunk name
        name: String,
    },
}

/// Arguments for `pbxadm trunk add`
#[derive(Args)]
pub struct TrunkAddArgs {
    /// Trunk name
    pub name: String,

    /// Provider host name or address
    #[arg(long)]
    pub host: String,

    /// Provider SIP port
    #[arg(long, default_value_t = 5060)]
    pub port: u16,

    /// Account user name
    #[arg(long)]
    pub username: String,

    /// Account password
    #[arg(long)]
    pub secret: String,

    /// Dialplan context for inbound calls
    #[arg(long, default_value = "from-trunk")]
    pub context: String,

    /// Allowed codecs, comma separated
    #[arg(long, default_value = "ulaw,alaw")]
    pub codecs: String,

    /// Register with the provider
    #[arg(long)]
    pub register: bool,
}

impl TrunkAddArgs {
    fn to_spec(&self) -> NewTrunk {
        NewTrunk {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            secret: self.secret.clone(),
            context: self.context.clone(),
            codecs: self.codecs.clone(),
            register: self.register,
        }
    }
}

/// Arguments for `pbxadm trunk update`
#[derive(Args)]
pub struct TrunkUpdateArgs {
    /// Trunk name
    pub name: String,

    /// New provider host
    #[arg(long)]
    pub host: Option<String>,

    /// New provider port
    #[arg(long)]
    pub port: Option<u16>,

    /// New account user name
    #[arg(long)]
    pub username: Option<String>,

    /// New account password
    #[arg(long)]
    pub secret: Option<String>,

    /// New dialplan context
    #[arg(long)]
    pub context: Option<String>,
}

/// Execute trunk command
pub fn execute(cmd: TrunkCommands, registry: &EntityRegistry, output: &Output) -> anyhow::Result<()> {
    let ops = registry.trunks().dry_run(output.dry_run());
    match cmd {
        TrunkCommands::List => {
            let items = ops.list()?;
            output.data(&format!("{} trunk(s)", items.len()), &items, || {
                if items.is_empty() {
                    println!("No trunks found.");
                }
                for item in &items {
                    println!(
                        "  {:<16} {:<24} register={}",
                        item.name,
                        endpoint_address(item),
                        yes_no(item.registers)
                    );
                }
            })
        }
        TrunkCommands::Show { name } => {
            let summary = ops.read(&name)?;
            output.data(&format!("Trunk {name}"), &summary, || {
                println!("Trunk:     {}", summary.name);
                println!("Address:   {}", endpoint_address(&summary));
                println!("Username:  {}", summary.username.as_deref().unwrap_or("-"));
                println!("Context:   {}", summary.context.as_deref().unwrap_or("-"));
                println!("Codecs:    {}", summary.codecs.as_deref().unwrap_or("-"));
                println!("Registers: {}", yes_no(summary.registers));
                if !summary.complete {
                    println!("Warning:   trunk is missing stanzas");
                }
            })
        }
        TrunkCommands::Add(args) => output.outcome(&ops.create(&args.to_spec())?),
        TrunkCommands::Update(args) => {
            let update = TrunkUpdate {
                host: args.host,
                port: args.port,
                username: args.username,
                secret: args.secret,
                context: args.context,
            };
            output.outcome(&ops.update(&args.name, &update)?)
        }
        TrunkCommands::Remove { name } => output.outcome(&ops.delete(&name)?),
    }
}

fn endpoint_address(summary: &TrunkSummary) -> String {
    match (&summary.host, summary.port) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.clone(),
        _ => "-".to_string(),
    }
}
