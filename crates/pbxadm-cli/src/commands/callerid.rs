//! Caller ID CLI commands
//!
//! Handles: pbxadm callerid show/update/override

use clap::builder::BoolishValueParser;
use clap::{Args, Subcommand, ValueEnum};

use pbxadm_core::entity::CallerIdUpdate;
use pbxadm_core::EntityRegistry;

use super::{yes_no, Output};

/// Caller ID commands
#[derive(Subcommand)]
pub enum CallerIdCommands {
    /// Show the caller ID policy of an endpoint
    Show {
        /// Endpoint name
        endpoint: String,
    },
    /// Change caller ID settings
    Update(CallerIdUpdateArgs),
    /// Turn the from_user override on or off
    Override {
        /// Endpoint name
        endpoint: String,
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Toggle {
    On,
    Off,
}

/// Arguments for `pbxadm callerid update`
#[derive(Args)]
pub struct CallerIdUpdateArgs {
    /// Endpoint name
    pub endpoint: String,

    /// Caller ID, e.g. '"Main Line" <5551234>'
    #[arg(long)]
    pub callerid: Option<String>,

    /// User part of the From header
    #[arg(long)]
    pub from_user: Option<String>,

    /// Send P-Asserted-Identity (yes/no)
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub send_pai: Option<bool>,

    /// Send Remote-Party-ID (yes/no)
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub send_rpid: Option<bool>,

    /// Pass identity to the far end (yes/no)
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub trust_id_outbound: Option<bool>,
}

/// Execute caller ID command
pub fn execute(
    cmd: CallerIdCommands,
    registry: &EntityRegistry,
    output: &Output,
) -> anyhow::Result<()> {
    let ops = registry.caller_id().dry_run(output.dry_run());
    match cmd {
        CallerIdCommands::Show { endpoint } => {
            let policy = ops.read(&endpoint)?;
            let flag = |v: Option<bool>| v.map_or("-", yes_no);
            output.data(&format!("Caller ID of {endpoint}"), &policy, || {
                println!("Endpoint:          {}", policy.endpoint);
                println!("Caller ID:         {}", policy.callerid.as_deref().unwrap_or("-"));
                println!(
                    "From user:         {} ({})",
                    policy.from_user.as_deref().unwrap_or("-"),
                    if policy.override_active { "active" } else { "inactive" }
                );
                println!("Send PAI:          {}", flag(policy.send_pai));
                println!("Send RPID:         {}", flag(policy.send_rpid));
                println!("Trust outbound ID: {}", flag(policy.trust_id_outbound));
            })
        }
        CallerIdCommands::Update(args) => {
            let update = CallerIdUpdate {
                callerid: args.callerid,
                from_user: args.from_user,
                send_pai: args.send_pai,
                send_rpid: args.send_rpid,
                trust_id_outbound: args.trust_id_outbound,
            };
            output.outcome(&ops.update(&args.endpoint, &update)?)
        }
        CallerIdCommands::Override { endpoint, state } => {
            output.outcome(&ops.set_override(&endpoint, matches!(state, Toggle::On))?)
        }
    }
}
