//! Feature code CLI commands
//!
//! Handles: pbxadm feature list/show/set/enable/disable/reset

use clap::Subcommand;

use pbxadm_core::entity::FeatureCode;
use pbxadm_core::EntityRegistry;

use super::Output;

/// Feature code commands
#[derive(Subcommand)]
pub enum FeatureCommands {
    /// List known features with their codes
    List,
    /// Show one feature
    Show {
        /// Feature name, e.g. blindxfer
        name: String,
    },
    /// Set a feature's code and enable it
    Set {
        /// Feature name
        name: String,
        /// Digits, '*' and '#'
        code: String,
    },
    /// Enable a feature
    Enable {
        /// Feature name
        name: String,
    },
    /// Disable a feature by commenting it out
    Disable {
        /// Feature name
        name: String,
    },
    /// Restore a feature's stock code
    Reset {
        /// Feature name
        name: String,
    },
}

/// Execute feature command
pub fn execute(
    cmd: FeatureCommands,
    registry: &EntityRegistry,
    output: &Output,
) -> anyhow::Result<()> {
    let ops = registry.features().dry_run(output.dry_run());
    match cmd {
        FeatureCommands::List => {
            let items = ops.list()?;
            output.data(&format!("{} feature(s)", items.len()), &items, || {
                for item in &items {
                    print_row(item);
                }
            })
        }
        FeatureCommands::Show { name } => {
            let item = ops.read(&name)?;
            output.data(&format!("Feature {name}"), &item, || print_row(&item))
        }
        FeatureCommands::Set { name, code } => output.outcome(&ops.set_code(&name, &code)?),
        FeatureCommands::Enable { name } => output.outcome(&ops.enable(&name)?),
        FeatureCommands::Disable { name } => output.outcome(&ops.disable(&name)?),
        FeatureCommands::Reset { name } => output.outcome(&ops.reset(&name)?),
    }
}

fn print_row(item: &FeatureCode) {
    let state = if item.enabled { "enabled" } else { "disabled" };
    println!(
        "  {:<12} {:<8} {:<9} (default {})",
        item.name,
        item.code.as_deref().unwrap_or("-"),
        state,
        item.default_code
    );
}
