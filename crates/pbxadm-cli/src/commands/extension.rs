//! Extension CLI commands
//!
//! Handles: pbxadm extension list/show/add/update/remove

use clap::{Args, Subcommand};

use pbxadm_core::entity::{ExtensionSummary, ExtensionUpdate, NewExtension};
use pbxadm_core::EntityRegistry;

use super::{yes_no, Output};

/// Extension commands
#[derive(Subcommand)]
pub enum ExtensionCommands {
    /// List all extensions
    List,
    /// Show one extension
    Show {
        /// Extension number
        number: String,
    },
    /// Add an extension
    Add(ExtensionAddArgs),
    /// Change an extension
    Update(ExtensionUpdateArgs),
    /// Remove an extension and all of its stanzas
    Remove {
        /// Extension number
        number: String,
    },
}

/// Arguments for `pbxadm extension add`
#[derive(Args)]
pub struct ExtensionAddArgs {
    /// Extension number (3-5 digits)
    pub number: String,

    /// SIP password
    #[arg(long)]
    pub secret: String,

    /// Display name for caller ID
    #[arg(long)]
    pub name: Option<String>,

    /// Dialplan context
    #[arg(long, default_value = "from-internal")]
    pub context: String,

    /// Allowed codecs, comma separated
    #[arg(long, default_value = "ulaw,alaw")]
    pub codecs: String,

    /// Maximum registered contacts
    #[arg(long, default_value_t = 1)]
    pub max_contacts: u32,
}

impl ExtensionAddArgs {
    fn to_spec(&self) -> NewExtension {
        NewExtension {
            number: self.number.clone(),
            secret: self.secret.clone(),
            display_name: self.name.clone(),
            context: self.context.clone(),
            codecs: self.codecs.clone(),
            max_contacts: self.max_contacts,
        }
    }
}

/// Arguments for `pbxadm extension update`
#[derive(Args)]
pub struct ExtensionUpdateArgs {
    /// Extension number
    pub number: String,

    /// New SIP password
    #[arg(long)]
    pub secret: Option<String>,

    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New dialplan context
    #[arg(long)]
    pub context: Option<String>,

    /// New contact limit
    #[arg(long)]
    pub max_contacts: Option<u32>,
}

/// Execute extension command
pub fn execute(
    cmd: ExtensionCommands,
    registry: &EntityRegistry,
    output: &Output,
) -> anyhow::Result<()> {
    let ops = registry.extensions().dry_run(output.dry_run());
    match cmd {
        ExtensionCommands::List => {
            let items = ops.list()?;
            output.data(&format!("{} extension(s)", items.len()), &items, || {
                if items.is_empty() {
                    println!("No extensions found.");
                }
                for item in &items {
                    print_row(item);
                }
            })
        }
        ExtensionCommands::Show { number } => {
            let summary = ops.read(&number)?;
            output.data(&format!("Extension {number}"), &summary, || print_detail(&summary))
        }
        ExtensionCommands::Add(args) => output.outcome(&ops.create(&args.to_spec())?),
        ExtensionCommands::Update(args) => {
            let update = ExtensionUpdate {
                secret: args.secret,
                display_name: args.name,
                context: args.context,
                max_contacts: args.max_contacts,
            };
            output.outcome(&ops.update(&args.number, &update)?)
        }
        ExtensionCommands::Remove { number } => output.outcome(&ops.delete(&number)?),
    }
}

fn print_row(item: &ExtensionSummary) {
    let incomplete = if item.complete { "" } else { "  (incomplete)" };
    println!(
        "  {:<6} {:<28} {}{incomplete}",
        item.number,
        item.callerid.as_deref().unwrap_or("-"),
        item.context.as_deref().unwrap_or("-"),
    );
}

fn print_detail(summary: &ExtensionSummary) {
    println!("Extension:    {}", summary.number);
    println!("Caller ID:    {}", summary.callerid.as_deref().unwrap_or("-"));
    println!("Context:      {}", summary.context.as_deref().unwrap_or("-"));
    println!("Codecs:       {}", summary.codecs.as_deref().unwrap_or("-"));
    if let Some(max) = summary.max_contacts {
        println!("Max contacts: {max}");
    }
    println!("Secret set:   {}", yes_no(summary.has_secret));
    let roles: Vec<&str> = summary.roles.iter().map(|r| r.as_str()).collect();
    println!("Stanzas:      {}", roles.join(", "));
}
