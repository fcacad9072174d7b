//! Voicemail CLI commands
//!
//! Handles: pbxadm voicemail list/show/add/update/remove

use clap::{Args, Subcommand};

use pbxadm_core::entity::{MailboxUpdate, NewMailbox};
use pbxadm_core::EntityRegistry;

use super::Output;

/// Voicemail commands
#[derive(Subcommand)]
pub enum VoicemailCommands {
    /// List mailboxes in the configured context
    List,
    /// Show one mailbox
    Show {
        /// Mailbox number
        mailbox: String,
    },
    /// Add a mailbox for an existing extension
    Add(MailboxAddArgs),
    /// Change a mailbox
    Update(MailboxUpdateArgs),
    /// Remove a mailbox
    Remove {
        /// Mailbox number
        mailbox: String,
    },
}

/// Arguments for `pbxadm voicemail add`
#[derive(Args)]
pub struct MailboxAddArgs {
    /// Mailbox number; must match an extension
    pub mailbox: String,

    /// Numeric PIN
    #[arg(long)]
    pub pin: String,

    /// Owner's full name
    #[arg(long)]
    pub name: String,

    /// Notification address
    #[arg(long)]
    pub email: Option<String>,
}

/// Arguments for `pbxadm voicemail update`
#[derive(Args)]
pub struct MailboxUpdateArgs {
    /// Mailbox number
    pub mailbox: String,

    /// New PIN
    #[arg(long)]
    pub pin: Option<String>,

    /// New full name
    #[arg(long)]
    pub name: Option<String>,

    /// New notification address; empty clears it
    #[arg(long)]
    pub email: Option<String>,
}

/// Execute voicemail command
pub fn execute(
    cmd: VoicemailCommands,
    registry: &EntityRegistry,
    output: &Output,
) -> anyhow::Result<()> {
    let ops = registry.voicemail().dry_run(output.dry_run());
    match cmd {
        VoicemailCommands::List => {
            let items = ops.list()?;
            output.data(&format!("{} mailbox(es)", items.len()), &items, || {
                if items.is_empty() {
                    println!("No mailboxes found.");
                }
                for item in &items {
                    println!(
                        "  {:<6} {:<24} {}",
                        item.mailbox,
                        item.full_name,
                        item.email.as_deref().unwrap_or("-")
                    );
                }
            })
        }
        VoicemailCommands::Show { mailbox } => {
            let summary = ops.read(&mailbox)?;
            output.data(&format!("Mailbox {mailbox}"), &summary, || {
                println!("Mailbox: {}@{}", summary.mailbox, summary.context);
                println!("Name:    {}", summary.full_name);
                println!("Email:   {}", summary.email.as_deref().unwrap_or("-"));
            })
        }
        VoicemailCommands::Add(args) => {
            let mut spec = NewMailbox::new(args.mailbox, args.pin, args.name);
            if let Some(email) = args.email {
                spec = spec.with_email(email);
            }
            output.outcome(&ops.create(&spec)?)
        }
        VoicemailCommands::Update(args) => {
            let update = MailboxUpdate {
                pin: args.pin,
                full_name: args.name,
                email: args.email,
            };
            output.outcome(&ops.update(&args.mailbox, &update)?)
        }
        VoicemailCommands::Remove { mailbox } => output.outcome(&ops.delete(&mailbox)?),
    }
}
