//! Voicemail boxes: `mailbox => pin,full name,email` directives inside the
//! configured context stanza of `voicemail.conf`

use serde::{Deserialize, Serialize};

use super::extension::endpoint_exists;
use super::{apply, EntityKind, EntityRegistry, ManagedFile, Mutation, OperationOutcome, OperationType};
use crate::document::{ConfigDocument, Directive, SectionStanza};
use crate::error::{AdminError, AdminResult};
use crate::locate;
use crate::plan::{InsertionPoint, MutationPlanner, NewStanza};
use crate::reload::Subsystem;
use crate::util::{validate_extension_number, validate_pin, validate_text};

const KIND: &str = "voicemail";
const SEPARATOR: &str = " => ";

/// Fields for a new mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMailbox {
    /// Mailbox number; an extension with this number must exist
    pub mailbox: String,
    pub pin: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewMailbox {
    pub fn new(mailbox: impl Into<String>, pin: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            pin: pin.into(),
            full_name: full_name.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Fields to change on an existing mailbox; unset fields are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxUpdate {
    pub pin: Option<String>,
    pub full_name: Option<String>,
    /// Empty string clears the address
    pub email: Option<String>,
}

/// One mailbox as configured; the PIN is never echoed back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxSummary {
    pub mailbox: String,
    pub context: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub has_pin: bool,
}

struct MailboxValue {
    pin: String,
    full_name: String,
    email: Option<String>,
    /// Fields after the email (pager address, options), kept verbatim
    rest: Vec<String>,
}

impl MailboxValue {
    fn parse(value: &str) -> Self {
        let mut fields = value.split(',').map(str::trim);
        let pin = fields.next().unwrap_or_default().to_string();
        let full_name = fields.next().unwrap_or_default().to_string();
        let email = fields
            .next()
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        let rest = fields.map(str::to_string).collect();
        Self {
            pin,
            full_name,
            email,
            rest,
        }
    }

    fn render(&self) -> String {
        let mut fields = vec![self.pin.clone(), self.full_name.clone()];
        if self.email.is_some() || !self.rest.is_empty() {
            fields.push(self.email.clone().unwrap_or_default());
        }
        fields.extend(self.rest.iter().cloned());
        fields.join(",")
    }
}

/// Mailbox operations against `voicemail.conf`
pub struct VoicemailOps<'a> {
    registry: &'a EntityRegistry,
    dry_run: bool,
}

impl<'a> VoicemailOps<'a> {
    pub(crate) fn new(registry: &'a EntityRegistry) -> Self {
        Self {
            registry,
            dry_run: false,
        }
    }

    /// Plan and diff only
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Add a mailbox; creates the context stanza if it is missing
    ///
    /// # Errors
    /// `Validation` for malformed fields or a missing owner extension,
    /// `Conflict` if the mailbox already exists in the context
    pub fn create(&self, spec: &NewMailbox) -> AdminResult<OperationOutcome> {
        validate_extension_number(&spec.mailbox)?;
        validate_pin(&spec.pin, self.registry.settings().voicemail.pin_length)?;
        validate_text("full name", &spec.full_name, false)?;
        if let Some(email) = &spec.email {
            validate_email(email)?;
        }
        self.require_owner(&spec.mailbox)?;

        let context = self.context().to_string();
        let value = MailboxValue {
            pin: spec.pin.clone(),
            full_name: spec.full_name.clone(),
            email: spec.email.clone(),
            rest: Vec::new(),
        }
        .render();

        self.registry.mutate(self.mutation(OperationType::Create, &spec.mailbox), |doc| {
            let planner = MutationPlanner::new(&doc).with_separator(SEPARATOR);
            if locate_mailbox(&doc, &context, &spec.mailbox).is_some() {
                return Err(AdminError::conflict(KIND, &spec.mailbox));
            }
            let patch = match locate::find_one(&doc, &context, None) {
                None => planner.append_entity(
                    &[NewStanza::new(&context).with(&spec.mailbox, &value)],
                    &InsertionPoint::EndOfFile,
                )?,
                Some(stanza) => planner.append_directive(&stanza, &spec.mailbox, &value)?,
            };
            apply(&doc, &patch)
        })
    }

    /// # Errors
    /// `NotFound` if the mailbox is not in the context
    pub fn read(&self, mailbox: &str) -> AdminResult<MailboxSummary> {
        let doc = self.registry.document(ManagedFile::Voicemail)?;
        let directive = find_mailbox(&doc, self.context(), mailbox)?;
        Ok(self.summary(&directive))
    }

    /// Every mailbox in the context, in file order
    ///
    /// # Errors
    /// `Parse`/`Io` from the file
    pub fn list(&self) -> AdminResult<Vec<MailboxSummary>> {
        let doc = self.registry.document(ManagedFile::Voicemail)?;
        let stanzas = locate::find(&doc, self.context(), None);
        let directives: Vec<&Directive> = stanzas.iter().flat_map(|s| s.active()).collect();
        let mut seen: Vec<&str> = Vec::new();
        let mut boxes = Vec::new();
        for directive in directives.into_iter().rev() {
            if directive.key.bytes().all(|b| b.is_ascii_digit()) && !seen.contains(&directive.key.as_str()) {
                seen.push(&directive.key);
                boxes.push(self.summary(directive));
            }
        }
        boxes.reverse();
        Ok(boxes)
    }

    /// # Errors
    /// `Validation` for an empty or malformed update, `NotFound` if the
    /// mailbox does not exist
    pub fn update(&self, mailbox: &str, update: &MailboxUpdate) -> AdminResult<OperationOutcome> {
        if update.pin.is_none() && update.full_name.is_none() && update.email.is_none() {
            return Err(AdminError::Validation("nothing to update".into()));
        }
        if let Some(pin) = &update.pin {
            validate_pin(pin, self.registry.settings().voicemail.pin_length)?;
        }
        if let Some(name) = &update.full_name {
            validate_text("full name", name, false)?;
        }
        if let Some(email) = update.email.as_deref().filter(|e| !e.is_empty()) {
            validate_email(email)?;
        }

        let context = self.context().to_string();
        self.registry.mutate(self.mutation(OperationType::Update, mailbox), |doc| {
            let (stanza, directive) = locate_mailbox(&doc, &context, mailbox)
                .ok_or_else(|| AdminError::not_found(KIND, mailbox))?;
            let mut value = MailboxValue::parse(&directive.value);
            if let Some(pin) = &update.pin {
                value.pin.clone_from(pin);
            }
            if let Some(name) = &update.full_name {
                value.full_name.clone_from(name);
            }
            if let Some(email) = &update.email {
                value.email = Some(email.clone()).filter(|e| !e.is_empty());
            }

            let patch = MutationPlanner::new(&doc)
                .with_separator(SEPARATOR)
                .set_directive(&stanza, mailbox, &value.render())?;
            apply(&doc, &patch)
        })
    }

    /// # Errors
    /// `NotFound` if the mailbox does not exist
    pub fn delete(&self, mailbox: &str) -> AdminResult<OperationOutcome> {
        let context = self.context().to_string();
        self.registry.mutate(self.mutation(OperationType::Delete, mailbox), |doc| {
            let (stanza, _) = locate_mailbox(&doc, &context, mailbox)
                .ok_or_else(|| AdminError::not_found(KIND, mailbox))?;
            let patch = MutationPlanner::new(&doc).remove_directive(&stanza, mailbox)?;
            apply(&doc, &patch)
        })
    }

    fn context(&self) -> &str {
        &self.registry.settings().voicemail.context
    }

    fn require_owner(&self, mailbox: &str) -> AdminResult<()> {
        let pjsip = self.registry.document(ManagedFile::Pjsip)?;
        if endpoint_exists(&pjsip, mailbox) {
            Ok(())
        } else {
            Err(AdminError::Validation(format!(
                "extension {mailbox} does not exist"
            )))
        }
    }

    fn summary(&self, directive: &Directive) -> MailboxSummary {
        let value = MailboxValue::parse(&directive.value);
        MailboxSummary {
            mailbox: directive.key.clone(),
            context: self.context().to_string(),
            full_name: value.full_name,
            email: value.email,
            has_pin: !value.pin.is_empty(),
        }
    }

    fn mutation(&self, operation: OperationType, mailbox: &str) -> Mutation {
        Mutation {
            operation,
            kind: EntityKind::Voicemail,
            name: mailbox.to_string(),
            file: ManagedFile::Voicemail,
            reloads: vec![Subsystem::Voicemail],
            dry_run: self.dry_run,
        }
    }
}

/// Same-named context stanzas add up; the last active definition wins
fn locate_mailbox(
    doc: &ConfigDocument,
    context: &str,
    mailbox: &str,
) -> Option<(SectionStanza, Directive)> {
    locate::find(doc, context, None).into_iter().rev().find_map(|stanza| {
        let directive = stanza.last_directive(mailbox).cloned()?;
        Some((stanza, directive))
    })
}

fn find_mailbox(doc: &ConfigDocument, context: &str, mailbox: &str) -> AdminResult<Directive> {
    locate_mailbox(doc, context, mailbox)
        .map(|(_, directive)| directive)
        .ok_or_else(|| AdminError::not_found(KIND, mailbox))
}

fn validate_email(email: &str) -> AdminResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
        && !email.contains([',', ';', ' ', '"', '\n', '\r']);
    if valid {
        Ok(())
    } else {
        Err(AdminError::Validation(format!("invalid email '{email}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AdminSettings;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    const PJSIP: &str = "[1001]\ntype=endpoint\n\n[1002]\ntype=endpoint\n";
    const VOICEMAIL: &str = "[general]\nformat=wav49|wav\n\n[default]\n1001 => 1234,Alice,alice@example.com\n";

    fn setup(voicemail: &str) -> (TempDir, EntityRegistry) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        fs::write(dir.path().join("voicemail.conf"), voicemail).unwrap();
        let mut settings = AdminSettings::for_directory(dir.path());
        settings.reload.commands = BTreeMap::from([(
            Subsystem::Voicemail,
            vec!["sh".into(), "-c".into(), "echo ok".into()],
        )]);
        (dir, EntityRegistry::new(settings))
    }

    fn read(dir: &TempDir) -> String {
        fs::read_to_string(dir.path().join("voicemail.conf")).unwrap()
    }

    #[test]
    fn test_create_appends_to_context() {
        let (dir, registry) = setup(VOICEMAIL);
        registry
            .voicemail()
            .create(&NewMailbox::new("1002", "4321", "Bob"))
            .unwrap();
        assert_eq!(read(&dir), format!("{VOICEMAIL}1002 => 4321,Bob\n"));

        let summary = registry.voicemail().read("1002").unwrap();
        assert_eq!(summary.full_name, "Bob");
        assert!(summary.email.is_none());
    }

    #[test]
    fn test_create_creates_missing_context() {
        let (dir, registry) = setup("[general]\nformat=wav\n");
        registry
            .voicemail()
            .create(&NewMailbox::new("1001", "1111", "Alice").with_email("a@example.com"))
            .unwrap();
        assert_eq!(
            read(&dir),
            "[general]\nformat=wav\n\n[default]\n1001 => 1111,Alice,a@example.com\n"
        );
    }

    #[test]
    fn test_create_rejections() {
        let (dir, registry) = setup(VOICEMAIL);
        let ops = registry.voicemail();
        assert_eq!(
            ops.create(&NewMailbox::new("1001", "1234", "Dup")).unwrap_err().code(),
            "CONFLICT"
        );
        assert_eq!(
            ops.create(&NewMailbox::new("1003", "1234", "Nobody")).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            ops.create(&NewMailbox::new("1002", "12", "Short")).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            ops.create(&NewMailbox::new("1002", "1234", "Smith, Bob")).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(read(&dir), VOICEMAIL);
    }

    #[test]
    fn test_update_keeps_unchanged_fields() {
        let (dir, registry) = setup(VOICEMAIL);
        let update = MailboxUpdate {
            pin: Some("9999".into()),
            ..MailboxUpdate::default()
        };
        registry.voicemail().update("1001", &update).unwrap();
        assert_eq!(
            read(&dir),
            VOICEMAIL.replace("1234,Alice", "9999,Alice")
        );

        let clear = MailboxUpdate {
            email: Some(String::new()),
            ..MailboxUpdate::default()
        };
        registry.voicemail().update("1001", &clear).unwrap();
        assert!(read(&dir).ends_with("1001 => 9999,Alice\n"));
    }

    #[test]
    fn test_list_and_delete() {
        let (dir, registry) = setup(VOICEMAIL);
        registry
            .voicemail()
            .create(&NewMailbox::new("1002", "4321", "Bob"))
            .unwrap();
        let boxes: Vec<String> = registry
            .voicemail()
            .list()
            .unwrap()
            .into_iter()
            .map(|b| b.mailbox)
            .collect();
        assert_eq!(boxes, vec!["1001", "1002"]);

        registry.voicemail().delete("1002").unwrap();
        assert_eq!(read(&dir), VOICEMAIL);
        assert_eq!(registry.voicemail().delete("1002").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_split_context_is_one_namespace() {
        let split = "[default]\n1001 => 1111,Alice\n\n[default]\n1002 => 2222,Bob\n";
        let (dir, registry) = setup(split);
        let ops = registry.voicemail();
        assert_eq!(ops.read("1001").unwrap().full_name, "Alice");
        assert_eq!(
            ops.list().unwrap().into_iter().map(|b| b.mailbox).collect::<Vec<_>>(),
            vec!["1001", "1002"]
        );
        assert_eq!(
            ops.create(&NewMailbox::new("1001", "1234", "Dup")).unwrap_err().code(),
            "CONFLICT"
        );
        assert_eq!(read(&dir), split);

        let update = MailboxUpdate {
            full_name: Some("Alicia".into()),
            ..MailboxUpdate::default()
        };
        ops.update("1001", &update).unwrap();
        assert_eq!(read(&dir), split.replace("1111,Alice", "1111,Alicia"));

        ops.delete("1001").unwrap();
        assert_eq!(read(&dir), "[default]\n\n[default]\n1002 => 2222,Bob\n");
    }

    #[test]
    fn test_mailbox_value_keeps_extra_fields() {
        let value = MailboxValue::parse("1234,Alice,,pager@example.com,attach=yes");
        assert_eq!(value.email, None);
        assert_eq!(value.render(), "1234,Alice,,pager@example.com,attach=yes");
    }
}
