//! Caller-ID policy on an endpoint stanza

use serde::{Deserialize, Serialize};

use super::{
    flag, parse_flag, require_stanza, set_value, toggle_value, EntityKind, EntityRegistry,
    ManagedFile, Mutation, OperationOutcome, OperationType,
};
use crate::document::{ConfigDocument, StanzaRole};
use crate::error::{AdminError, AdminResult};
use crate::plan::check_directive;
use crate::reload::Subsystem;

const KIND: &str = "endpoint";
const OVERRIDE_KEY: &str = "from_user";

/// Caller-ID related settings of one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdPolicy {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callerid: Option<String>,
    /// Value of `from_user`, even when commented out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_pai: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_rpid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_id_outbound: Option<bool>,
    /// `from_user` is present and not commented out
    pub override_active: bool,
}

/// Fields to set; unset fields are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerIdUpdate {
    pub callerid: Option<String>,
    pub from_user: Option<String>,
    pub send_pai: Option<bool>,
    pub send_rpid: Option<bool>,
    pub trust_id_outbound: Option<bool>,
}

impl CallerIdUpdate {
    fn validate(&self) -> AdminResult<()> {
        if self.callerid.is_none()
            && self.from_user.is_none()
            && self.send_pai.is_none()
            && self.send_rpid.is_none()
            && self.trust_id_outbound.is_none()
        {
            return Err(AdminError::Validation("nothing to update".into()));
        }
        if let Some(callerid) = &self.callerid {
            if callerid.trim().is_empty() {
                return Err(AdminError::Validation("callerid cannot be empty".into()));
            }
            check_directive("callerid", callerid)?;
        }
        if let Some(user) = &self.from_user {
            if user.is_empty() || user.chars().any(|c| c.is_whitespace() || matches!(c, ';' | '"' | '@')) {
                return Err(AdminError::Validation(format!("invalid from_user '{user}'")));
            }
        }
        Ok(())
    }
}

/// Caller-ID operations against endpoint stanzas in `pjsip.conf`
pub struct CallerIdOps<'a> {
    registry: &'a EntityRegistry,
    dry_run: bool,
}

impl<'a> CallerIdOps<'a> {
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

    /// # Errors
    /// `NotFound` if no endpoint stanza has that name
    pub fn read(&self, endpoint: &str) -> AdminResult<CallerIdPolicy> {
        let doc = self.registry.document(ManagedFile::Pjsip)?;
        policy(&doc, endpoint)
    }

    /// Set any subset of the policy fields. Setting `from_user` while the
    /// override is commented out re-enables it.
    ///
    /// # Errors
    /// `Validation` for an empty or malformed update, `NotFound` if the
    /// endpoint does not exist
    pub fn update(&self, endpoint: &str, update: &CallerIdUpdate) -> AdminResult<OperationOutcome> {
        update.validate()?;

        self.registry.mutate(self.mutation(OperationType::Update, endpoint), |doc| {
            let stanza = require_stanza(&doc, endpoint, Some(StanzaRole::Endpoint), KIND)?;
            let override_disabled = stanza.last_directive(OVERRIDE_KEY).is_none()
                && stanza.last_directive_any(OVERRIDE_KEY).is_some();

            let mut doc = doc;
            let role = Some(StanzaRole::Endpoint);
            if let Some(callerid) = &update.callerid {
                doc = set_value(doc, endpoint, role, "callerid", callerid, "=")?;
            }
            if let Some(user) = &update.from_user {
                if override_disabled {
                    doc = toggle_value(doc, endpoint, role, OVERRIDE_KEY, false)?;
                }
                doc = set_value(doc, endpoint, role, OVERRIDE_KEY, user, "=")?;
            }
            for (key, value) in [
                ("send_pai", update.send_pai),
                ("send_rpid", update.send_rpid),
                ("trust_id_outbound", update.trust_id_outbound),
            ] {
                if let Some(value) = value {
                    doc = set_value(doc, endpoint, role, key, flag(value), "=")?;
                }
            }
            Ok(doc)
        })
    }

    /// Comment `from_user` in (`active = true`) or out
    ///
    /// # Errors
    /// `NotFound` if the endpoint or its `from_user` line is missing
    pub fn set_override(&self, endpoint: &str, active: bool) -> AdminResult<OperationOutcome> {
        let operation = if active {
            OperationType::Enable
        } else {
            OperationType::Disable
        };
        self.registry.mutate(self.mutation(operation, endpoint), |doc| {
            require_stanza(&doc, endpoint, Some(StanzaRole::Endpoint), KIND)?;
            toggle_value(doc, endpoint, Some(StanzaRole::Endpoint), OVERRIDE_KEY, !active)
        })
    }

    fn mutation(&self, operation: OperationType, endpoint: &str) -> Mutation {
        Mutation {
            operation,
            kind: EntityKind::CallerId,
            name: endpoint.to_string(),
            file: ManagedFile::Pjsip,
            reloads: vec![Subsystem::Endpoints],
            dry_run: self.dry_run,
        }
    }
}

fn policy(doc: &ConfigDocument, endpoint: &str) -> AdminResult<CallerIdPolicy> {
    let stanza = require_stanza(doc, endpoint, Some(StanzaRole::Endpoint), KIND)?;
    let from_user = stanza
        .last_directive(OVERRIDE_KEY)
        .or_else(|| stanza.last_directive_any(OVERRIDE_KEY));
    Ok(CallerIdPolicy {
        endpoint: endpoint.to_string(),
        callerid: stanza.value("callerid").map(str::to_string),
        from_user: from_user.map(|d| d.value.clone()),
        send_pai: stanza.value("send_pai").and_then(parse_flag),
        send_rpid: stanza.value("send_rpid").and_then(parse_flag),
        trust_id_outbound: stanza.value("trust_id_outbound").and_then(parse_flag),
        override_active: stanza.last_directive(OVERRIDE_KEY).is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::OperationState;
    use crate::settings::AdminSettings;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    const PJSIP: &str = "\
[voip]
type=endpoint
context=from-trunk
from_user=acct42
send_pai=yes

[voip]
type=identify
match=10.0.0.1
";

    fn setup() -> (TempDir, EntityRegistry) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        let mut settings = AdminSettings::for_directory(dir.path());
        settings.reload.commands = BTreeMap::from([(
            Subsystem::Endpoints,
            vec!["sh".into(), "-c".into(), "echo ok".into()],
        )]);
        (dir, EntityRegistry::new(settings))
    }

    fn read(dir: &TempDir) -> String {
        fs::read_to_string(dir.path().join("pjsip.conf")).unwrap()
    }

    #[test]
    fn test_read_policy() {
        let (_dir, registry) = setup();
        let policy = registry.caller_id().read("voip").unwrap();
        assert_eq!(policy.from_user.as_deref(), Some("acct42"));
        assert_eq!(policy.send_pai, Some(true));
        assert_eq!(policy.send_rpid, None);
        assert!(policy.override_active);
        assert_eq!(registry.caller_id().read("vo").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_override_toggle_is_idempotent() {
        let (dir, registry) = setup();
        registry.caller_id().set_override("voip", false).unwrap();
        assert!(read(&dir).contains("; disabled by pbxadm: from_user\n;from_user=acct42\n"));
        assert!(!registry.caller_id().read("voip").unwrap().override_active);

        let again = registry.caller_id().set_override("voip", false).unwrap();
        assert_eq!(again.state, OperationState::Unchanged);

        registry.caller_id().set_override("voip", true).unwrap();
        assert_eq!(read(&dir), PJSIP);
    }

    #[test]
    fn test_override_follows_active_line_over_later_comment() {
        let dir = TempDir::new().unwrap();
        let text = "[voip]\ntype=endpoint\nfrom_user=acct42\n;from_user=old\n";
        fs::write(dir.path().join("pjsip.conf"), text).unwrap();
        let mut settings = AdminSettings::for_directory(dir.path());
        settings.reload.commands = BTreeMap::from([(
            Subsystem::Endpoints,
            vec!["sh".into(), "-c".into(), "echo ok".into()],
        )]);
        let registry = EntityRegistry::new(settings);

        let policy = registry.caller_id().read("voip").unwrap();
        assert_eq!(policy.from_user.as_deref(), Some("acct42"));
        assert!(policy.override_active);

        let enable = registry.caller_id().set_override("voip", true).unwrap();
        assert_eq!(enable.state, OperationState::Unchanged);

        registry.caller_id().set_override("voip", false).unwrap();
        assert_eq!(
            read(&dir),
            "[voip]\ntype=endpoint\n; disabled by pbxadm: from_user\n;from_user=acct42\n;from_user=old\n"
        );
        assert!(!registry.caller_id().read("voip").unwrap().override_active);
    }

    #[test]
    fn test_update_subset() {
        let (dir, registry) = setup();
        let update = CallerIdUpdate {
            callerid: Some("\"Main Line\" <5551234>".into()),
            send_rpid: Some(false),
            ..CallerIdUpdate::default()
        };
        registry.caller_id().update("voip", &update).unwrap();
        let expected = PJSIP.replace(
            "send_pai=yes\n",
            "send_pai=yes\ncallerid=\"Main Line\" <5551234>\nsend_rpid=no\n",
        );
        assert_eq!(read(&dir), expected);
    }

    #[test]
    fn test_setting_from_user_reenables_override() {
        let (dir, registry) = setup();
        registry.caller_id().set_override("voip", false).unwrap();
        let update = CallerIdUpdate {
            from_user: Some("acct99".into()),
            ..CallerIdUpdate::default()
        };
        registry.caller_id().update("voip", &update).unwrap();
        assert_eq!(read(&dir), PJSIP.replace("acct42", "acct99"));
    }

    #[test]
    fn test_override_without_from_user() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), "[1000]\ntype=endpoint\n").unwrap();
        let registry = EntityRegistry::new(AdminSettings::for_directory(dir.path()));
        assert_eq!(
            registry.caller_id().set_override("1000", true).unwrap_err().code(),
            "NOT_FOUND"
        );
        assert_eq!(
            registry
                .caller_id()
                .update("1000", &CallerIdUpdate {
                    callerid: Some("\"Bad <1000>".into()),
                    ..CallerIdUpdate::default()
                })
                .unwrap_err()
                .code(),
            "VALIDATION_ERROR"
        );
    }
}
