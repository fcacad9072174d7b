//! SIP trunks: optional registration plus auth, aor, endpoint and identify
//! stanzas sharing the trunk name

use serde::{Deserialize, Serialize};

use super::{
    apply, set_value, EntityKind, EntityRegistry, ManagedFile, Mutation, OperationOutcome,
    OperationType,
};
use crate::document::{ConfigDocument, SectionStanza, StanzaRole};
use crate::error::{AdminError, AdminResult};
use crate::locate;
use crate::plan::{InsertionPoint, MutationPlanner, NewStanza};
use crate::reload::Subsystem;
use crate::util::{
    validate_codecs, validate_context, validate_host, validate_secret, validate_trunk_name,
};

const KIND: &str = "trunk";
const DEFAULT_PORT: u16 = 5060;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_context() -> String {
    "from-trunk".to_string()
}

fn default_codecs() -> String {
    "ulaw,alaw".to_string()
}

/// Fields for a new trunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrunk {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub secret: String,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default = "default_codecs")]
    pub codecs: String,
    /// Register with the provider
    #[serde(default)]
    pub register: bool,
}

impl NewTrunk {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            secret: secret.into(),
            context: default_context(),
            codecs: default_codecs(),
            register: false,
        }
    }

    fn validate(&self) -> AdminResult<()> {
        validate_trunk_name(&self.name)?;
        validate_host(&self.host)?;
        validate_port(self.port)?;
        validate_username(&self.username)?;
        validate_secret(&self.secret)?;
        validate_context(&self.context)?;
        validate_codecs(&self.codecs)
    }

    fn stanzas(&self) -> Vec<NewStanza> {
        let name = &self.name;
        let server = server_uri(&self.host, self.port);
        let mut stanzas = Vec::with_capacity(5);
        if self.register {
            stanzas.push(
                NewStanza::new(name)
                    .with("type", "registration")
                    .with("outbound_auth", name)
                    .with("server_uri", &server)
                    .with("client_uri", client_uri(&self.username, &self.host, self.port))
                    .with("retry_interval", "60"),
            );
        }
        stanzas.push(
            NewStanza::new(name)
                .with("type", "auth")
                .with("auth_type", "userpass")
                .with("username", &self.username)
                .with("password", &self.secret),
        );
        stanzas.push(
            NewStanza::new(name)
                .with("type", "aor")
                .with("contact", &server)
                .with("qualify_frequency", "60"),
        );
        stanzas.push(
            NewStanza::new(name)
                .with("type", "endpoint")
                .with("context", &self.context)
                .with("disallow", "all")
                .with("allow", &self.codecs)
                .with("outbound_auth", name)
                .with("aors", name)
                .with("from_user", &self.username),
        );
        stanzas.push(
            NewStanza::new(name)
                .with("type", "identify")
                .with("endpoint", name)
                .with("match", &self.host),
        );
        stanzas
    }
}

/// Fields to change on an existing trunk; unset fields are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrunkUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub context: Option<String>,
}

impl TrunkUpdate {
    fn validate(&self) -> AdminResult<()> {
        if self.host.is_none()
            && self.port.is_none()
            && self.username.is_none()
            && self.secret.is_none()
            && self.context.is_none()
        {
            return Err(AdminError::Validation("nothing to update".into()));
        }
        if let Some(host) = &self.host {
            validate_host(host)?;
        }
        if let Some(port) = self.port {
            validate_port(port)?;
        }
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        if let Some(secret) = &self.secret {
            validate_secret(secret)?;
        }
        if let Some(context) = &self.context {
            validate_context(context)?;
        }
        Ok(())
    }
}

/// What the file says about one trunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codecs: Option<String>,
    pub registers: bool,
    pub roles: Vec<StanzaRole>,
    /// Auth, aor, endpoint and identify all present
    pub complete: bool,
}

impl TrunkSummary {
    fn from_stanzas(name: &str, stanzas: &[SectionStanza]) -> Self {
        let by_role = |role| stanzas.iter().rev().find(|s| s.role() == Some(role));
        let auth = by_role(StanzaRole::Auth);
        let aor = by_role(StanzaRole::Aor);
        let endpoint = by_role(StanzaRole::Endpoint);
        let identify = by_role(StanzaRole::Identify);
        let registration = by_role(StanzaRole::Registration);

        let contact = aor
            .and_then(|s| s.value("contact"))
            .and_then(parse_sip_uri);

        let mut roles: Vec<StanzaRole> = Vec::new();
        for role in stanzas.iter().filter_map(SectionStanza::role) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        Self {
            name: name.to_string(),
            host: contact
                .as_ref()
                .map(|(host, _)| host.clone())
                .or_else(|| identify.and_then(|s| s.value("match")).map(str::to_string)),
            port: contact.map(|(_, port)| port),
            username: auth.and_then(|s| s.value("username")).map(str::to_string),
            context: endpoint.and_then(|s| s.value("context")).map(str::to_string),
            codecs: endpoint.and_then(|s| s.value("allow")).map(str::to_string),
            registers: registration.is_some(),
            complete: auth.is_some() && aor.is_some() && endpoint.is_some() && identify.is_some(),
            roles,
        }
    }
}

/// Trunk operations against `pjsip.conf`
pub struct TrunkOps<'a> {
    registry: &'a EntityRegistry,
    dry_run: bool,
}

impl<'a> TrunkOps<'a> {
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

    /// Write all trunk stanzas in one commit
    ///
    /// # Errors
    /// `Validation` for malformed fields, `Conflict` if the name is taken
    pub fn create(&self, spec: &NewTrunk) -> AdminResult<OperationOutcome> {
        spec.validate()?;
        let marker = InsertionPoint::from(self.registry.settings().markers.trunks.as_ref());

        self.registry.mutate(
            self.mutation(OperationType::Create, &spec.name, spec.register),
            |doc| {
                if locate::exists(&doc, &spec.name) {
                    return Err(AdminError::conflict(KIND, &spec.name));
                }
                let patch = MutationPlanner::new(&doc).append_entity(&spec.stanzas(), &marker)?;
                apply(&doc, &patch)
            },
        )
    }

    /// # Errors
    /// `NotFound` if no trunk has that name
    pub fn read(&self, name: &str) -> AdminResult<TrunkSummary> {
        let doc = self.registry.document(ManagedFile::Pjsip)?;
        let stanzas = trunk_stanzas(&doc, name)?;
        Ok(TrunkSummary::from_stanzas(name, &stanzas))
    }

    /// Every trunk, in file order
    ///
    /// # Errors
    /// `Parse`/`Io` from the file
    pub fn list(&self) -> AdminResult<Vec<TrunkSummary>> {
        let doc = self.registry.document(ManagedFile::Pjsip)?;
        let mut names = locate::names_with_role(&doc, StanzaRole::Identify);
        for name in locate::names_with_role(&doc, StanzaRole::Registration) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names
            .into_iter()
            .filter_map(|name| {
                trunk_stanzas(&doc, &name)
                    .ok()
                    .map(|stanzas| TrunkSummary::from_stanzas(&name, &stanzas))
            })
            .collect())
    }

    /// Host/port rewrite the aor contact, identify match and registration
    /// URIs; credentials rewrite auth, registration and `from_user`
    ///
    /// # Errors
    /// `Validation` for an empty or malformed update, `NotFound` if the
    /// trunk or a stanza a field lives in is missing
    pub fn update(&self, name: &str, update: &TrunkUpdate) -> AdminResult<OperationOutcome> {
        update.validate()?;
        let registers = self
            .registry
            .document(ManagedFile::Pjsip)
            .map(|doc| locate::find_one(&doc, name, Some(StanzaRole::Registration)).is_some())
            .unwrap_or(false);

        self.registry.mutate(self.mutation(OperationType::Update, name, registers), |doc| {
            let summary = TrunkSummary::from_stanzas(name, &trunk_stanzas(&doc, name)?);
            let has_registration = summary.registers;
            let mut doc = doc;

            if update.host.is_some() || update.port.is_some() || update.username.is_some() {
                let host = update
                    .host
                    .clone()
                    .or_else(|| summary.host.clone())
                    .ok_or_else(|| AdminError::not_found("aor contact", name))?;
                let port = update.port.or(summary.port).unwrap_or(DEFAULT_PORT);
                let username = update
                    .username
                    .clone()
                    .or_else(|| summary.username.clone())
                    .unwrap_or_default();

                if update.host.is_some() || update.port.is_some() {
                    let server = server_uri(&host, port);
                    doc = set_value(doc, name, Some(StanzaRole::Aor), "contact", &server, "=")?;
                    if let Some(new_host) = &update.host {
                        doc = set_value(doc, name, Some(StanzaRole::Identify), "match", new_host, "=")?;
                    }
                    if has_registration {
                        doc = set_value(
                            doc,
                            name,
                            Some(StanzaRole::Registration),
                            "server_uri",
                            &server,
                            "=",
                        )?;
                    }
                }
                if has_registration {
                    doc = set_value(
                        doc,
                        name,
                        Some(StanzaRole::Registration),
                        "client_uri",
                        &client_uri(&username, &host, port),
                        "=",
                    )?;
                }
            }

            if let Some(username) = &update.username {
                doc = set_value(doc, name, Some(StanzaRole::Auth), "username", username, "=")?;
                let endpoint = locate::find_one(&doc, name, Some(StanzaRole::Endpoint));
                // A disabled from_user override stays disabled
                if endpoint.is_some_and(|e| e.last_directive("from_user").is_some()) {
                    doc = set_value(doc, name, Some(StanzaRole::Endpoint), "from_user", username, "=")?;
                }
            }
            if let Some(secret) = &update.secret {
                doc = set_value(doc, name, Some(StanzaRole::Auth), "password", secret, "=")?;
            }
            if let Some(context) = &update.context {
                doc = set_value(doc, name, Some(StanzaRole::Endpoint), "context", context, "=")?;
            }
            Ok(doc)
        })
    }

    /// Remove every stanza named after the trunk
    ///
    /// # Errors
    /// `NotFound` if no trunk has that name
    pub fn delete(&self, name: &str) -> AdminResult<OperationOutcome> {
        let registers = self
            .registry
            .document(ManagedFile::Pjsip)
            .map(|doc| locate::find_one(&doc, name, Some(StanzaRole::Registration)).is_some())
            .unwrap_or(false);

        self.registry.mutate(self.mutation(OperationType::Delete, name, registers), |doc| {
            trunk_stanzas(&doc, name)?;
            let patch = MutationPlanner::new(&doc).remove_entity(name)?;
            apply(&doc, &patch)
        })
    }

    fn mutation(&self, operation: OperationType, name: &str, registers: bool) -> Mutation {
        let mut reloads = vec![Subsystem::Endpoints];
        if registers {
            reloads.push(Subsystem::Registrations);
        }
        Mutation {
            operation,
            kind: EntityKind::Trunk,
            name: name.to_string(),
            file: ManagedFile::Pjsip,
            reloads,
            dry_run: self.dry_run,
        }
    }
}

/// Stanzas of trunk `name`: an entity with an identify or registration stanza
fn trunk_stanzas(doc: &ConfigDocument, name: &str) -> AdminResult<Vec<SectionStanza>> {
    let stanzas: Vec<SectionStanza> = locate::find(doc, name, None)
        .into_iter()
        .filter(|s| !s.is_template())
        .collect();
    let is_trunk = stanzas
        .iter()
        .any(|s| matches!(s.role(), Some(StanzaRole::Identify | StanzaRole::Registration)));
    if is_trunk {
        Ok(stanzas)
    } else {
        Err(AdminError::not_found(KIND, name))
    }
}

fn server_uri(host: &str, port: u16) -> String {
    format!("sip:{host}:{port}")
}

fn client_uri(username: &str, host: &str, port: u16) -> String {
    format!("sip:{username}@{host}:{port}")
}

/// `sip:[user@]host[:port]` into host and port
fn parse_sip_uri(uri: &str) -> Option<(String, u16)> {
    let rest = uri.trim().strip_prefix("sip:")?;
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    let rest = rest.split(';').next().unwrap_or(rest);
    match rest.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') && !host.is_empty() => {
            Some((host.to_string(), port.parse().ok()?))
        }
        _ if !rest.is_empty() => Some((rest.to_string(), DEFAULT_PORT)),
        _ => None,
    }
}

fn validate_port(port: u16) -> AdminResult<()> {
    if port == 0 {
        Err(AdminError::Validation("port must be between 1 and 65535".into()))
    } else {
        Ok(())
    }
}

fn validate_username(username: &str) -> AdminResult<()> {
    if username.is_empty()
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'))
    {
        return Err(AdminError::Validation(format!("invalid username '{username}'")));
    }
    Ok(())
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
[1000]
type=endpoint
context=from-internal

; END EXTENSIONS

; END TRUNKS
";

    fn setup() -> (TempDir, EntityRegistry) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        let mut settings = AdminSettings::for_directory(dir.path());
        settings.markers.trunks = Some("; END TRUNKS".into());
        let ok = vec!["sh".to_string(), "-c".to_string(), "echo ok".to_string()];
        settings.reload.commands = BTreeMap::from([
            (Subsystem::Endpoints, ok.clone()),
            (Subsystem::Registrations, ok),
        ]);
        (dir, EntityRegistry::new(settings))
    }

    fn read(dir: &TempDir) -> String {
        fs::read_to_string(dir.path().join("pjsip.conf")).unwrap()
    }

    #[test]
    fn test_create_registering_trunk_before_marker() {
        let (dir, registry) = setup();
        let mut spec = NewTrunk::new("voip", "sip.example.com", "acct42", "pw");
        spec.register = true;

        let outcome = registry.trunks().create(&spec).unwrap();
        assert_eq!(outcome.state, OperationState::ReloadConfirmed);
        let subsystems: Vec<Subsystem> = outcome.reloads.iter().map(|r| r.subsystem).collect();
        assert_eq!(subsystems, vec![Subsystem::Endpoints, Subsystem::Registrations]);

        let text = read(&dir);
        assert!(text.contains(
            "\n[voip]\ntype=registration\noutbound_auth=voip\nserver_uri=sip:sip.example.com:5060\nclient_uri=sip:acct42@sip.example.com:5060\nretry_interval=60\n"
        ));
        assert!(text.ends_with("match=sip.example.com\n\n; END TRUNKS\n"));
        assert!(text.starts_with("[1000]\ntype=endpoint\ncontext=from-internal\n\n; END EXTENSIONS\n\n[voip]\n"));

        let summary = registry.trunks().read("voip").unwrap();
        assert!(summary.complete);
        assert!(summary.registers);
        assert_eq!(summary.host.as_deref(), Some("sip.example.com"));
        assert_eq!(summary.port, Some(5060));
    }

    #[test]
    fn test_create_conflicts_with_extension_name() {
        let (dir, registry) = setup();
        let err = registry
            .trunks()
            .create(&NewTrunk::new("1000", "10.0.0.1", "u", "p"))
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(read(&dir), PJSIP);
    }

    #[test]
    fn test_update_host_rewrites_contact_and_match() {
        let (dir, registry) = setup();
        registry
            .trunks()
            .create(&NewTrunk::new("voip", "old.example.com", "acct", "pw"))
            .unwrap();

        let update = TrunkUpdate {
            host: Some("new.example.com".into()),
            port: Some(5080),
            ..TrunkUpdate::default()
        };
        let outcome = registry.trunks().update("voip", &update).unwrap();
        assert_eq!(outcome.reloads.len(), 1);

        let text = read(&dir);
        assert!(text.contains("contact=sip:new.example.com:5080\n"));
        assert!(text.contains("match=new.example.com\n"));
        assert!(!text.contains("old.example.com"));
        assert_eq!(registry.trunks().read("voip").unwrap().port, Some(5080));
    }

    #[test]
    fn test_list_and_delete() {
        let (dir, registry) = setup();
        registry
            .trunks()
            .create(&NewTrunk::new("voip", "10.0.0.1", "u", "p"))
            .unwrap();
        let names: Vec<String> = registry.trunks().list().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["voip"]);
        assert!(registry.extensions().read("voip").is_err());
        assert_eq!(registry.extensions().list().unwrap().len(), 1);

        registry.trunks().delete("voip").unwrap();
        assert_eq!(read(&dir), PJSIP);
        assert_eq!(registry.trunks().delete("voip").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_parse_sip_uri() {
        assert_eq!(parse_sip_uri("sip:host.example:5080"), Some(("host.example".into(), 5080)));
        assert_eq!(parse_sip_uri("sip:user@10.0.0.1"), Some(("10.0.0.1".into(), 5060)));
        assert_eq!(parse_sip_uri("http://x"), None);
    }
}
