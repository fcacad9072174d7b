//! Extensions: an endpoint, auth and aor stanza sharing the extension number

use serde::{Deserialize, Serialize};

use super::{
    apply, require_stanza, set_value, EntityKind, EntityRegistry, ManagedFile, Mutation,
    OperationOutcome, OperationType,
};
use crate::document::{ConfigDocument, SectionStanza, StanzaRole};
use crate::error::{AdminError, AdminResult};
use crate::locate;
use crate::plan::{InsertionPoint, MutationPlanner, NewStanza};
use crate::reload::Subsystem;
use crate::util::{
    validate_codecs, validate_context, validate_extension_number, validate_secret, validate_text,
};

const KIND: &str = "extension";
const MAX_CONTACTS_LIMIT: u32 = 100;

fn default_context() -> String {
    "from-internal".to_string()
}

fn default_codecs() -> String {
    "ulaw,alaw".to_string()
}

fn default_max_contacts() -> u32 {
    1
}

/// Fields for a new extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExtension {
    pub number: String,
    pub secret: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default = "default_codecs")]
    pub codecs: String,
    #[serde(default = "default_max_contacts")]
    pub max_contacts: u32,
}

impl NewExtension {
    pub fn new(number: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            secret: secret.into(),
            display_name: None,
            context: default_context(),
            codecs: default_codecs(),
            max_contacts: default_max_contacts(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    fn validate(&self) -> AdminResult<()> {
        validate_extension_number(&self.number)?;
        validate_secret(&self.secret)?;
        if let Some(name) = &self.display_name {
            validate_text("display name", name, true)?;
        }
        validate_context(&self.context)?;
        validate_codecs(&self.codecs)?;
        validate_max_contacts(self.max_contacts)
    }

    fn stanzas(&self) -> Vec<NewStanza> {
        let mut endpoint = NewStanza::new(&self.number)
            .with("type", "endpoint")
            .with("context", &self.context)
            .with("disallow", "all")
            .with("allow", &self.codecs)
            .with("auth", &self.number)
            .with("aors", &self.number);
        if let Some(name) = &self.display_name {
            endpoint = endpoint.with("callerid", callerid(name, &self.number));
        }
        let auth = NewStanza::new(&self.number)
            .with("type", "auth")
            .with("auth_type", "userpass")
            .with("username", &self.number)
            .with("password", &self.secret);
        let aor = NewStanza::new(&self.number)
            .with("type", "aor")
            .with("max_contacts", self.max_contacts.to_string());
        vec![endpoint, auth, aor]
    }
}

/// Fields to change on an existing extension; unset fields are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionUpdate {
    pub secret: Option<String>,
    pub display_name: Option<String>,
    pub context: Option<String>,
    pub max_contacts: Option<u32>,
}

impl ExtensionUpdate {
    fn is_empty(&self) -> bool {
        self.secret.is_none()
            && self.display_name.is_none()
            && self.context.is_none()
            && self.max_contacts.is_none()
    }

    fn validate(&self) -> AdminResult<()> {
        if self.is_empty() {
            return Err(AdminError::Validation("nothing to update".into()));
        }
        if let Some(secret) = &self.secret {
            validate_secret(secret)?;
        }
        if let Some(name) = &self.display_name {
            validate_text("display name", name, true)?;
        }
        if let Some(context) = &self.context {
            validate_context(context)?;
        }
        if let Some(max) = self.max_contacts {
            validate_max_contacts(max)?;
        }
        Ok(())
    }
}

/// What the file says about one extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSummary {
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callerid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codecs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_contacts: Option<u32>,
    pub has_secret: bool,
    pub roles: Vec<StanzaRole>,
    /// Endpoint, auth and aor all present
    pub complete: bool,
}

impl ExtensionSummary {
    fn from_stanzas(number: &str, stanzas: &[SectionStanza]) -> Self {
        let by_role = |role| stanzas.iter().rev().find(|s| s.role() == Some(role));
        let endpoint = by_role(StanzaRole::Endpoint);
        let auth = by_role(StanzaRole::Auth);
        let aor = by_role(StanzaRole::Aor);

        let mut roles: Vec<StanzaRole> = Vec::new();
        for role in stanzas.iter().filter_map(SectionStanza::role) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        Self {
            number: number.to_string(),
            callerid: endpoint.and_then(|s| s.value("callerid")).map(str::to_string),
            context: endpoint.and_then(|s| s.value("context")).map(str::to_string),
            codecs: endpoint.and_then(|s| s.value("allow")).map(str::to_string),
            max_contacts: aor
                .and_then(|s| s.value("max_contacts"))
                .and_then(|v| v.parse().ok()),
            has_secret: auth.and_then(|s| s.value("password")).is_some(),
            complete: endpoint.is_some() && auth.is_some() && aor.is_some(),
            roles,
        }
    }
}

/// Extension operations against `pjsip.conf`
pub struct ExtensionOps<'a> {
    registry: &'a EntityRegistry,
    dry_run: bool,
}

impl<'a> ExtensionOps<'a> {
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

    /// Write the endpoint, auth and aor stanzas in one commit
    ///
    /// # Errors
    /// `Validation` for malformed fields, `Conflict` if any stanza already
    /// uses the number, `Parse`/`Io` from the file
    pub fn create(&self, spec: &NewExtension) -> AdminResult<OperationOutcome> {
        spec.validate()?;
        let marker = InsertionPoint::from(self.registry.settings().markers.extensions.as_ref());

        self.registry.mutate(self.mutation(OperationType::Create, &spec.number), |doc| {
            if locate::exists(&doc, &spec.number) {
                return Err(AdminError::conflict(KIND, &spec.number));
            }
            let patch = MutationPlanner::new(&doc).append_entity(&spec.stanzas(), &marker)?;
            apply(&doc, &patch)
        })
    }

    /// # Errors
    /// `NotFound` if no extension has that number
    pub fn read(&self, number: &str) -> AdminResult<ExtensionSummary> {
        let doc = self.registry.document(ManagedFile::Pjsip)?;
        let stanzas = extension_stanzas(&doc, number)?;
        Ok(ExtensionSummary::from_stanzas(number, &stanzas))
    }

    /// Every extension, in file order
    ///
    /// # Errors
    /// `Parse`/`Io` from the file
    pub fn list(&self) -> AdminResult<Vec<ExtensionSummary>> {
        let doc = self.registry.document(ManagedFile::Pjsip)?;
        Ok(locate::names_with_role(&doc, StanzaRole::Endpoint)
            .into_iter()
            .filter_map(|name| {
                extension_stanzas(&doc, &name)
                    .ok()
                    .map(|stanzas| ExtensionSummary::from_stanzas(&name, &stanzas))
            })
            .collect())
    }

    /// # Errors
    /// `Validation` for an empty or malformed update, `NotFound` if the
    /// extension or one of the stanzas a field lives in is missing
    pub fn update(&self, number: &str, update: &ExtensionUpdate) -> AdminResult<OperationOutcome> {
        update.validate()?;

        self.registry.mutate(self.mutation(OperationType::Update, number), |doc| {
            extension_stanzas(&doc, number)?;
            let mut doc = doc;
            if let Some(secret) = &update.secret {
                doc = set_value(doc, number, Some(StanzaRole::Auth), "password", secret, "=")?;
            }
            if let Some(name) = &update.display_name {
                doc = set_value(
                    doc,
                    number,
                    Some(StanzaRole::Endpoint),
                    "callerid",
                    &callerid(name, number),
                    "=",
                )?;
            }
            if let Some(context) = &update.context {
                doc = set_value(doc, number, Some(StanzaRole::Endpoint), "context", context, "=")?;
            }
            if let Some(max) = update.max_contacts {
                doc = set_value(
                    doc,
                    number,
                    Some(StanzaRole::Aor),
                    "max_contacts",
                    &max.to_string(),
                    "=",
                )?;
            }
            Ok(doc)
        })
    }

    /// Remove every stanza named after the extension
    ///
    /// # Errors
    /// `NotFound` if no extension has that number
    pub fn delete(&self, number: &str) -> AdminResult<OperationOutcome> {
        self.registry.mutate(self.mutation(OperationType::Delete, number), |doc| {
            extension_stanzas(&doc, number)?;
            let patch = MutationPlanner::new(&doc).remove_entity(number)?;
            apply(&doc, &patch)
        })
    }

    fn mutation(&self, operation: OperationType, number: &str) -> Mutation {
        Mutation {
            operation,
            kind: EntityKind::Extension,
            name: number.to_string(),
            file: ManagedFile::Pjsip,
            reloads: vec![Subsystem::Endpoints],
            dry_run: self.dry_run,
        }
    }
}

/// Stanzas of extension `number`; trunks (which carry an identify or
/// registration stanza) do not count even when numerically named
pub(crate) fn extension_stanzas(doc: &ConfigDocument, number: &str) -> AdminResult<Vec<SectionStanza>> {
    validate_extension_number(number).map_err(|_| AdminError::not_found(KIND, number))?;
    let stanzas: Vec<SectionStanza> = locate::find(doc, number, None)
        .into_iter()
        .filter(|s| !s.is_template())
        .collect();
    let is_trunk = stanzas
        .iter()
        .any(|s| matches!(s.role(), Some(StanzaRole::Identify | StanzaRole::Registration)));
    let has_extension_role = stanzas
        .iter()
        .any(|s| matches!(s.role(), Some(StanzaRole::Endpoint | StanzaRole::Auth | StanzaRole::Aor)));
    if is_trunk || !has_extension_role {
        return Err(AdminError::not_found(KIND, number));
    }
    Ok(stanzas)
}

/// Whether an endpoint named `number` exists
pub(crate) fn endpoint_exists(doc: &ConfigDocument, number: &str) -> bool {
    require_stanza(doc, number, Some(StanzaRole::Endpoint), KIND).is_ok()
}

fn callerid(name: &str, number: &str) -> String {
    format!("\"{name}\" <{number}>")
}

fn validate_max_contacts(max: u32) -> AdminResult<()> {
    if (1..=MAX_CONTACTS_LIMIT).contains(&max) {
        Ok(())
    } else {
        Err(AdminError::Validation(format!(
            "max contacts must be between 1 and {MAX_CONTACTS_LIMIT}"
        )))
    }
}
