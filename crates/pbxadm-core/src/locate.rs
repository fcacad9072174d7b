//! Stanza lookup by exact section name
//!
//! Entity names are matched against the parsed header token only. Names
//! that are prefixes of each other ("100" and "1001") never match across,
//! and nothing outside a header line is ever considered.

use crate::document::{ConfigDocument, SectionStanza, StanzaRole};

/// Every stanza named `name`, optionally restricted to one role, in file order
#[must_use]
pub fn find(doc: &ConfigDocument, name: &str, role: Option<StanzaRole>) -> Vec<SectionStanza> {
    doc.stanzas()
        .into_iter()
        .filter(|s| s.name == name)
        .filter(|s| role.map_or(true, |r| s.role() == Some(r)))
        .collect()
}

/// Last stanza named `name` with the given role
#[must_use]
pub fn find_one(doc: &ConfigDocument, name: &str, role: Option<StanzaRole>) -> Option<SectionStanza> {
    find(doc, name, role).pop()
}

/// Whether any stanza is named `name`
#[must_use]
pub fn exists(doc: &ConfigDocument, name: &str) -> bool {
    doc.stanzas().iter().any(|s| s.name == name)
}

/// Distinct names of stanzas with `role`, in order of first appearance
#[must_use]
pub fn names_with_role(doc: &ConfigDocument, role: StanzaRole) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for stanza in doc.stanzas() {
        if stanza.role() == Some(role) && !stanza.is_template() && !names.contains(&stanza.name) {
            names.push(stanza.name);
        }
    }
    names
}
