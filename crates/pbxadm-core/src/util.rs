//! Checksums and input validation shared by the entity modules

use sha2::{Digest, Sha256};

use crate::error::{AdminError, AdminResult};

/// Lowercase hex SHA256 of `content`
#[must_use]
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Extension numbers: 3 to 5 ASCII digits
///
/// # Errors
/// Returns a validation error otherwise
pub fn validate_extension_number(number: &str) -> AdminResult<()> {
    if (3..=5).contains(&number.len()) && number.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AdminError::Validation(format!(
            "extension number must be 3-5 digits, got '{number}'"
        )))
    }
}

/// Trunk names: `[A-Za-z0-9_-]+`, at most 64 characters
///
/// # Errors
/// Returns a validation error otherwise
pub fn validate_trunk_name(name: &str) -> AdminResult<()> {
    if name.is_empty() {
        return Err(AdminError::Validation("trunk name cannot be empty".into()));
    }
    if name.len() > 64 {
        return Err(AdminError::Validation(
            "trunk name cannot exceed 64 characters".into(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AdminError::Validation(format!(
            "trunk name may only contain letters, digits, '_' and '-', got '{name}'"
        )));
    }
    Ok(())
}

/// PIN of exactly `length` digits
///
/// # Errors
/// Returns a validation error otherwise
pub fn validate_pin(pin: &str, length: usize) -> AdminResult<()> {
    if pin.len() == length && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AdminError::Validation(format!(
            "PIN must be exactly {length} digits"
        )))
    }
}

/// Free text written into a directive value
///
/// # Errors
/// Returns a validation error for line breaks, `;`, `"` or, when
/// `allow_comma` is false, `,`
pub fn validate_text(field: &str, value: &str, allow_comma: bool) -> AdminResult<()> {
    if value.contains(['\n', '\r', ';', '"']) || (!allow_comma && value.contains(',')) {
        return Err(AdminError::Validation(format!(
            "{field} contains a character that is not allowed"
        )));
    }
    Ok(())
}

/// Secret for an auth stanza: non-empty, no whitespace or `;`
///
/// # Errors
/// Returns a validation error otherwise
pub fn validate_secret(secret: &str) -> AdminResult<()> {
    if secret.is_empty() {
        return Err(AdminError::Validation("secret cannot be empty".into()));
    }
    if secret.chars().any(|c| c.is_whitespace() || c == ';' || c == '"') {
        return Err(AdminError::Validation(
            "secret cannot contain whitespace, ';' or '\"'".into(),
        ));
    }
    Ok(())
}

/// Hostname or IP address for a trunk
///
/// # Errors
/// Returns a validation error otherwise
pub fn validate_host(host: &str) -> AdminResult<()> {
    if host.is_empty()
        || host.len() > 253
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
    {
        return Err(AdminError::Validation(format!("invalid host '{host}'")));
    }
    Ok(())
}

/// Comma-separated codec list such as `ulaw,alaw`
///
/// # Errors
/// Returns a validation error for empty entries or odd characters
pub fn validate_codecs(codecs: &str) -> AdminResult<()> {
    let ok = !codecs.is_empty()
        && codecs.split(',').all(|c| {
            !c.is_empty() && c.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        });
    if ok {
        Ok(())
    } else {
        Err(AdminError::Validation(format!("invalid codec list '{codecs}'")))
    }
}

/// Dialplan context name
///
/// # Errors
/// Returns a validation error otherwise
pub fn validate_context(context: &str) -> AdminResult<()> {
    if context.is_empty()
        || !context
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AdminError::Validation(format!("invalid context '{context}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_extension_numbers() {
        assert!(validate_extension_number("100").is_ok());
        assert!(validate_extension_number("10001").is_ok());
        assert!(validate_extension_number("10").is_err());
        assert!(validate_extension_number("100001").is_err());
        assert!(validate_extension_number("10a").is_err());
    }

    #[test]
    fn test_trunk_names() {
        assert!(validate_trunk_name("voip-out_1").is_ok());
        assert!(validate_trunk_name("").is_err());
        assert!(validate_trunk_name("bad name").is_err());
        assert!(validate_trunk_name("x]").is_err());
    }

    #[test]
    fn test_pins() {
        assert!(validate_pin("1234", 4).is_ok());
        assert!(validate_pin("123", 4).is_err());
        assert!(validate_pin("12a4", 4).is_err());
        assert!(validate_pin("123456", 6).is_ok());
    }

    #[test]
    fn test_text_and_codecs() {
        assert!(validate_text("name", "Alice Smith", false).is_ok());
        assert!(validate_text("name", "Smith, Alice", false).is_err());
        assert!(validate_text("name", "a;b", true).is_err());
        assert!(validate_codecs("ulaw,alaw,g722").is_ok());
        assert!(validate_codecs("ulaw,,alaw").is_err());
        assert!(validate_host("sip.example.com").is_ok());
        assert!(validate_host("sip example").is_err());
        assert!(validate_secret("s3cr3t!").is_ok());
        assert!(validate_secret("has space").is_err());
        assert!(validate_context("from-internal").is_ok());
        assert!(validate_context("bad ctx").is_err());
    }
}
