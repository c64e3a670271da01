///! Input validation for storage provisioning
///! Checks connection addresses, target names and volume parameters before they are persisted

use fleetstor_common::Error;
use regex::Regex;
use std::sync::LazyLock;

/// Maximum allowed lengths for various fields
pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_ISCSI_NAME_LENGTH: usize = 223;

/// Regex patterns for validation
static VOLUME_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap()
});

static IP_ADDR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$").unwrap()
});

static HOSTNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$").unwrap()
});

static ISCSI_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s/]+$").unwrap()
});

/// Validation result type
pub type ValidationResult<T> = Result<T, Error>;

/// IP address validation
pub fn validate_ip_address(ip: &str) -> ValidationResult<()> {
    if !IP_ADDR_REGEX.is_match(ip) {
        return Err(Error::Validation(
            "Invalid IP address format".to_string()
        ));
    }

    Ok(())
}

/// Hostname validation
pub fn validate_hostname(hostname: &str) -> ValidationResult<()> {
    if hostname.is_empty() {
        return Err(Error::Validation("Hostname cannot be empty".to_string()));
    }

    if hostname.len() > 253 {
        return Err(Error::Validation(
            "Hostname too long (max 253 characters)".to_string()
        ));
    }

    if !HOSTNAME_REGEX.is_match(hostname) {
        return Err(Error::Validation(
            "Invalid hostname format".to_string()
        ));
    }

    Ok(())
}

/// Storage array address: IPv4 address or hostname
pub fn validate_address(addr: &str) -> ValidationResult<()> {
    if addr.is_empty() {
        return Err(Error::Validation("Storage address cannot be empty".to_string()));
    }

    if validate_ip_address(addr).is_ok() {
        return Ok(());
    }

    // Dotted quads that fail the IP check are typos, not hostnames
    if addr.split('.').all(|part| part.chars().all(|c| c.is_ascii_digit())) {
        return Err(Error::Validation(format!("Invalid IP address: {}", addr)));
    }

    validate_hostname(addr)
}

/// Port number validation
pub fn validate_port(port: u16) -> ValidationResult<()> {
    if port == 0 {
        return Err(Error::Validation(
            "Port must be between 1 and 65535".to_string()
        ));
    }

    Ok(())
}

/// iSCSI target name validation (iqn./eui./naa. or a bare array-local name)
pub fn validate_iscsi_target(target: &str) -> ValidationResult<()> {
    if target.is_empty() {
        return Err(Error::Validation("iSCSI target cannot be empty".to_string()));
    }

    if target.len() > MAX_ISCSI_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "iSCSI target too long (max {} characters)",
            MAX_ISCSI_NAME_LENGTH
        )));
    }

    if !ISCSI_NAME_REGEX.is_match(target) {
        return Err(Error::Validation(
            "iSCSI target cannot contain whitespace or '/'".to_string()
        ));
    }

    Ok(())
}

/// Volume name validation
pub fn validate_volume_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(Error::Validation("Volume name cannot be empty".to_string()));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "Volume name too long (max {} characters)",
            MAX_NAME_LENGTH
        )));
    }

    if !VOLUME_NAME_REGEX.is_match(name) {
        return Err(Error::Validation(
            "Volume name can only contain letters, numbers, dots, hyphens, and underscores".to_string()
        ));
    }

    Ok(())
}

/// Volume size validation. A `max_gb` of 0 means no limit.
pub fn validate_volume_size(size_gb: u64, max_gb: u64) -> ValidationResult<()> {
    if max_gb > 0 && size_gb > max_gb {
        return Err(Error::Validation(format!(
            "Volume size {}GB exceeds the {}GB limit",
            size_gb, max_gb
        )));
    }

    // Sizes are stored as signed 64-bit integers
    if i64::try_from(size_gb).is_err() {
        return Err(Error::Validation(format!("Volume size {}GB is out of range", size_gb)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ip_address() {
        assert!(validate_ip_address("192.168.1.1").is_ok());
        assert!(validate_ip_address("10.0.0.1").is_ok());
        assert!(validate_ip_address("999.999.999.999").is_err());
        assert!(validate_ip_address("192.168.1").is_err());
        assert!(validate_ip_address("not-an-ip").is_err());
    }

    #[test]
    fn test_validate_hostname() {
        assert!(validate_hostname("example.com").is_ok());
        assert!(validate_hostname("san01.storage.example.com").is_ok());
        assert!(validate_hostname("-invalid").is_err());
        assert!(validate_hostname("invalid-.com").is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("10.0.0.5").is_ok());
        assert!(validate_address("san01").is_ok());
        assert!(validate_address("").is_err());
        assert!(validate_address("10.0.0.256").is_err());
        assert!(validate_address("san 01").is_err());
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(3260).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_validate_iscsi_target() {
        assert!(validate_iscsi_target("iqn.2024-01.example:vol1").is_ok());
        assert!(validate_iscsi_target("tgt1").is_ok());
        assert!(validate_iscsi_target("").is_err());
        assert!(validate_iscsi_target("iqn with space").is_err());
        assert!(validate_iscsi_target(&"a".repeat(224)).is_err());
    }

    #[test]
    fn test_validate_volume() {
        assert!(validate_volume_name("vm-100-disk-0").is_ok());
        assert!(validate_volume_name("../etc").is_err());
        assert!(validate_volume_size(0, 100).is_ok());
        assert!(validate_volume_size(100, 100).is_ok());
        assert!(validate_volume_size(101, 100).is_err());
        assert!(validate_volume_size(u64::MAX, 0).is_err());
    }
}
