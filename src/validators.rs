//! Input validation for values that reach an elevated command line
//!
//! Everything here runs before elevation so that a rejected request never
//! touches sudo or the filtering program.

use network_interface::{NetworkInterface, NetworkInterfaceConfig};

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be empty, "." or ".."
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Interface name cannot be empty".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    // A leading dash would be read as an option by the filtering program
    if name.starts_with('-') {
        return Err("Interface name cannot start with '-'".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Lists the host's network interface names, sorted and deduplicated.
///
/// Returns an empty list if enumeration fails.
pub fn list_interfaces() -> Vec<String> {
    let mut names: Vec<String> = NetworkInterface::show()
        .map(|ifaces| ifaces.into_iter().map(|i| i.name).collect())
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to enumerate network interfaces: {e}");
            Vec::new()
        });
    names.sort();
    names.dedup();
    names
}

/// Checks that an interface exists on this host.
///
/// If enumeration itself fails the name is accepted; the filtering program
/// reports the authoritative error in that case.
pub fn interface_exists(name: &str) -> bool {
    let names = list_interfaces();
    names.is_empty() || names.iter().any(|n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_interface_valid() {
        assert_eq!(validate_interface("eth0").unwrap(), "eth0");
        assert_eq!(validate_interface("wlan0.100").unwrap(), "wlan0.100");
        assert_eq!(validate_interface("br_lan-1").unwrap(), "br_lan-1");
    }

    #[test]
    fn test_validate_interface_rejects_option_like() {
        assert!(validate_interface("--run").is_err());
    }

    #[test]
    fn test_validate_interface_rejects_empty_and_dots() {
        assert!(validate_interface("").is_err());
        assert!(validate_interface(".").is_err());
        assert!(validate_interface("..").is_err());
    }

    #[test]
    fn test_validate_interface_rejects_shell_chars() {
        assert!(validate_interface("eth0;reboot").is_err());
        assert!(validate_interface("eth 0").is_err());
    }

    #[test]
    fn test_loopback_exists() {
        assert!(interface_exists("lo"));
    }
}
