//! Privilege checks for the reload command and the listening socket

#[cfg(unix)]
use sudo::RunningAs;

/// Check if the current process has administrative privileges
pub fn has_admin_privileges() -> bool {
    #[cfg(unix)]
    {
        // root, or a setuid binary whose effective uid is 0
        matches!(sudo::check(), RunningAs::Root)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Check if a port requires administrative privileges
pub fn port_requires_privileges(port: u16) -> bool {
    port < 1024
}

/// Warn about settings that will fail without the right privileges. Returns
/// the number of warnings emitted.
pub fn warn_missing_privileges(port: u16, reload_command: &[String]) -> usize {
    if has_admin_privileges() {
        return 0;
    }

    let mut warnings = 0;
    if port_requires_privileges(port) {
        log::warn!("Port {} normally requires root to bind", port);
        warnings += 1;
    }

    if reload_command.first().map(String::as_str) != Some("sudo") {
        log::warn!(
            "Reload command [{}] runs without sudo and the process is not root",
            reload_command.join(" ")
        );
        warnings += 1;
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_ports() {
        assert!(port_requires_privileges(53));
        assert!(port_requires_privileges(80));
        assert!(!port_requires_privileges(5000));
    }

    #[test]
    fn test_no_warnings_for_defaults() {
        let reload = vec!["sudo".to_string(), "systemctl".to_string()];
        assert_eq!(warn_missing_privileges(5000, &reload), 0);
    }
}
