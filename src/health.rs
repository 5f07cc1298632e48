//! Preflight checks behind `repomirror doctor`

use crate::Config;
use std::path::Path;

/// Shorter hook secrets are accepted but flagged
const MIN_SECRET_LEN: usize = 16;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Local GitLab repository storage
    pub storage_root: CheckResult,
    /// GitHub token availability
    pub mirror_token: CheckResult,
    /// Webhook shared secret
    pub hook_secret: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config) -> Self {
        Self {
            git: Self::check_git(),
            storage_root: Self::check_storage_root(Path::new(&config.source.storage.root)),
            mirror_token: Self::check_mirror_token(config.mirror.token.as_deref()),
            hook_secret: Self::check_hook_secret(&config.hooks.secret),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, r)| r.passed)
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check git installation
    fn check_git() -> CheckResult {
        match std::process::Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error("Git command failed"),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// The GitLab repositories must be readable from this host
    fn check_storage_root(root: &Path) -> CheckResult {
        if root.is_dir() {
            CheckResult::ok_with_details("Storage root exists", root.display().to_string())
        } else {
            CheckResult::error_with_details(
                "Storage root does not exist",
                format!(
                    "{} not found. Run repomirror on the GitLab host or set source.storage.root",
                    root.display()
                ),
            )
        }
    }

    fn check_mirror_token(configured: Option<&str>) -> CheckResult {
        if configured.is_some_and(|t| !t.is_empty()) {
            return CheckResult::ok("GitHub token configured");
        }
        match std::env::var("GITHUB_TOKEN") {
            Ok(token) if !token.is_empty() => {
                CheckResult::ok_with_details("GitHub token found", "Using GITHUB_TOKEN")
            }
            _ => CheckResult::error_with_details(
                "No GitHub token",
                "Set mirror.token or export GITHUB_TOKEN",
            ),
        }
    }

    fn check_hook_secret(secret: &str) -> CheckResult {
        if secret.is_empty() {
            CheckResult::error_with_details(
                "No webhook secret",
                "Set hooks.secret to the token configured on the GitLab system hook",
            )
        } else if secret.len() < MIN_SECRET_LEN {
            CheckResult::warning_with_details(
                "Webhook secret is short",
                format!("Use at least {} characters", MIN_SECRET_LEN),
            )
        } else {
            CheckResult::ok("Webhook secret configured")
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Installation", &self.git),
            ("Storage Root", &self.storage_root),
            ("GitHub Token", &self.mirror_token),
            ("Webhook Secret", &self.hook_secret),
        ]
    }
}
