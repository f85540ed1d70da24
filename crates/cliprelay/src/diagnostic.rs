//! Store connectivity diagnostics.
//!
//! Tries every configured endpoint on its own, outside any service instance,
//! and reports what it found.

use std::fmt::Write as _;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::logging::{Glyph, Icons};
use crate::store::connector::open_endpoint;
use crate::store::{Endpoint, Store};

/// One configuration value as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingSummary {
    /// Setting name.
    pub name: &'static str,
    /// Displayed value; secrets are masked.
    pub value: Option<String>,
}

/// Result of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCheck {
    /// Endpoint label.
    pub label: String,
    /// `host:port`.
    pub address: String,
    /// Database name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Server version, when the connection succeeded.
    pub server_version: Option<String>,
    /// Failure description, when it did not.
    pub error: Option<String>,
    /// Time taken, in milliseconds.
    pub elapsed_ms: u64,
}

impl EndpointCheck {
    /// Whether the endpoint accepted a connection.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything `check` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    /// Effective store settings.
    pub settings: Vec<SettingSummary>,
    /// Per-endpoint results, in search order.
    pub endpoints: Vec<EndpointCheck>,
}

impl DiagnosticReport {
    /// Number of endpoints that accepted a connection.
    #[must_use]
    pub fn reachable_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_reachable()).count()
    }

    /// Whether at least one endpoint is usable.
    #[must_use]
    pub fn any_reachable(&self) -> bool {
        self.reachable_count() > 0
    }

    /// The report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render the report for a terminal.
    #[must_use]
    pub fn render(&self, icons: Icons) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Store connection check");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out);
        let _ = writeln!(out, "Configuration:");
        for setting in &self.settings {
            match &setting.value {
                Some(value) => {
                    let _ = writeln!(out, "    {:<14} {}", setting.name, value);
                }
                None => {
                    let _ = writeln!(
                        out,
                        "    {:<14} {} NOT SET",
                        setting.name,
                        icons.get(Glyph::Warning)
                    );
                }
            }
        }

        for check in &self.endpoints {
            let _ = writeln!(out);
            if let Some(version) = &check.server_version {
                let _ = writeln!(
                    out,
                    "{} Connected to {} ({}) in {} ms",
                    icons.get(Glyph::Success),
                    check.label,
                    check.address,
                    check.elapsed_ms
                );
                let _ = writeln!(out, "    Database:   {}", check.database);
                let _ = writeln!(out, "    User:       {}", check.user);
                let _ = writeln!(out, "    PostgreSQL: {version}");
            } else {
                let _ = writeln!(
                    out,
                    "{} {} ({}) failed: {}",
                    icons.get(Glyph::Error),
                    check.label,
                    check.address,
                    check.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{rule}");
        if self.any_reachable() {
            let _ = writeln!(
                out,
                "{} {}/{} endpoints reachable",
                icons.get(Glyph::Success),
                self.reachable_count(),
                self.endpoints.len()
            );
        } else {
            let _ = writeln!(
                out,
                "{} No endpoint reachable; check the configuration and network",
                icons.get(Glyph::Error)
            );
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}

/// The store settings from `config`, with the password masked.
#[must_use]
pub fn settings_summary(config: &Config) -> Vec<SettingSummary> {
    let redacted = config.redacted();
    let store = &redacted.store;
    let set = |value: String| Some(value).filter(|v| !v.is_empty());
    vec![
        SettingSummary {
            name: "database",
            value: set(store.database.clone()),
        },
        SettingSummary {
            name: "user",
            value: set(store.user.clone()),
        },
        SettingSummary {
            name: "password",
            value: store.password.clone().and_then(set),
        },
        SettingSummary {
            name: "port",
            value: Some(store.port.to_string()),
        },
        SettingSummary {
            name: "primary_host",
            value: set(store.primary_host.clone()),
        },
        SettingSummary {
            name: "fallback_host",
            value: set(store.fallback_host.clone()),
        },
    ]
}

/// Connect to one endpoint, ask for the server version, and disconnect.
pub async fn check_endpoint(store: &dyn Store, endpoint: &Endpoint) -> EndpointCheck {
    let started = Instant::now();
    debug!(endpoint = %endpoint, "Checking endpoint");

    let result = match open_endpoint(store, endpoint).await {
        Ok(mut conn) => {
            let version = conn.server_version().await;
            conn.close().await;
            version
        }
        Err(e) => Err(e),
    };

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let (server_version, error) = match result {
        Ok(version) => (Some(short_version(&version)), None),
        Err(e) => (None, Some(e.to_string())),
    };

    EndpointCheck {
        label: endpoint.label.clone(),
        address: endpoint.to_string(),
        database: endpoint.database.clone(),
        user: endpoint.user.clone(),
        server_version,
        error,
        elapsed_ms,
    }
}

/// Check every endpoint in order, each independently of the others.
pub async fn run_checks(
    config: &Config,
    store: &dyn Store,
    endpoints: &[Endpoint],
) -> DiagnosticReport {
    let mut checks = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        checks.push(check_endpoint(store, endpoint).await);
    }
    DiagnosticReport {
        settings: settings_summary(config),
        endpoints: checks,
    }
}

/// `PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by ...` -> `PostgreSQL 16.2 on x86_64-pc-linux-gnu`
fn short_version(version: &str) -> String {
    version
        .split(',')
        .next()
        .unwrap_or(version)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{endpoints, FakeStore};

    #[tokio::test]
    async fn test_checks_every_endpoint() {
        let store = FakeStore::new();
        store.set_reachable("b", true);

        let report = run_checks(&Config::default(), &store, &endpoints(&["a", "b"])).await;

        assert_eq!(report.endpoints.len(), 2);
        assert!(!report.endpoints[0].is_reachable());
        assert!(report.endpoints[0].error.as_ref().unwrap().contains("refused"));
        assert!(report.endpoints[1].is_reachable());
        assert_eq!(
            report.endpoints[1].server_version.as_deref(),
            Some("FakeSQL 1.0 on b")
        );
        assert_eq!(report.reachable_count(), 1);
        assert_eq!(store.connect_log(), vec!["a", "b"]);
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_checks_continue_after_first_success() {
        let store = FakeStore::new();
        store.set_reachable("a", true);
        store.set_reachable("b", true);

        let report = run_checks(&Config::default(), &store, &endpoints(&["a", "b"])).await;
        assert_eq!(report.reachable_count(), 2);
    }

    #[tokio::test]
    async fn test_nothing_reachable() {
        let store = FakeStore::new();
        let report = run_checks(&Config::default(), &store, &endpoints(&["a", "b"])).await;

        assert!(!report.any_reachable());
        assert!(report.render(Icons::ascii()).contains("No endpoint reachable"));
    }

    #[test]
    fn test_settings_summary_masks_password() {
        let mut config = Config::default();
        config.store.password = Some("hunter2".to_string());

        let summary = settings_summary(&config);
        let password = summary.iter().find(|s| s.name == "password").unwrap();
        assert_eq!(password.value.as_deref(), Some("*******"));
    }

    #[test]
    fn test_settings_summary_reports_missing_password() {
        let summary = settings_summary(&Config::default());
        let password = summary.iter().find(|s| s.name == "password").unwrap();
        assert!(password.value.is_none());

        let report = DiagnosticReport {
            settings: summary,
            endpoints: Vec::new(),
        };
        assert!(report.render(Icons::ascii()).contains("[WARN] NOT SET"));
    }

    #[test]
    fn test_short_version() {
        assert_eq!(
            short_version("PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc"),
            "PostgreSQL 16.2 on x86_64-pc-linux-gnu"
        );
        assert_eq!(short_version("FakeSQL"), "FakeSQL");
    }

    #[test]
    fn test_report_json() {
        let report = DiagnosticReport {
            settings: Vec::new(),
            endpoints: vec![EndpointCheck {
                label: "primary".to_string(),
                address: "10.0.0.44:5432".to_string(),
                database: "clipboard_tts".to_string(),
                user: "postgres".to_string(),
                server_version: Some("PostgreSQL 16.2".to_string()),
                error: None,
                elapsed_ms: 12,
            }],
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"server_version\": \"PostgreSQL 16.2\""));
    }
}
