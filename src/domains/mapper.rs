//! Canonical and custom domain derivation.

use thiserror::Error;

use crate::config::DomainConfig;
use crate::context::is_subdomain_of;
use crate::specs::ApplicationSpec;

/// Schemes removed from user-supplied domains.
const SCHEMES: [&str; 2] = ["https://", "http://"];

/// Specification data that cannot be mapped to domains.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{app}: {ports} ports produced {domains} canonical domains")]
    CanonicalCount { app: String, ports: usize, domains: usize },

    #[error("{app}/{component}: {ports} ports but {domains} domain entries")]
    DomainEntries {
        app: String,
        component: String,
        ports: usize,
        domains: usize,
    },

    #[error("{0} declares no ports")]
    NoPorts(String),
}

/// Domains served by a single application port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDomains {
    pub port: u16,
    /// Component name, or the application name for flat specifications.
    pub component: String,
    pub canonical: String,
    pub custom: Vec<String>,
}

/// Derives domain names under the managed subdomain.
#[derive(Debug, Clone)]
pub struct DomainMapper {
    suffix: String,
}

impl DomainMapper {
    pub fn new(config: &DomainConfig) -> Self {
        Self {
            suffix: config.managed_suffix().to_lowercase(),
        }
    }

    /// The managed suffix, e.g. `app.runonflux.io`.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `<app>.<sub>.<root>`.
    pub fn alias_domain(&self, spec: &ApplicationSpec) -> String {
        format!("{}.{}", spec.name.to_lowercase(), self.suffix)
    }

    /// One domain per declared port plus the alias, in declaration order.
    pub fn canonical_domains(&self, spec: &ApplicationSpec) -> Result<Vec<String>, DomainError> {
        let app = spec.name.to_lowercase();
        let ports = spec.all_ports();
        if ports.is_empty() {
            return Err(DomainError::NoPorts(spec.name.clone()));
        }

        let mut domains: Vec<String> = ports
            .iter()
            .map(|port| format!("{}_{}.{}", app, port, self.suffix))
            .collect();
        domains.push(self.alias_domain(spec));
        dedup_in_order(&mut domains);

        if domains.len() != ports.len() + 1 {
            return Err(DomainError::CanonicalCount {
                app: spec.name.clone(),
                ports: ports.len(),
                domains: domains.len(),
            });
        }
        Ok(domains)
    }

    /// Every accepted custom domain variant across all ports.
    pub fn custom_domains(&self, spec: &ApplicationSpec) -> Result<Vec<String>, DomainError> {
        let mut all: Vec<String> = self
            .port_domains(spec)?
            .into_iter()
            .flat_map(|p| p.custom)
            .collect();
        dedup_in_order(&mut all);
        Ok(all)
    }

    /// Canonical and custom domains grouped by port.
    pub fn port_domains(&self, spec: &ApplicationSpec) -> Result<Vec<PortDomains>, DomainError> {
        let canonical = self.canonical_domains(spec)?;
        let mut result = Vec::new();

        for group in spec.port_groups() {
            if !group.domains.is_empty() && group.domains.len() != group.ports.len() {
                return Err(DomainError::DomainEntries {
                    app: spec.name.clone(),
                    component: group.name.to_string(),
                    ports: group.ports.len(),
                    domains: group.domains.len(),
                });
            }
            for (i, port) in group.ports.iter().enumerate() {
                let text = group.domains.get(i).map(String::as_str).unwrap_or("");
                result.push(PortDomains {
                    port: *port,
                    component: group.name.to_string(),
                    canonical: canonical[result.len()].clone(),
                    custom: self.parse_custom(text),
                });
            }
        }
        Ok(result)
    }

    /// Parse one port's comma-separated free text.
    pub fn parse_custom(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for entry in text.split(',') {
            let Some(base) = self.normalize_custom(entry) else {
                continue;
            };
            out.push(base.clone());
            out.push(format!("www.{}", base));
            out.push(format!("test.{}", base));
        }
        dedup_in_order(&mut out);
        out
    }

    fn normalize_custom(&self, entry: &str) -> Option<String> {
        let mut domain = entry.trim().to_lowercase();
        for scheme in SCHEMES {
            if let Some(rest) = domain.strip_prefix(scheme) {
                domain = rest.to_string();
            }
        }
        if let Some((host, _path)) = domain.split_once('/') {
            domain = host.to_string();
        }
        domain.retain(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        let domain = domain.trim_matches('.');
        let domain = domain.strip_prefix("www.").unwrap_or(domain);

        let managed = domain == self.suffix || is_subdomain_of(domain, &self.suffix);
        if !domain.contains('.') || domain.len() < 3 || managed {
            return None;
        }
        Some(domain.to_string())
    }
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|d| seen.insert(d.clone()));
}
