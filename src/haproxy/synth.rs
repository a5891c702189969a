//! Load balancer configuration text.
//!
//! # Data Flow
//! ```text
//! (spec, healthy IPs)
//!     → plan(): port routes, domains, overrides, servers
//!     → render(): global + defaults
//!                 HTTP redirect frontend
//!                 HTTPS frontend: one ACL + use_backend per domain
//!                 TCP frontends for tcp-mode routes
//!                 one backend per (application, port) bucket
//! ```
//!
//! # Design Decisions
//! - Output depends only on the inputs: plans are ordered by application
//!   name, servers by address
//! - A domain claimed by two applications goes to the first in order
//! - The alias domain is served by the first port's backend
//! - ACL and backend names are derived injectively from domains; distinct
//!   domains never share an identifier

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::Ipv4Addr;

use super::overrides::{Override, OverrideTable};
use crate::config::{ProxyMode, TlsMode};
use crate::domains::{DomainError, DomainMapper};
use crate::specs::types::ApplicationSpec;

const ACME_PORT: u16 = 8787;

/// One application port and everything routed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRoute {
    pub port: u16,
    pub component: String,
    pub backend: String,
    pub domains: Vec<String>,
    pub settings: Override,
}

/// Everything the configuration needs about one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPlan {
    pub app: String,
    pub routes: Vec<PortRoute>,
    pub servers: Vec<Ipv4Addr>,
}

impl AppPlan {
    /// Every domain of the application, in route order.
    pub fn domains(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.routes
            .iter()
            .flat_map(|r| r.domains.iter())
            .filter(|d| seen.insert(d.as_str()))
            .cloned()
            .collect()
    }
}

/// Identifier-safe form of a name. Lossy: only for names that are unique
/// on their own, such as addresses.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// HAProxy identifier for a domain. Characters HAProxy accepts in names are
/// kept; any other byte becomes `:xx`, and `:` never appears literally, so
/// distinct inputs give distinct identifiers.
pub fn identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'_' => out.push(byte as char),
            other => out.push_str(&format!(":{other:02x}")),
        }
    }
    out
}

/// Builds the complete configuration document.
#[derive(Debug, Clone)]
pub struct ConfigSynthesizer {
    mapper: DomainMapper,
    overrides: OverrideTable,
    cert_dir: String,
}

impl ConfigSynthesizer {
    pub fn new(mapper: DomainMapper, overrides: OverrideTable, cert_dir: impl Into<String>) -> Self {
        Self {
            mapper,
            overrides,
            cert_dir: cert_dir.into(),
        }
    }

    pub fn mapper(&self) -> &DomainMapper {
        &self.mapper
    }

    /// Routes and servers of one application.
    pub fn plan(&self, spec: &ApplicationSpec, healthy: &[Ipv4Addr]) -> Result<AppPlan, DomainError> {
        let alias = self.mapper.alias_domain(spec);
        let routes = self
            .mapper
            .port_domains(spec)?
            .into_iter()
            .enumerate()
            .map(|(index, group)| {
                let mut domains = vec![group.canonical.clone()];
                if index == 0 {
                    domains.push(alias.clone());
                }
                domains.extend(group.custom);
                PortRoute {
                    port: group.port,
                    backend: format!("{}_backend", identifier(&group.canonical)),
                    settings: self.overrides.resolve(group.port, &group.component),
                    component: group.component,
                    domains,
                }
            })
            .collect();

        let servers: BTreeSet<Ipv4Addr> = healthy.iter().copied().collect();
        Ok(AppPlan {
            app: spec.name.clone(),
            routes,
            servers: servers.into_iter().collect(),
        })
    }

    /// Configuration for every application with at least one healthy IP.
    /// Applications whose domains cannot be derived are left out.
    pub fn build_config(
        &self,
        specs: &[&ApplicationSpec],
        healthy: &BTreeMap<String, Vec<Ipv4Addr>>,
    ) -> String {
        let plans: Vec<AppPlan> = specs
            .iter()
            .filter_map(|spec| {
                let ips = healthy.get(&spec.name)?;
                match self.plan(spec, ips) {
                    Ok(plan) => Some(plan),
                    Err(e) => {
                        tracing::warn!(app = %spec.name, error = %e, "Skipping application");
                        None
                    }
                }
            })
            .collect();
        self.render(&plans)
    }

    /// Render plans into configuration text.
    pub fn render(&self, plans: &[AppPlan]) -> String {
        let mut ordered: Vec<&AppPlan> = plans.iter().filter(|p| !p.servers.is_empty()).collect();
        ordered.sort_by(|a, b| a.app.cmp(&b.app));

        let mut out = String::new();
        self.render_preamble(&mut out);

        let mut claimed: HashSet<&str> = HashSet::new();
        let mut acls = String::new();
        let mut tcp_frontends = String::new();
        let mut tcp_ports: HashSet<u16> = HashSet::new();
        let mut backends = String::new();
        let mut backend_names: HashSet<&str> = HashSet::new();

        for plan in &ordered {
            for route in &plan.routes {
                if !backend_names.insert(route.backend.as_str()) {
                    tracing::warn!(app = %plan.app, backend = %route.backend, "Backend already defined, skipping route");
                    continue;
                }
                match route.settings.mode {
                    ProxyMode::Http => {
                        for domain in &route.domains {
                            if !claimed.insert(domain.as_str()) {
                                tracing::warn!(app = %plan.app, domain = %domain, "Domain already routed, skipping");
                                continue;
                            }
                            let acl = format!("host_{}", identifier(domain));
                            push(&mut acls, 1, &format!("acl {acl} hdr(host) -i {domain}"));
                            push(&mut acls, 1, &format!("use_backend {} if {acl}", route.backend));
                        }
                    }
                    ProxyMode::Tcp => {
                        if !tcp_ports.insert(route.port) {
                            tracing::warn!(app = %plan.app, port = route.port, "TCP port already bound, skipping");
                            continue;
                        }
                        tcp_frontends.push('\n');
                        push(&mut tcp_frontends, 0, &format!("frontend tcp_{}_{}", route.port, sanitize(&route.component)));
                        push(&mut tcp_frontends, 1, "mode tcp");
                        push(&mut tcp_frontends, 1, &format!("bind 0.0.0.0:{}", route.port));
                        push(&mut tcp_frontends, 1, &format!("default_backend {}", route.backend));
                    }
                }
                render_backend(&mut backends, route, &plan.servers);
            }
        }

        out.push('\n');
        push(&mut out, 0, "frontend wwwhttps");
        push(&mut out, 1, &format!("bind 0.0.0.0:443 ssl crt {}", self.cert_dir));
        push(&mut out, 1, "option forwardfor");
        push(&mut out, 1, "http-request add-header X-Forwarded-Proto https");
        out.push_str(&acls);
        out.push_str(&tcp_frontends);

        out.push('\n');
        push(&mut out, 0, "backend letsencrypt-backend");
        push(&mut out, 1, &format!("server letsencrypt 127.0.0.1:{ACME_PORT}"));
        out.push_str(&backends);
        out
    }

    fn render_preamble(&self, out: &mut String) {
        for (indent, text) in [
            (0, "global"),
            (1, "maxconn 50000"),
            (1, "log /dev/log local0"),
            (1, "ssl-default-bind-options ssl-min-ver TLSv1.2"),
            (1, "tune.ssl.default-dh-param 2048"),
            (0, ""),
            (0, "defaults"),
            (1, "log global"),
            (1, "mode http"),
            (1, "option httplog"),
            (1, "option dontlognull"),
            (1, "timeout connect 5s"),
            (1, "timeout client 60s"),
            (1, "timeout server 60s"),
            (0, ""),
            (0, "frontend wwwhttp"),
            (1, "bind 0.0.0.0:80"),
            (1, "option forwardfor"),
            (1, "acl letsencrypt-acl path_beg /.well-known/acme-challenge/"),
            (1, "use_backend letsencrypt-backend if letsencrypt-acl"),
            (1, "redirect scheme https code 301 if !letsencrypt-acl"),
        ] {
            push(out, indent, text);
        }
    }
}

fn render_backend(out: &mut String, route: &PortRoute, servers: &[Ipv4Addr]) {
    let settings = &route.settings;
    out.push('\n');
    push(out, 0, &format!("backend {}", route.backend));
    if settings.mode == ProxyMode::Tcp {
        push(out, 1, "mode tcp");
    }
    push(out, 1, &format!("balance {}", settings.balance));
    for line in settings.timeouts.iter().chain(&settings.check_lines).chain(&settings.headers) {
        push(out, 1, line);
    }
    let tls = match settings.tls {
        TlsMode::Terminate => "",
        TlsMode::Reencrypt => " ssl verify none",
    };
    for ip in servers {
        let name = format!("{}_{}", sanitize(&ip.to_string()), route.port);
        push(out, 1, &format!("server {name} {ip}:{} check{tls}", route.port));
    }
}

fn push(out: &mut String, indent: usize, text: &str) {
    if !text.is_empty() {
        for _ in 0..indent {
            out.push_str("    ");
        }
        out.push_str(text);
    }
    out.push('\n');
}
