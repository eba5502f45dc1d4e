//! The authorization chain: ordered request predicates independent of
//! authentication.
//!
//! Each check answers "is this request authorized" from request attributes
//! alone. Evaluation short-circuits at the first check that grants. An
//! empty chain defers to the authentication result; absence of a chain
//! never denies by itself.

use std::collections::BTreeMap;

/// The request attributes authorization checks evaluate against.
///
/// Checks are pure with respect to these facts and never mutate the
/// request they describe.
#[derive(Debug, Clone, Default)]
pub struct RequestFacts {
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Origin host, when the request carried one.
    pub host: Option<String>,
    /// Request headers, lowercased names.
    pub headers: BTreeMap<String, String>,
}

impl RequestFacts {
    /// Creates facts for a method and path with no host or headers.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            host: None,
            headers: BTreeMap::new(),
        }
    }

    /// Sets the origin host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }
}

/// A single authorization capability: a stateless predicate over a request.
pub trait AuthzCheck: Send + Sync {
    /// Short identifier for logging.
    fn name(&self) -> &'static str;

    /// Returns true if this check authorizes the request.
    fn check_authorization(&self, facts: &RequestFacts) -> bool;
}

/// Outcome of evaluating an authorization chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Some check granted the request.
    Granted,
    /// A non-empty chain ran and no check granted.
    Denied,
    /// The chain is empty; defer to the authentication result only.
    NoChain,
}

/// Ordered, short-circuiting set of authorization checks.
///
/// Built once at startup from tagged configuration entries; evaluation
/// order is configuration order.
#[derive(Default)]
pub struct AuthzChain {
    checks: Vec<Box<dyn AuthzCheck>>,
}

impl AuthzChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Appends a check to the chain.
    #[must_use]
    pub fn with_check(mut self, check: Box<dyn AuthzCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Returns the number of checks in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Returns true if the chain has no checks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Evaluates the chain against the request facts.
    ///
    /// Stops at the first check that grants.
    #[must_use]
    pub fn evaluate(&self, facts: &RequestFacts) -> ChainOutcome {
        if self.checks.is_empty() {
            return ChainOutcome::NoChain;
        }
        for check in &self.checks {
            if check.check_authorization(facts) {
                return ChainOutcome::Granted;
            }
        }
        ChainOutcome::Denied
    }
}

impl std::fmt::Debug for AuthzChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthzChain")
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Grants requests whose origin host is on an allowlist.
///
/// Hosts compare case-insensitively with any port stripped.
#[derive(Debug, Clone)]
pub struct AllowedHosts {
    hosts: Vec<String>,
}

impl AllowedHosts {
    /// Creates the check from a host allowlist.
    #[must_use]
    pub fn new(hosts: impl IntoIterator<Item = String>) -> Self {
        Self {
            hosts: hosts.into_iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    fn hostname(host: &str) -> &str {
        host.rsplit_once(':').map_or(host, |(name, _)| name)
    }
}

impl AuthzCheck for AllowedHosts {
    fn name(&self) -> &'static str {
        "hosts"
    }

    fn check_authorization(&self, facts: &RequestFacts) -> bool {
        let Some(host) = facts.host.as_deref() else {
            return false;
        };
        let hostname = Self::hostname(host).to_lowercase();
        self.hosts.iter().any(|h| *h == hostname)
    }
}

/// Grants requests whose path starts with a configured prefix.
///
/// Used for paths that must stay reachable without authentication, such as
/// health probes and static assets.
#[derive(Debug, Clone)]
pub struct PublicPaths {
    prefixes: Vec<String>,
}

impl PublicPaths {
    /// Creates the check from a list of path prefixes.
    #[must_use]
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }
}

impl AuthzCheck for PublicPaths {
    fn name(&self) -> &'static str {
        "public_paths"
    }

    fn check_authorization(&self, facts: &RequestFacts) -> bool {
        self.prefixes.iter().any(|p| facts.path.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-answer check for chain-evaluation tests.
    struct Fixed(bool);

    impl AuthzCheck for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn check_authorization(&self, _facts: &RequestFacts) -> bool {
            self.0
        }
    }

    fn chain_of(answers: &[bool]) -> AuthzChain {
        answers.iter().fold(AuthzChain::new(), |chain, &a| {
            chain.with_check(Box::new(Fixed(a)))
        })
    }

    #[test]
    fn chain_grants_when_any_check_passes() {
        let chain = chain_of(&[false, false, true]);
        let facts = RequestFacts::new("GET", "/");
        assert_eq!(chain.evaluate(&facts), ChainOutcome::Granted);
    }

    #[test]
    fn chain_denies_when_all_checks_fail() {
        let chain = chain_of(&[false, false]);
        let facts = RequestFacts::new("GET", "/");
        assert_eq!(chain.evaluate(&facts), ChainOutcome::Denied);
    }

    #[test]
    fn empty_chain_defers_to_authentication() {
        let chain = AuthzChain::new();
        let facts = RequestFacts::new("GET", "/");
        assert_eq!(chain.evaluate(&facts), ChainOutcome::NoChain);
    }

    #[test]
    fn chain_short_circuits_on_first_grant() {
        /// Panics if evaluated; proves short-circuiting.
        struct Unreachable;

        impl AuthzCheck for Unreachable {
            fn name(&self) -> &'static str {
                "unreachable"
            }

            fn check_authorization(&self, _facts: &RequestFacts) -> bool {
                panic!("chain did not short-circuit");
            }
        }

        let chain = AuthzChain::new()
            .with_check(Box::new(Fixed(true)))
            .with_check(Box::new(Unreachable));
        let facts = RequestFacts::new("GET", "/");
        assert_eq!(chain.evaluate(&facts), ChainOutcome::Granted);
    }

    #[test]
    fn allowed_hosts_matches_case_insensitively() {
        let check = AllowedHosts::new(vec!["App.Example.COM".to_string()]);
        let facts = RequestFacts::new("GET", "/").with_host("app.example.com");
        assert!(check.check_authorization(&facts));
    }

    #[test]
    fn allowed_hosts_ignores_port() {
        let check = AllowedHosts::new(vec!["localhost".to_string()]);
        let facts = RequestFacts::new("GET", "/").with_host("localhost:3000");
        assert!(check.check_authorization(&facts));
    }

    #[test]
    fn allowed_hosts_rejects_unknown_host() {
        let check = AllowedHosts::new(vec!["app.example.com".to_string()]);
        let facts = RequestFacts::new("GET", "/").with_host("evil.example.net");
        assert!(!check.check_authorization(&facts));
    }

    #[test]
    fn allowed_hosts_rejects_missing_host() {
        let check = AllowedHosts::new(vec!["app.example.com".to_string()]);
        let facts = RequestFacts::new("GET", "/");
        assert!(!check.check_authorization(&facts));
    }

    #[test]
    fn public_paths_matches_prefix() {
        let check = PublicPaths::new(vec!["/healthz".to_string(), "/static/".to_string()]);

        assert!(check.check_authorization(&RequestFacts::new("GET", "/healthz")));
        assert!(check.check_authorization(&RequestFacts::new("GET", "/static/app.css")));
        assert!(!check.check_authorization(&RequestFacts::new("GET", "/api/v1/login")));
    }
}
