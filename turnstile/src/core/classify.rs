//! Request classification and bucket key derivation
//!
//! Classification is an ordered predicate chain, first match wins:
//!
//! 1. path under a bypass prefix → [`Classification::Bypass`]
//! 2. path under the authentication prefix → [`TrafficClass::Auth`]
//! 3. authenticated, non-anonymous principal → [`TrafficClass::Api`]
//! 4. anything else → [`TrafficClass::Public`]

use super::TrafficClass;
use std::fmt;

/// Prefixes exempt from admission control: health checks, API docs,
/// interactive docs UI, the database console and the websocket handshake
pub const DEFAULT_BYPASS_PREFIXES: [&str; 6] = [
    "/actuator/",
    "/swagger-ui/",
    "/api-docs/",
    "/swagger-ui.html",
    "/h2-console/",
    "/ws/",
];

pub const DEFAULT_AUTH_PREFIX: &str = "/api/auth/";

/// Principal name the authentication layer reports for unauthenticated callers
pub const DEFAULT_ANONYMOUS_PRINCIPAL: &str = "anonymousUser";

/// Identifier used when no client address can be resolved at all
pub const UNKNOWN_CLIENT: &str = "unknown";

/// What the admission layer needs to know about one inbound request
///
/// All fields are borrowed from the transport; header values are the raw
/// strings, if the header was present and readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub principal: Option<&'a str>,
    pub forwarded_for: Option<&'a str>,
    pub real_ip: Option<&'a str>,
    pub peer_addr: Option<&'a str>,
}

impl<'a> RequestContext<'a> {
    pub fn new(path: &'a str) -> Self {
        RequestContext {
            path,
            ..Default::default()
        }
    }

    pub fn with_principal(mut self, principal: &'a str) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_forwarded_for(mut self, value: &'a str) -> Self {
        self.forwarded_for = Some(value);
        self
    }

    pub fn with_real_ip(mut self, value: &'a str) -> Self {
        self.real_ip = Some(value);
        self
    }

    pub fn with_peer_addr(mut self, value: &'a str) -> Self {
        self.peer_addr = Some(value);
        self
    }
}

/// Result of classifying a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Exempt: no bucket, no headers
    Bypass,
    Limited(TrafficClass),
}

/// Bucket key in the form `<CLASS>:<identifier>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey(String);

impl BucketKey {
    pub fn new(class: TrafficClass, identifier: &str) -> Self {
        let mut key = String::with_capacity(class.as_str().len() + 1 + identifier.len());
        key.push_str(class.as_str());
        key.push(':');
        key.push_str(identifier);
        BucketKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path and principal rules for classification
///
/// # Example
///
/// ```
/// use turnstile::{Classification, Classifier, RequestContext, TrafficClass};
///
/// let classifier = Classifier::default();
///
/// let login = RequestContext::new("/api/auth/login").with_peer_addr("10.0.0.1");
/// assert_eq!(classifier.classify(&login), Classification::Limited(TrafficClass::Auth));
/// assert_eq!(classifier.bucket_key(TrafficClass::Auth, &login).as_str(), "AUTH:10.0.0.1");
///
/// let health = RequestContext::new("/actuator/health");
/// assert_eq!(classifier.classify(&health), Classification::Bypass);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    bypass_prefixes: Vec<String>,
    auth_prefix: String,
    anonymous_principal: String,
}

impl Classifier {
    pub fn new(
        bypass_prefixes: Vec<String>,
        auth_prefix: impl Into<String>,
        anonymous_principal: impl Into<String>,
    ) -> Self {
        Classifier {
            bypass_prefixes,
            auth_prefix: auth_prefix.into(),
            anonymous_principal: anonymous_principal.into(),
        }
    }

    pub fn bypass_prefixes(&self) -> &[String] {
        &self.bypass_prefixes
    }

    pub fn auth_prefix(&self) -> &str {
        &self.auth_prefix
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// The principal name, if it denotes an authenticated caller
    pub fn authenticated_principal<'a>(&self, ctx: &RequestContext<'a>) -> Option<&'a str> {
        ctx.principal
            .filter(|name| !name.is_empty() && *name != self.anonymous_principal)
    }

    pub fn classify(&self, ctx: &RequestContext<'_>) -> Classification {
        if self.is_bypassed(ctx.path) {
            Classification::Bypass
        } else if ctx.path.starts_with(self.auth_prefix.as_str()) {
            Classification::Limited(TrafficClass::Auth)
        } else if self.authenticated_principal(ctx).is_some() {
            Classification::Limited(TrafficClass::Api)
        } else {
            Classification::Limited(TrafficClass::Public)
        }
    }

    /// Principal name for API traffic, client address otherwise
    ///
    /// API traffic without an authenticated principal cannot come out of
    /// [`classify`](Self::classify); if a caller forces it anyway the client
    /// address is used.
    pub fn identifier<'a>(&self, class: TrafficClass, ctx: &RequestContext<'a>) -> &'a str {
        match class {
            TrafficClass::Api => self
                .authenticated_principal(ctx)
                .unwrap_or_else(|| resolve_client_address(ctx)),
            TrafficClass::Auth | TrafficClass::Public => resolve_client_address(ctx),
        }
    }

    pub fn bucket_key(&self, class: TrafficClass, ctx: &RequestContext<'_>) -> BucketKey {
        BucketKey::new(class, self.identifier(class, ctx))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(
            DEFAULT_BYPASS_PREFIXES.iter().map(|p| p.to_string()).collect(),
            DEFAULT_AUTH_PREFIX,
            DEFAULT_ANONYMOUS_PRINCIPAL,
        )
    }
}

/// Client address with forwarded-for, then real-ip, then peer precedence
///
/// Only the left-most forwarded-for entry counts. Blank values fall through
/// to the next source; nothing here ever fails.
pub fn resolve_client_address<'a>(ctx: &RequestContext<'a>) -> &'a str {
    if let Some(first) = ctx
        .forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
    {
        return first;
    }

    if let Some(real_ip) = ctx.real_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
        return real_ip;
    }

    ctx.peer_addr
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypass_prefixes() {
        let classifier = Classifier::default();
        for path in [
            "/actuator/health",
            "/swagger-ui/index.html",
            "/api-docs/openapi.json",
            "/swagger-ui.html",
            "/h2-console/login.do",
            "/ws/chat",
        ] {
            let ctx = RequestContext::new(path).with_principal("alice");
            assert_eq!(classifier.classify(&ctx), Classification::Bypass, "{path}");
        }
    }

    #[test]
    fn test_prefix_match_is_literal() {
        let classifier = Classifier::default();
        // No trailing slash, so not under /actuator/
        let ctx = RequestContext::new("/actuator");
        assert_eq!(
            classifier.classify(&ctx),
            Classification::Limited(TrafficClass::Public)
        );
    }

    #[test]
    fn test_auth_prefix_wins_over_principal() {
        let classifier = Classifier::default();
        let ctx = RequestContext::new("/api/auth/refresh").with_principal("alice");
        assert_eq!(
            classifier.classify(&ctx),
            Classification::Limited(TrafficClass::Auth)
        );
    }

    #[test]
    fn test_authenticated_principal_is_api() {
        let classifier = Classifier::default();
        let ctx = RequestContext::new("/api/tasks").with_principal("alice");
        assert_eq!(
            classifier.classify(&ctx),
            Classification::Limited(TrafficClass::Api)
        );
        assert_eq!(
            classifier.bucket_key(TrafficClass::Api, &ctx).as_str(),
            "API:alice"
        );
    }

    #[test]
    fn test_anonymous_principal_is_public() {
        let classifier = Classifier::default();
        for principal in ["anonymousUser", ""] {
            let ctx = RequestContext::new("/api/tasks")
                .with_principal(principal)
                .with_peer_addr("10.0.0.7");
            assert_eq!(
                classifier.classify(&ctx),
                Classification::Limited(TrafficClass::Public)
            );
            assert_eq!(
                classifier.bucket_key(TrafficClass::Public, &ctx).as_str(),
                "PUBLIC:10.0.0.7"
            );
        }
    }

    #[test]
    fn test_forwarded_for_takes_left_most_entry() {
        let ctx = RequestContext::new("/")
            .with_forwarded_for(" 203.0.113.5 , 10.0.0.1, 10.0.0.2")
            .with_real_ip("198.51.100.9")
            .with_peer_addr("127.0.0.1");
        assert_eq!(resolve_client_address(&ctx), "203.0.113.5");
    }

    #[test]
    fn test_real_ip_then_peer_fallback() {
        let ctx = RequestContext::new("/")
            .with_real_ip("198.51.100.9")
            .with_peer_addr("127.0.0.1");
        assert_eq!(resolve_client_address(&ctx), "198.51.100.9");

        let ctx = RequestContext::new("/").with_peer_addr("127.0.0.1");
        assert_eq!(resolve_client_address(&ctx), "127.0.0.1");

        assert_eq!(resolve_client_address(&RequestContext::new("/")), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_malformed_forwarded_for_falls_through() {
        for header in ["", "   ", ", 10.0.0.1", ","] {
            let ctx = RequestContext::new("/")
                .with_forwarded_for(header)
                .with_real_ip("198.51.100.9");
            assert_eq!(resolve_client_address(&ctx), "198.51.100.9", "{header:?}");
        }

        let ctx = RequestContext::new("/")
            .with_forwarded_for(" ")
            .with_real_ip("  ")
            .with_peer_addr("192.0.2.1");
        assert_eq!(resolve_client_address(&ctx), "192.0.2.1");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::default();
        let ctx = RequestContext::new("/api/notes")
            .with_forwarded_for("203.0.113.5")
            .with_peer_addr("10.0.0.1");

        let first = classifier.classify(&ctx);
        let Classification::Limited(class) = first else {
            panic!("expected a limited class");
        };
        let key = classifier.bucket_key(class, &ctx);
        for _ in 0..100 {
            assert_eq!(classifier.classify(&ctx), first);
            assert_eq!(classifier.bucket_key(class, &ctx), key);
        }
        assert_eq!(key.as_str(), "PUBLIC:203.0.113.5");
    }

    #[test]
    fn test_class_prefix_keeps_keys_apart() {
        let classifier = Classifier::default();
        let ctx = RequestContext::new("/").with_peer_addr("10.0.0.1");
        assert_ne!(
            classifier.bucket_key(TrafficClass::Auth, &ctx),
            classifier.bucket_key(TrafficClass::Public, &ctx)
        );
    }

    #[test]
    fn test_custom_rules() {
        let classifier = Classifier::new(vec!["/internal/".to_string()], "/login/", "guest");
        assert!(classifier.is_bypassed("/internal/metrics"));
        assert!(!classifier.is_bypassed("/actuator/health"));

        let ctx = RequestContext::new("/login/form");
        assert_eq!(
            classifier.classify(&ctx),
            Classification::Limited(TrafficClass::Auth)
        );

        let ctx = RequestContext::new("/data").with_principal("guest");
        assert_eq!(
            classifier.classify(&ctx),
            Classification::Limited(TrafficClass::Public)
        );
    }
}
