// ============================
// kabuport-backend-lib/src/routes.rs
// ============================
//! Static route table and path classification for the request gate.
//!
//! Classification is a pure function of the path and the configured lists;
//! it never looks at method, body or any mutable state.

use crate::config::GateSettings;

/// Category of a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Immutable build asset; never gated
    StaticAsset,
    /// Matches the public allow-list exactly
    PublicExact,
    /// Lies under a public prefix
    PublicPrefix,
    /// Everything else
    Protected,
}

impl RouteClass {
    pub fn is_public(self) -> bool {
        matches!(self, RouteClass::PublicExact | RouteClass::PublicPrefix)
    }
}

/// Route policy resolved from [`GateSettings`]
#[derive(Debug, Clone)]
pub struct RouteTable {
    public_exact: Vec<String>,
    public_prefixes: Vec<String>,
    prefix_max_segments: Option<usize>,
    static_prefixes: Vec<String>,
    static_exact: Vec<String>,
    preauth_paths: Vec<String>,
    login_path: String,
    home_path: String,
}

impl RouteTable {
    pub fn from_settings(settings: &GateSettings) -> Self {
        Self {
            public_exact: settings.public_exact.clone(),
            public_prefixes: settings.public_prefixes.clone(),
            prefix_max_segments: settings.public_prefix_max_segments,
            static_prefixes: settings.static_prefixes.clone(),
            static_exact: settings.static_exact.clone(),
            preauth_paths: settings.preauth_paths.clone(),
            login_path: settings.login_path.clone(),
            home_path: settings.home_path.clone(),
        }
    }

    /// Classify a request path
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.is_static_asset(path) {
            RouteClass::StaticAsset
        } else if self.public_exact.iter().any(|p| p == path) {
            RouteClass::PublicExact
        } else if self
            .public_prefixes
            .iter()
            .any(|prefix| self.under_prefix(path, prefix))
        {
            RouteClass::PublicPrefix
        } else {
            RouteClass::Protected
        }
    }

    pub fn is_static_asset(&self, path: &str) -> bool {
        self.static_exact.iter().any(|p| p == path)
            || self.static_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Login/signup style entry paths
    pub fn is_preauth(&self, path: &str) -> bool {
        self.preauth_paths.iter().any(|p| p == path)
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    fn under_prefix(&self, path: &str, prefix: &str) -> bool {
        let Some(rest) = path.strip_prefix(prefix) else {
            return false;
        };
        match self.prefix_max_segments {
            None => true,
            Some(max) => {
                let segments = rest.split('/').filter(|s| !s.is_empty()).count();
                segments >= 1 && segments <= max
            },
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::from_settings(&GateSettings::default())
    }
}
