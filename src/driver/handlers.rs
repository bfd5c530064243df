//! Step handler availability
//!
//! Handlers render steps and live outside this crate. The driver service
//! only asks whether one is installed and, when it is not, how to install it.

use std::collections::BTreeSet;

/// Placeholder token in install hint patterns
pub const HANDLER_TOKEN: &str = "{handler}";

/// Default install hint pattern
pub const DEFAULT_INSTALL_HINT: &str = "install the '{handler}' form handler";

/// Handler name used for placeholder steps
pub const MISSING_HANDLER: &str = "missing";

pub trait HandlerRegistry: Send + Sync {
    fn is_available(&self, handler: &str) -> bool;

    fn install_hint(&self, handler: &str) -> String;
}

/// Fixed set of handler names
#[derive(Debug, Clone)]
pub struct StaticHandlerRegistry {
    available: BTreeSet<String>,
    hint_pattern: String,
}

impl Default for StaticHandlerRegistry {
    fn default() -> Self {
        Self {
            available: BTreeSet::new(),
            hint_pattern: DEFAULT_INSTALL_HINT.to_string(),
        }
    }
}

impl StaticHandlerRegistry {
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Install hint pattern; `{handler}` is replaced by the handler name
    pub fn with_install_hint(mut self, pattern: impl Into<String>) -> Self {
        self.hint_pattern = pattern.into();
        self
    }

    pub fn register(&mut self, handler: impl Into<String>) {
        self.available.insert(handler.into());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.available.iter().map(String::as_str)
    }
}

impl HandlerRegistry for StaticHandlerRegistry {
    fn is_available(&self, handler: &str) -> bool {
        // placeholder steps are always renderable
        handler == MISSING_HANDLER || self.available.contains(handler)
    }

    fn install_hint(&self, handler: &str) -> String {
        self.hint_pattern.replace(HANDLER_TOKEN, handler)
    }
}
