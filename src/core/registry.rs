//! Service locator — providers registered by category and name.
//!
//! Categories in use: `"llm"`, `"skill"`, `"platform"`, `"storage"`,
//! `"memory"`. Retrieval is typed: callers downcast to the concrete
//! type they registered.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use super::errors::ArcError;

type Provider = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Category {
    providers: HashMap<String, Provider>,
    /// Insertion order, used when no explicit default is set.
    order: Vec<String>,
    default: Option<String>,
}

/// Typed service locator.
pub struct Registry {
    categories: RwLock<HashMap<String, Category>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            categories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider. Re-registering an existing `(category, name)`
    /// replaces the provider without changing its position in the order.
    pub fn register<T: Any + Send + Sync>(&self, category: &str, name: &str, provider: Arc<T>) {
        let mut cats = self.categories.write().unwrap_or_else(|e| e.into_inner());
        let cat = cats.entry(category.to_string()).or_default();
        let is_new = !cat.providers.contains_key(name);
        cat.providers.insert(name.to_string(), provider);
        if is_new {
            cat.order.push(name.to_string());
        }
        log::debug!("registered {category}/{name}");
    }

    /// Get a provider by category and optional name.
    ///
    /// With `name = None`, returns the explicit default if one is set,
    /// else the first-registered provider.
    pub fn get<T: Any + Send + Sync>(
        &self,
        category: &str,
        name: Option<&str>,
    ) -> Result<Arc<T>, ArcError> {
        let cats = self.categories.read().unwrap_or_else(|e| e.into_inner());
        let cat = cats.get(category).filter(|c| !c.providers.is_empty()).ok_or_else(|| {
            ArcError::ProviderNotFound(format!("no providers registered for category '{category}'"))
        })?;

        let resolved = match name {
            Some(n) => cat.providers.get(n).ok_or_else(|| {
                let available = cat.order.join(", ");
                ArcError::ProviderNotFound(format!(
                    "provider '{n}' not found in category '{category}'. Available: {available}"
                ))
            })?,
            None => {
                let default_name = cat
                    .default
                    .as_deref()
                    .filter(|d| cat.providers.contains_key(*d))
                    .or_else(|| cat.order.first().map(String::as_str))
                    .ok_or_else(|| {
                        ArcError::ProviderNotFound(format!("category '{category}' is empty"))
                    })?;
                &cat.providers[default_name]
            }
        };

        Arc::clone(resolved).downcast::<T>().map_err(|_| {
            ArcError::ProviderNotFound(format!(
                "provider in category '{category}' has a different concrete type"
            ))
        })
    }

    /// Set the explicit default for a category. Errors if the provider
    /// does not exist.
    pub fn set_default(&self, category: &str, name: &str) -> Result<(), ArcError> {
        let mut cats = self.categories.write().unwrap_or_else(|e| e.into_inner());
        let cat = cats.get_mut(category).ok_or_else(|| {
            ArcError::ProviderNotFound(format!("no providers registered for category '{category}'"))
        })?;
        if !cat.providers.contains_key(name) {
            return Err(ArcError::ProviderNotFound(format!(
                "cannot set default: '{name}' not in category '{category}'"
            )));
        }
        cat.default = Some(name.to_string());
        Ok(())
    }

    pub fn has(&self, category: &str, name: Option<&str>) -> bool {
        let cats = self.categories.read().unwrap_or_else(|e| e.into_inner());
        match (cats.get(category), name) {
            (Some(cat), Some(n)) => cat.providers.contains_key(n),
            (Some(cat), None) => !cat.providers.is_empty(),
            (None, _) => false,
        }
    }

    /// Provider names in a category, in registration order.
    pub fn names(&self, category: &str) -> Vec<String> {
        let cats = self.categories.read().unwrap_or_else(|e| e.into_inner());
        cats.get(category).map(|c| c.order.clone()).unwrap_or_default()
    }

    /// Remove a provider; clears the default if it pointed at it.
    pub fn remove(&self, category: &str, name: &str) {
        let mut cats = self.categories.write().unwrap_or_else(|e| e.into_inner());
        if let Some(cat) = cats.get_mut(category) {
            cat.providers.remove(name);
            cat.order.retain(|n| n != name);
            if cat.default.as_deref() == Some(name) {
                cat.default = None;
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
