//! Current version of every component the guard reports on.

use std::sync::{PoisonError, RwLock};

use deploy_guard_api::ComponentReport;

/// Version reported before anything better is known.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Version table shared by the heartbeat and the update engine.
///
/// The primary component is always first; managed components follow in
/// configuration order. Readers get copies, never the live table.
#[derive(Debug)]
pub struct ComponentVersions {
    primary: String,
    entries: RwLock<Vec<(String, String)>>,
}

impl ComponentVersions {
    pub fn new<I, S>(primary: impl Into<String>, managed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let primary = primary.into();
        let mut entries = vec![(primary.clone(), UNKNOWN_VERSION.to_string())];
        for slug in managed {
            let slug = slug.into();
            if !entries.iter().any(|(s, _)| *s == slug) {
                entries.push((slug, UNKNOWN_VERSION.to_string()));
            }
        }
        Self {
            primary,
            entries: RwLock::new(entries),
        }
    }

    /// Slug of the host component.
    pub fn primary_slug(&self) -> &str {
        &self.primary
    }

    /// Version of the host component.
    pub fn primary(&self) -> String {
        self.get(&self.primary)
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    pub fn set_primary(&self, version: impl Into<String>) {
        let primary = self.primary.clone();
        self.set(&primary, version);
    }

    /// Version of `slug`, if it is tracked.
    pub fn get(&self, slug: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .find(|(s, _)| s == slug)
            .map(|(_, v)| v.clone())
    }

    /// Records `version` for `slug`, tracking it if it was not yet.
    pub fn set(&self, slug: &str, version: impl Into<String>) {
        let version = version.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|(s, _)| s == slug) {
            Some(entry) => entry.1 = version,
            None => entries.push((slug.to_string(), version)),
        }
    }

    /// Consistent copy of all versions, primary first.
    pub fn snapshot(&self) -> Vec<ComponentReport> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(slug, version)| ComponentReport {
                slug: slug.clone(),
                version: version.clone(),
            })
            .collect()
    }
}
