//! Plugin catalog and manual plugin updates.

use deploy_guard_api::{endpoints, PluginCatalog, PluginInfo};
use tracing::{debug, info};

use crate::error::{GuardError, GuardResult};
use crate::guard::Guard;

impl Guard {
    /// Fetches the plugins this machine can see.
    ///
    /// With `include_uninstalled` false the authority only lists plugins
    /// already installed here.
    pub async fn plugin_catalog(&self, include_uninstalled: bool) -> GuardResult<PluginCatalog> {
        let mut query = vec![
            ("license_key", self.config.license_key.clone()),
            ("machine_id", self.identity.machine_id().to_string()),
            ("project_slug", self.config.project_slug.clone()),
            ("os", self.config.ota.os.clone()),
            ("arch", self.config.ota.arch.clone()),
        ];
        if !include_uninstalled {
            query.push(("include_uninstalled", "false".to_string()));
        }
        let catalog: PluginCatalog = self
            .scoped(self.client.get_json(endpoints::PLUGIN_CATALOG, &query))
            .await?;
        Ok(catalog)
    }

    /// All plugins, installed or not.
    pub async fn list_plugins(&self) -> GuardResult<Vec<PluginInfo>> {
        Ok(self.plugin_catalog(true).await?.plugins)
    }

    /// Plugins with an update available.
    pub async fn check_plugin_updates(&self) -> GuardResult<Vec<PluginInfo>> {
        let mut plugins = self.list_plugins().await?;
        plugins.retain(|p| p.update_available);
        Ok(plugins)
    }

    /// Updates one plugin to the catalog's latest version and waits for
    /// the attempt to finish.
    ///
    /// Returns `Ok` without downloading anything when the plugin is
    /// already at that version.
    pub async fn update_plugin(&self, slug: &str) -> GuardResult<()> {
        if slug.is_empty() {
            return Err(GuardError::Config("plugin slug is required".to_string()));
        }

        let catalog = self.plugin_catalog(true).await?;
        if catalog.update_frozen {
            return Err(GuardError::UpdateFrozen);
        }
        let plugin = catalog
            .plugins
            .into_iter()
            .find(|p| p.slug == slug)
            .ok_or_else(|| GuardError::PluginNotFound(slug.to_string()))?;
        if !plugin.ota_enabled {
            return Err(GuardError::PluginOtaDisabled(slug.to_string()));
        }
        let latest = match plugin.latest_version {
            Some(v) if plugin.update_available && plugin.can_update && !v.is_empty() => v,
            _ => return Err(GuardError::NoPluginUpdate(slug.to_string())),
        };
        if !self.engine.manages(slug) {
            return Err(GuardError::PluginNotManaged(slug.to_string()));
        }
        if self.versions.get(slug).as_deref() == Some(latest.as_str()) {
            debug!(plugin = slug, version = %latest, "plugin already up to date");
            return Ok(());
        }

        info!(plugin = slug, version = %latest, "updating plugin");
        self.apply_update(slug, &latest).await
    }
}
