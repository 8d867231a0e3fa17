//! The provider: the contract the orchestrator drives, and its implementation.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{CloudflareClient, PrefixApi};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::resource::{self, PrefixResource, ATTR_PREFIX_ID, RESOURCE_TYPE};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::state::ResourceData;
use crate::types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
use crate::validation;

/// Trait that provider implementations must implement.
///
/// States cross this boundary as JSON objects. The orchestrator owns state
/// persistence and calls at most one operation per resource instance at a
/// time.
///
/// # Example
///
/// ```ignore
/// use cloudflare_ip_prefix_provider::{ProviderService, ProviderError, PlanResult, ProviderSchema};
/// use cloudflare_ip_prefix_provider::schema::Diagnostic;
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn schema(&self) -> ProviderSchema {
///         ProviderSchema::new()
///     }
///
///     async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.schema().resources.keys().cloned().collect();
        resources.sort();
        ProviderMetadata { resources }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// Returns diagnostics (errors and warnings).
    async fn validate_provider_config(
        &self,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<serde_json::Value>,
        proposed_state: serde_json::Value,
        config: serde_json::Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: serde_json::Value,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::InvalidRequest(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// Environment variable lookup used to fill unset provider settings.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Provider serving the `cloudflare_ip_prefix` resource.
///
/// The API client is either built by [`ProviderService::configure`] or
/// injected up front with [`IpPrefixProvider::with_client`].
pub struct IpPrefixProvider {
    resource: RwLock<Option<PrefixResource>>,
    env: EnvLookup,
}

impl std::fmt::Debug for IpPrefixProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpPrefixProvider")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl Default for IpPrefixProvider {
    fn default() -> Self {
        Self {
            resource: RwLock::new(None),
            env: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }
}

impl IpPrefixProvider {
    /// Create an unconfigured provider reading fallbacks from the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider that uses the given client and needs no configure call.
    pub fn with_client(client: Arc<dyn PrefixApi>) -> Self {
        Self {
            resource: RwLock::new(Some(PrefixResource::new(client))),
            ..Self::default()
        }
    }

    /// Replace the environment lookup used by `configure` and config validation.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Whether a client is available.
    pub async fn is_configured(&self) -> bool {
        self.resource.read().await.is_some()
    }

    async fn resource(&self, resource_type: &str) -> Result<PrefixResource, ProviderError> {
        check_resource_type(resource_type)?;
        self.resource.read().await.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "configure must be called before resource operations".to_string(),
            )
        })
    }

    /// Parse and check a provider block, reporting problems as diagnostics.
    fn check_config(&self, config: Value) -> Result<ProviderConfig, Vec<Diagnostic>> {
        let mut diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let env = &self.env;
        let config = ProviderConfig::from_value_with_env(config, |name| env(name))
            .map_err(|e| {
                vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
            })?;

        if let Err(e) = config.validate() {
            diagnostics.push(
                Diagnostic::error("Invalid provider configuration").with_detail(e.message()),
            );
            return Err(diagnostics);
        }
        Ok(config)
    }
}

fn check_resource_type(resource_type: &str) -> Result<(), ProviderError> {
    if resource_type == RESOURCE_TYPE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResource(resource_type.to_string()))
    }
}

fn validation_error(diagnostics: &[Diagnostic]) -> ProviderError {
    let summaries: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| match &d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary.clone(),
        })
        .collect();
    ProviderError::Validation(summaries.join("; "))
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[async_trait::async_trait]
impl ProviderService for IpPrefixProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(RESOURCE_TYPE, resource::schema())
    }

    #[instrument(skip_all)]
    async fn validate_provider_config(
        &self,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        match self.check_config(config) {
            Ok(_) => Ok(vec![]),
            Err(diagnostics) => {
                warn!(diagnostics = diagnostics.len(), "Provider config is invalid");
                Ok(diagnostics)
            },
        }
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = match self.check_config(config) {
            Ok(config) => config,
            Err(diagnostics) => {
                warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
                return Ok(diagnostics);
            },
        };

        let client = CloudflareClient::new(&config)?;
        info!(
            account_id = %client.account_id(),
            base_url = %config.base_url(),
            "Configured API client"
        );
        *self.resource.write().await = Some(PrefixResource::new(Arc::new(client)));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Provider stopping");
        Ok(())
    }

    #[instrument(skip(self, config))]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        check_resource_type(resource_type)?;
        Ok(validation::validate(&resource::schema(), &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<serde_json::Value>,
        proposed_state: serde_json::Value,
        _config: serde_json::Value,
    ) -> Result<PlanResult, ProviderError> {
        check_resource_type(resource_type)?;
        let schema = resource::schema();

        if proposed_state.is_null() {
            let changes = prior_state
                .as_ref()
                .map(as_object)
                .unwrap_or_default()
                .into_iter()
                .filter(|(k, _)| schema.attribute(k).is_some())
                .map(|(k, v)| AttributeChange::removed(k, v))
                .collect();
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let diagnostics = validation::validate(&schema, &proposed_state);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(validation_error(&diagnostics));
        }
        let proposed = as_object(&proposed_state);

        let Some(prior_state) = prior_state.filter(|v| !v.is_null()) else {
            let mut names: Vec<&String> = proposed.keys().collect();
            names.sort();
            let changes = names
                .into_iter()
                .filter(|name| schema.attribute(name).is_some())
                .filter(|name| !proposed[*name].is_null())
                .map(|name| AttributeChange::added(name.as_str(), proposed[name].clone()))
                .collect();
            debug!("Planned create");
            return Ok(PlanResult::with_changes(proposed_state, changes, false));
        };
        let prior = as_object(&prior_state);

        let force_new = schema.force_new_attributes();
        let mut planned = prior.clone();
        let mut changes = Vec::new();

        let mut names: Vec<&str> = schema.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        for name in names {
            let Some(after) = proposed.get(name).filter(|v| !v.is_null()) else {
                continue;
            };
            let before = prior.get(name).cloned().unwrap_or(Value::Null);
            if &before != after {
                changes.push(AttributeChange::modified(name, before, after.clone()));
            }
            planned.insert(name.to_string(), after.clone());
        }

        let requires_replace = changes
            .iter()
            .any(|change| force_new.contains(&change.path.as_str()));

        if requires_replace {
            // The new resource shares nothing with the old one
            planned = proposed.clone();
            planned.remove("id");
        }

        debug!(changes = changes.len(), requires_replace, "Planned update");
        Ok(PlanResult::with_changes(
            Value::Object(planned),
            changes,
            requires_replace,
        ))
    }

    #[instrument(skip(self, planned_state))]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let mut data = ResourceData::from_declared(planned_state);

        if let Err(e) = resource.create(&mut data).await {
            error!(error = %e, "Create failed");
            return Err(e);
        }
        info!(prefix_id = %data.id(), "Create completed");
        Ok(data.into_state())
    }

    #[instrument(skip(self, current_state))]
    async fn read(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let mut data = ResourceData::from_state(current_state);

        if let Err(e) = resource.read(&mut data).await {
            error!(error = %e, "Read failed");
            return Err(e);
        }
        Ok(data.into_state())
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: serde_json::Value,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let mut data = ResourceData::new(prior_state, planned_state);

        if data.has_change(ATTR_PREFIX_ID) {
            let (before, after) = data.get_change(ATTR_PREFIX_ID);
            return Err(ProviderError::InvalidRequest(format!(
                "{} cannot be changed in place ({} -> {})",
                ATTR_PREFIX_ID,
                before.unwrap_or(&Value::Null),
                after.unwrap_or(&Value::Null)
            )));
        }

        if let Err(e) = resource.update(&mut data).await {
            error!(error = %e, "Update failed");
            return Err(e);
        }
        info!(prefix_id = %data.id(), "Update completed");
        Ok(data.into_state())
    }

    #[instrument(skip(self, current_state))]
    async fn delete(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type).await?;
        let mut data = ResourceData::from_state(current_state);
        resource.delete(&mut data).await
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type).await?;
        let imported = resource.import(id).await?;
        info!(imported = imported.len(), "Import completed");
        Ok(imported
            .into_iter()
            .map(|data| ImportedResource::new(RESOURCE_TYPE, data.into_state()))
            .collect())
    }
}
