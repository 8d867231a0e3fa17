//! The `cloudflare_ip_prefix` resource.
//!
//! Manages the description and BGP advertisement of an existing prefix.
//! Prefixes cannot be created or deleted through the API: create adopts an
//! existing prefix and delete only forgets it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::client::PrefixApi;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

/// Resource type name.
pub const RESOURCE_TYPE: &str = "cloudflare_ip_prefix";

/// Identifier attribute; changing it replaces the resource.
pub const ATTR_PREFIX_ID: &str = "prefix_id";
/// Description attribute.
pub const ATTR_DESCRIPTION: &str = "description";
/// Advertisement attribute, `"on"` or `"off"`.
pub const ATTR_ADVERTISEMENT: &str = "advertisement";

/// Whether a prefix is announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Advertisement {
    /// Announced.
    On,
    /// Withdrawn.
    Off,
}

impl Advertisement {
    /// The accepted string forms.
    pub const VALUES: [&'static str; 2] = ["on", "off"];

    /// The string form used in state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    /// Whether this means announced.
    pub fn is_advertised(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for Advertisement {
    fn from(advertised: bool) -> Self {
        if advertised {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl From<Advertisement> for bool {
    fn from(advertisement: Advertisement) -> Self {
        advertisement.is_advertised()
    }
}

impl FromStr for Advertisement {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(ProviderError::Validation(format!(
                "expected {} to be one of [on, off], got \"{}\"",
                ATTR_ADVERTISEMENT, other
            ))),
        }
    }
}

impl fmt::Display for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema of the prefix resource.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("Description and BGP advertisement of an IP prefix")
        .with_attribute(
            ATTR_PREFIX_ID,
            Attribute::required_string()
                .with_force_new()
                .with_description("Identifier of the prefix"),
        )
        .with_attribute(
            ATTR_DESCRIPTION,
            Attribute::optional_computed_string().with_description("Description of the prefix"),
        )
        .with_attribute(
            ATTR_ADVERTISEMENT,
            Attribute::optional_computed_string()
                .with_allowed_values(Advertisement::VALUES)
                .with_description("Whether the prefix is announced: on or off"),
        )
}

/// Lifecycle operations for one prefix, backed by a [`PrefixApi`].
#[derive(Clone)]
pub struct PrefixResource {
    client: Arc<dyn PrefixApi>,
}

impl fmt::Debug for PrefixResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixResource").finish_non_exhaustive()
    }
}

impl PrefixResource {
    /// Create the resource handler around an API client.
    pub fn new(client: Arc<dyn PrefixApi>) -> Self {
        Self { client }
    }

    /// Adopt an existing prefix: read it, then push declared values.
    #[instrument(skip_all, fields(prefix_id = %data.get_str(ATTR_PREFIX_ID)))]
    pub async fn create(&self, data: &mut ResourceData) -> Result<(), ProviderError> {
        self.read(data).await?;
        self.update(data).await
    }

    /// Refresh description and advertisement from the API.
    ///
    /// The two calls are independent; a remote change between them is not
    /// detected.
    #[instrument(skip_all, fields(prefix_id = %data.get_str(ATTR_PREFIX_ID)))]
    pub async fn read(&self, data: &mut ResourceData) -> Result<(), ProviderError> {
        let prefix_id = data.get_str(ATTR_PREFIX_ID).to_string();
        data.set_id(prefix_id.as_str());

        let prefix = self.client.get_prefix(&prefix_id).await.map_err(|e| {
            ProviderError::remote_read(
                format!("Error reading IP prefix information for {:?}", prefix_id),
                e,
            )
        })?;
        data.set(ATTR_DESCRIPTION, prefix.description);

        let status = self
            .client
            .get_advertisement_status(&prefix_id)
            .await
            .map_err(|e| {
                ProviderError::remote_read(
                    format!(
                        "Error reading advertisement status of IP prefix for {:?}",
                        prefix_id
                    ),
                    e,
                )
            })?;
        let advertisement = Advertisement::from(status.advertised);
        data.set(ATTR_ADVERTISEMENT, advertisement.as_str());

        debug!(%advertisement, "Read prefix");
        Ok(())
    }

    /// Push changed fields: description first, then advertisement.
    ///
    /// Stops at the first failure. No read-back follows a successful push.
    #[instrument(skip_all, fields(prefix_id = %data.get_str(ATTR_PREFIX_ID)))]
    pub async fn update(&self, data: &mut ResourceData) -> Result<(), ProviderError> {
        let prefix_id = data.get_str(ATTR_PREFIX_ID).to_string();
        data.set_id(prefix_id.as_str());

        if data.get_ok(ATTR_DESCRIPTION) && data.has_change(ATTR_DESCRIPTION) {
            let description = data.get_str(ATTR_DESCRIPTION);
            self.client
                .update_prefix_description(&prefix_id, description)
                .await
                .map_err(|e| {
                    ProviderError::remote_update(
                        format!("Cannot update prefix description for {:?}", prefix_id),
                        e,
                    )
                })?;
            info!("Updated prefix description");
        }

        if data.get_ok(ATTR_ADVERTISEMENT) && data.has_change(ATTR_ADVERTISEMENT) {
            let advertisement: Advertisement = data.get_str(ATTR_ADVERTISEMENT).parse()?;
            self.client
                .update_advertisement_status(&prefix_id, advertisement.into())
                .await
                .map_err(|e| {
                    ProviderError::remote_update(
                        format!(
                            "Cannot update prefix advertisement status for {:?}",
                            prefix_id
                        ),
                        e,
                    )
                })?;
            info!(%advertisement, "Updated prefix advertisement");
        }

        Ok(())
    }

    /// Forget the prefix. The API has no delete, so nothing is called.
    #[instrument(skip_all, fields(prefix_id = %data.id()))]
    pub async fn delete(&self, data: &mut ResourceData) -> Result<(), ProviderError> {
        debug!("Prefix deletion is not supported remotely; dropping from state");
        Ok(())
    }

    /// Start managing an existing prefix by identifier.
    ///
    /// Best effort: a failed read is logged and the partially populated
    /// state is still returned.
    #[instrument(skip(self))]
    pub async fn import(&self, import_id: &str) -> Result<Vec<ResourceData>, ProviderError> {
        let mut data = ResourceData::default();
        data.set_id(import_id);
        data.set(ATTR_PREFIX_ID, import_id);

        if let Err(e) = self.read(&mut data).await {
            warn!(error = %e, "Imported prefix without reading remote state");
        }

        Ok(vec![data])
    }
}
