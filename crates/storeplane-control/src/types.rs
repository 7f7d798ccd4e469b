//! Core types for storeplane-control.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Minimum length of a store name after trimming.
pub const MIN_STORE_NAME_LENGTH: usize = 2;

/// Maximum length of a store name.
pub const MAX_STORE_NAME_LENGTH: usize = 50;

/// Prefix for derived store namespaces.
pub const NAMESPACE_PREFIX: &str = "store-";

/// Number of id characters carried into the namespace.
const NAMESPACE_ID_CHARS: usize = 8;

static STORE_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9 \-_]+$").ok());

/// Unique identifier for a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    /// Create a store ID from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique store ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the cluster namespace for this store.
    ///
    /// Uses the trailing characters of the ID, which are the random part of a
    /// ULID, so namespaces of stores created in the same millisecond differ.
    #[must_use]
    pub fn namespace(&self) -> String {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(NAMESPACE_ID_CHARS - 1)
            .map_or(0, |(idx, _)| idx);
        format!("{NAMESPACE_PREFIX}{}", &self.0[start..])
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StoreId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate and normalise a requested store name.
///
/// Returns the trimmed name.
pub fn validate_store_name(name: &str) -> ControlResult<String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();

    if len < MIN_STORE_NAME_LENGTH || name.chars().count() > MAX_STORE_NAME_LENGTH {
        return Err(ControlError::validation(format!(
            "Store name must be between {MIN_STORE_NAME_LENGTH} and {MAX_STORE_NAME_LENGTH} characters"
        )));
    }

    let Some(pattern) = STORE_NAME_PATTERN.as_ref() else {
        return Err(ControlError::internal("store name validation unavailable"));
    };

    if !pattern.is_match(trimmed) {
        return Err(ControlError::validation(
            "Store name can only contain letters, numbers, spaces, hyphens, and underscores",
        ));
    }

    Ok(trimmed.to_owned())
}

/// Application template a store is deployed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// WordPress with WooCommerce.
    #[serde(rename = "woocommerce")]
    WooCommerce,
    /// Medusa headless commerce.
    Medusa,
}

impl StoreType {
    /// All supported templates.
    pub const ALL: [Self; 2] = [Self::WooCommerce, Self::Medusa];

    /// Get the type name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WooCommerce => "woocommerce",
            Self::Medusa => "medusa",
        }
    }

    /// Label selector matching the application pods of this template.
    #[must_use]
    pub const fn pod_selector(&self) -> &'static str {
        match self {
            Self::WooCommerce => "app.kubernetes.io/name=wordpress",
            Self::Medusa => "app.kubernetes.io/name=medusa",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "woocommerce" => Ok(Self::WooCommerce),
            "medusa" => Ok(Self::Medusa),
            _ => Err(ControlError::validation(
                "Store type must be either 'woocommerce' or 'medusa'",
            )),
        }
    }
}

/// Lifecycle status of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreStatus {
    /// External deployment in progress.
    Provisioning,
    /// Deployment succeeded and is serving.
    Ready,
    /// Deployment failed.
    Failed,
    /// Teardown in progress.
    Deleting,
    /// Teardown failed; record kept for operators.
    DeletionFailed,
}

impl StoreStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Provisioning,
        Self::Ready,
        Self::Failed,
        Self::Deleting,
        Self::DeletionFailed,
    ];

    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "Provisioning",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
            Self::DeletionFailed => "DeletionFailed",
        }
    }

    /// Whether the store is owned by the teardown path.
    ///
    /// Provisioning and reconciliation never touch these stores.
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        matches!(self, Self::Deleting | Self::DeletionFailed)
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Provisioning" => Ok(Self::Provisioning),
            "Ready" => Ok(Self::Ready),
            "Failed" => Ok(Self::Failed),
            "Deleting" => Ok(Self::Deleting),
            "DeletionFailed" => Ok(Self::DeletionFailed),
            _ => Err(format!("unknown store status: {s}")),
        }
    }
}

/// A store record as persisted and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// Unique store identifier.
    pub id: StoreId,
    /// Human label.
    pub name: String,
    /// Application template.
    #[serde(rename = "type")]
    pub store_type: StoreType,
    /// Current lifecycle status.
    pub status: StoreStatus,
    /// Cluster namespace, also the release name.
    pub namespace: String,
    /// Public URL of the store.
    pub url: String,
    /// Diagnostic from the last failed transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the store was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl StoreRecord {
    /// Create a new store record in the provisioning state.
    ///
    /// The name must already be validated.
    #[must_use]
    pub fn new(name: String, store_type: StoreType, domain_suffix: &str) -> Self {
        let id = StoreId::generate();
        let namespace = id.namespace();
        let url = store_url(&namespace, domain_suffix);
        let now = Utc::now();

        Self {
            id,
            name,
            store_type,
            status: StoreStatus::Provisioning,
            namespace,
            url,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// External hostname of the store.
    #[must_use]
    pub fn host(&self, domain_suffix: &str) -> String {
        format!("{}.{domain_suffix}", self.namespace)
    }
}

/// Build the public URL for a namespace.
#[must_use]
pub fn store_url(namespace: &str, domain_suffix: &str) -> String {
    format!("http://{namespace}.{domain_suffix}")
}
