//! Platform users and roles.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Permission strings understood by the platform.
pub mod permissions {
    /// Read datasets.
    pub const DATASETS_READ: &str = "datasets:read";
    /// Create, edit, curate and delete datasets.
    pub const DATASETS_WRITE: &str = "datasets:write";
    /// List and inspect models.
    pub const MODELS_READ: &str = "models:read";
    /// Select the active model.
    pub const MODELS_SELECT: &str = "models:select";
    /// Read training jobs and metrics.
    pub const TRAINING_READ: &str = "training:read";
    /// Create and cancel training jobs.
    pub const TRAINING_WRITE: &str = "training:write";
    /// Read guardrail configuration and safety events.
    pub const SAFETY_READ: &str = "safety:read";
    /// Change guardrail configuration.
    pub const SAFETY_WRITE: &str = "safety:write";
    /// Submit and cancel generation requests.
    pub const GENERATION_SUBMIT: &str = "generation:submit";
}

/// Role assigned to a platform user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Full access.
    Admin,
    /// Datasets, training and generation.
    Researcher,
    /// Models, training and safety.
    Engineer,
    /// Read-only.
    Viewer,
}

impl Role {
    /// Permissions every holder of the role has.
    #[must_use]
    pub fn default_permissions(self) -> &'static [&'static str] {
        use permissions::{
            DATASETS_READ, DATASETS_WRITE, GENERATION_SUBMIT, MODELS_READ, MODELS_SELECT,
            SAFETY_READ, SAFETY_WRITE, TRAINING_READ, TRAINING_WRITE,
        };
        match self {
            Self::Admin => &[
                DATASETS_READ,
                DATASETS_WRITE,
                MODELS_READ,
                MODELS_SELECT,
                TRAINING_READ,
                TRAINING_WRITE,
                SAFETY_READ,
                SAFETY_WRITE,
                GENERATION_SUBMIT,
            ],
            Self::Researcher => &[
                DATASETS_READ,
                DATASETS_WRITE,
                MODELS_READ,
                TRAINING_READ,
                TRAINING_WRITE,
                SAFETY_READ,
                GENERATION_SUBMIT,
            ],
            Self::Engineer => &[
                DATASETS_READ,
                MODELS_READ,
                MODELS_SELECT,
                TRAINING_READ,
                TRAINING_WRITE,
                SAFETY_READ,
                SAFETY_WRITE,
            ],
            Self::Viewer => &[DATASETS_READ, MODELS_READ, TRAINING_READ, SAFETY_READ],
        }
    }

    /// Returns the role as its wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Researcher => "RESEARCHER",
            Self::Engineer => "ENGINEER",
            Self::Viewer => "VIEWER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "RESEARCHER" => Ok(Self::Researcher),
            "ENGINEER" => Ok(Self::Engineer),
            "VIEWER" => Ok(Self::Viewer),
            other => Err(DomainError::UnknownRole(other.to_string())),
        }
    }
}

/// An authenticated platform user.
///
/// Fetched once per session and replaced wholesale on re-login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable user id.
    pub id: String,
    /// Login email.
    pub email: String,
    /// Assigned role.
    pub role: Role,
    /// Explicit permission grants on top of the role defaults.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Whether the account has a second factor enrolled.
    #[serde(default)]
    pub mfa_enabled: bool,
}

impl User {
    /// Creates a user with no explicit permissions.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
            permissions: BTreeSet::new(),
            mfa_enabled: false,
        }
    }

    /// Adds an explicit permission grant.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Checks explicit grants first, then the role defaults.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.role == Role::Admin
            || self.permissions.contains(permission)
            || self
                .role
                .default_permissions()
                .iter()
                .any(|granted| *granted == permission)
    }
}
