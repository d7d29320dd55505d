//! Supporting types for the Installation CRD

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by stages and products
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has happened yet
    #[default]
    None,
    /// Work has started but is not finished
    InProgress,
    /// Everything this phase covers is installed
    Completed,
    /// A reconciler reported a failure
    Failed,
    /// Installed, waiting on components it depends on
    AwaitingComponents,
}

impl Phase {
    /// Returns true for [`Phase::Completed`]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::AwaitingComponents => write!(f, "AwaitingComponents"),
        }
    }
}

/// Result of the checks run before any stage starts
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PreflightStatus {
    /// Checks have never run
    #[default]
    NotStarted,
    /// Checks are running
    InProgress,
    /// All checks passed, stages may run
    Success,
    /// A check failed, checks will be retried
    Fail,
}

impl PreflightStatus {
    /// Returns true while the preflight gate still has to be (re)run
    pub fn needs_check(&self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl std::fmt::Display for PreflightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Success => write!(f, "Success"),
            Self::Fail => write!(f, "Fail"),
        }
    }
}

/// Observed state of one product
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatus {
    /// Product name
    pub name: String,

    /// Current product phase
    #[serde(default)]
    pub phase: Phase,

    /// Endpoint the product is reachable at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Installed product version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Installed operator version for the product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_version: Option<String>,
}

impl ProductStatus {
    /// Create an empty status slot for the named product
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Observed state of one stage
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageStatus {
    /// Stage name
    pub name: String,

    /// Aggregated stage phase
    #[serde(default)]
    pub phase: Phase,

    /// Product statuses keyed by product name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub products: BTreeMap<String, ProductStatus>,
}

impl StageStatus {
    /// Create an empty stage status
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
