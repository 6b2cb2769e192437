//! Log namespace discovery for a deployment.
//!
//! Two tiers: a prefix derived from the workflow identity the deployment
//! declares in its outputs (`pattern`), else the generic
//! `/{root}/{segment}/{deployment}` convention (`main`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use triage_sources::{DeploymentMetadataService, DeploymentOutput};

use crate::domain::{TriageError, TriageResult};

/// Prefixes shorter than this are too broad to enumerate.
pub const MIN_PREFIX_LEN: usize = 5;

/// Textual convention linking deployment outputs to log namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConvention {
    /// Output key whose value is the workflow identity
    pub workflow_output_key: String,
    /// Separator in front of the workflow name inside the identity
    pub workflow_marker: String,
    /// Suffix appended to the component-group name to form the workflow name
    pub workflow_suffix: String,
    pub namespace_root: String,
    pub component_segment: String,
}

impl Default for NamespaceConvention {
    fn default() -> Self {
        Self {
            workflow_output_key: "StateMachineArn".to_string(),
            workflow_marker: ":stateMachine:".to_string(),
            workflow_suffix: "-DocumentProcessingWorkflow".to_string(),
            namespace_root: "aws".to_string(),
            component_segment: "lambda".to_string(),
        }
    }
}

impl NamespaceConvention {
    pub fn validate(&self) -> TriageResult<()> {
        if self.workflow_output_key.trim().is_empty() || self.workflow_marker.is_empty() {
            return Err(TriageError::configuration(
                "namespace.workflow_output_key and namespace.workflow_marker must be set",
            ));
        }
        if self.component_segment.trim().is_empty() {
            return Err(TriageError::configuration(
                "namespace.component_segment must be set",
            ));
        }
        Ok(())
    }

    fn pattern_prefix(&self, component_group: &str) -> String {
        format!("/{}/{}", component_group, self.component_segment)
    }

    fn main_prefix(&self, deployment: &str) -> String {
        format!(
            "/{}/{}/{}",
            self.namespace_root, self.component_segment, deployment
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixKind {
    /// Derived from workflow metadata
    Pattern,
    /// Generic fallback
    Main,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceResolution {
    pub deployment: String,
    pub prefix: String,
    pub kind: PrefixKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_group: Option<String>,
}

impl NamespaceResolution {
    /// Whether the prefix is specific enough to enumerate groups under.
    pub fn is_searchable(&self) -> bool {
        self.prefix.chars().count() >= MIN_PREFIX_LEN
    }
}

/// Component-group name embedded in a workflow identity.
///
/// `arn:...:stateMachine:idp-nested-DocumentProcessingWorkflow` yields
/// `idp-nested`. Without the suffix the last `-` segment is dropped.
pub fn extract_component_group(
    identity: &str,
    convention: &NamespaceConvention,
) -> Option<String> {
    let (_, name) = identity.rsplit_once(convention.workflow_marker.as_str())?;
    let suffix = convention.workflow_suffix.as_str();
    let group = if !suffix.is_empty() && name.contains(suffix) {
        name.replace(suffix, "")
    } else {
        let (head, _) = name.rsplit_once('-')?;
        head.to_string()
    };
    let group = group.trim();
    (!group.is_empty()).then(|| group.to_string())
}

fn find_identity<'a>(
    outputs: &'a [DeploymentOutput],
    convention: &NamespaceConvention,
) -> Option<&'a str> {
    outputs
        .iter()
        .find(|o| o.key == convention.workflow_output_key)
        .map(|o| o.value.as_str())
}

pub struct NamespaceResolver {
    metadata: Arc<dyn DeploymentMetadataService>,
    convention: NamespaceConvention,
}

impl NamespaceResolver {
    pub fn new(
        metadata: Arc<dyn DeploymentMetadataService>,
        convention: NamespaceConvention,
    ) -> Self {
        Self {
            metadata,
            convention,
        }
    }

    /// Resolve the log prefix of `deployment`.
    ///
    /// A missing deployment is a configuration error; an unreachable
    /// metadata service surfaces as [`TriageError::Source`].
    #[instrument(skip(self))]
    pub async fn resolve(&self, deployment: &str) -> TriageResult<NamespaceResolution> {
        let deployment = deployment.trim();
        if deployment.is_empty() {
            return Err(TriageError::configuration("deployment name is empty"));
        }

        let description = self.metadata.describe(deployment).await?;
        if !description.exists {
            return Err(TriageError::configuration(format!(
                "deployment '{deployment}' does not exist"
            )));
        }

        let component_group = find_identity(&description.outputs, &self.convention)
            .and_then(|identity| extract_component_group(identity, &self.convention));

        let resolution = match component_group {
            Some(group) => NamespaceResolution {
                deployment: deployment.to_string(),
                prefix: self.convention.pattern_prefix(&group),
                kind: PrefixKind::Pattern,
                component_group: Some(group),
            },
            None => NamespaceResolution {
                deployment: deployment.to_string(),
                prefix: self.convention.main_prefix(deployment),
                kind: PrefixKind::Main,
                component_group: None,
            },
        };
        debug!(prefix = %resolution.prefix, kind = ?resolution.kind, "namespace resolved");
        Ok(resolution)
    }
}
