//! Resolution error taxonomy.

use crate::catalog::CatalogError;
use crate::descriptor::DescriptorError;

/// Classification of a [`LookupError`] for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing to install yet for (module, channel).
    NotFound,
    /// Several templates claim the same (module, channel).
    Ambiguous,
    /// The template itself is broken.
    Authoring,
    /// Blocked on purpose: mandatory, visibility, downgrade.
    PolicyViolation,
    /// The tenant request is malformed.
    MalformedInput,
    /// The catalog could not be read; a later pass may succeed.
    Unavailable,
}

/// Why the version-skew check refused an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateBlockCause {
    /// The new template carries a lower version than the one installed.
    Downgrade,
    /// A version on either side could not be parsed.
    InvalidVersion,
    /// The new template's descriptor could not be decoded.
    Descriptor,
}

/// Error types for template resolution and the version-skew check.
///
/// All variants are per module; none aborts resolution of sibling modules.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("given module template is not valid: invalid module {module}")]
    InvalidModule { module: String },

    #[error("no templates were found in channel {channel} for module {module}")]
    NoTemplatesInListResult { module: String, channel: String },

    #[error("no channel found on template for module {module}: specifying no default channel is not allowed")]
    NotDefaultChannelAllowed { module: String },

    #[error("template marked as mandatory in channel {channel} for module {module}")]
    TemplateMarkedAsMandatory { module: String, channel: String },

    #[error("no unique template could be identified: more than one module template found for module {module}, candidates: {candidates:?}")]
    TemplateNotIdentified {
        module: String,
        candidates: Vec<String>,
    },

    #[error("module template not allowed: {reason}")]
    TemplateNotAllowed { reason: String },

    #[error("module template update not allowed: {reason}")]
    TemplateUpdateNotAllowed {
        reason: String,
        cause: UpdateBlockCause,
    },

    #[error("invalid remote module template configuration for module {module}: {reason}")]
    InvalidRemoteModuleConfiguration { module: String, reason: String },

    #[error("invalid module template descriptor on {template}: {source}")]
    Descriptor {
        template: String,
        #[source]
        source: DescriptorError,
    },

    #[error("failed to list module templates on lookup: {0}")]
    Catalog(#[from] CatalogError),
}

impl LookupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoTemplatesInListResult { .. } => ErrorKind::NotFound,
            Self::TemplateNotIdentified { .. } => ErrorKind::Ambiguous,
            Self::NotDefaultChannelAllowed { .. } | Self::Descriptor { .. } => ErrorKind::Authoring,
            Self::TemplateUpdateNotAllowed { cause, .. } => match cause {
                UpdateBlockCause::Downgrade => ErrorKind::PolicyViolation,
                UpdateBlockCause::InvalidVersion | UpdateBlockCause::Descriptor => {
                    ErrorKind::Authoring
                }
            },
            Self::TemplateMarkedAsMandatory { .. } | Self::TemplateNotAllowed { .. } => {
                ErrorKind::PolicyViolation
            }
            Self::InvalidModule { .. } | Self::InvalidRemoteModuleConfiguration { .. } => {
                ErrorKind::MalformedInput
            }
            Self::Catalog(_) => ErrorKind::Unavailable,
        }
    }

    /// Stable reason string recorded in the tenant's per-module status.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidModule { .. } => "InvalidModule",
            Self::NoTemplatesInListResult { .. } => "TemplateNotFound",
            Self::NotDefaultChannelAllowed { .. } => "TemplateChannelMissing",
            Self::TemplateMarkedAsMandatory { .. } => "TemplateMandatory",
            Self::TemplateNotIdentified { .. } => "TemplateNotIdentified",
            Self::TemplateNotAllowed { .. } => "TemplateNotAllowed",
            Self::TemplateUpdateNotAllowed { cause, .. } => match cause {
                UpdateBlockCause::Downgrade => "TemplateUpdateNotAllowed",
                UpdateBlockCause::InvalidVersion => "TemplateVersionInvalid",
                UpdateBlockCause::Descriptor => "InvalidDescriptor",
            },
            Self::InvalidRemoteModuleConfiguration { .. } => "InvalidRemoteConfiguration",
            Self::Descriptor { .. } => "InvalidDescriptor",
            Self::Catalog(_) => "CatalogUnavailable",
        }
    }

    /// Whether a later pass over unchanged resources could succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}
