use crate::feature::SecurityFeature;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Reading source unavailable for {feature}: {reason}")]
    SourceUnavailable {
        feature: SecurityFeature,
        reason: String,
    },

    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(SecurityFeature),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Sample kind {kind} cannot drive {feature}")]
    SampleMismatch {
        feature: SecurityFeature,
        kind: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
