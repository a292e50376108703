//! Credential, region and identity resolution.

use crate::error::{AwsError, classify_sdk_error};
use crate::registry::EcrRegistry;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use serde::Serialize;
use tracing::debug;

/// Overrides for the default AWS configuration chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsOptions {
    /// Region; falls back to the environment and profile when unset
    pub region: Option<String>,
    /// Named profile from the shared config files
    pub profile: Option<String>,
}

/// Who the loaded credentials belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    /// Account ID
    pub account: String,
    /// ARN of the calling principal
    pub arn: String,
    /// Region the session targets
    pub region: String,
}

/// Loaded AWS configuration shared by every client the tool creates.
#[derive(Debug, Clone)]
pub struct AwsSession {
    config: SdkConfig,
}

/// Load the AWS configuration from flags, environment and shared config files.
///
/// # Errors
/// Returns [`AwsError::MissingRegion`] when no region could be determined.
pub async fn load_session(options: &AwsOptions) -> Result<AwsSession, AwsError> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &options.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &options.profile {
        loader = loader.profile_name(profile);
    }
    let config = loader.load().await;

    if config.region().is_none() {
        return Err(AwsError::MissingRegion);
    }
    debug!(region = ?config.region(), profile = ?options.profile, "Loaded AWS configuration");
    Ok(AwsSession { config })
}

impl AwsSession {
    /// The resolved region.
    #[must_use]
    pub fn region(&self) -> &str {
        self.config.region().map_or("", |region| region.as_ref())
    }

    /// An ECR registry client for this session.
    #[must_use]
    pub fn registry(&self) -> EcrRegistry {
        EcrRegistry::new(aws_sdk_ecr::Client::new(&self.config))
    }

    /// Ask STS who the credentials belong to.
    ///
    /// # Errors
    /// Returns [`AwsError::CallerIdentity`] if the call fails, typically
    /// because credentials are missing or expired.
    pub async fn caller_identity(&self) -> Result<CallerIdentity, AwsError> {
        let client = aws_sdk_sts::Client::new(&self.config);
        let response = client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| AwsError::CallerIdentity {
                source: classify_sdk_error("GetCallerIdentity", &e),
            })?;

        Ok(CallerIdentity {
            account: response.account().unwrap_or_default().to_string(),
            arn: response.arn().unwrap_or_default().to_string(),
            region: self.region().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_region_wins() {
        let options = AwsOptions {
            region: Some("eu-west-3".to_string()),
            profile: None,
        };
        let session = load_session(&options).await.unwrap();
        assert_eq!(session.region(), "eu-west-3");
    }

    #[test]
    fn test_identity_serialization() {
        let identity = CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:user/ci".to_string(),
            region: "us-east-1".to_string(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["account"], "123456789012");
    }
}
