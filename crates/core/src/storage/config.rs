//! S3 client construction from application configuration.

use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use smarthub_shared::S3Config;
use tracing::info;

/// Build an S3 client from configuration.
///
/// Static credentials are used when both keys are configured; otherwise the
/// default AWS credential chain (environment, profile, IMDS) applies.
pub async fn s3_client(config: &S3Config) -> Client {
    let region = Region::new(config.region.clone());

    let mut builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(region.clone())
        .force_path_style(config.force_path_style);

    // Custom endpoint for MinIO/R2
    if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        builder = builder.endpoint_url(endpoint);
    }

    if let Some((access_key, secret_key)) = config.static_credentials() {
        builder = builder.credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "smarthub-static",
        ));
    } else {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        if let Some(provider) = sdk_config.credentials_provider() {
            builder = builder.credentials_provider(provider.clone());
        }
    }

    info!(
        region = %config.region,
        endpoint = config.endpoint.as_deref().unwrap_or("aws"),
        path_style = config.force_path_style,
        "S3 client configured"
    );

    Client::from_conf(builder.build())
}
