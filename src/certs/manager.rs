// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rotation of the CA and webhook secrets and CA bundle self-healing.

use crate::certs::{
    generate_ca, generate_webhook_cert, is_valid_ca, verify_signed_by, CertificateBundle,
    CertificateError, CertificateInfo, Result,
};
use crate::config::ControllerConfig;
use crate::constants::{certs, kinds, labels, OPERATOR_NAME};
use crate::kubernetes::client::ClusterClient;
use crate::kubernetes::objects::{from_dynamic, to_dynamic};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What `ensure` had to regenerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    WebhookOnly,
    Full,
}

/// Certificates in place after `ensure`
#[derive(Debug, Clone)]
pub struct CertificateState {
    pub rotation: Rotation,
    pub ca_cert_pem: String,
}

pub struct CertificateManager {
    client: Arc<dyn ClusterClient>,
}

impl CertificateManager {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Make sure both secrets hold valid certificates.
    ///
    /// A missing, unreadable or expiring CA regenerates the CA and the webhook
    /// certificate. Otherwise a missing or expiring webhook certificate, or one
    /// not signed by the current CA, regenerates the webhook certificate alone.
    #[instrument(skip(self, config), fields(namespace = %config.chart_namespace))]
    pub async fn ensure(&self, config: &ControllerConfig) -> Result<CertificateState> {
        let namespace = config.chart_namespace.as_str();
        let boundary = config.expiration_boundary;

        let ca = self
            .load(namespace, certs::CA_SECRET, certs::CA_CERT_KEY, certs::CA_PRIVATE_KEY)
            .await?
            .filter(|ca| {
                let usable = is_valid_ca(ca) && still_valid(&ca.cert_pem, boundary);
                if !usable {
                    info!("CA certificate is invalid or about to expire");
                }
                usable
            });

        let Some(ca) = ca else {
            let ca = generate_ca(config.rsa_key_bits, config.ca_certificate_expiration)?;
            self.store(namespace, certs::CA_SECRET, certs::CA_CERT_KEY, certs::CA_PRIVATE_KEY, &ca)
                .await?;
            self.regenerate_webhook(config, &ca).await?;
            info!("Generated new CA and webhook certificates");
            return Ok(CertificateState {
                rotation: Rotation::Full,
                ca_cert_pem: ca.cert_pem,
            });
        };

        let webhook = self
            .load(
                namespace,
                certs::WEBHOOK_SECRET,
                certs::WEBHOOK_CERT_KEY,
                certs::WEBHOOK_PRIVATE_KEY,
            )
            .await?;
        let webhook_valid = webhook.as_ref().is_some_and(|webhook| {
            let fresh = still_valid(&webhook.cert_pem, boundary);
            let signed = verify_signed_by(&webhook.cert_pem, &ca.cert_pem).unwrap_or(false);
            if !fresh {
                info!("Webhook certificate is invalid or about to expire");
            } else if !signed {
                info!("Webhook certificate is not signed by the current CA");
            }
            fresh && signed
        });

        if webhook_valid {
            debug!("Certificates are up to date");
            return Ok(CertificateState {
                rotation: Rotation::None,
                ca_cert_pem: ca.cert_pem,
            });
        }

        self.regenerate_webhook(config, &ca).await?;
        info!("Regenerated webhook certificate");
        Ok(CertificateState {
            rotation: Rotation::WebhookOnly,
            ca_cert_pem: ca.cert_pem,
        })
    }

    /// Patch every managed webhook configuration whose CA bundle differs from
    /// `ca_cert`. Returns the number of configurations patched.
    #[instrument(skip(self, ca_cert))]
    pub async fn reconcile_ca_bundles(&self, ca_cert: &[u8]) -> Result<usize> {
        let selector = labels::managed_selector();
        let mut patched = 0;

        for gvk in [kinds::mutating_webhook(), kinds::validating_webhook()] {
            let configurations = match self.client.list(&gvk, None, Some(&selector)).await {
                Ok(configurations) => configurations,
                Err(e) if e.is_tolerated() => {
                    debug!("Skipping {}: {}", gvk.kind, e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for configuration in configurations {
                let Some(webhooks) = configuration.data.get("webhooks").and_then(Value::as_array) else {
                    continue;
                };
                if webhooks.iter().all(|webhook| ca_bundle(webhook).as_deref() == Some(ca_cert)) {
                    continue;
                }

                let name = configuration.metadata.name.as_deref().unwrap_or_default();
                warn!("{} {} has a stale CA bundle, patching", gvk.kind, name);
                let encoded = serde_json::to_value(ByteString(ca_cert.to_vec()))
                    .map_err(|e| CertificateError::Parse(e.to_string()))?;
                let updated: Vec<Value> = webhooks
                    .iter()
                    .cloned()
                    .map(|mut webhook| {
                        if !webhook["clientConfig"].is_object() {
                            webhook["clientConfig"] = json!({});
                        }
                        webhook["clientConfig"]["caBundle"] = encoded.clone();
                        webhook
                    })
                    .collect();
                self.client
                    .patch_merge(&gvk, None, name, &json!({ "webhooks": updated }))
                    .await?;
                patched += 1;
            }
        }

        Ok(patched)
    }

    async fn regenerate_webhook(&self, config: &ControllerConfig, ca: &CertificateBundle) -> Result<()> {
        let webhook = generate_webhook_cert(
            ca,
            &config.chart_namespace,
            config.rsa_key_bits,
            config.webhook_certificate_expiration,
        )?;
        self.store(
            &config.chart_namespace,
            certs::WEBHOOK_SECRET,
            certs::WEBHOOK_CERT_KEY,
            certs::WEBHOOK_PRIVATE_KEY,
            &webhook,
        )
        .await
    }

    async fn load(
        &self,
        namespace: &str,
        name: &str,
        cert_key: &str,
        private_key: &str,
    ) -> Result<Option<CertificateBundle>> {
        let obj = match self.client.get(&kinds::secret(), Some(namespace), name).await {
            Ok(obj) => obj,
            Err(e) if e.is_not_found() => {
                info!("Secret {} not found", name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let secret: Secret = from_dynamic(&obj)?;
        let data = secret.data.unwrap_or_default();
        let read = |key: &str| {
            data.get(key)
                .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        };
        Ok(read(cert_key)
            .zip(read(private_key))
            .map(|(cert_pem, key_pem)| CertificateBundle { cert_pem, key_pem }))
    }

    async fn store(
        &self,
        namespace: &str,
        name: &str,
        cert_key: &str,
        private_key: &str,
        bundle: &CertificateBundle,
    ) -> Result<()> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    labels::MANAGED_BY.to_string(),
                    OPERATOR_NAME.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (cert_key.to_string(), ByteString(bundle.cert_pem.clone().into_bytes())),
                (private_key.to_string(), ByteString(bundle.key_pem.clone().into_bytes())),
            ])),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        self.client.apply(&kinds::secret(), &to_dynamic(&secret)?).await?;
        debug!("Stored secret {}/{}", namespace, name);
        Ok(())
    }
}

/// Whether `cert_pem` parses and stays valid for longer than `boundary`
fn still_valid(cert_pem: &str, boundary: Duration) -> bool {
    match CertificateInfo::from_pem(cert_pem) {
        Ok(info) if info.expires_within(boundary) => {
            info!("Certificate {} expires within {:?}", info.common_name, boundary);
            false
        }
        Ok(_) => true,
        Err(e) => {
            warn!("Unreadable certificate: {}", e);
            false
        }
    }
}

fn ca_bundle(webhook: &Value) -> Option<Vec<u8>> {
    let value = webhook.get("clientConfig")?.get("caBundle")?;
    serde_json::from_value::<ByteString>(value.clone())
        .ok()
        .map(|bytes| bytes.0)
}
