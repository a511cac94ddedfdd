// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used for server-side apply and the managed-by label
pub const OPERATOR_NAME: &str = "btp-manager";

/// Finalizer guarding deprovisioning of the installation
pub const FINALIZER: &str = "operator.kyma-project.io/btp-manager";

/// Label keys stamped on every installed resource
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const CHART_VERSION: &str = "chart-version";

    /// Selector matching everything installed by this operator
    pub fn managed_selector() -> String {
        format!("{}={}", MANAGED_BY, super::OPERATOR_NAME)
    }

    /// Selector matching installed resources of one chart version
    pub fn version_selector(version: &str) -> String {
        format!("{},{}={}", managed_selector(), CHART_VERSION, version)
    }
}

/// Keys of the operator's credentials secret
pub mod credentials {
    pub const CLIENT_ID: &str = "clientid";
    pub const CLIENT_SECRET: &str = "clientsecret";
    pub const SM_URL: &str = "sm_url";
    pub const TOKEN_URL: &str = "tokenurl";
    pub const CLUSTER_ID: &str = "cluster_id";

    pub const REQUIRED_KEYS: [&str; 5] = [CLIENT_ID, CLIENT_SECRET, SM_URL, TOKEN_URL, CLUSTER_ID];
}

/// Objects of the installed operand that the manager touches directly
pub mod operand {
    pub const CONFIG_MAP: &str = "sap-btp-operator-config";
    pub const SECRET: &str = "sap-btp-service-operator";
    pub const MUTATING_WEBHOOK: &str = "sap-btp-operator-mutating-webhook-configuration";
    pub const VALIDATING_WEBHOOK: &str = "sap-btp-operator-validating-webhook-configuration";
    pub const WEBHOOK_SERVICE: &str = "sap-btp-operator-webhook-service";
}

/// Certificate secrets backing the operand's admission webhooks
pub mod certs {
    pub const CA_SECRET: &str = "ca-server-cert";
    pub const CA_CERT_KEY: &str = "ca.crt";
    pub const CA_PRIVATE_KEY: &str = "ca.key";
    pub const WEBHOOK_SECRET: &str = "webhook-server-cert";
    pub const WEBHOOK_CERT_KEY: &str = "tls.crt";
    pub const WEBHOOK_PRIVATE_KEY: &str = "tls.key";
    pub const ORGANIZATION: &str = "kyma-project.io";
}

/// Persisted chart version record
pub mod versions {
    pub const CONFIG_MAP: &str = "btp-manager-versions";
    pub const OLD_CHART_VERSION: &str = "oldChartVersion";
    pub const OLD_GVKS: &str = "oldGvks";
    pub const CURRENT_CHART_VERSION: &str = "currentChartVersion";
    pub const CURRENT_GVKS: &str = "currentGvks";
}

/// Resource kinds the manager addresses by type
pub mod kinds {
    use kube::api::GroupVersionKind;

    pub fn secret() -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "Secret")
    }

    pub fn config_map() -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "ConfigMap")
    }

    pub fn namespace() -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "Namespace")
    }

    pub fn deployment() -> GroupVersionKind {
        GroupVersionKind::gvk("apps", "v1", "Deployment")
    }

    pub fn crd() -> GroupVersionKind {
        GroupVersionKind::gvk("apiextensions.k8s.io", "v1", "CustomResourceDefinition")
    }

    pub fn mutating_webhook() -> GroupVersionKind {
        GroupVersionKind::gvk(
            "admissionregistration.k8s.io",
            "v1",
            "MutatingWebhookConfiguration",
        )
    }

    pub fn validating_webhook() -> GroupVersionKind {
        GroupVersionKind::gvk(
            "admissionregistration.k8s.io",
            "v1",
            "ValidatingWebhookConfiguration",
        )
    }

    pub fn btp_operator() -> GroupVersionKind {
        GroupVersionKind::gvk("operator.kyma-project.io", "v1alpha1", "BtpOperator")
    }

    pub fn service_instance() -> GroupVersionKind {
        GroupVersionKind::gvk("services.cloud.sap.com", "v1", "ServiceInstance")
    }

    pub fn service_binding() -> GroupVersionKind {
        GroupVersionKind::gvk("services.cloud.sap.com", "v1", "ServiceBinding")
    }

    /// Dependent kinds owned by the operand, bindings first
    pub fn dependents() -> [GroupVersionKind; 2] {
        [service_binding(), service_instance()]
    }
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
