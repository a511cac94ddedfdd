// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock API server for kube clients, an in-memory cluster
//! and shared fixtures.

use crate::config::ControllerConfig;
use crate::constants::{credentials, kinds};
use crate::kubernetes::client::{gvk_key, ClusterClient, ClusterError, ClusterResult};
use crate::kubernetes::crd::crd_name;
use crate::types::btp_operator::{BtpOperator, BtpOperatorSpec};
use async_trait::async_trait;
use http::{Request, Response};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::{DateTime, Utc};
use kube::api::{DynamicObject, GroupVersionKind, ObjectMeta, TypeMeta};
use kube::client::Body;
use kube::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Add a response for GET requests matching the path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for DELETE requests matching the path
    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Paths registered with a trailing slash match everything below them
        for ((m, p), resp) in responses.iter() {
            if m == method && p.ends_with('/') && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let (status, body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, status_json(404, "NotFound", "not found")));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// A Status failure body
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

/// Discovery document for one group version: `(plural, kind, namespaced)`
pub fn api_resource_list_json(group_version: &str, resources: &[(&str, &str, bool)]) -> String {
    let resources: Vec<Value> = resources
        .iter()
        .map(|(plural, kind, namespaced)| {
            serde_json::json!({
                "name": plural,
                "singularName": kind.to_lowercase(),
                "namespaced": namespaced,
                "kind": kind,
                "verbs": ["create", "delete", "deletecollection", "get", "list", "patch", "update", "watch"]
            })
        })
        .collect();
    serde_json::json!({
        "kind": "APIResourceList",
        "apiVersion": "v1",
        "groupVersion": group_version,
        "resources": resources
    })
    .to_string()
}

type ObjectKey = (String, String, String);

#[derive(Default)]
struct ClusterState {
    kinds: HashMap<String, bool>,
    objects: BTreeMap<ObjectKey, DynamicObject>,
    next_uid: u64,
    failing_delete_collection: HashSet<String>,
    stalled_delete_collection: HashSet<String>,
    stalled_deployments: bool,
}

/// In-memory `ClusterClient` with API server style finalizer handling.
///
/// Deleting an object that still has finalizers only marks it as deleting;
/// it disappears once its finalizer list is cleared.
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        let cluster = Self {
            state: Mutex::new(ClusterState::default()),
        };
        for (gvk, namespaced) in [
            (kinds::namespace(), false),
            (kinds::secret(), true),
            (kinds::config_map(), true),
            (GroupVersionKind::gvk("", "v1", "Service"), true),
            (GroupVersionKind::gvk("", "v1", "ServiceAccount"), true),
            (kinds::deployment(), true),
            (
                GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "ClusterRole"),
                false,
            ),
            (kinds::crd(), false),
            (kinds::mutating_webhook(), false),
            (kinds::validating_webhook(), false),
            (kinds::btp_operator(), true),
        ] {
            cluster.register_kind(&gvk, namespaced);
        }
        cluster.add_namespace("default");
        cluster
    }

    pub fn register_kind(&self, gvk: &GroupVersionKind, namespaced: bool) {
        self.state
            .lock()
            .unwrap()
            .kinds
            .insert(gvk_key(gvk), namespaced);
    }

    /// Register the operand's dependent kinds together with their CRDs
    pub fn register_dependent_kinds(&self) {
        for gvk in kinds::dependents() {
            self.register_kind(&gvk, true);
            self.insert(&kinds::crd(), dynamic(None, &crd_name(&gvk), Value::Object(Map::new())));
        }
    }

    pub fn add_namespace(&self, name: &str) {
        self.insert(&kinds::namespace(), dynamic(None, name, Value::Object(Map::new())));
    }

    /// Store an object as-is, filling in identity metadata
    pub fn insert(&self, gvk: &GroupVersionKind, mut obj: DynamicObject) -> DynamicObject {
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        let n = state.next_uid;
        obj.types = Some(type_meta(gvk));
        obj.metadata.uid.get_or_insert_with(|| format!("uid-{}", n));
        obj.metadata
            .creation_timestamp
            .get_or_insert_with(|| timestamp(n as i64));
        if !state.kinds.get(&gvk_key(gvk)).copied().unwrap_or(true) {
            obj.metadata.namespace = None;
        }
        let key = object_key(gvk, obj.metadata.namespace.as_deref(), obj.metadata.name.as_deref().unwrap_or_default());
        state.objects.insert(key, obj.clone());
        obj
    }

    pub fn find(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        let state = self.state.lock().unwrap();
        let namespace = if state.kinds.get(&gvk_key(gvk)).copied().unwrap_or(true) {
            namespace
        } else {
            None
        };
        state.objects.get(&object_key(gvk, namespace, name)).cloned()
    }

    /// Every stored object of a kind, in all namespaces
    pub fn objects(&self, gvk: &GroupVersionKind) -> Vec<DynamicObject> {
        let key = gvk_key(gvk);
        self.state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == key)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Number of stored objects of a kind matching `selector`
    pub fn count(&self, gvk: &GroupVersionKind, selector: &str) -> usize {
        self.objects(gvk)
            .iter()
            .filter(|obj| matches_selector(obj, Some(selector)))
            .count()
    }

    pub fn remove(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) {
        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&object_key(gvk, namespace, name));
    }

    /// Make every delete-collection call for `gvk` fail
    pub fn fail_delete_collection(&self, gvk: &GroupVersionKind) {
        self.state
            .lock()
            .unwrap()
            .failing_delete_collection
            .insert(gvk_key(gvk));
    }

    /// Make every delete-collection call for `gvk` hang forever
    pub fn stall_delete_collection(&self, gvk: &GroupVersionKind) {
        self.state
            .lock()
            .unwrap()
            .stalled_delete_collection
            .insert(gvk_key(gvk));
    }

    /// Applied deployments never report available replicas
    pub fn stall_deployments(&self) {
        self.state.lock().unwrap().stalled_deployments = true;
    }

    fn check_kind(state: &ClusterState, gvk: &GroupVersionKind) -> ClusterResult<bool> {
        state
            .kinds
            .get(&gvk_key(gvk))
            .copied()
            .ok_or_else(|| ClusterError::NoKindMatch(gvk_key(gvk)))
    }

    fn mark_deleted(state: &mut ClusterState, key: &ObjectKey) {
        let Some(obj) = state.objects.get_mut(key) else {
            return;
        };
        if obj.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            obj.metadata
                .deletion_timestamp
                .get_or_insert_with(|| Time(Utc::now()));
        } else {
            state.objects.remove(key);
        }
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> ClusterResult<DynamicObject> {
        let state = self.state.lock().unwrap();
        let namespaced = Self::check_kind(&state, gvk)?;
        let namespace = if namespaced { namespace } else { None };
        state
            .objects
            .get(&object_key(gvk, namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("{} {}", gvk.kind, name)))
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<DynamicObject>> {
        let state = self.state.lock().unwrap();
        let namespaced = Self::check_kind(&state, gvk)?;
        let key = gvk_key(gvk);
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == key && (!namespaced || namespace.is_none_or(|wanted| ns.as_str() == wanted))
            })
            .filter(|(_, obj)| matches_selector(obj, label_selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn apply(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let mut state = self.state.lock().unwrap();
        let namespaced = Self::check_kind(&state, gvk)?;

        let mut next = obj.clone();
        next.types = Some(type_meta(gvk));
        if !namespaced {
            next.metadata.namespace = None;
        } else if next.metadata.namespace.is_none() {
            return Err(ClusterError::Api(format!("{} requires a namespace", gvk.kind)));
        }
        let name = next.metadata.name.clone().unwrap_or_default();
        let key = object_key(gvk, next.metadata.namespace.as_deref(), &name);

        match state.objects.get(&key).cloned() {
            Some(existing) => {
                next.metadata.uid = existing.metadata.uid.clone();
                next.metadata.creation_timestamp = existing.metadata.creation_timestamp.clone();
                next.metadata.deletion_timestamp = existing.metadata.deletion_timestamp.clone();
                if next.metadata.finalizers.is_none() {
                    next.metadata.finalizers = existing.metadata.finalizers.clone();
                }
                if next.data.get("status").is_none() {
                    if let Some(status) = existing.data.get("status") {
                        next.data["status"] = status.clone();
                    }
                }
            }
            None => {
                state.next_uid += 1;
                next.metadata.uid = Some(format!("uid-{}", state.next_uid));
                next.metadata.creation_timestamp = Some(timestamp(state.next_uid as i64));
            }
        }

        if gvk.kind == "Deployment" && !state.stalled_deployments {
            let replicas = next.data["spec"]["replicas"].as_i64().unwrap_or(1);
            next.data["status"] = serde_json::json!({
                "replicas": replicas,
                "readyReplicas": replicas,
                "availableReplicas": replicas
            });
        }

        state.objects.insert(key, next.clone());
        Ok(next)
    }

    async fn patch_merge(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> ClusterResult<DynamicObject> {
        let mut state = self.state.lock().unwrap();
        let namespaced = Self::check_kind(&state, gvk)?;
        let key = object_key(gvk, if namespaced { namespace } else { None }, name);
        let existing = state
            .objects
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("{} {}", gvk.kind, name)))?;

        let mut value = serde_json::to_value(existing).unwrap();
        merge_patch(&mut value, patch);
        let updated: DynamicObject = serde_json::from_value(value)
            .map_err(|e| ClusterError::Serialization(e.to_string()))?;

        let gone = updated.metadata.deletion_timestamp.is_some()
            && updated.metadata.finalizers.as_ref().is_none_or(|f| f.is_empty());
        if gone {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn patch_status(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        status: &Value,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        let namespaced = Self::check_kind(&state, gvk)?;
        let key = object_key(gvk, if namespaced { namespace } else { None }, name);
        let existing = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("{} {}", gvk.kind, name)))?;

        if !existing.data.is_object() {
            existing.data = Value::Object(Map::new());
        }
        let mut current = existing.data.get("status").cloned().unwrap_or(Value::Null);
        merge_patch(&mut current, status);
        existing.data["status"] = current;
        Ok(())
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        let namespaced = Self::check_kind(&state, gvk)?;
        let key = object_key(gvk, if namespaced { namespace } else { None }, name);
        if !state.objects.contains_key(&key) {
            return Err(ClusterError::NotFound(format!("{} {}", gvk.kind, name)));
        }
        Self::mark_deleted(&mut state, &key);
        Ok(())
    }

    async fn delete_collection(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<()> {
        let stalled = {
            let state = self.state.lock().unwrap();
            Self::check_kind(&state, gvk)?;
            if state.failing_delete_collection.contains(&gvk_key(gvk)) {
                return Err(ClusterError::Api(format!(
                    "simulated delete-collection failure for {}",
                    gvk.kind
                )));
            }
            state.stalled_delete_collection.contains(&gvk_key(gvk))
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        let namespaced = Self::check_kind(&state, gvk)?;
        let key = gvk_key(gvk);
        let matching: Vec<ObjectKey> = state
            .objects
            .iter()
            .filter(|((k, ns, _), obj)| {
                *k == key
                    && (!namespaced || namespace.is_none_or(|wanted| ns.as_str() == wanted))
                    && matches_selector(obj, label_selector)
            })
            .map(|(k, _)| k.clone())
            .collect();
        for object in matching {
            Self::mark_deleted(&mut state, &object);
        }
        Ok(())
    }
}

fn object_key(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        gvk_key(gvk),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn type_meta(gvk: &GroupVersionKind) -> TypeMeta {
    TypeMeta {
        api_version: gvk.api_version(),
        kind: gvk.kind.clone(),
    }
}

fn matches_selector(obj: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|actual| actual == v),
            None => labels.contains_key(term),
        })
}

fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let map = target.as_object_mut().unwrap();
            for (key, value) in entries {
                if value.is_null() {
                    map.remove(key);
                } else {
                    merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// Deterministic creation timestamp `offset` seconds after a fixed epoch
pub fn timestamp(offset: i64) -> Time {
    Time(DateTime::from_timestamp(1_767_225_600 + offset, 0).unwrap())
}

/// A dynamic object with the given identity and body
pub fn dynamic(namespace: Option<&str>, name: &str, data: Value) -> DynamicObject {
    DynamicObject {
        types: None,
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        },
        data,
    }
}

/// A BtpOperator created `created` seconds after the fixture epoch
pub fn make_btp_operator(name: &str, namespace: &str, created: i64) -> BtpOperator {
    let mut cr = BtpOperator::new(name, BtpOperatorSpec::default());
    cr.metadata.namespace = Some(namespace.to_string());
    cr.metadata.creation_timestamp = Some(timestamp(created));
    cr.metadata.uid = Some(format!("{}-{}", namespace, name));
    cr
}

pub fn insert_btp_operator(cluster: &InMemoryCluster, name: &str, namespace: &str, created: i64) {
    let cr = make_btp_operator(name, namespace, created);
    let obj = crate::kubernetes::objects::to_dynamic(&cr).unwrap();
    cluster.insert(&kinds::btp_operator(), obj);
}

/// Store the credentials secret; `None` values are left out
pub fn insert_credentials(cluster: &InMemoryCluster, config: &ControllerConfig, values: &[(&str, Option<&str>)]) {
    let data: Map<String, Value> = values
        .iter()
        .filter_map(|(k, v)| {
            v.map(|v| {
                let encoded = serde_json::to_value(k8s_openapi::ByteString(v.as_bytes().to_vec())).unwrap();
                (k.to_string(), encoded)
            })
        })
        .collect();
    cluster.insert(
        &kinds::secret(),
        dynamic(
            Some(&config.chart_namespace),
            &config.secret_name,
            serde_json::json!({ "data": data, "type": "Opaque" }),
        ),
    );
}

/// A complete, valid set of credentials
pub fn valid_credentials() -> Vec<(&'static str, Option<&'static str>)> {
    vec![
        (credentials::CLIENT_ID, Some("client-id")),
        (credentials::CLIENT_SECRET, Some("client-secret")),
        (credentials::SM_URL, Some("https://sm.example.com")),
        (credentials::TOKEN_URL, Some("https://token.example.com")),
        (credentials::CLUSTER_ID, Some("cluster-1")),
    ]
}

/// Controller settings with timings suited to tests
pub fn make_config(chart_path: &Path) -> ControllerConfig {
    ControllerConfig {
        chart_path: chart_path.join("chart").to_string_lossy().into_owned(),
        resources_path: chart_path.join("resources").to_string_lossy().into_owned(),
        ready_timeout: Duration::from_millis(300),
        ready_check_interval: Duration::from_millis(10),
        hard_delete_timeout: Duration::from_millis(400),
        hard_delete_check_interval: Duration::from_millis(10),
        delete_request_timeout: Duration::from_millis(200),
        rsa_key_bits: 2048,
        ..ControllerConfig::default()
    }
}

pub const DEPLOYMENT_MANIFEST: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: sap-btp-operator-controller-manager
  namespace: kyma-system
spec:
  replicas: 1
  selector:
    matchLabels:
      app: sap-btp-operator
  template:
    metadata:
      labels:
        app: sap-btp-operator
    spec:
      containers:
        - name: manager
          image: sap-btp-operator:latest
"#;

pub const CONFIG_MAP_MANIFEST: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: sap-btp-operator-config
data:
  MAX_CONCURRENT: "1"
"#;

pub const SECRET_MANIFEST: &str = r#"
apiVersion: v1
kind: Secret
metadata:
  name: sap-btp-service-operator
type: Opaque
"#;

pub const SERVICE_MANIFEST: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: sap-btp-operator-webhook-service
spec:
  ports:
    - port: 443
      targetPort: 9443
"#;

pub const CLUSTER_ROLE_MANIFEST: &str = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: sap-btp-operator-manager-role
rules:
  - apiGroups: ["services.cloud.sap.com"]
    resources: ["serviceinstances", "servicebindings"]
    verbs: ["*"]
"#;

pub const WEBHOOK_MANIFESTS: &str = r#"
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata:
  name: sap-btp-operator-mutating-webhook-configuration
webhooks:
  - name: mservicebinding.kb.io
    admissionReviewVersions: ["v1"]
    sideEffects: None
    clientConfig:
      service:
        name: sap-btp-operator-webhook-service
        namespace: kyma-system
        path: /mutate-services-cloud-sap-com-v1-servicebinding
---
apiVersion: admissionregistration.k8s.io/v1
kind: ValidatingWebhookConfiguration
metadata:
  name: sap-btp-operator-validating-webhook-configuration
webhooks:
  - name: vservicebinding.kb.io
    admissionReviewVersions: ["v1"]
    sideEffects: None
    clientConfig:
      service:
        name: sap-btp-operator-webhook-service
        namespace: kyma-system
        path: /validate-services-cloud-sap-com-v1-servicebinding
  - name: vserviceinstance.kb.io
    admissionReviewVersions: ["v1"]
    sideEffects: None
    clientConfig:
      service:
        name: sap-btp-operator-webhook-service
        namespace: kyma-system
        path: /validate-services-cloud-sap-com-v1-serviceinstance
"#;

/// The manifests of a complete operand chart, one file each
pub fn default_manifests() -> Vec<(&'static str, &'static str)> {
    vec![
        ("deployment.yaml", DEPLOYMENT_MANIFEST),
        ("configmap.yaml", CONFIG_MAP_MANIFEST),
        ("secret.yaml", SECRET_MANIFEST),
        ("service.yml", SERVICE_MANIFEST),
        ("rbac/clusterrole.yaml", CLUSTER_ROLE_MANIFEST),
        ("webhooks.yaml", WEBHOOK_MANIFESTS),
    ]
}

/// Write a chart below `<root>/chart`, replacing any previous templates
pub fn write_chart(root: &Path, version: &str, manifests: &[(&str, &str)]) {
    let chart = root.join("chart");
    let templates = chart.join("templates");
    if templates.exists() {
        std::fs::remove_dir_all(&templates).unwrap();
    }
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(
        chart.join("Chart.yaml"),
        format!("apiVersion: v2\nname: sap-btp-operator\nversion: {}\n", version),
    )
    .unwrap();
    for (file, content) in manifests {
        let path = templates.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
