// # Kubernetes Annotation Updater
//
// Points external-dns at the router's apex addresses by setting
// `external-dns.alpha.kubernetes.io/target` on labeled resources:
//
// - Ingress (networking.k8s.io/v1)
// - HTTPRoute (gateway.networking.k8s.io/v1)
//
// Resources are listed across all namespaces with a label selector and
// merge-patched only when the annotation differs. A failure on one kind or
// one resource is logged and the rest are still processed.
//
// The cluster client is created on first use from the in-cluster (or
// kubeconfig) environment.

use async_trait::async_trait;
use ddns_core::traits::AnnotationUpdater;
use ddns_core::{Error, Result};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, ResourceExt};
use kube::core::GroupVersionKind;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use std::net::Ipv4Addr;
use tokio::sync::OnceCell;

/// Annotation read by external-dns
pub const TARGET_ANNOTATION: &str = "external-dns.alpha.kubernetes.io/target";

const SOURCE: &str = "kubernetes";

/// Annotation value for `ips`: sorted, deduplicated, comma-joined
pub fn target_value(ips: &[Ipv4Addr]) -> String {
    let mut sorted = ips.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
        .iter()
        .map(Ipv4Addr::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Merge patch body setting the target annotation
pub fn annotation_patch(target: &str) -> serde_json::Value {
    json!({
        "metadata": {
            "annotations": {
                TARGET_ANNOTATION: target
            }
        }
    })
}

/// A resource whose annotation differs from the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPatch {
    pub namespace: String,
    pub name: String,
    pub current: Option<String>,
}

/// Select the resources that need `target`
///
/// Cluster-scoped objects (no namespace) are ignored.
pub fn plan_patches<K: ResourceExt>(kind: &str, items: &[K], target: &str) -> Vec<PendingPatch> {
    items
        .iter()
        .filter_map(|item| {
            let namespace = item.namespace()?;
            let name = item.name_any();
            let current = item.annotations().get(TARGET_ANNOTATION).cloned();

            if current.as_deref() == Some(target) {
                tracing::debug!(kind, namespace = %namespace, name = %name, target, "Annotation already up-to-date");
                return None;
            }
            Some(PendingPatch {
                namespace,
                name,
                current,
            })
        })
        .collect()
}

fn httproute_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("gateway.networking.k8s.io", "v1", "HTTPRoute");
    ApiResource::from_gvk_with_plural(&gvk, "httproutes")
}

/// [`AnnotationUpdater`] backed by the Kubernetes API
#[derive(Default)]
pub struct KubeAnnotationUpdater {
    client: OnceCell<Client>,
}

impl std::fmt::Debug for KubeAnnotationUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAnnotationUpdater")
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl KubeAnnotationUpdater {
    /// Updater that connects lazily using the default client configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Updater using an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client: OnceCell::new_with(Some(client)),
        }
    }

    async fn client(&self) -> Result<Client> {
        self.client
            .get_or_try_init(|| async {
                Client::try_default()
                    .await
                    .map_err(|e| Error::upstream(SOURCE, format!("Failed to load kubernetes config: {e}")))
            })
            .await
            .cloned()
    }

    /// List, plan and patch one resource kind; returns whether anything changed
    async fn update_kind<K, F>(
        &self,
        kind: &'static str,
        all: Api<K>,
        namespaced: F,
        label_selector: &str,
        target: &str,
        dry_run: bool,
    ) -> bool
    where
        K: Resource + Clone + DeserializeOwned + Debug,
        F: Fn(&str) -> Api<K>,
    {
        let items = match all.list(&ListParams::default().labels(label_selector)).await {
            Ok(list) => list.items,
            Err(e) => {
                tracing::error!(kind, error = %e, "Failed to list resources");
                return false;
            }
        };

        let mut updated = false;
        for pending in plan_patches(kind, &items, target) {
            tracing::info!(
                kind,
                namespace = %pending.namespace,
                name = %pending.name,
                old = ?pending.current,
                new = target,
                dry_run,
                "Updating annotation"
            );

            if dry_run {
                updated = true;
                continue;
            }

            let patch = annotation_patch(target);
            match namespaced(&pending.namespace)
                .patch(&pending.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => updated = true,
                Err(e) => tracing::error!(
                    kind,
                    namespace = %pending.namespace,
                    name = %pending.name,
                    error = %e,
                    "Failed to patch annotation"
                ),
            }
        }

        updated
    }
}

#[async_trait]
impl AnnotationUpdater for KubeAnnotationUpdater {
    async fn update_apex_annotations(&self, ips: &[Ipv4Addr], label_selector: &str, dry_run: bool) -> Result<bool> {
        if ips.is_empty() {
            tracing::warn!("No IPs provided for kubernetes annotation update");
            return Ok(false);
        }

        let target = target_value(ips);
        tracing::info!(target = %target, label_selector, dry_run, "Updating kubernetes resources");

        let client = self.client().await?;

        let ingresses = {
            let client = client.clone();
            self.update_kind(
                "Ingress",
                Api::<Ingress>::all(client.clone()),
                move |ns| Api::namespaced(client.clone(), ns),
                label_selector,
                &target,
                dry_run,
            )
            .await
        };

        let resource = httproute_resource();
        let routes = self
            .update_kind(
                "HTTPRoute",
                Api::<DynamicObject>::all_with(client.clone(), &resource),
                |ns| Api::namespaced_with(client.clone(), ns, &resource),
                label_selector,
                &target,
                dry_run,
            )
            .await;

        Ok(ingresses || routes)
    }
}
