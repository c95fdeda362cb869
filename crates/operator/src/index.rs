//! Owner index over the pod cache. The watch task in `main` keeps the backing
//! store current; the reconciler only reads it, so it never has to list the
//! whole namespace through the API server.

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Resource, ResourceExt};

use crate::crd::Minecraft;

/// Indexing function: the name of the controlling Minecraft resource, if any.
/// Pods controlled by anything else contribute nothing to the index.
pub fn owner_name(pod: &Pod) -> Option<&str> {
    let owner = pod
        .metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|o| o.controller == Some(true))?;
    (owner.api_version == Minecraft::api_version(&()) && owner.kind == Minecraft::kind(&()))
        .then(|| owner.name.as_str())
}

/// Maps a child pod event to the owner that must be re-reconciled.
pub fn triggers_for(pod: Pod) -> Option<ObjectRef<Minecraft>> {
    let namespace = pod.namespace()?;
    let owner = owner_name(&pod)?;
    Some(ObjectRef::new(owner).within(&namespace))
}

#[derive(Clone)]
pub struct ChildIndex {
    store: Store<Pod>,
}

impl ChildIndex {
    pub fn new(store: Store<Pod>) -> Self {
        Self { store }
    }

    /// Every cached pod controlled by the named resource in its namespace.
    pub fn children_of(&self, namespace: &str, owner: &str) -> Vec<Pod> {
        self.store
            .state()
            .into_iter()
            .filter(|p| p.namespace().as_deref() == Some(namespace) && owner_name(p) == Some(owner))
            .map(|p| (*p).clone())
            .collect()
    }
}
