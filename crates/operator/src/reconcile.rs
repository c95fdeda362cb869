//! The reconcile loop. Each pass observes current child state, computes the
//! delta against the desired spec, and issues the minimum corrective actions.
//! Passes are level-based: safe to re-run arbitrarily often, in any order
//! relative to external changes, with convergence rather than per-pass
//! atomicity as the correctness goal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::OperatorConfig;
use crate::crd::{Minecraft, MinecraftStatus};
use crate::error::{Error, Result};
use crate::index::ChildIndex;
use crate::render;
use crate::telemetry;

/// Shared state handed to every reconcile pass.
pub struct Context {
    pub client: Client,
    pub index: ChildIndex,
    pub config: OperatorConfig,
    pub failures: FailureTracker,
}

impl Context {
    pub fn new(client: Client, index: ChildIndex, config: OperatorConfig) -> Self {
        Self {
            client,
            index,
            config,
            failures: FailureTracker::default(),
        }
    }
}

/// Consecutive-failure counts per resource key, backing the error backoff.
/// Cleared by the first successful pass.
#[derive(Default)]
pub struct FailureTracker {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureTracker {
    pub fn record(&self, key: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap();
        let n = counts.entry(key.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    pub fn clear(&self, key: &str) {
        self.counts.lock().unwrap().remove(key);
    }

    pub fn count(&self, key: &str) -> u32 {
        self.counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

/// Delay before the nth consecutive retry: base doubled per failure, capped.
pub fn backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    base.saturating_mul(2u32.saturating_pow(exp)).min(max)
}

fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

/// A child still making progress toward (or at) a running server. Anything
/// past Pending/Running is terminal.
fn is_alive(pod: &Pod) -> bool {
    matches!(phase(pod), Some("Pending" | "Running"))
}

/// A child whose recorded spec hash matches what the current spec renders to.
/// Pods created before the annotation existed count as stale and get replaced.
fn is_current(pod: &Pod, desired_hash: &str) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(render::SPEC_HASH_ANNOTATION))
        .map(String::as_str)
        == Some(desired_hash)
}

/// Outcome of the planning stage for one pass.
#[derive(Debug, Default)]
pub struct Plan {
    pub survivor: Option<Pod>,
    pub doomed: Vec<Pod>,
}

/// Decide corrective actions. Pure. Survivor selection sorts alive, current
/// candidates by creation timestamp (oldest wins, name as the final tie-break)
/// so repeated passes over the same children always pick the same pod.
pub fn plan(children: &[Pod], desired_hash: &str) -> Plan {
    let mut candidates: Vec<&Pod> = children
        .iter()
        .filter(|p| is_alive(p) && is_current(p, desired_hash))
        .collect();
    candidates.sort_by_key(|p| {
        (
            p.metadata.creation_timestamp.as_ref().map(|t| t.0),
            p.name_any(),
        )
    });
    let survivor = candidates.first().map(|p| (*p).clone());
    let survivor_name = survivor.as_ref().map(|p| p.name_any());
    let doomed = children
        .iter()
        .filter(|p| survivor_name.as_deref() != Some(p.name_any().as_str()))
        .cloned()
        .collect();
    Plan { survivor, doomed }
}

/// Status computed from the pre-cleanup observation: a crash between the
/// status write and the deletions leaves a record consistent with "no
/// survivor decided yet".
pub fn observed_status(mc: &Minecraft, survivor: Option<&Pod>) -> MinecraftStatus {
    match survivor {
        Some(pod) => MinecraftStatus {
            mode: mc.spec.mode,
            status: phase(pod).unwrap_or("Unknown").to_string(),
            pod: Some(pod.name_any()),
        },
        None => MinecraftStatus {
            mode: mc.spec.mode,
            status: "None".to_string(),
            pod: None,
        },
    }
}

async fn publish_status(api: &Api<Minecraft>, name: &str, status: &MinecraftStatus) -> Result<()> {
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// One complete pass for a single resource. Any store failure short-circuits
/// the rest of the pass; the next pass starts over from a fresh read.
pub async fn reconcile(mc: Arc<Minecraft>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = mc.name_any();
    let namespace = mc
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let key = format!("{namespace}/{name}");

    let minecrafts: Api<Minecraft> = Api::namespaced(ctx.client.clone(), &namespace);
    // Work from a fresh read; the triggering snapshot may be stale. A vanished
    // resource is not an error: the owner-reference cascade collects whatever
    // children it left behind.
    let Some(mc) = minecrafts.get_opt(&name).await? else {
        debug!(resource = %key, "resource gone, nothing to do");
        ctx.failures.clear(&key);
        return Ok(Action::requeue(ctx.config.requeue_interval));
    };

    let children = ctx.index.children_of(&namespace, &name);
    let desired_hash = render::spec_hash(&render::pod_spec(&mc.spec))?;
    let plan = plan(&children, &desired_hash);

    // Status must land before any destructive action.
    let status = observed_status(&mc, plan.survivor.as_ref());
    publish_status(&minecrafts, &name, &status).await?;

    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    for pod in &plan.doomed {
        let pod_name = pod.name_any();
        match pods.delete(&pod_name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(resource = %key, pod = %pod_name, "deleted superseded pod");
                telemetry::CHILD_PODS_DELETED.inc();
            }
            // already gone
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }

    if plan.survivor.is_none() {
        let pod = render::pod_for(&mc)?;
        let created = pods.create(&PostParams::default(), &pod).await?;
        info!(resource = %key, pod = %created.name_any(), "created server pod");
        telemetry::CHILD_PODS_CREATED.inc();
        // Second status write of the pass: record the replacement child with
        // whatever phase the store reported, so back-to-back passes with no
        // external change settle on the same status.
        let status = observed_status(&mc, Some(&created));
        publish_status(&minecrafts, &name, &status).await?;
    }

    ctx.failures.clear(&key);
    telemetry::RECONCILES.with_label_values(&["success"]).inc();
    telemetry::RECONCILE_DURATION.observe(start.elapsed().as_secs_f64());
    Ok(Action::requeue(ctx.config.requeue_interval))
}

/// Every failure is retryable; the delay grows with the consecutive-failure
/// count for this resource and resets on the first clean pass.
pub fn error_policy(mc: Arc<Minecraft>, err: &Error, ctx: Arc<Context>) -> Action {
    let key = format!("{}/{}", mc.namespace().unwrap_or_default(), mc.name_any());
    let failures = ctx.failures.record(&key);
    let delay = backoff(failures, ctx.config.requeue_interval, ctx.config.max_backoff);
    warn!(resource = %key, error = %err, failures, delay_secs = delay.as_secs(), "reconcile failed");
    telemetry::RECONCILES.with_label_values(&["error"]).inc();
    Action::requeue(delay)
}
