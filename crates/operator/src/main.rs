//! Binary entrypoint for the Minecraft operator.
use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::controller::Controller;
use kube::runtime::reflector::store::Writer;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client};
use tracing::{info, warn};

use minecraft_operator::config::OperatorConfig;
use minecraft_operator::index::{self, ChildIndex};
use minecraft_operator::reconcile::{error_policy, reconcile, Context};
use minecraft_operator::{telemetry, Minecraft};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = OperatorConfig::from_env();
    let client = Client::try_default().await?;

    let minecrafts: Api<Minecraft> = match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let pods: Api<Pod> = match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let (reader, writer) = reflector::store::<Pod>();
    tokio::spawn(run_child_watch(writer, pods.clone()));

    let telemetry_addr = config.telemetry_addr;
    tokio::spawn(async move {
        if let Err(e) = telemetry::serve(telemetry_addr).await {
            warn!(error = %e, "telemetry server failed");
        }
    });

    let ctx = Arc::new(Context::new(client, ChildIndex::new(reader), config));
    info!("minecraft operator starting");

    Controller::new(minecrafts, watcher::Config::default())
        .watches(pods, watcher::Config::default(), index::triggers_for)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => info!(resource = %obj, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile dispatch failed"),
            }
        })
        .await;

    info!("controller terminated");
    Ok(())
}

/// Keeps the owner index current; the reconciler only reads the store this
/// task writes.
async fn run_child_watch(writer: Writer<Pod>, pods: Api<Pod>) {
    let stream = reflector(writer, watcher(pods, watcher::Config::default()).default_backoff());
    futures_util::pin_mut!(stream);
    while let Some(ev) = stream.next().await {
        if let Err(e) = ev {
            warn!(error = %e, "pod watch error");
        }
    }
}
