//! Desired-state rendering: a `MinecraftSpec` maps to exactly one pod
//! specification. The transform is pure and deterministic; the hash of its
//! output is what the reconciler compares to decide whether a running child
//! is still current.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, ExecAction, Pod, PodSpec, Probe, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};

use crate::crd::{Minecraft, MinecraftSpec};
use crate::error::{Error, Result};

pub const SERVER_IMAGE: &str = "itzg/minecraft-server:latest";
pub const SERVER_CONTAINER: &str = "minecraft-server";
pub const DEFAULT_PORT: u16 = 25565;
pub const POD_NAME_PREFIX: &str = "minecraft-pod-";
/// Annotation recording the hash of the rendered pod spec at creation time.
pub const SPEC_HASH_ANNOTATION: &str = "minecraft.schidlow.ski/spec-hash";

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

/// Readiness and liveness share the same check: ping the server's own status
/// endpoint on loopback after a fixed startup grace period.
fn status_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec!["mcstatus".into(), "127.0.0.1".into(), "ping".into()]),
        }),
        initial_delay_seconds: Some(30),
        period_seconds: Some(30),
        ..Default::default()
    }
}

/// Render the pod spec for a resource spec. Each optional field contributes
/// exactly one environment entry; the port additionally overrides the declared
/// container port.
pub fn pod_spec(spec: &MinecraftSpec) -> PodSpec {
    let mut envs = vec![
        env("EULA", "true"),
        env("ALLOW_NETHER", "true"),
        env("ANNOUNCE_PLAYER_ACHIEVEMENTS", "true"),
        env("GENERATE_STRUCTURES", "true"),
        env("SPAWN_ANIMALS", "true"),
        env("ALLOW_FLIGHT", "true"),
    ];

    let mut container_port = DEFAULT_PORT;
    if let Some(port) = spec.ports.as_ref().and_then(|p| p.minecraft) {
        envs.push(env("SERVER_PORT", port.to_string()));
        container_port = port;
    }
    if let Some(mode) = spec.mode {
        envs.push(env("MODE", mode.as_str()));
    }
    if let Some(name) = spec.name.as_deref() {
        envs.push(env("SERVER_NAME", name));
    }
    if let Some(difficulty) = spec.difficulty {
        envs.push(env("DIFFICULTY", difficulty.as_str()));
    }
    if let Some(motd) = spec.motd.as_deref() {
        envs.push(env("MOTD", motd));
    }
    if let Some(seed) = spec.seed.as_deref() {
        envs.push(env("SEED", seed));
    }

    PodSpec {
        containers: vec![Container {
            name: SERVER_CONTAINER.to_string(),
            image: Some(SERVER_IMAGE.to_string()),
            resources: Some(ResourceRequirements {
                limits: Some(BTreeMap::from([(
                    "memory".to_string(),
                    Quantity("2Gi".to_string()),
                )])),
                requests: Some(BTreeMap::from([(
                    "memory".to_string(),
                    Quantity("1.5Gi".to_string()),
                )])),
                ..Default::default()
            }),
            env: Some(envs),
            ports: Some(vec![ContainerPort {
                container_port: i32::from(container_port),
                name: Some("minecraft".to_string()),
                ..Default::default()
            }]),
            readiness_probe: Some(status_probe()),
            liveness_probe: Some(status_probe()),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Content hash of a rendered pod spec. Stable for equal specs, which is what
/// lets a later pass detect that a running child no longer matches.
pub fn spec_hash(spec: &PodSpec) -> Result<String> {
    let bytes = serde_json::to_vec(spec)?;
    let mut h = Sha256::new();
    h.update(&bytes);
    Ok(format!("{:x}", h.finalize()))
}

/// Build the complete pod to create for a resource: rendered spec plus
/// template metadata, a generated name, the owner reference back to the
/// resource, and the spec-hash annotation.
pub fn pod_for(mc: &Minecraft) -> Result<Pod> {
    let spec = pod_spec(&mc.spec);
    let hash = spec_hash(&spec)?;
    let oref = mc
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))?;

    let mut annotations = mc.spec.template.annotations.clone().unwrap_or_default();
    annotations.insert(SPEC_HASH_ANNOTATION.to_string(), hash);

    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(POD_NAME_PREFIX.to_string()),
            namespace: mc.namespace(),
            labels: mc.spec.template.labels.clone(),
            annotations: Some(annotations),
            owner_references: Some(vec![oref]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ChildTemplate, MinecraftDifficulty, MinecraftMode, MinecraftPorts};

    fn env_value(spec: &PodSpec, key: &str) -> Option<String> {
        spec.containers[0]
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == key)?
            .value
            .clone()
    }

    #[test]
    fn baseline_has_fixed_toggles_and_default_port() {
        let spec = pod_spec(&MinecraftSpec::default());
        for key in [
            "EULA",
            "ALLOW_NETHER",
            "ANNOUNCE_PLAYER_ACHIEVEMENTS",
            "GENERATE_STRUCTURES",
            "SPAWN_ANIMALS",
            "ALLOW_FLIGHT",
        ] {
            assert_eq!(env_value(&spec, key).as_deref(), Some("true"), "{key}");
        }
        assert_eq!(env_value(&spec, "SERVER_PORT"), None);
        assert_eq!(env_value(&spec, "MODE"), None);
        let container = &spec.containers[0];
        assert_eq!(container.image.as_deref(), Some(SERVER_IMAGE));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 25565);
    }

    #[test]
    fn port_and_mode_override() {
        let spec = pod_spec(&MinecraftSpec {
            mode: Some(MinecraftMode::Creative),
            ports: Some(MinecraftPorts { minecraft: Some(25566) }),
            ..Default::default()
        });
        assert_eq!(env_value(&spec, "SERVER_PORT").as_deref(), Some("25566"));
        assert_eq!(env_value(&spec, "MODE").as_deref(), Some("creative"));
        assert_eq!(spec.containers[0].ports.as_ref().unwrap()[0].container_port, 25566);
    }

    #[test]
    fn optional_fields_each_map_to_one_env() {
        let spec = pod_spec(&MinecraftSpec {
            name: Some("skyblock".into()),
            motd: Some("welcome back".into()),
            seed: Some("404".into()),
            difficulty: Some(MinecraftDifficulty::Peaceful),
            ..Default::default()
        });
        assert_eq!(env_value(&spec, "SERVER_NAME").as_deref(), Some("skyblock"));
        assert_eq!(env_value(&spec, "MOTD").as_deref(), Some("welcome back"));
        assert_eq!(env_value(&spec, "SEED").as_deref(), Some("404"));
        assert_eq!(env_value(&spec, "DIFFICULTY").as_deref(), Some("peaceful"));
    }

    #[test]
    fn probes_poll_server_status() {
        let spec = pod_spec(&MinecraftSpec::default());
        let container = &spec.containers[0];
        for probe in [
            container.readiness_probe.as_ref().unwrap(),
            container.liveness_probe.as_ref().unwrap(),
        ] {
            let cmd = probe.exec.as_ref().unwrap().command.as_ref().unwrap();
            assert_eq!(cmd, &["mcstatus", "127.0.0.1", "ping"]);
            assert_eq!(probe.initial_delay_seconds, Some(30));
            assert_eq!(probe.period_seconds, Some(30));
        }
    }

    #[test]
    fn render_is_deterministic() {
        let spec = MinecraftSpec {
            mode: Some(MinecraftMode::Survival),
            seed: Some("8675309".into()),
            ..Default::default()
        };
        let a = pod_spec(&spec);
        let b = pod_spec(&spec);
        assert_eq!(a, b);
        assert_eq!(spec_hash(&a).unwrap(), spec_hash(&b).unwrap());

        let changed = MinecraftSpec {
            seed: Some("other".into()),
            ..spec
        };
        assert_ne!(
            spec_hash(&a).unwrap(),
            spec_hash(&pod_spec(&changed)).unwrap()
        );
    }

    #[test]
    fn pod_carries_template_metadata_owner_ref_and_hash() {
        let mut mc = Minecraft::new(
            "alpha",
            MinecraftSpec {
                template: ChildTemplate {
                    labels: Some(std::collections::BTreeMap::from([(
                        "team".to_string(),
                        "ops".to_string(),
                    )])),
                    annotations: Some(std::collections::BTreeMap::from([(
                        "note".to_string(),
                        "weekly".to_string(),
                    )])),
                },
                ..Default::default()
            },
        );
        mc.metadata.namespace = Some("games".into());
        mc.metadata.uid = Some("uid-1".into());

        let pod = pod_for(&mc).unwrap();
        assert_eq!(pod.metadata.generate_name.as_deref(), Some(POD_NAME_PREFIX));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("games"));
        assert_eq!(
            pod.metadata.labels.as_ref().unwrap().get("team").map(String::as_str),
            Some("ops")
        );
        let annotations = pod.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations.get("note").map(String::as_str), Some("weekly"));
        let expected = spec_hash(&pod_spec(&mc.spec)).unwrap();
        assert_eq!(annotations.get(SPEC_HASH_ANNOTATION), Some(&expected));

        let oref = &pod.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(oref.kind, "Minecraft");
        assert_eq!(oref.name, "alpha");
        assert_eq!(oref.controller, Some(true));
    }

    #[test]
    fn missing_uid_is_an_error() {
        let mut mc = Minecraft::new("alpha", MinecraftSpec::default());
        mc.metadata.namespace = Some("games".into());
        assert!(pod_for(&mc).is_err());
    }
}
