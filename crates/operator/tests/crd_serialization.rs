use kube::CustomResourceExt;
use minecraft_operator::{
    ChildTemplate, Minecraft, MinecraftDifficulty, MinecraftMode, MinecraftPorts, MinecraftSpec,
};
use serde_json::json;
use std::collections::BTreeMap;

#[test]
fn crd_struct_roundtrip() {
    let original = MinecraftSpec {
        mode: Some(MinecraftMode::Creative),
        name: Some("skyblock".into()),
        motd: Some("welcome back".into()),
        seed: Some("404".into()),
        difficulty: Some(MinecraftDifficulty::Normal),
        ports: Some(MinecraftPorts { minecraft: Some(25566) }),
        template: ChildTemplate {
            labels: Some(BTreeMap::from([("team".to_string(), "ops".to_string())])),
            annotations: None,
        },
    };
    let j = serde_json::to_value(&original).unwrap();
    assert_eq!(
        j,
        json!({
            "mode": "creative",
            "name": "skyblock",
            "motd": "welcome back",
            "seed": "404",
            "difficulty": "normal",
            "ports": {"minecraft": 25566},
            "template": {"labels": {"team": "ops"}}
        })
    );
    let back: MinecraftSpec = serde_json::from_value(j).unwrap();
    assert_eq!(back, original);
}

#[test]
fn absent_fields_deserialize_to_none() {
    let spec: MinecraftSpec = serde_json::from_value(json!({})).unwrap();
    assert_eq!(spec, MinecraftSpec::default());

    let partial: MinecraftSpec = serde_json::from_value(json!({"mode": "hardcore"})).unwrap();
    assert_eq!(partial.mode, Some(MinecraftMode::Hardcore));
    assert!(partial.ports.is_none());
}

#[test]
fn invalid_enum_values_are_rejected() {
    assert!(serde_json::from_value::<MinecraftSpec>(json!({"mode": "spectator"})).is_err());
    assert!(serde_json::from_value::<MinecraftSpec>(json!({"difficulty": "impossible"})).is_err());
}

#[test]
fn crd_declares_group_kind_and_status_subresource() {
    let crd = Minecraft::crd();
    assert_eq!(crd.spec.group, "minecraft.schidlow.ski");
    assert_eq!(crd.spec.names.kind, "Minecraft");
    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1");
    assert!(version
        .subresources
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .is_some());
}
