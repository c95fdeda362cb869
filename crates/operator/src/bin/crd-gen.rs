use kube::CustomResourceExt;
use minecraft_operator::Minecraft; // bring in CRD type
fn main() {
    let crd = Minecraft::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD");
    println!("{}", yaml);
}
