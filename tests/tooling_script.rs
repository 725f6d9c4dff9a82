use std::io::Write;

use tempfile::Builder;

use slotfill_kernel_rs::collaborators::RegistryCollaborators;
use slotfill_kernel_rs::core::slots::NavigationState;
use slotfill_kernel_rs::impls::demo::{register_demo_impls, DemoCatalog};
use slotfill_kernel_rs::navigation::MemoryLocation;
use slotfill_kernel_rs::preselect::Collection;
use slotfill_kernel_rs::registry::Registry;
use slotfill_kernel_rs::script::{load_script, run_script, ScriptTarget};
use slotfill_kernel_rs::selection::{Collaborators, FlowOptions, MemeFlow, StepperFlow};

fn collaborators() -> Collaborators {
    let registry = Registry::new();
    register_demo_impls(
        &registry,
        DemoCatalog {
            collections: vec![Collection {
                chain: "eth".into(),
                address: "0xmascot".into(),
                size: 50,
                name: Some("Mascots".into()),
            }],
            ..DemoCatalog::default()
        },
    );
    RegistryCollaborators::new(registry).into_collaborators()
}

const STEPPER_SCRIPT: &str = r#"
script:
  - event: select
    index: 0
    token: { chain: eth, contractAddress: "0xmascot", tokenId: "4" }
  - event: skip
    index: 1
  - event: back
  - event: forward
  - event: hash
  - event: modify
    index: 0
  - event: select
    index: 0
    token: { chain: eth, contractAddress: "0xmascot", tokenId: "8" }
"#;

#[test]
fn yaml_script_replays_a_stepper_session() {
    let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(STEPPER_SCRIPT.as_bytes()).unwrap();
    let steps = load_script(file.path()).unwrap();

    let location = MemoryLocation::parse("https://app.test/trio#1").unwrap();
    let mut flow = StepperFlow::mount(location, FlowOptions::new(0, 3), collaborators()).unwrap();
    let records = run_script(&mut flow, &steps).unwrap();

    let states: Vec<NavigationState> = records.iter().map(|r| r.navigation).collect();
    assert_eq!(
        states,
        vec![
            NavigationState::EditingSlot(1),
            NavigationState::EditingSlot(2),
            NavigationState::EditingSlot(1),
            NavigationState::EditingSlot(2),
            NavigationState::Summary,
            NavigationState::EditingSlot(0),
            NavigationState::EditingSlot(1),
        ]
    );
    assert_eq!(records[5].picker, Some(0));
    assert!(records[6].url.contains("nft_0_id=8"));

    let fill = flow.slots().get(0).unwrap();
    assert_eq!(fill.token.name.as_deref(), Some("Mascots #8"));
    assert_eq!(records.last().unwrap().filled, 1);
}

#[test]
fn text_steps_need_a_meme_flow() {
    let steps = slotfill_kernel_rs::script::parse_script(&serde_json::json!([
        { "event": "text", "index": 0, "value": "when the build passes" }
    ]))
    .unwrap();

    let location = MemoryLocation::parse("https://app.test/meme").unwrap();
    let mut stepper =
        StepperFlow::mount(location.clone(), FlowOptions::new(1, 1), collaborators()).unwrap();
    assert!(run_script(&mut stepper, &steps).is_err());

    let mut meme = MemeFlow::mount(location, FlowOptions::new(1, 1), collaborators()).unwrap();
    let records = run_script(&mut meme, &steps).unwrap();
    assert!(records[0].url.contains("text_0=when+the+build+passes"));
    assert_eq!(ScriptTarget::texts(&meme), ["when the build passes"]);
}
