pub mod adapters;
pub mod flow;
pub mod machine;

pub use adapters::{MemeFlow, MemeSubmission, SingleTokenFlow, StepperFlow};
pub use flow::{
    Collaborators, FlowOptions, FlowSnapshot, InitSource, MountReport, SelectionFlow,
    SlotSnapshot,
};
pub use machine::{Effect, FlowEvent, SelectionMachine};
