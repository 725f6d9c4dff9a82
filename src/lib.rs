pub mod collaborators;
pub mod core;
pub mod impls;
pub mod navigation;
pub mod preselect;
pub mod registry;
pub mod resolution;
pub mod script;
pub mod selection;
pub mod tooling;

pub use collaborators::RegistryCollaborators;
pub use core::register_core;
pub use core::slots::{Attribution, NavigationState, SlotSet};
pub use core::token::{Token, TokenIdentity};
pub use impls::demo::register_demo_impls;
pub use navigation::MemoryLocation;
pub use registry::{Context, Registry};
pub use selection::{
    Collaborators, FlowOptions, MemeFlow, SelectionFlow, SingleTokenFlow, StepperFlow,
};
pub use tooling::{init_logging, FlowConfig};
