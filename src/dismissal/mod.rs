pub mod controller;
pub mod state;

pub use controller::{DismissalController, DismissalEvent};
pub use state::{DismissMethod, DismissalSession, DismissalState, OperatorChoice, SideEffects};
