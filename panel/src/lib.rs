pub mod controller;
pub mod events;
pub mod panel;
pub mod sync;

#[cfg(test)]
mod tests;

pub use controller::AutomationController;
pub use events::{EventHub, PanelEvent};
pub use panel::{Panel, PanelAction};
pub use sync::ActivitySyncLoop;
