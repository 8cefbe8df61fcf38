//! Panel data store and refresh lifecycle

mod auto_refresh;
mod panel_store;

pub use auto_refresh::AutoRefresh;
pub use panel_store::{PanelConfig, PanelStore};
