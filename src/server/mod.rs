mod router;
mod state;

pub use router::{build_control_router, serve_control};
pub use state::ControlState;
