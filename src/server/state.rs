use std::sync::Arc;

use crate::session::SessionController;

#[derive(Clone)]
pub struct ControlState {
    pub(crate) controller: Arc<SessionController>,
}

impl ControlState {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }
}
