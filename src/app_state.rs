use crate::usecase::controller::{ControllerSharedState, SessionController};
use crate::usecase::store_service::StoreHandle;
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex};

pub struct AppState {
    pub store: StoreHandle,
    pub controller: Mutex<SessionController>,
    pub shared_state: Arc<ArcSwap<ControllerSharedState>>,
}

impl AppState {
    pub fn new(store: StoreHandle, controller: SessionController) -> Self {
        let shared_state = controller.shared_state();
        Self {
            store,
            controller: Mutex::new(controller),
            shared_state,
        }
    }
}
