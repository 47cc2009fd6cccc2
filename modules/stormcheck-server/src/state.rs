use stormcheck_store::Store;

use crate::scheduler::Scheduler;

pub struct AppState {
    pub store: Store,
    pub scheduler: Scheduler,
    pub admin_username: String,
    pub admin_password: String,
}
