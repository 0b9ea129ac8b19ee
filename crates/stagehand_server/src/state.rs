use stagehand_core::prelude::*;
use stagehand_provision::prelude::*;

#[derive(Clone)]
pub struct AppState<S: ProvisionServices> {
    pub provisioner: Provisioner<S>,
}
