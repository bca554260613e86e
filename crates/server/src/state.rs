use std::sync::Arc;

use docpost_core::Config;
use docpost_notify::{Directory, TemplateRenderer};

pub struct AppState {
    pub directory: Arc<dyn Directory>,
    /// Renders the unsubscribe confirmation/failure pages.
    pub pages: TemplateRenderer,
    pub config: Config,
}
