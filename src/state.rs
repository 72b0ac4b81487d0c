use std::sync::Arc;

use crate::auth::session::generate_secret;
use crate::auth::SessionKeys;
use crate::config::Config;
use crate::graph::GraphStore;
use crate::media::MediaStore;
use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub store: GraphStore,
    pub config: Config,
    pub sessions: Arc<SessionKeys>,
    pub media: Arc<dyn MediaStore>,
    pub services: Services,
}

impl AppState {
    /// Wire the services around an opened store. Without a configured JWT
    /// secret, a per-process one is generated and tokens die with the process.
    pub fn new(store: GraphStore, config: Config, media: Arc<dyn MediaStore>) -> Self {
        let secret = match config.auth.jwt_secret.clone() {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!(
                    "No JWT secret configured; using a random one. Sessions will not survive a restart."
                );
                generate_secret()
            }
        };
        let sessions = Arc::new(SessionKeys::new(&secret, config.auth.token_hours));
        let services = Services::new(store.clone(), sessions.clone(), &config);

        Self {
            store,
            config,
            sessions,
            media,
            services,
        }
    }
}
