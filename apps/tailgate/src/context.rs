use std::sync::Arc;

use crate::config::ClientConfig;
use crate::session::{SessionId, SessionIdentity};
use crate::termination::TerminationSignal;

/// Everything a component needs to know about the current run, passed
/// explicitly instead of living in process globals. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClientContext {
    session: Arc<SessionIdentity>,
    config: Arc<ClientConfig>,
    termination: TerminationSignal,
}

impl ClientContext {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_session(config, SessionIdentity::new())
    }

    pub fn with_session(config: ClientConfig, session: SessionIdentity) -> Self {
        Self {
            session: Arc::new(session),
            config: Arc::new(config),
            termination: TerminationSignal::new(),
        }
    }

    /// Generated on first use and stable for the rest of the run.
    pub fn session_id(&self) -> &SessionId {
        self.session.get()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn termination(&self) -> &TerminationSignal {
        &self.termination
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_session_and_termination() {
        let ctx = ClientContext::new(ClientConfig::new("a.log", "ws://a", vec!["true".into()]));
        let clone = ctx.clone();

        assert_eq!(ctx.session_id(), clone.session_id());
        clone.termination().request();
        assert!(ctx.termination().is_requested());
    }
}
