//! Connection context for the host application.
//!
//! A [`Session`] owns the [`Connector`] and the live [`Automation`] session,
//! if any. Before each tool call the live session is checked with a cheap
//! property read; a session that no longer answers is dropped and one
//! reconnection is attempted.

use crate::cad::error::{CadError, CadResult};
use crate::cad::executor::Executor;
use crate::cad::host::{Automation, Connector};
use crate::cad::layers;

/// Owns the connection to the host application.
pub struct Session {
    connector: Box<dyn Connector>,
    host: Option<Box<dyn Automation>>,
}

impl Session {
    /// Creates a session that connects lazily through `connector`.
    #[must_use]
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            host: None,
        }
    }

    /// Returns `true` if a live session is held. The session is not checked.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.host.is_some()
    }

    /// Attaches to the host application and ensures the structure layers.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if the host cannot be reached or its
    /// active document does not answer.
    pub fn connect(&mut self, exec: &Executor) -> CadResult<()> {
        self.host = None;

        let mut host = self.connector.connect()?;
        let document = host
            .document_name()
            .map_err(|e| CadError::not_connected(format!("no active document: {e}")))?;

        let created = layers::ensure_structure_layers(host.as_mut(), exec);
        tracing::info!(document = %document, layers_created = created, "Connected to host application");

        self.host = Some(host);
        Ok(())
    }

    /// Returns a live session, reconnecting once if the current one stopped
    /// answering.
    ///
    /// # Errors
    ///
    /// Returns [`CadError::NotConnected`] if no live session can be obtained.
    pub fn ensure_connected(&mut self, exec: &Executor) -> CadResult<&mut dyn Automation> {
        let healthy = match self.host.as_deref() {
            Some(host) => match host.document_name() {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Host stopped answering, reconnecting");
                    false
                }
            },
            None => false,
        };

        if !healthy {
            self.connect(exec).map_err(|e| {
                tracing::warn!(error = %e, "Could not connect to host application");
                match e {
                    CadError::NotConnected { .. } => e,
                    other => CadError::not_connected(other.to_string()),
                }
            })?;
        }

        match self.host.as_deref_mut() {
            Some(host) => Ok(host),
            None => Err(CadError::not_connected("no live session")),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
