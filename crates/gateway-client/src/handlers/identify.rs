//! Identify handshake (op 2)

use crate::connection::{FrameWriter, Session};
use crate::error::WriteError;
use crate::protocol::{Envelope, IdentifyPayload, IdentifyProperties};
use futures_util::Sink;
use gateway_common::{ClientIdentity, Credential};
use std::fmt::Display;
use tokio_tungstenite::tungstenite::Message;

/// Build the op 2 envelope for `credential`
#[must_use]
pub fn build_identify(credential: &Credential, identity: &ClientIdentity) -> Envelope {
    Envelope::identify(IdentifyPayload {
        token: credential.expose().to_string(),
        properties: IdentifyProperties::from(identity),
    })
}

/// Sends identify for a session
pub struct IdentifyHandler;

impl IdentifyHandler {
    /// Send identify once; the caller guarantees it holds the session's hello claim
    pub async fn send<S>(
        session: &Session,
        writer: &FrameWriter<S>,
        identity: &ClientIdentity,
    ) -> Result<(), WriteError>
    where
        S: Sink<Message> + Unpin + Send,
        S::Error: Display,
    {
        writer
            .send(&build_identify(session.credential(), identity))
            .await?;

        tracing::info!(
            connection_id = %session.connection_id(),
            os = %identity.os,
            browser = %identity.browser,
            "Identify sent"
        );
        Ok(())
    }
}
