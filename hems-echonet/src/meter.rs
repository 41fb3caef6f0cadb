//! Power reading round trip

use crate::frame::EchonetFrame;
use crate::rxudp::RxUdp;
use async_trait::async_trait;
use hems_core::{HemsResult, Reading};
use hems_session::SkSession;
use hems_transport::TransportLayer;
use std::time::SystemTime;

/// Anything that can produce an instantaneous power reading
#[async_trait]
pub trait PowerSource: Send {
    async fn fetch_power(&mut self) -> HemsResult<Reading>;
}

/// Request the instantaneous power from the meter over a joined session
///
/// The reading is stamped with the time the request was sent.
///
/// # Errors
/// Whatever `send_to` reports (`RequestFailed(Er06)`, `SessionExpired`,
/// `Timeout`, ...), `Protocol` for a malformed notification and
/// `UnexpectedLength` for a response that is not a power value.
pub async fn fetch_power<T: TransportLayer>(session: &mut SkSession<T>) -> HemsResult<Reading> {
    let timestamp = SystemTime::now();
    let request = EchonetFrame::power_request().encode()?;

    let line = session.send_to(&request).await?;
    let notification = RxUdp::parse(&line)?;
    let watts = notification.decode_power().inspect_err(|e| {
        log::warn!("discarding meter response ({}): {}", e.classification(), e);
    })?;

    log::debug!("instantaneous power {} W", watts);
    Ok(Reading::new(timestamp, watts))
}

/// [`PowerSource`] backed by a PANA session
#[derive(Debug)]
pub struct MeterReader<T: TransportLayer> {
    session: SkSession<T>,
}

impl<T: TransportLayer> MeterReader<T> {
    pub fn new(session: SkSession<T>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SkSession<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SkSession<T> {
        &mut self.session
    }

    pub fn into_session(self) -> SkSession<T> {
        self.session
    }
}

#[async_trait]
impl<T: TransportLayer> PowerSource for MeterReader<T> {
    async fn fetch_power(&mut self) -> HemsResult<Reading> {
        fetch_power(&mut self.session).await
    }
}
