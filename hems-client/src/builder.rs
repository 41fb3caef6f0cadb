//! Session builder
//!
//! Collects the dongle link and the Route-B parameters before creating a
//! session.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use hems_client::SessionBuilder;
//! use hems_session::Credentials;
//!
//! let credentials = Credentials::new("00112233445566778899AABBCCDDEEFF", "0123456789AB");
//! let reader = SessionBuilder::new(credentials)
//!     .serial("/dev/ttyACM0", 115200)
//!     .build_serial()?;
//! # Ok::<(), hems_core::HemsError>(())
//! ```

use crate::supervisor::SessionFactory;
use async_trait::async_trait;
use hems_core::{HemsError, HemsResult};
use hems_echonet::MeterReader;
use hems_session::{Credentials, SessionSettings, SkSession};
use hems_transport::{SerialSettings, SerialTransport, TransportLayer};
use std::time::Duration;

/// Builder for meter sessions
///
/// # Default Settings
/// - Link: not configured
/// - Session parameters: [`SessionSettings::new`]
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    serial: Option<SerialSettings>,
    settings: SessionSettings,
}

impl SessionBuilder {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            serial: None,
            settings: SessionSettings::new(credentials),
        }
    }

    /// Configure the serial link (8N1, no flow control)
    ///
    /// # Arguments
    /// * `port_name` - Device path (e.g., "/dev/ttyACM0")
    /// * `baud_rate` - Baud rate (the dongle ships at 115200)
    pub fn serial(mut self, port_name: &str, baud_rate: u32) -> Self {
        self.serial = Some(SerialSettings::new(port_name.to_string(), baud_rate));
        self
    }

    /// Configure the serial link from complete settings
    pub fn serial_settings(mut self, settings: SerialSettings) -> Self {
        self.serial = Some(settings);
        self
    }

    /// Per-line read deadline of the link
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        if let Some(serial) = self.serial.as_mut() {
            serial.timeout = Some(timeout);
        }
        self
    }

    /// Pause after opening the link
    pub fn settle_time(mut self, settle_time: Duration) -> Self {
        self.settings.settle_time = settle_time;
        self
    }

    /// `SKSCAN` duration exponent
    pub fn scan_duration(mut self, duration: u8) -> Self {
        self.settings.scan_duration = duration;
        self
    }

    /// Longest silence tolerated during the active scan
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.settings.scan_timeout = Some(timeout);
        self
    }

    /// Longest silence tolerated while waiting for the PANA result
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.settings.join_timeout = timeout;
        self
    }

    /// Send `SKTERM` right after opening the link
    pub fn terminate_stale_session(mut self, enabled: bool) -> Self {
        self.settings.terminate_stale_session = enabled;
        self
    }

    pub fn session_settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Build a session over the configured serial link
    ///
    /// The port is not opened until the session is initialised.
    ///
    /// # Errors
    /// `HemsError::Config` if no serial link was configured
    pub fn build_serial(&self) -> HemsResult<MeterReader<SerialTransport>> {
        let serial = self
            .serial
            .clone()
            .ok_or_else(|| HemsError::Config("Serial link not configured".to_string()))?;
        Ok(self.build_with(SerialTransport::new(serial)))
    }

    /// Build a session over any link
    pub fn build_with<T: TransportLayer>(&self, link: T) -> MeterReader<T> {
        MeterReader::new(SkSession::new(link, self.settings.clone()))
    }
}

/// Factory opening a fresh serial session for every supervisor unit
#[derive(Debug, Clone)]
pub struct SerialSessionFactory {
    builder: SessionBuilder,
}

impl SerialSessionFactory {
    /// # Errors
    /// `HemsError::Config` if the builder has no serial link
    pub fn new(builder: SessionBuilder) -> HemsResult<Self> {
        if builder.serial.is_none() {
            return Err(HemsError::Config("Serial link not configured".to_string()));
        }
        Ok(Self { builder })
    }
}

#[async_trait]
impl SessionFactory for SerialSessionFactory {
    type Session = MeterReader<SerialTransport>;

    async fn create(&self) -> HemsResult<Self::Session> {
        if let Some(serial) = &self.builder.serial {
            log::info!("new session on {} at {} baud", serial.port_name, serial.baud_rate);
        }
        self.builder.build_serial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hems_core::SessionState;
    use hems_transport::MemoryTransport;

    fn credentials() -> Credentials {
        Credentials::new("00112233445566778899AABBCCDDEEFF", "0123456789AB")
    }

    #[test]
    fn test_serial_required() {
        assert!(matches!(
            SessionBuilder::new(credentials()).build_serial(),
            Err(HemsError::Config(_))
        ));
        assert!(SerialSessionFactory::new(SessionBuilder::new(credentials())).is_err());
    }

    #[test]
    fn test_builder_settings() {
        let builder = SessionBuilder::new(credentials())
            .serial("/dev/ttyUSB0", 115200)
            .read_timeout(Duration::from_secs(2))
            .settle_time(Duration::ZERO)
            .scan_duration(5)
            .scan_timeout(Duration::from_secs(40))
            .join_timeout(Duration::from_secs(30))
            .terminate_stale_session(false);

        let reader = builder.build_serial().unwrap();
        let settings = reader.session().settings();
        assert_eq!(settings.scan_duration, 5);
        assert_eq!(settings.scan_read_timeout(), Duration::from_secs(40));
        assert_eq!(settings.join_timeout, Duration::from_secs(30));
        assert!(!settings.terminate_stale_session);
        assert_eq!(settings.settle_time, Duration::ZERO);
        assert_eq!(reader.session().state(), SessionState::Disconnected);
    }

    #[test]
    fn test_build_with_memory_link() {
        let reader = SessionBuilder::new(credentials()).build_with(MemoryTransport::new());
        assert_eq!(reader.session().state(), SessionState::Disconnected);
        assert_eq!(reader.session().settings().credentials, credentials());
    }
}
