//! PANA session lifecycle
//!
//! [`SkSession`] takes the dongle from an unopened link to an authenticated
//! PANA session with the meter and back down.
//!
//! # Bring-up Flow
//!
//! 1. **Open**: open the link, drop stale input, terminate a leftover session, settle
//! 2. **SKVER**: read the firmware version
//! 3. **SKINFO**: read the local IPv6 address
//! 4. **SKSETPWD / SKSETRBID**: register the Route-B credentials
//! 5. **SKSCAN**: find the meter's PAN
//! 6. **SKSREG S2 / S3**: tune to the PAN's channel and PAN ID
//! 7. **SKLL64**: resolve the meter's link-local address
//! 8. **SKJOIN**: authenticate
//!
//! Each step runs only after the previous one succeeded; the first error
//! aborts the bring-up and is returned unchanged, leaving the session in the
//! last state it reached.

use crate::skstack::line::{event, Line, EVENT_RXUDP, LINK_LOCAL_PREFIX, RESP_OK};
use crate::skstack::{CommandEngine, EngineStatistics, Flow, ScanAccumulator, SkCommand};
use hems_core::{
    DeviceInfo, FailCode, HemsError, HemsResult, PanDescriptor, SessionEndpoints, SessionState,
};
use hems_transport::TransportLayer;
use std::fmt;
use std::time::Duration;

/// UDP port of ECHONET Lite
pub const ECHONET_LITE_PORT: u16 = 0x0E1A;

/// Read deadline while waiting for the PANA result of `SKJOIN`
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Channels swept by a Route-B active scan
const SCAN_CHANNELS: u32 = 28;
/// Per-channel scan time is `SCAN_SLOT * (2^duration + 1)`
const SCAN_SLOT: Duration = Duration::from_micros(9_600);
/// Highest duration exponent the dongle accepts
const MAX_SCAN_DURATION: u8 = 14;
const SCAN_MARGIN: Duration = Duration::from_secs(5);

/// Route-B credentials issued by the electricity retailer
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    route_b_id: String,
    password: String,
}

impl Credentials {
    pub fn new(route_b_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            route_b_id: route_b_id.into(),
            password: password.into(),
        }
    }

    pub fn route_b_id(&self) -> &str {
        &self.route_b_id
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("route_b_id", &format_args!("<{} chars>", self.route_b_id.len()))
            .field("password", &format_args!("<redacted>"))
            .finish()
    }
}

/// Session parameters
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub credentials: Credentials,
    /// Pause after opening the link; the module needs time after power-up or reset
    pub settle_time: Duration,
    /// `SKSCAN` duration exponent
    pub scan_duration: u8,
    /// Longest silence tolerated during `SKSCAN`; derived from `scan_duration` when unset
    pub scan_timeout: Option<Duration>,
    /// Longest silence tolerated between `SKJOIN` and the PANA result
    pub join_timeout: Duration,
    /// Send `SKTERM` right after opening to clear a session left by a previous run
    pub terminate_stale_session: bool,
    /// UDP handle used for `SKSENDTO`
    pub sendto_handle: u8,
    /// Destination UDP port for datagrams
    pub port: u16,
    /// Send datagrams encrypted
    pub secured: bool,
}

impl SessionSettings {
    /// Create settings with default parameters
    ///
    /// # Default Values
    /// - Settle time: 1 second
    /// - Scan duration: 6, scan deadline derived from it
    /// - Join deadline: 20 seconds
    /// - Stale session terminate: enabled
    /// - Handle 1, port 0x0E1A, secured
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            settle_time: Duration::from_secs(1),
            scan_duration: 6,
            scan_timeout: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            terminate_stale_session: true,
            sendto_handle: 1,
            port: ECHONET_LITE_PORT,
            secured: true,
        }
    }

    /// Read deadline used while scanning
    ///
    /// `scan_timeout` if set. Otherwise the time a full sweep of the Route-B
    /// channels takes at `scan_duration`, plus a margin.
    pub fn scan_read_timeout(&self) -> Duration {
        self.scan_timeout.unwrap_or_else(|| {
            let exponent = u32::from(self.scan_duration.min(MAX_SCAN_DURATION));
            let slots = (1u32 << exponent) + 1;
            SCAN_SLOT * slots * SCAN_CHANNELS + SCAN_MARGIN
        })
    }
}

/// One PANA session with the meter
///
/// Owns the command engine (and through it the link), the session state and
/// the addresses learnt during bring-up. A session is brought up once; to
/// recover from a failure, close it and build a new one.
pub struct SkSession<T: TransportLayer> {
    engine: CommandEngine<T>,
    settings: SessionSettings,
    state: SessionState,
    history: Vec<SessionState>,
    version: Option<String>,
    device_info: Option<DeviceInfo>,
    pan: Option<PanDescriptor>,
    remote: Option<String>,
}

impl<T: TransportLayer> SkSession<T> {
    /// Create a session over an unopened link
    pub fn new(link: T, settings: SessionSettings) -> Self {
        Self {
            engine: CommandEngine::new(link),
            settings,
            state: SessionState::Disconnected,
            history: vec![SessionState::Disconnected],
            version: None,
            device_info: None,
            pan: None,
            remote: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state the session has been in, oldest first
    pub fn state_history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Firmware version reported by `SKVER`
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    pub fn pan(&self) -> Option<&PanDescriptor> {
        self.pan.as_ref()
    }

    /// Local and remote addresses, once both are known
    pub fn endpoints(&self) -> Option<SessionEndpoints> {
        match (&self.device_info, &self.remote) {
            (Some(info), Some(remote)) => Some(SessionEndpoints {
                local: info.ipv6_address.clone(),
                remote: remote.clone(),
            }),
            _ => None,
        }
    }

    pub fn engine(&self) -> &CommandEngine<T> {
        &self.engine
    }

    pub async fn statistics(&self) -> EngineStatistics {
        self.engine.statistics().await
    }

    fn advance(&mut self, next: SessionState) -> HemsResult<()> {
        self.state.validate_transition(next)?;
        log::debug!("session state {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    fn mark_expired(&mut self) {
        if self.state.is_joined() {
            log::warn!("session lifetime exceeded, session is no longer usable");
            self.state = SessionState::Disconnected;
            self.history.push(SessionState::Disconnected);
        }
    }

    /// Bring the session up from `Disconnected` to `Joined`
    ///
    /// # Errors
    /// The error of the first failing step, unchanged. The session stays in
    /// the last state it reached.
    pub async fn init(&mut self) -> HemsResult<()> {
        if self.state != SessionState::Disconnected || self.history.len() > 1 {
            return Err(HemsError::InvalidState(format!(
                "bring-up needs a fresh session, current state is {}",
                self.state
            )));
        }

        log::info!("session bring-up started");
        if let Err(e) = self.bring_up().await {
            log::error!(
                "session bring-up failed after {} ({}): {}",
                self.state,
                e.classification(),
                e
            );
            return Err(e);
        }
        log::info!("session joined");
        Ok(())
    }

    async fn bring_up(&mut self) -> HemsResult<()> {
        self.connect().await?;
        self.query_version().await?;
        self.query_info().await?;
        self.register_credentials().await?;
        self.scan().await?;
        self.register_pan().await?;
        self.resolve_address().await?;
        self.join().await
    }

    async fn connect(&mut self) -> HemsResult<()> {
        self.engine.open().await?;
        self.advance(SessionState::LinkOpen)?;

        if self.settings.terminate_stale_session {
            if let Err(e) = self.send_terminate().await {
                log::warn!("clearing stale session failed ({}): {}", e.classification(), e);
            }
        }

        if !self.settings.settle_time.is_zero() {
            log::debug!("waiting {:?} for the module to settle", self.settings.settle_time);
            tokio::time::sleep(self.settings.settle_time).await;
        }
        Ok(())
    }

    async fn query_version(&mut self) -> HemsResult<()> {
        let lines = self.engine.send_and_await(&SkCommand::Version, RESP_OK).await?;
        let version = lines
            .iter()
            .find_map(|l| match Line::classify(l) {
                Line::Version(v) => Some(v.to_string()),
                _ => None,
            })
            .ok_or_else(|| HemsError::Protocol("SKVER failed".to_string()))?;

        log::info!("firmware version {}", version);
        self.version = Some(version);
        self.advance(SessionState::Versioned)
    }

    async fn query_info(&mut self) -> HemsResult<()> {
        let lines = self.engine.send_and_await(&SkCommand::Info, RESP_OK).await?;
        let info = lines
            .iter()
            .find_map(|l| match Line::classify(l) {
                Line::Info(fields) => DeviceInfo::from_fields(fields.split_whitespace()),
                _ => None,
            })
            .ok_or_else(|| HemsError::Protocol("SKINFO failed".to_string()))?;

        log::info!("local address {} (mac {})", info.ipv6_address, info.mac_address);
        self.device_info = Some(info);
        self.advance(SessionState::InfoKnown)
    }

    async fn register_credentials(&mut self) -> HemsResult<()> {
        let credentials = &self.settings.credentials;
        let password = SkCommand::SetPassword(credentials.password().to_string());
        let route_b_id = SkCommand::SetRouteBId(credentials.route_b_id().to_string());

        self.engine.write_command(&password).await?;
        self.engine.write_command(&route_b_id).await?;
        self.advance(SessionState::CredentialsSet)
    }

    async fn scan(&mut self) -> HemsResult<()> {
        let mut scan = ScanAccumulator::new();
        let command = SkCommand::active_scan(self.settings.scan_duration);
        let deadline = self.settings.scan_read_timeout();

        let result = self
            .engine
            .send_and_scan_within(&command, deadline, |_, line| match line {
                Line::Fail(code) => Flow::Fail(HemsError::RequestFailed(code.clone())),
                line => {
                    if scan.feed(line) {
                        Flow::Done
                    } else {
                        Flow::Continue
                    }
                }
            })
            .await;
        match result {
            Ok(_) => {}
            Err(HemsError::Timeout) => {
                log::debug!("scan silent for {:?}, taking it as finished", deadline);
            }
            Err(e) => return Err(e),
        }

        if !scan.is_complete() {
            log::warn!("scan ended without a completion event");
        }
        let pan = scan.finish()?;
        log::info!(
            "found PAN {} on channel {} (addr {}, lqi {})",
            pan.pan_id,
            pan.channel,
            pan.addr,
            pan.lqi
        );
        self.pan = Some(pan);
        self.advance(SessionState::Scanned)
    }

    async fn register_pan(&mut self) -> HemsResult<()> {
        let pan = self
            .pan
            .clone()
            .ok_or_else(|| HemsError::InvalidState("no PAN to register".to_string()))?;

        for (register, value) in [("S2", pan.channel), ("S3", pan.pan_id)] {
            let command = SkCommand::SetRegister {
                register: register.to_string(),
                value,
            };
            self.engine.send_and_await(&command, RESP_OK).await?;
        }
        self.advance(SessionState::Registered)
    }

    async fn resolve_address(&mut self) -> HemsResult<()> {
        let addr = match &self.pan {
            Some(pan) => pan.addr.clone(),
            None => return Err(HemsError::InvalidState("no PAN to resolve".to_string())),
        };

        let lines = self
            .engine
            .send_and_await(&SkCommand::LinkLocal64(addr), LINK_LOCAL_PREFIX)
            .await?;
        let remote = lines
            .into_iter()
            .find(|l| l.starts_with(LINK_LOCAL_PREFIX))
            .ok_or_else(|| HemsError::Protocol("SKLL64 failed".to_string()))?;

        log::info!("meter address {}", remote);
        self.remote = Some(remote);
        self.advance(SessionState::AddressResolved)
    }

    async fn join(&mut self) -> HemsResult<()> {
        let remote = self
            .remote
            .clone()
            .ok_or_else(|| HemsError::InvalidState("no address to join".to_string()))?;

        let mut joined = false;
        let deadline = self.settings.join_timeout;
        let result = self
            .engine
            .send_and_scan_within(&SkCommand::Join(remote), deadline, |_, line| match line {
                Line::Fail(code) => Flow::Fail(HemsError::RequestFailed(code.clone())),
                Line::Event {
                    code: event::PANA_FAILED,
                    rest,
                } => Flow::Fail(HemsError::JoinFailed(rest.to_string())),
                line if line.is_event(event::PANA_JOINED) => {
                    joined = true;
                    Flow::DoneWithTrailer
                }
                _ => Flow::Continue,
            })
            .await;
        match result {
            Ok(_) => {}
            Err(HemsError::Timeout) => {
                return Err(HemsError::JoinFailed(format!(
                    "no PANA result within {:?}",
                    deadline
                )));
            }
            Err(e) => return Err(e),
        }

        if !joined {
            return Err(HemsError::JoinFailed(
                "stream ended before the join completed".to_string(),
            ));
        }
        self.advance(SessionState::Joined)
    }

    async fn send_terminate(&self) -> HemsResult<()> {
        let result = self
            .engine
            .send_and_scan(&SkCommand::Terminate, |_, line| match line {
                Line::Fail(FailCode::Er10) => Flow::Done,
                Line::Fail(code) => Flow::Fail(HemsError::RequestFailed(code.clone())),
                Line::Ok => Flow::Done,
                line if line.is_event(event::TERMINATE_TIMEOUT)
                    || line.is_event(event::SESSION_CLOSED) =>
                {
                    Flow::Done
                }
                _ => Flow::Continue,
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(HemsError::SessionExpired) => {
                log::debug!("session expired while terminating");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Terminate the PANA session
    ///
    /// Succeeds when the dongle confirms, when there was no session (`FAIL
    /// ER10`) and when the session had already timed out (`EVENT 28`).
    pub async fn terminate(&mut self) -> HemsResult<()> {
        self.send_terminate().await?;
        if self.state.is_joined() {
            self.advance(SessionState::Terminated)?;
        }
        log::info!("session terminated");
        Ok(())
    }

    /// Terminate the session and close the link
    ///
    /// A failing terminate is logged and does not keep the link open. No
    /// terminate is sent over a link that already reached end of stream, but
    /// the link itself is still released. Closing twice is a no-op.
    pub async fn close(&mut self) -> HemsResult<()> {
        if !self.engine.is_closed().await {
            if let Err(e) = self.terminate().await {
                log::warn!("terminate before close failed ({}): {}", e.classification(), e);
            }
        }
        self.engine.close().await?;
        log::debug!("link closed");
        Ok(())
    }

    /// Send a UDP datagram to the meter and wait for its answer
    ///
    /// # Returns
    /// The `ERXUDP` line whose sender is the meter and whose destination is
    /// this dongle.
    ///
    /// # Errors
    /// - `HemsError::InvalidState` unless the session is joined
    /// - `HemsError::RequestFailed(FailCode::Er06)` when the dongle rejects the send
    /// - `HemsError::SessionExpired` (the session moves to `Disconnected`)
    /// - `HemsError::Protocol` when no matching notification arrived
    pub async fn send_to(&mut self, payload: &[u8]) -> HemsResult<String> {
        let endpoints = match (self.state.is_joined(), self.endpoints()) {
            (true, Some(endpoints)) => endpoints,
            _ => {
                return Err(HemsError::InvalidState(format!(
                    "datagrams need a joined session, current state is {}",
                    self.state
                )));
            }
        };

        let command = SkCommand::SendTo {
            handle: self.settings.sendto_handle,
            address: endpoints.remote.clone(),
            port: self.settings.port,
            secured: self.settings.secured,
            side: 0,
            length: payload.len(),
        };
        let terminal = format!("{}{} {}", EVENT_RXUDP, endpoints.remote, endpoints.local);

        let lines = match self
            .engine
            .send_payload_and_await(&command, payload, &terminal)
            .await
        {
            Ok(lines) => lines,
            Err(HemsError::SessionExpired) => {
                self.mark_expired();
                return Err(HemsError::SessionExpired);
            }
            Err(e) => return Err(e),
        };

        lines
            .into_iter()
            .find(|l| l.starts_with(&terminal))
            .ok_or_else(|| HemsError::Protocol("SKSENDTO failed".to_string()))
    }
}

impl<T: TransportLayer> fmt::Debug for SkSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkSession")
            .field("state", &self.state)
            .field("version", &self.version)
            .field("remote", &self.remote)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hems_transport::{DrainBehavior, MemoryTransport, MemoryTransportHandle};

    const LOCAL: &str = "FE80:0000:0000:0000:021D:1291:0000:0001";
    const REMOTE: &str = "FE80:0000:0000:0000:021D:1290:1234:5678";

    fn settings() -> SessionSettings {
        let mut settings = SessionSettings::new(Credentials::new(
            "00112233445566778899AABBCCDDEEFF",
            "0123456789AB",
        ));
        settings.settle_time = Duration::ZERO;
        settings
    }

    fn info_line() -> String {
        format!("EINFO {} 001D129100000001 21 8888 0", LOCAL)
    }

    /// Dongle answering every bring-up step except `SKSCAN` and `SKJOIN`
    fn dongle_without_scan_and_join() -> MemoryTransport {
        MemoryTransport::new()
            .on("SKVER", ["EVER 1.2.10", "OK"])
            .on("SKINFO", [info_line(), "OK".to_string()])
            .always("SKSREG", ["OK"])
            .on("SKLL64", [REMOTE])
    }

    fn quiet_settings() -> SessionSettings {
        let mut settings = settings();
        settings.terminate_stale_session = false;
        settings.scan_timeout = Some(Duration::from_millis(50));
        settings.join_timeout = Duration::from_millis(50);
        settings
    }

    fn scripted_dongle() -> MemoryTransport {
        MemoryTransport::new()
            .on("SKTERM", ["SKTERM", "FAIL ER10"])
            .on("SKVER", ["SKVER", "EVER 1.2.10", "OK"])
            .on(
                "SKINFO",
                ["SKINFO", &format!("EINFO {} 001D129100000001 21 8888 0", LOCAL), "OK"],
            )
            .on("SKSETPWD", ["OK"])
            .on("SKSETRBID", ["OK"])
            .on(
                "SKSCAN",
                [
                    "SKSCAN 2 FFFFFFFF 6 0",
                    "OK",
                    &format!("EVENT 20 {}", LOCAL),
                    "EPANDESC",
                    "  Channel:21",
                    "  Channel Page:09",
                    "  Pan ID:8888",
                    "  Addr:001D129012345678",
                    "  LQI:E1",
                    "  Side:0",
                    "  PairID:00ABCDEF",
                    &format!("EVENT 22 {} 0", LOCAL),
                ],
            )
            .on("SKSREG", ["SKSREG S2 21", "OK"])
            .on("SKSREG", ["SKSREG S3 8888", "OK"])
            .on("SKLL64", ["SKLL64 001D129012345678", REMOTE])
            .on(
                "SKJOIN",
                [
                    &format!("SKJOIN {}", REMOTE),
                    "OK",
                    &format!("EVENT 21 {} 0 00", REMOTE),
                    &format!("EVENT 25 {} 0", REMOTE),
                    &format!(
                        "ERXUDP {} FF02:0000:0000:0000:0000:0000:0000:0001 0E1A 0E1A \
                         001D129012345678 1 0 0012 1081000002880105FF017301D50401028801",
                        REMOTE
                    ),
                ],
            )
    }

    async fn joined_session() -> (SkSession<MemoryTransport>, MemoryTransportHandle) {
        let transport = scripted_dongle();
        let handle = transport.handle();
        let mut session = SkSession::new(transport, settings());
        session.init().await.unwrap();
        (session, handle)
    }

    #[tokio::test]
    async fn test_bring_up_visits_every_state() {
        let (session, handle) = joined_session().await;

        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(
            session.state_history(),
            &[
                SessionState::Disconnected,
                SessionState::LinkOpen,
                SessionState::Versioned,
                SessionState::InfoKnown,
                SessionState::CredentialsSet,
                SessionState::Scanned,
                SessionState::Registered,
                SessionState::AddressResolved,
                SessionState::Joined,
            ]
        );
        assert_eq!(
            handle.written(),
            vec![
                "SKTERM".to_string(),
                "SKVER".to_string(),
                "SKINFO".to_string(),
                "SKSETPWD C 0123456789AB".to_string(),
                "SKSETRBID 00112233445566778899AABBCCDDEEFF".to_string(),
                "SKSCAN 2 FFFFFFFF 6 0".to_string(),
                "SKSREG S2 21".to_string(),
                "SKSREG S3 8888".to_string(),
                "SKLL64 001D129012345678".to_string(),
                format!("SKJOIN {}", REMOTE),
            ]
        );
    }

    #[tokio::test]
    async fn test_bring_up_records_device_data() {
        let (session, _) = joined_session().await;

        assert_eq!(session.version(), Some("1.2.10"));
        assert_eq!(session.device_info().unwrap().ipv6_address, LOCAL);
        let pan = session.pan().unwrap();
        assert_eq!(pan.channel, "21");
        assert_eq!(pan.pan_id, "8888");
        assert_eq!(pan.addr, "001D129012345678");
        assert_eq!(
            session.endpoints(),
            Some(SessionEndpoints {
                local: LOCAL.to_string(),
                remote: REMOTE.to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_scan_failure_halts_at_credentials_set() {
        let transport = MemoryTransport::new()
            .on("SKSCAN", ["FAIL ER09"])
            .on("SKVER", ["EVER 1.2.10", "OK"])
            .on("SKINFO", [info_line(), "OK".to_string()]);
        let handle = transport.handle();
        let mut session = SkSession::new(transport, settings());

        let err = session.init().await.unwrap_err();
        assert!(matches!(err, HemsError::RequestFailed(FailCode::Er09)));
        assert_eq!(session.state(), SessionState::CredentialsSet);
        assert!(!handle.written().iter().any(|l| l.starts_with("SKSREG")));
    }

    #[tokio::test]
    async fn test_scan_without_addr_is_no_pan() {
        let transport = MemoryTransport::new()
            .on("SKVER", ["EVER 1.2.10", "OK"])
            .on("SKINFO", [info_line(), "OK".to_string()])
            .on(
                "SKSCAN",
                ["OK".to_string(), "Channel:21".to_string(), format!("EVENT 22 {} 0", LOCAL)],
            );
        let mut session = SkSession::new(transport, settings());

        assert!(matches!(session.init().await, Err(HemsError::NoPanFound)));
        assert_eq!(session.state(), SessionState::CredentialsSet);
    }

    #[tokio::test]
    async fn test_quiet_scan_keeps_found_pan() {
        let transport = dongle_without_scan_and_join()
            .with_drain(DrainBehavior::Stall)
            .on(
                "SKSCAN",
                [
                    "OK".to_string(),
                    format!("EVENT 20 {} 0", LOCAL),
                    "EPANDESC".to_string(),
                    "  Channel:21".to_string(),
                    "  Pan ID:8888".to_string(),
                    "  Addr:001D129012345678".to_string(),
                ],
            )
            .on(
                "SKJOIN",
                [
                    "OK".to_string(),
                    format!("EVENT 25 {} 0", REMOTE),
                    format!("EVENT 21 {} 0 00", REMOTE),
                ],
            );
        let mut session = SkSession::new(transport, quiet_settings());
        session
            .engine()
            .set_read_timeout(Some(Duration::from_millis(20)))
            .await
            .unwrap();

        session.init().await.unwrap();
        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(session.pan().unwrap().addr, "001D129012345678");
        assert_eq!(session.pan().unwrap().channel, "21");
        assert_eq!(
            session.engine().read_timeout().await,
            Some(Duration::from_millis(20))
        );
    }

    #[tokio::test]
    async fn test_quiet_scan_without_pan() {
        let transport = dongle_without_scan_and_join()
            .with_drain(DrainBehavior::Stall)
            .on("SKSCAN", ["OK".to_string(), format!("EVENT 20 {} 0", LOCAL)]);
        let mut session = SkSession::new(transport, quiet_settings());

        assert!(matches!(session.init().await, Err(HemsError::NoPanFound)));
        assert_eq!(session.state(), SessionState::CredentialsSet);
    }

    #[test]
    fn test_scan_deadline_follows_duration() {
        let mut settings = settings();
        assert_eq!(
            settings.scan_read_timeout(),
            Duration::from_micros(28 * 9_600 * 65) + Duration::from_secs(5)
        );
        settings.scan_duration = 3;
        assert_eq!(
            settings.scan_read_timeout(),
            Duration::from_micros(28 * 9_600 * 9) + Duration::from_secs(5)
        );
        settings.scan_timeout = Some(Duration::from_secs(40));
        assert_eq!(settings.scan_read_timeout(), Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_join_without_result_times_out() {
        let transport = dongle_without_scan_and_join()
            .with_drain(DrainBehavior::Stall)
            .on(
                "SKSCAN",
                [
                    "Channel:21".to_string(),
                    "Pan ID:8888".to_string(),
                    "Addr:001D129012345678".to_string(),
                    format!("EVENT 22 {} 0", LOCAL),
                ],
            )
            .on("SKJOIN", ["OK".to_string(), format!("EVENT 21 {} 0 00", REMOTE)]);
        let mut session = SkSession::new(transport, quiet_settings());
        session
            .engine()
            .set_read_timeout(Some(Duration::from_secs(1)))
            .await
            .unwrap();

        let err = session.init().await.unwrap_err();
        assert!(matches!(err, HemsError::JoinFailed(_)));
        assert_eq!(session.state(), SessionState::AddressResolved);
        assert_eq!(session.engine().read_timeout().await, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_lifetime_event_during_bring_up() {
        let transport = dongle_without_scan_and_join()
            .on(
                "SKSCAN",
                [
                    "Channel:21".to_string(),
                    "Pan ID:8888".to_string(),
                    "Addr:001D129012345678".to_string(),
                    format!("EVENT 22 {} 0", LOCAL),
                ],
            )
            .on(
                "SKJOIN",
                [
                    "OK".to_string(),
                    format!("EVENT 29 {} 0", REMOTE),
                    format!("EVENT 25 {} 0", REMOTE),
                ],
            );
        let mut session = SkSession::new(transport, settings());

        let err = session.init().await.unwrap_err();
        assert!(matches!(err, HemsError::SessionExpired));
        assert_eq!(session.state(), SessionState::AddressResolved);
        assert!(session.endpoints().is_some());
    }

    #[tokio::test]
    async fn test_missing_version_line() {
        let transport = MemoryTransport::new().on("SKVER", ["OK"]);
        let mut session = SkSession::new(transport, settings());

        let err = session.init().await.unwrap_err();
        assert!(matches!(err, HemsError::Protocol(_)));
        assert_eq!(session.state(), SessionState::LinkOpen);
    }

    #[tokio::test]
    async fn test_pana_failure_event() {
        let transport = MemoryTransport::new()
            .on("SKVER", ["EVER 1.2.10", "OK"])
            .on("SKINFO", [info_line(), "OK".to_string()])
            .on(
                "SKSCAN",
                [
                    "Addr:001D129012345678".to_string(),
                    "Channel:21".to_string(),
                    "Pan ID:8888".to_string(),
                    format!("EVENT 22 {} 0", LOCAL),
                ],
            )
            .always("SKSREG", ["OK"])
            .on("SKLL64", [REMOTE])
            .on("SKJOIN", ["OK".to_string(), format!("EVENT 24 {} 0", REMOTE)]);
        let mut session = SkSession::new(transport, settings());

        let err = session.init().await.unwrap_err();
        assert!(matches!(err, HemsError::JoinFailed(_)));
        assert_eq!(session.state(), SessionState::AddressResolved);
    }

    #[tokio::test]
    async fn test_init_needs_fresh_session() {
        let (mut session, _) = joined_session().await;
        assert!(matches!(session.init().await, Err(HemsError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_terminate_accepts_no_session() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKTERM", ["SKTERM", "FAIL ER10"]);
        session.terminate().await.unwrap();
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_accepts_session_timeout() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKTERM", [format!("EVENT 28 {} 0", REMOTE)]);
        session.terminate().await.unwrap();
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_accepts_ok() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKTERM", ["OK"]);
        assert!(session.terminate().await.is_ok());
    }

    #[tokio::test]
    async fn test_terminate_surfaces_other_failures() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKTERM", ["FAIL ER99"]);
        let err = session.terminate().await.unwrap_err();
        assert!(matches!(err, HemsError::RequestFailed(FailCode::Other(ref c)) if c == "ER99"));
        assert_eq!(session.state(), SessionState::Joined);
    }

    #[tokio::test]
    async fn test_close_closes_link_even_if_terminate_fails() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKTERM", ["FAIL ER99"]);

        session.close().await.unwrap();
        assert_eq!(handle.close_count(), 1);
        assert_eq!(handle.written().last().map(String::as_str), Some("SKTERM"));

        session.close().await.unwrap();
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_link_after_hang_up() {
        let transport = scripted_dongle().with_drain(DrainBehavior::HangUp);
        let handle = transport.handle();
        let mut session = SkSession::new(transport, settings());
        session.init().await.unwrap();

        handle.on("SKSENDTO", Vec::<String>::new());
        assert!(matches!(session.send_to(&[0x10]).await, Err(HemsError::Protocol(_))));
        assert!(session.engine().is_closed().await);
        assert_eq!(handle.close_count(), 0);

        session.close().await.unwrap();
        assert_eq!(handle.close_count(), 1);
        assert!(handle.written().last().unwrap().starts_with("SKSENDTO"));
    }

    #[tokio::test]
    async fn test_send_to_returns_matching_notification() {
        let (mut session, handle) = joined_session().await;
        let reply = format!(
            "ERXUDP {} {} 0E1A 0E1A 001D129012345678 1 0 0012 1081000102880105FF017201E704000000C8",
            REMOTE, LOCAL
        );
        handle.on(
            "SKSENDTO",
            [
                format!("EVENT 21 {} 0 00", REMOTE),
                format!(
                    "ERXUDP FE80:0000:0000:0000:021D:1290:0000:9999 {} 0E1A 0E1A \
                     001D129000009999 1 0 0002 0102",
                    LOCAL
                ),
                reply.clone(),
            ],
        );

        let line = session.send_to(&[0x10, 0x81]).await.unwrap();
        assert_eq!(line, reply);
        let sent = handle.written().into_iter().last().unwrap();
        assert!(sent.starts_with(&format!("SKSENDTO 1 {} 0E1A 1 0 0002 ", REMOTE)));
    }

    #[tokio::test]
    async fn test_send_to_desync() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKSENDTO", ["FAIL ER06"]);
        let err = session.send_to(&[0x10]).await.unwrap_err();
        assert!(err.is_desync());
        assert_eq!(session.state(), SessionState::Joined);
    }

    #[tokio::test]
    async fn test_send_to_session_expired() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKSENDTO", [format!("EVENT 29 {} 0", REMOTE)]);
        let err = session.send_to(&[0x10]).await.unwrap_err();
        assert!(matches!(err, HemsError::SessionExpired));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.send_to(&[0x10]).await, Err(HemsError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_send_to_without_reply() {
        let (mut session, handle) = joined_session().await;
        handle.on("SKSENDTO", [format!("EVENT 21 {} 0 00", REMOTE)]);
        assert!(matches!(session.send_to(&[0x10]).await, Err(HemsError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_send_to_requires_joined_session() {
        let mut session = SkSession::new(MemoryTransport::new(), settings());
        assert!(matches!(session.send_to(&[0x10]).await, Err(HemsError::InvalidState(_))));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials::new("00112233445566778899AABBCCDDEEFF", "0123456789AB");
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("0123456789AB"));
        assert!(!debug.contains("AABB"));
    }
}
