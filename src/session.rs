use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, oneshot};

use crate::buffer::Buffer;
use crate::credentials::Credentials;
use crate::crypto;
use crate::datapoint::{self, DataPoint};
use crate::message::{
    self, FC_DEVICE_INFO, FC_DEVICE_RESET, FC_DEVICE_STATUS, FC_PAIR, FC_RECEIVE_DP,
    FC_RECEIVE_DP_V4, FC_SEND_DPS, FC_SEND_DPS_V4, FC_TIME1_REQUEST, FC_TIME2_REQUEST, FC_UNBIND,
    ReceivedMessage, SECURITY_FLAG_LOCAL_KEY,
};
use crate::packet::{self, PacketAssembler};
use crate::transport::{Transport, TransportError};

/// Connection lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    AwaitingDeviceInfo,
    AwaitingPair,
    Ready,
}

/// Everything the engine reports back, delivered over one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    /// The handshake finished. `paired` carries the device's verdict; the
    /// session accepts data-point traffic either way.
    Ready { paired: bool },
    DataPointReceived(DataPoint),
    /// Fired once per inbound batch, after every contained data point has
    /// been applied.
    ReportedDataPointsUpdated,
}

/// Firmware version strings reported in the DeviceInfo response,
/// `"major.minor"` each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub device: String,
    pub protocol: String,
    pub hardware: String,
}

#[derive(Debug)]
pub enum SessionError {
    Transport(TransportError),
    /// A send was attempted before the handshake reached `Ready`.
    NotReady,
    AlreadyConnected,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Transport(e) => write!(f, "Transport error: {e}"),
            SessionError::NotReady => write!(f, "Session is not ready"),
            SessionError::AlreadyConnected => write!(f, "Session is already connected"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        SessionError::Transport(e)
    }
}

/// The session engine: one instance speaks to one peer over one transport.
///
/// All methods run on the caller's thread and never block; inbound
/// notifications are pushed in through [`handle_notification`] from the
/// transport's callback context. Events come out of the receiver returned
/// by [`new`]; data-point sends complete through per-request oneshot
/// handles.
///
/// [`new`]: Session::new
/// [`handle_notification`]: Session::handle_notification
pub struct Session<T: Transport> {
    transport: T,
    credentials: Credentials,
    protocol_version: u8,

    phase: Phase,
    sequence_number: u32,

    local_key_first_six: [u8; 6],
    local_key_md5: [u8; 16],
    session_key: Option<[u8; 16]>,
    auth_key: Vec<u8>,

    assembler: PacketAssembler,
    pending_dp_responses: HashMap<u32, oneshot::Sender<()>>,
    reported_data_points: HashMap<u8, DataPoint>,
    versions: VersionInfo,

    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<T: Transport> Session<T> {
    /// Create an engine for one peer. `protocol_version` comes from the
    /// advertisement (3 for current devices); it selects the outbound DP
    /// length width and function code.
    pub fn new(
        transport: T,
        credentials: Credentials,
        protocol_version: u8,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();

        let local_key_first_six = credentials.local_key_first_six();
        let local_key_md5 = crypto::md5(&local_key_first_six);

        let session = Session {
            transport,
            credentials,
            protocol_version,
            phase: Phase::Idle,
            sequence_number: 0,
            local_key_first_six,
            local_key_md5,
            session_key: None,
            auth_key: Vec::new(),
            assembler: PacketAssembler::new(),
            pending_dp_responses: HashMap::new(),
            reported_data_points: HashMap::new(),
            versions: VersionInfo::default(),
            events,
        };
        (session, event_rx)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn versions(&self) -> &VersionInfo {
        &self.versions
    }

    /// The 32-byte auth key from the DeviceInfo response. Retained for
    /// callers; the open protocol does not use it.
    pub fn auth_key(&self) -> &[u8] {
        &self.auth_key
    }

    pub fn reported_data_point(&self, dp: u8) -> Option<&DataPoint> {
        self.reported_data_points.get(&dp)
    }

    pub fn reported_data_points(&self) -> &HashMap<u8, DataPoint> {
        &self.reported_data_points
    }

    // -- Lifecycle --

    /// Connect the transport and start the handshake. Transport failures
    /// return synchronously and leave the session Idle.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::AlreadyConnected);
        }

        self.phase = Phase::Connecting;
        if let Err(e) = self.transport.connect() {
            self.phase = Phase::Idle;
            return Err(e.into());
        }

        tracing::info!("transport connected, requesting device info");
        self.phase = Phase::AwaitingDeviceInfo;
        let _ = self.events.send(SessionEvent::Connected);

        if let Err(e) = self.send_message(FC_DEVICE_INFO, &[]) {
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Tear the session down. Pending completions are dropped without
    /// firing, reassembly state and the session key are forgotten, and the
    /// sequence counter restarts for the next session.
    pub fn disconnect(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }

        self.transport.disconnect();
        self.phase = Phase::Idle;
        self.sequence_number = 0;
        self.session_key = None;
        self.assembler.reset();
        self.pending_dp_responses.clear();

        tracing::info!("disconnected");
        let _ = self.events.send(SessionEvent::Disconnected);
    }

    // -- Sending --

    /// Submit data points; the returned handle resolves when the device
    /// acknowledges them. It closes unfulfilled if the session disconnects
    /// first.
    pub fn send_data_points(
        &mut self,
        dps: &[DataPoint],
    ) -> Result<oneshot::Receiver<()>, SessionError> {
        if self.phase != Phase::Ready {
            return Err(SessionError::NotReady);
        }

        let payload = datapoint::encode_data_points(dps, self.protocol_version);
        let code = if self.protocol_version >= 4 {
            FC_SEND_DPS_V4
        } else {
            FC_SEND_DPS
        };

        let (tx, rx) = oneshot::channel();
        let sequence_number = self.send_message(code, &payload)?;
        self.pending_dp_responses.insert(sequence_number, tx);
        Ok(rx)
    }

    pub fn send_data_point(
        &mut self,
        dp: DataPoint,
    ) -> Result<oneshot::Receiver<()>, SessionError> {
        self.send_data_points(std::slice::from_ref(&dp))
    }

    /// Ask the device to re-emit its data points.
    pub fn request_status(&mut self) -> Result<(), SessionError> {
        self.send_ready_gated(FC_DEVICE_STATUS)
    }

    /// Remove the device from its account binding.
    pub fn unbind(&mut self) -> Result<(), SessionError> {
        self.send_ready_gated(FC_UNBIND)
    }

    /// Factory-reset the device.
    pub fn reset_device(&mut self) -> Result<(), SessionError> {
        self.send_ready_gated(FC_DEVICE_RESET)
    }

    fn send_ready_gated(&mut self, code: u16) -> Result<(), SessionError> {
        if self.phase != Phase::Ready {
            return Err(SessionError::NotReady);
        }
        self.send_message(code, &[]).map(|_| ())
    }

    /// Frame, encrypt, fragment and write one message. Returns the
    /// sequence number it was assigned, which response correlation keys on.
    fn send_message(&mut self, code: u16, data: &[u8]) -> Result<u32, SessionError> {
        self.sequence_number += 1;
        let sequence_number = self.sequence_number;

        let security_flag = message::security_flag_for(code);
        let key = match security_flag {
            SECURITY_FLAG_LOCAL_KEY => self.local_key_md5,
            _ => self.session_key.ok_or(SessionError::NotReady)?,
        };

        tracing::debug!(
            seq = sequence_number,
            code = %format_args!("{code:#06x}"),
            len = data.len(),
            "sending message"
        );

        let envelope =
            message::build_message(sequence_number, 0, code, data, security_flag, &key);
        for fragment in packet::split_into_packets(&envelope, self.protocol_version) {
            self.transport.write_packet(&fragment)?;
        }
        Ok(sequence_number)
    }

    fn send_pair_request(&mut self) -> Result<(), SessionError> {
        let mut data = Buffer::with_capacity(44);
        data.append_str(&self.credentials.uuid);
        data.append_slice(&self.local_key_first_six);
        data.append_str(&self.credentials.device_id);
        if data.len() < 44 {
            let padding = 44 - data.len();
            data.append_slice(&Buffer::zeroed(padding));
        }
        self.send_message(FC_PAIR, &data).map(|_| ())
    }

    // -- Receiving --

    /// Feed one GATT notification's bytes from the transport.
    pub fn handle_notification(&mut self, data: &[u8]) {
        let Some(envelope) = self.assembler.feed(data) else {
            return;
        };

        match message::parse_message(&envelope, &self.local_key_md5, self.session_key.as_ref()) {
            Ok(received) => self.dispatch(received),
            Err(e) => tracing::warn!("discarding malformed message: {e}"),
        }
    }

    fn dispatch(&mut self, received: ReceivedMessage) {
        tracing::debug!(
            code = %format_args!("{:#06x}", received.function_code),
            seq = received.sequence_number,
            rseq = received.response_to_sequence_number,
            len = received.data.len(),
            "received message"
        );

        match received.function_code {
            FC_DEVICE_INFO => self.handle_device_info_response(&received),
            FC_PAIR => self.handle_pair_response(&received),
            FC_SEND_DPS | FC_SEND_DPS_V4 => self.handle_send_dps_ack(&received),
            FC_RECEIVE_DP | FC_RECEIVE_DP_V4 => self.handle_receive_dp(&received),
            FC_TIME1_REQUEST | FC_TIME2_REQUEST => {
                // Our clock is not authoritative; the device gets no answer.
            }
            other => {
                tracing::trace!(code = %format_args!("{other:#06x}"), "unhandled function code");
            }
        }
    }

    /// Handshake step 1: the device's versions, the srand nonce the
    /// session key derives from, and the retained auth key.
    fn handle_device_info_response(&mut self, received: &ReceivedMessage) {
        if self.phase != Phase::AwaitingDeviceInfo {
            return;
        }

        let data = &received.data;
        if data.len() < 46 {
            tracing::warn!(len = data.len(), "device info response too short, handshake aborted");
            return;
        }

        self.versions = VersionInfo {
            device: format!("{}.{}", data[0], data[1]),
            protocol: format!("{}.{}", data[2], data[3]),
            hardware: format!("{}.{}", data[12], data[13]),
        };

        let srand = &data[6..12];
        self.auth_key = data[14..46].to_vec();

        let mut key_material = Buffer::with_capacity(12);
        key_material.append_slice(&self.local_key_first_six);
        key_material.append_slice(srand);
        self.session_key = Some(crypto::md5(&key_material));

        tracing::debug!(
            device = %self.versions.device,
            protocol = %self.versions.protocol,
            hardware = %self.versions.hardware,
            srand = %hex::encode(srand),
            "session key derived"
        );

        self.phase = Phase::AwaitingPair;
        if let Err(e) = self.send_pair_request() {
            tracing::warn!("could not send pair request: {e}");
            self.disconnect();
        }
    }

    /// Handshake step 2: the device's pairing verdict. The session becomes
    /// Ready either way; the verdict rides on the event.
    fn handle_pair_response(&mut self, received: &ReceivedMessage) {
        if self.phase != Phase::AwaitingPair {
            return;
        }
        let Some(&first) = received.data.first() else {
            return;
        };

        let paired = first != 0;
        if !paired {
            tracing::warn!("pairing rejected by device");
        }

        self.phase = Phase::Ready;
        let _ = self.events.send(SessionEvent::Ready { paired });
    }

    fn handle_send_dps_ack(&mut self, received: &ReceivedMessage) {
        if let Some(completion) = self
            .pending_dp_responses
            .remove(&received.response_to_sequence_number)
        {
            let _ = completion.send(());
        }
    }

    fn handle_receive_dp(&mut self, received: &ReceivedMessage) {
        // Inbound DP lengths are a single byte even on v4 firmware.
        let dps = datapoint::decode_data_points(&received.data, 3);

        for dp in dps {
            tracing::debug!(dp = dp.dp, "data point reported");
            self.reported_data_points.insert(dp.dp, dp.clone());
            let _ = self.events.send(SessionEvent::DataPointReceived(dp));
        }
        let _ = self.events.send(SessionEvent::ReportedDataPointsUpdated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{SECURITY_FLAG_SESSION_KEY, build_message_with_iv};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::oneshot::error::TryRecvError as OneshotTryRecvError;

    const LOCAL_KEY: &str = "0123456789abcdef";
    const SRAND: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    #[derive(Default)]
    struct MockTransport {
        written: Rc<RefCell<Vec<Vec<u8>>>>,
        fail_connect: bool,
    }

    impl Transport for MockTransport {
        fn connect(&mut self) -> Result<(), TransportError> {
            if self.fail_connect {
                Err(TransportError::ConnectFailed("mock".into()))
            } else {
                Ok(())
            }
        }

        fn write_packet(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            assert!(bytes.len() <= packet::MAX_PACKET_SIZE);
            self.written.borrow_mut().push(bytes.to_vec());
            Ok(())
        }

        fn disconnect(&mut self) {}
    }

    fn credentials() -> Credentials {
        Credentials {
            uuid: "tuya1234abcd5678".into(),
            device_id: "bf12345678abcdefghij".into(),
            local_key: LOCAL_KEY.into(),
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn new_session() -> (
        Session<MockTransport>,
        mpsc::UnboundedReceiver<SessionEvent>,
        Rc<RefCell<Vec<Vec<u8>>>>,
    ) {
        init_tracing();
        let written = Rc::new(RefCell::new(Vec::new()));
        let transport = MockTransport {
            written: written.clone(),
            fail_connect: false,
        };
        let (session, events) = Session::new(transport, credentials(), 3);
        (session, events, written)
    }

    fn session_key() -> [u8; 16] {
        let mut material = b"012345".to_vec();
        material.extend_from_slice(&SRAND);
        crypto::md5(&material)
    }

    /// Build a device→client message and feed its fragments to the session.
    fn feed_device_message(
        session: &mut Session<MockTransport>,
        code: u16,
        data: &[u8],
        response_to: u32,
        key: &[u8; 16],
        flag: u8,
    ) {
        let envelope = build_message_with_iv(100, response_to, code, data, flag, key, [0x5Au8; 16]);
        for fragment in packet::split_into_packets(&envelope, 3) {
            session.handle_notification(&fragment);
        }
    }

    fn device_info_payload() -> Vec<u8> {
        let mut data = vec![0u8; 46];
        data[0] = 1; // device version 1.0
        data[2] = 3;
        data[3] = 3; // protocol version 3.3
        data[6..12].copy_from_slice(&SRAND);
        data[12] = 2;
        data[13] = 1; // hardware version 2.1
        for (i, byte) in data[14..46].iter_mut().enumerate() {
            *byte = i as u8;
        }
        data
    }

    fn handshake(session: &mut Session<MockTransport>) {
        session.connect().unwrap();
        feed_device_message(
            session,
            FC_DEVICE_INFO,
            &device_info_payload(),
            1,
            &crypto::md5(b"012345"),
            SECURITY_FLAG_LOCAL_KEY,
        );
        feed_device_message(
            session,
            FC_PAIR,
            &[1],
            2,
            &session_key(),
            SECURITY_FLAG_SESSION_KEY,
        );
    }

    /// Reassemble the fragments the session wrote since `start` into one
    /// decrypted message.
    fn written_message(
        written: &Rc<RefCell<Vec<Vec<u8>>>>,
        start: usize,
        session_key: Option<&[u8; 16]>,
    ) -> ReceivedMessage {
        let mut assembler = PacketAssembler::new();
        let mut complete = None;
        for fragment in written.borrow()[start..].iter() {
            complete = assembler.feed(fragment);
        }
        let envelope = complete.expect("written fragments form a complete message");
        message::parse_message(&envelope, &crypto::md5(b"012345"), session_key).unwrap()
    }

    #[test]
    fn connect_sends_device_info_with_bootstrap_key() {
        let (mut session, mut events, written) = new_session();
        session.connect().unwrap();

        assert_eq!(session.phase(), Phase::AwaitingDeviceInfo);
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::Connected));

        let request = written_message(&written, 0, None);
        assert_eq!(request.sequence_number, 1);
        assert_eq!(request.function_code, FC_DEVICE_INFO);
        assert!(request.data.is_empty());
    }

    #[test]
    fn failed_connect_returns_to_idle() {
        let transport = MockTransport {
            written: Rc::new(RefCell::new(Vec::new())),
            fail_connect: true,
        };
        let (mut session, _events) = Session::new(transport, credentials(), 3);

        assert!(matches!(
            session.connect(),
            Err(SessionError::Transport(TransportError::ConnectFailed(_)))
        ));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn device_info_response_derives_the_session_key() {
        let (mut session, _events, written) = new_session();
        session.connect().unwrap();
        let pair_start = written.borrow().len();

        feed_device_message(
            &mut session,
            FC_DEVICE_INFO,
            &device_info_payload(),
            1,
            &crypto::md5(b"012345"),
            SECURITY_FLAG_LOCAL_KEY,
        );

        // sessionKey = md5("012345" ∥ srand)
        assert_eq!(session.session_key, Some(session_key()));
        assert_eq!(session.phase(), Phase::AwaitingPair);
        assert_eq!(session.versions().device, "1.0");
        assert_eq!(session.versions().protocol, "3.3");
        assert_eq!(session.versions().hardware, "2.1");
        assert_eq!(session.auth_key().len(), 32);

        // The pair request followed immediately, under the session key.
        let pair = written_message(&written, pair_start, Some(&session_key()));
        assert_eq!(pair.sequence_number, 2);
        assert_eq!(pair.function_code, FC_PAIR);
        assert_eq!(pair.data.len(), 44);

        let creds = credentials();
        let mut expected = Vec::new();
        expected.extend_from_slice(creds.uuid.as_bytes());
        expected.extend_from_slice(b"012345");
        expected.extend_from_slice(creds.device_id.as_bytes());
        expected.resize(44, 0);
        assert_eq!(pair.data, expected);
    }

    #[test]
    fn short_device_info_response_aborts_the_handshake() {
        let (mut session, _events, _written) = new_session();
        session.connect().unwrap();

        feed_device_message(
            &mut session,
            FC_DEVICE_INFO,
            &[0u8; 45],
            1,
            &crypto::md5(b"012345"),
            SECURITY_FLAG_LOCAL_KEY,
        );

        assert_eq!(session.phase(), Phase::AwaitingDeviceInfo);
        assert_eq!(session.session_key, None);
    }

    #[test]
    fn pair_response_makes_the_session_ready() {
        let (mut session, mut events, _written) = new_session();
        handshake(&mut session);

        assert!(session.is_ready());
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::Connected));
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::Ready { paired: true }));
    }

    #[test]
    fn rejected_pairing_still_reaches_ready() {
        let (mut session, mut events, _written) = new_session();
        session.connect().unwrap();
        feed_device_message(
            &mut session,
            FC_DEVICE_INFO,
            &device_info_payload(),
            1,
            &crypto::md5(b"012345"),
            SECURITY_FLAG_LOCAL_KEY,
        );
        feed_device_message(
            &mut session,
            FC_PAIR,
            &[0],
            2,
            &session_key(),
            SECURITY_FLAG_SESSION_KEY,
        );

        assert!(session.is_ready());
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::Connected));
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::Ready { paired: false }));
    }

    #[test]
    fn send_before_ready_is_rejected() {
        let (mut session, _events, _written) = new_session();
        assert!(matches!(
            session.send_data_points(&[DataPoint::boolean(1, true)]),
            Err(SessionError::NotReady)
        ));

        session.connect().unwrap();
        assert!(matches!(
            session.request_status(),
            Err(SessionError::NotReady)
        ));
    }

    #[test]
    fn data_point_send_completes_on_matching_ack() {
        let (mut session, _events, written) = new_session();
        handshake(&mut session);
        let start = written.borrow().len();

        let mut completion = session
            .send_data_points(&[DataPoint::boolean(47, true)])
            .unwrap();

        let sent = written_message(&written, start, Some(&session_key()));
        assert_eq!(sent.function_code, FC_SEND_DPS);
        assert_eq!(sent.sequence_number, 3);
        assert_eq!(sent.data, vec![47, 1, 1, 1]);

        // Not complete until the ack arrives.
        assert!(matches!(completion.try_recv(), Err(OneshotTryRecvError::Empty)));

        // An ack for someone else is ignored.
        feed_device_message(
            &mut session,
            FC_SEND_DPS,
            &[],
            999,
            &session_key(),
            SECURITY_FLAG_SESSION_KEY,
        );
        assert!(matches!(completion.try_recv(), Err(OneshotTryRecvError::Empty)));

        feed_device_message(
            &mut session,
            FC_SEND_DPS,
            &[],
            sent.sequence_number,
            &session_key(),
            SECURITY_FLAG_SESSION_KEY,
        );
        assert!(completion.try_recv().is_ok());
    }

    #[test]
    fn received_data_points_update_the_cache_and_fire_events() {
        let (mut session, mut events, _written) = new_session();
        handshake(&mut session);
        while events.try_recv().is_ok() {}

        let batch = datapoint::encode_data_points(
            &[DataPoint::boolean(47, true), DataPoint::enumeration(9, 2)],
            3,
        );
        feed_device_message(
            &mut session,
            FC_RECEIVE_DP,
            &batch,
            0,
            &session_key(),
            SECURITY_FLAG_SESSION_KEY,
        );

        assert_eq!(
            session.reported_data_point(47).and_then(DataPoint::as_boolean),
            Some(true)
        );
        assert_eq!(
            session.reported_data_point(9).and_then(DataPoint::as_enumeration),
            Some(2)
        );

        assert_eq!(
            events.try_recv().ok(),
            Some(SessionEvent::DataPointReceived(DataPoint::boolean(47, true)))
        );
        assert_eq!(
            events.try_recv().ok(),
            Some(SessionEvent::DataPointReceived(DataPoint::enumeration(9, 2)))
        );
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::ReportedDataPointsUpdated));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn disconnect_drops_pending_completions_and_resets_sequencing() {
        let (mut session, mut events, written) = new_session();
        handshake(&mut session);

        let mut completion = session
            .send_data_points(&[DataPoint::boolean(1, true)])
            .unwrap();

        session.disconnect();
        assert_eq!(session.phase(), Phase::Idle);
        // Dropped, never fulfilled.
        assert!(matches!(completion.try_recv(), Err(OneshotTryRecvError::Closed)));

        while events.try_recv().is_ok() {}

        // A fresh session starts the sequence over.
        let start = written.borrow().len();
        session.connect().unwrap();
        let request = written_message(&written, start, None);
        assert_eq!(request.sequence_number, 1);
    }

    #[test]
    fn sequence_numbers_are_strictly_monotonic() {
        let (mut session, _events, written) = new_session();
        handshake(&mut session);

        let mut sequences = Vec::new();
        for _ in 0..3 {
            let start = written.borrow().len();
            session.request_status().unwrap();
            sequences.push(written_message(&written, start, Some(&session_key())).sequence_number);
        }

        assert_eq!(sequences, vec![3, 4, 5]);
    }

    #[test]
    fn time_requests_are_ignored() {
        let (mut session, mut events, written) = new_session();
        handshake(&mut session);
        while events.try_recv().is_ok() {}
        let start = written.borrow().len();

        feed_device_message(
            &mut session,
            FC_TIME1_REQUEST,
            &[0x01],
            0,
            &session_key(),
            SECURITY_FLAG_SESSION_KEY,
        );

        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(written.borrow().len(), start);
    }

    #[test]
    fn malformed_inbound_messages_are_discarded() {
        let (mut session, mut events, _written) = new_session();
        handshake(&mut session);
        while events.try_recv().is_ok() {}

        // A complete "message" whose ciphertext is garbage.
        let garbage = vec![0xFFu8; 33];
        for fragment in packet::split_into_packets(&garbage, 3) {
            session.handle_notification(&fragment);
        }

        assert!(session.is_ready());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn duplicate_device_info_response_does_not_rekey() {
        let (mut session, _events, _written) = new_session();
        handshake(&mut session);

        let key_before = session.session_key;
        let mut altered = device_info_payload();
        altered[6..12].copy_from_slice(&[9, 9, 9, 9, 9, 9]);
        feed_device_message(
            &mut session,
            FC_DEVICE_INFO,
            &altered,
            1,
            &crypto::md5(b"012345"),
            SECURITY_FLAG_LOCAL_KEY,
        );

        assert_eq!(session.session_key, key_before);
        assert!(session.is_ready());
    }
}
