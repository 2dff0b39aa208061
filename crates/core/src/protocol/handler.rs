use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::RtspError;
use crate::media::{FrameSource, MediaCatalog, Packetizer};
use crate::protocol::request::{Command, Request};
use crate::protocol::response::Response;
use crate::server::ServerConfig;
use crate::session::{Session, SessionRegistry, SessionState, StreamTask};
use crate::transport::UdpTransport;

/// Drives the session state machine for a single TCP connection.
///
/// Commands arriving in a state where they do not apply are ignored and
/// get no reply. A request naming a media source other than the bound one
/// switches sources first (in Ready or Playing), keeping id and state.
pub struct SessionHandler {
    catalog: Arc<dyn MediaCatalog>,
    sessions: SessionRegistry,
    client_addr: SocketAddr,
    config: Arc<ServerConfig>,
    session: Session,
    /// Set once TEARDOWN completed; the connection closes after replying.
    closed: bool,
}

impl SessionHandler {
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        sessions: SessionRegistry,
        client_addr: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Self {
        SessionHandler {
            catalog,
            sessions,
            client_addr,
            config,
            session: Session::new(),
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session.id
    }

    /// Name of the currently bound media source.
    pub fn source(&self) -> Option<&str> {
        self.session.source.as_deref()
    }

    /// Sequence number of the last request that got a reply.
    pub fn last_cseq(&self) -> Option<u32> {
        self.session.last_cseq
    }

    /// Whether TEARDOWN has completed on this connection.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process one request. `None` means the request does not apply in the
    /// current state and must go unanswered.
    pub fn handle(&mut self, request: &Request) -> Option<Response> {
        let reply = self.dispatch(request);
        if reply.is_some() {
            self.session.last_cseq = Some(request.cseq);
        }
        reply
    }

    fn dispatch(&mut self, request: &Request) -> Option<Response> {
        let cseq = request.cseq;
        self.reap_stream();

        if request.command == Command::List {
            return Some(self.handle_list(cseq));
        }

        let mut switched = false;
        if self.session.state != SessionState::Init
            && let Some(target) = request.target.as_deref()
            && self.session.source.as_deref() != Some(target)
        {
            if let Err(resp) = self.switch_source(cseq, target) {
                return Some(resp);
            }
            switched = true;
        }

        let reply = match (&request.command, self.session.state) {
            (Command::Setup { client_port }, SessionState::Init) => {
                Some(self.handle_setup(cseq, request.target.as_deref(), *client_port))
            }
            (Command::Play, SessionState::Ready) => Some(self.handle_play(cseq)),
            (Command::Pause, SessionState::Playing) => Some(self.handle_pause(cseq)),
            (Command::Teardown, SessionState::Ready | SessionState::Playing) => {
                Some(self.handle_teardown(cseq))
            }
            (Command::Switch, SessionState::Ready | SessionState::Playing) => Some(self.ok(cseq)),
            _ => None,
        };

        reply.or_else(|| {
            if switched {
                Some(self.ok(cseq))
            } else {
                tracing::debug!(
                    command = request.command.name(),
                    state = %self.session.state,
                    cseq,
                    "request not applicable, ignored"
                );
                None
            }
        })
    }

    fn ok(&self, cseq: u32) -> Response {
        Response::ok(cseq).with_session(self.session.id)
    }

    fn handle_list(&self, cseq: u32) -> Response {
        let names = self.catalog.names();
        tracing::debug!(cseq, count = names.len(), "LIST");
        self.ok(cseq).with_body(names.join("\n"))
    }

    fn handle_setup(&mut self, cseq: u32, target: Option<&str>, client_port: u16) -> Response {
        let (source, frames) = match self.catalog.open(target) {
            Ok(opened) => opened,
            Err(RtspError::SourceNotFound(name)) => {
                tracing::warn!(%name, "SETUP for unknown media");
                return Response::not_found(cseq);
            }
            Err(e) => {
                tracing::error!(requested = ?target, error = %e, "failed to open media");
                return Response::server_error(cseq);
            }
        };

        let endpoint = SocketAddr::new(self.client_addr.ip(), client_port);
        let transport = match UdpTransport::bind(endpoint) {
            Ok(t) => t,
            Err(e) => {
                let mut frames = frames;
                frames.close();
                tracing::error!(error = %e, "failed to bind data socket");
                return Response::server_error(cseq);
            }
        };

        let id = self.sessions.register(&source, endpoint);
        self.session.id = Some(id);
        self.session.source = Some(source);
        self.session.frames = Some(frames);
        self.session.transport = Some(transport);
        self.set_state(SessionState::Ready);

        tracing::info!(
            session_id = id,
            source = ?self.session.source,
            client_data = %endpoint,
            "session set up"
        );
        self.ok(cseq)
    }

    fn handle_play(&mut self, cseq: u32) -> Response {
        match self.start_stream() {
            Ok(()) => {
                tracing::info!(session_id = ?self.session.id, source = ?self.session.source, "session started playing");
                self.ok(cseq)
            }
            Err(e) => {
                tracing::error!(session_id = ?self.session.id, error = %e, "failed to start stream");
                Response::server_error(cseq).with_session(self.session.id)
            }
        }
    }

    fn handle_pause(&mut self, cseq: u32) -> Response {
        self.stop_stream();
        tracing::info!(session_id = ?self.session.id, "session paused");
        self.ok(cseq)
    }

    fn handle_teardown(&mut self, cseq: u32) -> Response {
        let id = self.session.id;
        self.release();
        self.closed = true;
        tracing::info!(session_id = ?id, "session terminated via TEARDOWN");
        Response::ok(cseq).with_session(id)
    }

    /// Bind a different media source, keeping id and state.
    ///
    /// The new source is opened before anything is torn down, so a failed
    /// switch leaves the session exactly as it was.
    fn switch_source(&mut self, cseq: u32, target: &str) -> Result<(), Response> {
        let (source, frames) = match self.catalog.open(Some(target)) {
            Ok(opened) => opened,
            Err(RtspError::SourceNotFound(name)) => {
                tracing::warn!(%name, session_id = ?self.session.id, "switch to unknown media");
                return Err(Response::not_found(cseq).with_session(self.session.id));
            }
            Err(e) => {
                tracing::error!(requested = target, error = %e, "failed to open media for switch");
                return Err(Response::server_error(cseq).with_session(self.session.id));
            }
        };

        let was_playing = self.session.state == SessionState::Playing;
        if was_playing {
            self.stop_stream();
        }
        if let Some(mut old) = self.session.frames.take() {
            old.close();
        }

        tracing::info!(
            session_id = ?self.session.id,
            from = ?self.session.source,
            to = %source,
            "switching media source"
        );
        if let Some(id) = self.session.id {
            self.sessions.set_source(id, &source);
        }
        self.session.source = Some(source);
        self.session.frames = Some(frames);

        if was_playing && let Err(e) = self.start_stream() {
            tracing::error!(session_id = ?self.session.id, error = %e, "failed to restart stream after switch");
            return Err(Response::server_error(cseq).with_session(self.session.id));
        }
        Ok(())
    }

    /// Hand the frame source to a new streaming thread and enter Playing.
    fn start_stream(&mut self) -> crate::error::Result<()> {
        let (Some(id), Some(transport)) = (self.session.id, self.session.transport.clone()) else {
            return Err(RtspError::NotStarted);
        };
        let frames = match self.session.frames.take() {
            Some(frames) => frames,
            None => self.reopen_source()?,
        };

        // Before spawn: a thread failing at once marks the entry Ready.
        self.set_state(SessionState::Playing);
        match StreamTask::spawn(
            id,
            frames,
            transport,
            Packetizer::new(self.config.payload_type),
            self.config.frame_interval,
            self.sessions.clone(),
        ) {
            Ok(task) => {
                self.session.stream = Some(task);
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Ready);
                Err(e)
            }
        }
    }

    /// Stop and join the streaming thread, reclaiming the frame source.
    /// Leaves the session in Ready.
    fn stop_stream(&mut self) {
        let Some(task) = self.session.stream.take() else {
            return;
        };
        match task.stop() {
            Ok(outcome) => {
                tracing::debug!(session_id = ?self.session.id, sent = outcome.sent, "stream stopped");
                if let Some(e) = outcome.error {
                    tracing::warn!(session_id = ?self.session.id, error = %e, "stream had ended on send failure");
                }
                self.session.frames = Some(outcome.frames);
            }
            Err(e) => {
                tracing::error!(session_id = ?self.session.id, error = %e, "stream thread lost its frame source");
            }
        }
        self.set_state(SessionState::Ready);
    }

    /// A streaming thread that ended on its own (send failure) is joined
    /// here and the session falls back to Ready, as if paused.
    fn reap_stream(&mut self) {
        if self
            .session
            .stream
            .as_ref()
            .is_some_and(StreamTask::is_finished)
        {
            tracing::warn!(session_id = ?self.session.id, "stream ended on its own, pausing session");
            self.stop_stream();
        }
    }

    fn reopen_source(&mut self) -> crate::error::Result<Box<dyn FrameSource>> {
        let (_, frames) = self.catalog.open(self.session.source.as_deref())?;
        Ok(frames)
    }

    fn set_state(&mut self, state: SessionState) {
        self.session.set_state(state);
        if let Some(id) = self.session.id {
            self.sessions.set_state(id, state);
        }
    }

    /// Stop streaming, close the frame source and data socket, and drop the
    /// session from the registry. Safe to call more than once.
    fn release(&mut self) {
        self.stop_stream();
        if let Some(mut frames) = self.session.frames.take() {
            frames.close();
        }
        self.session.transport = None;
        if let Some(id) = self.session.id.take() {
            self.sessions.remove(id);
        }
        self.session.source = None;
        self.session.set_state(SessionState::Init);
    }

    /// Cleanup for a connection that went away without TEARDOWN.
    pub fn shutdown(&mut self) {
        if self.session.state != SessionState::Init || self.session.id.is_some() {
            tracing::info!(session_id = ?self.session.id, "releasing session on disconnect");
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::media::rtp::RtpPacket;
    use crate::protocol::response::StatusCode;
    use parking_lot::Mutex;
    use std::net::UdpSocket;
    use std::time::{Duration, Instant};

    /// Frame source yielding `<name>:<n>` and recording closes.
    struct FakeFrames {
        name: String,
        count: u32,
        closes: Arc<Mutex<Vec<String>>>,
    }

    impl FrameSource for FakeFrames {
        fn next_frame(&mut self) -> Option<Vec<u8>> {
            self.count += 1;
            Some(format!("{}:{}", self.name, self.count).into_bytes())
        }

        fn frame_number(&self) -> u32 {
            self.count
        }

        fn close(&mut self) {
            self.closes.lock().push(self.name.clone());
        }
    }

    struct FakeCatalog {
        names: Vec<String>,
        closes: Arc<Mutex<Vec<String>>>,
    }

    impl MediaCatalog for FakeCatalog {
        fn names(&self) -> Vec<String> {
            self.names.clone()
        }

        fn open(&self, name: Option<&str>) -> Result<(String, Box<dyn FrameSource>)> {
            let name = match name {
                Some(n) => self.names.iter().find(|s| s.as_str() == n),
                None => self.names.first(),
            }
            .ok_or_else(|| RtspError::SourceNotFound(name.unwrap_or("").to_string()))?
            .clone();
            Ok((
                name.clone(),
                Box::new(FakeFrames {
                    name,
                    count: 0,
                    closes: self.closes.clone(),
                }),
            ))
        }
    }

    struct Fixture {
        handler: SessionHandler,
        sessions: SessionRegistry,
        closes: Arc<Mutex<Vec<String>>>,
        data: UdpSocket,
    }

    fn fixture(names: &[&str]) -> Fixture {
        fixture_for(names, "127.0.0.1:40000")
    }

    fn fixture_for(names: &[&str], client: &str) -> Fixture {
        let closes = Arc::new(Mutex::new(Vec::new()));
        let catalog = Arc::new(FakeCatalog {
            names: names.iter().map(|n| n.to_string()).collect(),
            closes: closes.clone(),
        });
        let sessions = SessionRegistry::new();
        let config = ServerConfig {
            frame_interval: Duration::from_millis(5),
            ..ServerConfig::default()
        };
        let data = UdpSocket::bind("127.0.0.1:0").unwrap();
        data.set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let handler = SessionHandler::new(
            catalog,
            sessions.clone(),
            client.parse().unwrap(),
            Arc::new(config),
        );
        Fixture {
            handler,
            sessions,
            closes,
            data,
        }
    }

    impl Fixture {
        fn send(&mut self, raw: &str) -> Option<Response> {
            let request = Request::parse(raw).unwrap();
            self.handler.handle(&request)
        }

        fn setup(&mut self, target: &str) -> Option<Response> {
            let port = self.data.local_addr().unwrap().port();
            self.send(&format!("SETUP {target}\n1\nRTSP/1.0 RTP/UDP {port}"))
        }

        fn recv_payload(&self) -> String {
            let mut buf = [0u8; 256];
            let n = self.data.recv(&mut buf).unwrap();
            let packet = RtpPacket::decode(&buf[..n]).unwrap();
            String::from_utf8(packet.payload.to_vec()).unwrap()
        }
    }

    #[test]
    fn list_in_any_state() {
        let mut f = fixture(&["a.dat", "b.dat"]);
        let resp = f.send("LIST\n1").unwrap();
        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(resp.body.as_deref(), Some("a.dat\nb.dat"));
        assert!(resp.serialize().contains("Content-Length: 11\n"));
        assert_eq!(f.handler.state(), SessionState::Init);
    }

    #[test]
    fn setup_assigns_stable_session_id() {
        let mut f = fixture(&["a.dat"]);
        let setup = f.setup("a.dat").unwrap();
        assert_eq!(setup.status, StatusCode::Ok);
        let id = setup.session_id.unwrap();
        assert_ne!(id, 0);
        assert_eq!(f.handler.state(), SessionState::Ready);
        assert_eq!(f.sessions.get(id).unwrap().source, "a.dat");
        assert_eq!(
            f.handler.session.endpoint(),
            Some(f.data.local_addr().unwrap())
        );

        let play = f.send("PLAY\n2").unwrap();
        assert_eq!(play.session_id, Some(id));
        let pause = f.send("PAUSE\n3").unwrap();
        assert_eq!(pause.session_id, Some(id));
        let list = f.send("LIST\n4").unwrap();
        assert_eq!(list.session_id, Some(id));
    }

    #[test]
    fn setup_defaults_to_first_source() {
        let mut f = fixture(&["a.dat", "b.dat"]);
        let port = f.data.local_addr().unwrap().port();
        let resp = f.send(&format!("SETUP\n1\nRTSP/1.0 RTP/UDP {port}")).unwrap();
        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(f.handler.source(), Some("a.dat"));
    }

    #[test]
    fn setup_unknown_source_is_not_found() {
        let mut f = fixture(&["a.dat"]);
        let resp = f.setup("missing.dat").unwrap();
        assert_eq!(resp.status, StatusCode::NotFound);
        assert_eq!(resp.session_id, None);
        assert_eq!(f.handler.state(), SessionState::Init);
        assert!(f.sessions.is_empty());
    }

    #[test]
    fn setup_on_empty_catalog_is_not_found() {
        let mut f = fixture(&[]);
        let resp = f.setup("a.dat").unwrap();
        assert_eq!(resp.status, StatusCode::NotFound);
    }

    #[test]
    fn commands_in_wrong_state_are_ignored() {
        let mut f = fixture(&["a.dat"]);
        assert!(f.send("PLAY\n1").is_none());
        assert!(f.send("PAUSE\n2").is_none());
        assert!(f.send("TEARDOWN\n3").is_none());
        assert!(f.send("SWITCH a.dat\n4").is_none());
        assert_eq!(f.handler.state(), SessionState::Init);
        assert_eq!(f.handler.last_cseq(), None);

        f.setup("a.dat").unwrap();
        assert!(f.send("PAUSE\n5").is_none());
        assert!(f.setup("a.dat").is_none());

        f.send("PLAY\n6").unwrap();
        assert!(f.send("PLAY\n7").is_none());
        assert_eq!(f.handler.state(), SessionState::Playing);
        f.send("TEARDOWN\n8").unwrap();
    }

    #[test]
    fn play_streams_and_pause_stops() {
        let mut f = fixture(&["a.dat"]);
        f.setup("a.dat").unwrap();
        f.send("PLAY\n2").unwrap();
        assert_eq!(f.handler.state(), SessionState::Playing);
        assert!(f.recv_payload().starts_with("a.dat:"));

        f.send("PAUSE\n3").unwrap();
        assert_eq!(f.handler.state(), SessionState::Ready);
        // Drain anything sent before the join completed.
        let mut buf = [0u8; 256];
        while f.data.recv(&mut buf).is_ok() {}
        std::thread::sleep(Duration::from_millis(50));
        f.data
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        assert!(f.data.recv(&mut buf).is_err(), "packet after PAUSE reply");

        // Resuming continues from the same frame source.
        f.send("PLAY\n4").unwrap();
        let payload = f.recv_payload();
        let n: u32 = payload.rsplit(':').next().unwrap().parse().unwrap();
        assert!(n > 1);
    }

    #[test]
    fn switch_while_playing_closes_old_source_once() {
        let mut f = fixture(&["a.dat", "b.dat"]);
        let id = f.setup("a.dat").unwrap().session_id;
        f.send("PLAY\n2").unwrap();
        assert!(f.recv_payload().starts_with("a.dat:"));

        let resp = f.send("SWITCH b.dat\n3").unwrap();
        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(resp.session_id, id);
        assert_eq!(f.handler.state(), SessionState::Playing);
        assert_eq!(f.handler.source(), Some("b.dat"));
        assert_eq!(*f.closes.lock(), vec!["a.dat".to_string()]);

        let mut saw_new = false;
        for _ in 0..50 {
            let payload = f.recv_payload();
            if payload.starts_with("b.dat:") {
                saw_new = true;
                break;
            }
        }
        assert!(saw_new);
        // Only the new source's frames follow the first one seen.
        assert!(f.recv_payload().starts_with("b.dat:"));

        f.send("TEARDOWN\n4").unwrap();
        assert_eq!(
            *f.closes.lock(),
            vec!["a.dat".to_string(), "b.dat".to_string()]
        );
    }

    #[test]
    fn named_target_on_play_switches_then_plays() {
        let mut f = fixture(&["a.dat", "b.dat"]);
        f.setup("a.dat").unwrap();
        let resp = f.send("PLAY b.dat\n2").unwrap();
        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(f.handler.state(), SessionState::Playing);
        assert!(f.recv_payload().starts_with("b.dat:"));
        f.send("TEARDOWN\n3").unwrap();
    }

    #[test]
    fn named_target_in_inapplicable_command_still_switches() {
        let mut f = fixture(&["a.dat", "b.dat"]);
        f.setup("a.dat").unwrap();
        let resp = f.send("PAUSE b.dat\n2").unwrap();
        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(f.handler.state(), SessionState::Ready);
        assert_eq!(f.handler.source(), Some("b.dat"));
    }

    #[test]
    fn switch_to_unknown_keeps_current_source() {
        let mut f = fixture(&["a.dat"]);
        f.setup("a.dat").unwrap();
        let resp = f.send("SWITCH nope.dat\n2").unwrap();
        assert_eq!(resp.status, StatusCode::NotFound);
        assert_eq!(f.handler.source(), Some("a.dat"));
        assert_eq!(f.handler.state(), SessionState::Ready);
        assert!(f.closes.lock().is_empty());
    }

    #[test]
    fn switch_to_current_source_is_ok_noop() {
        let mut f = fixture(&["a.dat"]);
        f.setup("a.dat").unwrap();
        let resp = f.send("SWITCH a.dat\n2").unwrap();
        assert_eq!(resp.status, StatusCode::Ok);
        assert!(f.closes.lock().is_empty());
    }

    #[test]
    fn teardown_releases_everything() {
        let mut f = fixture(&["a.dat"]);
        let id = f.setup("a.dat").unwrap().session_id.unwrap();
        f.send("PLAY\n2").unwrap();

        let resp = f.send("TEARDOWN\n3").unwrap();
        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(resp.session_id, Some(id));
        assert!(f.handler.is_closed());
        assert_eq!(f.handler.state(), SessionState::Init);
        assert!(f.sessions.get(id).is_none());
        assert_eq!(*f.closes.lock(), vec!["a.dat".to_string()]);

        // Cleanup after TEARDOWN must not close again.
        f.handler.shutdown();
        assert_eq!(f.closes.lock().len(), 1);
    }

    #[test]
    fn shutdown_without_teardown_cleans_up() {
        let mut f = fixture(&["a.dat"]);
        let id = f.setup("a.dat").unwrap().session_id.unwrap();
        f.send("PLAY\n2").unwrap();
        f.handler.shutdown();
        assert!(f.sessions.get(id).is_none());
        assert_eq!(f.closes.lock().len(), 1);
    }

    #[test]
    fn sequence_number_is_echoed_not_enforced() {
        let mut f = fixture(&["a.dat"]);
        assert_eq!(f.send("LIST\n10").unwrap().cseq, 10);
        assert_eq!(f.send("LIST\n3").unwrap().cseq, 3);
        assert_eq!(f.handler.last_cseq(), Some(3));

        // Unanswered requests leave it alone.
        assert!(f.send("PLAY\n11").is_none());
        assert_eq!(f.handler.last_cseq(), Some(3));
    }

    #[test]
    fn send_failure_falls_back_to_ready() {
        // Unprivileged sends to the limited broadcast address fail.
        let mut f = fixture_for(&["a.dat"], "255.255.255.255:40000");
        let id = f.setup("a.dat").unwrap().session_id.unwrap();
        assert_eq!(f.send("PLAY\n2").unwrap().status, StatusCode::Ok);

        // The registry drops the session from Playing without a request.
        let deadline = Instant::now() + Duration::from_secs(2);
        while f.sessions.get(id).unwrap().state != SessionState::Ready
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(f.sessions.get(id).unwrap().state, SessionState::Ready);
        assert!(f.sessions.playing().is_empty());

        // The next request reaps the thread, so PAUSE no longer applies.
        assert!(f.send("PAUSE\n3").is_none());
        assert_eq!(f.handler.state(), SessionState::Ready);
        assert!(f.closes.lock().is_empty());

        let replay = f.send("PLAY\n4").unwrap();
        assert_eq!(replay.status, StatusCode::Ok);
        assert_eq!(replay.session_id, Some(id));
        assert_eq!(f.handler.state(), SessionState::Playing);

        f.send("TEARDOWN\n5").unwrap();
        assert_eq!(*f.closes.lock(), vec!["a.dat".to_string()]);
    }
}
