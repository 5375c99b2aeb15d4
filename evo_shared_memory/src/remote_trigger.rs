//! `RemoteTriggerServer`/`RemoteTriggerClient`: a request/response pattern
//! built from two named [`BinaryFutex`] segments, `<server_id>.req` and
//! `<server_id>.res`.
//!
//! There is a recommended 1:1 relationship between a server and a client; the
//! server cannot distinguish a request from multiple clients, but a single
//! client can have at most one outstanding request at a time.

use crate::clock::{Duration, Time};
use crate::error::{RtStatus, already_exists, deadline_exceeded, failed_precondition, invalid_argument};
use crate::futex::BinaryFutex;
use crate::handle::{Reader, Writer};
use crate::manager::SharedMemoryManager;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

const SEM_REQUEST_SUFFIX: &str = ".req";
const SEM_RESPONSE_SUFFIX: &str = ".res";

/// The poll window used by [`RemoteTriggerServer::start`]/[`start_async`](RemoteTriggerServer::start_async)/[`query`](RemoteTriggerServer::query)
/// between checks of the stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn request_segment_name(server_id: &str) -> String {
    format!("{server_id}{SEM_REQUEST_SUFFIX}")
}

fn response_segment_name(server_id: &str) -> String {
    format!("{server_id}{SEM_RESPONSE_SUFFIX}")
}

/// A callback invoked by the server on every request.
pub type ServerCallback = Box<dyn FnMut() + Send>;

/// Listens for incoming requests and executes a callback when triggered.
pub struct RemoteTriggerServer {
    server_id: String,
    callback: Arc<Mutex<Option<ServerCallback>>>,
    is_running: Arc<AtomicBool>,
    // Must drop before `shm_manager`: their `Drop` impls decrement refcounts
    // in the header that `shm_manager` destroys.
    request_futex: Reader<BinaryFutex>,
    response_futex: Writer<BinaryFutex>,
    #[allow(dead_code)]
    shm_manager: SharedMemoryManager,
    async_thread: Option<JoinHandle<()>>,
}

impl RemoteTriggerServer {
    /// Create a new server on `server_id`, owning both of its segments.
    pub fn create(server_id: &str, callback: ServerCallback) -> Result<Self, RtStatus> {
        if server_id.is_empty() {
            return Err(invalid_argument("no server id specified"));
        }
        let request_id = request_segment_name(server_id);
        let response_id = response_segment_name(server_id);
        let mut shm_manager = SharedMemoryManager::new();
        shm_manager
            .add_segment(&request_id, BinaryFutex::new(false))
            .map_err(|e| invalid_argument(&e.to_string()))?;
        shm_manager
            .add_segment(&response_id, BinaryFutex::new(false))
            .map_err(|e| invalid_argument(&e.to_string()))?;
        let request_futex =
            Reader::<BinaryFutex>::open(&request_id).map_err(|e| invalid_argument(&e.to_string()))?;
        let response_futex =
            Writer::<BinaryFutex>::open(&response_id).map_err(|e| invalid_argument(&e.to_string()))?;

        Ok(Self {
            server_id: server_id.to_string(),
            callback: Arc::new(Mutex::new(Some(callback))),
            is_running: Arc::new(AtomicBool::new(false)),
            request_futex,
            response_futex,
            shm_manager,
            async_thread: None,
        })
    }

    /// This server's id.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Whether the server loop is currently running.
    pub fn is_started(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Run the server loop on the calling thread until [`stop`](Self::stop) is
    /// called from another thread. No-op if already running.
    pub fn start(&mut self) {
        if self.is_running.load(Ordering::Acquire) {
            return;
        }
        self.is_running.store(true, Ordering::Release);
        self.run();
    }

    /// Run the server loop on a spawned thread. No-op if already running.
    pub fn start_async(&mut self) {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let is_running = self.is_running.clone();
        let callback = self.callback.clone();
        let request_futex = self.request_futex.clone();
        let response_futex = self.response_futex.clone();

        self.async_thread = Some(std::thread::spawn(move || {
            run_loop(&is_running, &callback, &request_futex, &response_futex);
        }));
    }

    /// Stop the server loop (sync or async) and join the async thread, if any.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.async_thread.take() {
            let _ = handle.join();
        }
    }

    /// Query once: waits up to [`POLL_INTERVAL`] for a request, runs the
    /// callback and posts the response if one arrived. Returns whether a
    /// callback ran. Does nothing (returns `false`) if the server is
    /// currently running via [`start`](Self::start)/[`start_async`](Self::start_async).
    pub fn query(&mut self) -> bool {
        if self.is_running.load(Ordering::Acquire) {
            return false;
        }

        let wait_status = self.request_futex.value().wait_for(POLL_INTERVAL);
        if wait_status.is_deadline_exceeded() {
            return false;
        }
        if !wait_status.is_ok() {
            tracing::error!(server = %self.server_id, status = ?wait_status, "unable to receive client request");
            return false;
        }

        let mut callback = self.callback.lock();
        let Some(cb) = callback.as_mut() else {
            return false;
        };
        cb();
        drop(callback);

        if let Err(e) = self.response_futex.value().post().into_result() {
            tracing::error!(server = %self.server_id, status = ?e, "unable to send response to client");
        }
        true
    }

    fn run(&mut self) {
        let is_running = self.is_running.clone();
        let callback = self.callback.clone();
        run_loop(&is_running, &callback, &self.request_futex, &self.response_futex);
    }
}

fn run_loop(
    is_running: &AtomicBool,
    callback: &Mutex<Option<ServerCallback>>,
    request_futex: &Reader<BinaryFutex>,
    response_futex: &Writer<BinaryFutex>,
) {
    while is_running.load(Ordering::Acquire) {
        let wait_status = request_futex.value().wait_for(POLL_INTERVAL);
        if wait_status.is_deadline_exceeded() {
            continue;
        }
        if !wait_status.is_ok() {
            tracing::error!(status = ?wait_status, "unable to receive client request");
            is_running.store(false, Ordering::Release);
            return;
        }
        if !is_running.load(Ordering::Acquire) {
            return;
        }

        {
            let mut guard = callback.lock();
            let Some(cb) = guard.as_mut() else {
                is_running.store(false, Ordering::Release);
                return;
            };
            cb();
        }

        if let Err(e) = response_futex.value().post().into_result() {
            tracing::error!(status = ?e, "unable to send response to client");
            is_running.store(false, Ordering::Release);
            return;
        }
    }
}

impl Drop for RemoteTriggerServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A pending asynchronous request issued by [`RemoteTriggerClient::trigger_async`].
///
/// Move-only; the request is considered complete once [`wait_until`](Self::wait_until)
/// succeeds, or when this value is dropped.
pub struct AsyncRequest {
    response_futex: Option<Reader<BinaryFutex>>,
    request_started: Option<Arc<AtomicBool>>,
}

impl AsyncRequest {
    fn new(response_futex: Reader<BinaryFutex>, request_started: Arc<AtomicBool>) -> Self {
        Self {
            response_futex: Some(response_futex),
            request_started: Some(request_started),
        }
    }

    /// Whether the request is still valid (has not yet been waited on or
    /// dropped).
    pub fn valid(&self) -> bool {
        match &self.request_started {
            Some(flag) => flag.load(Ordering::Acquire),
            None => false,
        }
    }

    /// Whether the server has already signaled a response.
    pub fn ready(&self) -> bool {
        match &self.response_futex {
            Some(f) => f.value().value() > 0,
            None => false,
        }
    }

    /// Wait for the server to respond, up to `deadline`.
    pub fn wait_until(&mut self, deadline: Time) -> RtStatus {
        if !self.valid() {
            return failed_precondition("async request no longer valid");
        }
        let response = self
            .response_futex
            .as_ref()
            .expect("valid() implies response_futex is set")
            .value()
            .wait_until(deadline);
        if let Some(flag) = self.request_started.take() {
            flag.store(false, Ordering::Release);
        }
        response
    }

    /// Convenience wrapper over [`wait_until`](Self::wait_until).
    pub fn wait_for(&mut self, timeout: Duration) -> RtStatus {
        let deadline = if timeout == Duration::INFINITE {
            Time::INFINITE
        } else {
            crate::clock::now().plus(timeout)
        };
        self.wait_until(deadline)
    }
}

impl Drop for AsyncRequest {
    fn drop(&mut self) {
        if let Some(flag) = self.request_started.take() {
            flag.store(false, Ordering::Release);
        }
    }
}

/// Signals a [`RemoteTriggerServer`] to execute its callback and (optionally)
/// waits for it to complete.
pub struct RemoteTriggerClient {
    server_id: String,
    request_futex: Option<Writer<BinaryFutex>>,
    response_futex: Option<Reader<BinaryFutex>>,
    request_started: Arc<AtomicBool>,
}

impl RemoteTriggerClient {
    /// Create a client for `server_id`. If `auto_connect`, attempts to open
    /// both segments immediately; otherwise the client starts unconnected and
    /// [`connect`](Self::connect) must be called explicitly.
    pub fn create(server_id: &str, auto_connect: bool) -> Result<Self, RtStatus> {
        if server_id.is_empty() {
            return Err(invalid_argument("no server id specified"));
        }
        let mut client = Self {
            server_id: server_id.to_string(),
            request_futex: None,
            response_futex: None,
            request_started: Arc::new(AtomicBool::new(false)),
        };
        if auto_connect {
            client.connect().map_err(|e| invalid_argument(&e.to_string()))?;
        }
        Ok(client)
    }

    /// This client's server id.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Attach to the server's segments, if not already connected.
    pub fn connect(&mut self) -> crate::error::ShmResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let request_id = request_segment_name(&self.server_id);
        let response_id = response_segment_name(&self.server_id);
        self.request_futex = Some(Writer::<BinaryFutex>::open(&request_id)?);
        self.response_futex = Some(Reader::<BinaryFutex>::open(&response_id)?);
        Ok(())
    }

    /// Whether both segments are currently attached.
    pub fn is_connected(&self) -> bool {
        self.request_futex.is_some() && self.response_futex.is_some()
    }

    /// Trigger the server's callback and block until its response, or
    /// `deadline`.
    pub fn trigger(&self, deadline: Time) -> RtStatus {
        if !self.is_connected() {
            return invalid_argument("client not connected");
        }
        if deadline < crate::clock::now() {
            return deadline_exceeded("specified deadline is in the past");
        }
        if self
            .request_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return already_exists("request already triggered");
        }

        let result = (|| {
            let request = self.request_futex.as_ref().unwrap();
            if let Err(e) = request.value().post().into_result() {
                return e;
            }
            let response = self.response_futex.as_ref().unwrap();
            response.value().wait_until(deadline)
        })();
        self.request_started.store(false, Ordering::Release);
        result
    }

    /// Trigger the server's callback without waiting for its response;
    /// returns a move-only [`AsyncRequest`] to await later.
    pub fn trigger_async(&self) -> Result<AsyncRequest, RtStatus> {
        if !self.is_connected() {
            return Err(invalid_argument("client not connected"));
        }
        if self
            .request_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(already_exists("request already triggered"));
        }

        let request = self.request_futex.as_ref().unwrap();
        let post_status = request.value().post();
        if !post_status.is_ok() {
            self.request_started.store(false, Ordering::Release);
            return Err(post_status);
        }

        let response = self.response_futex.as_ref().unwrap().clone();
        Ok(AsyncRequest::new(response, self.request_started.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    fn unique_id(tag: &str) -> String {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("/evo_test_remote_trigger_{tag}_{}_{n}", std::process::id())
    }

    #[test]
    fn query_runs_callback_and_posts_response() {
        let id = unique_id("query");
        let count = Arc::new(AtomicU32::new(0));
        let count_cb = count.clone();
        let mut server =
            RemoteTriggerServer::create(&id, Box::new(move || { count_cb.fetch_add(1, Ordering::SeqCst); })).unwrap();
        let client = RemoteTriggerClient::create(&id, true).unwrap();

        let client_thread = std::thread::spawn(move || client.trigger(crate::clock::now().plus(Duration::from_secs(1))));
        std::thread::sleep(StdDuration::from_millis(10));
        assert!(server.query());

        let status = client_thread.join().unwrap();
        assert!(status.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_async_serves_multiple_triggers() {
        let id = unique_id("async_server");
        let count = Arc::new(AtomicU32::new(0));
        let count_cb = count.clone();
        let mut server =
            RemoteTriggerServer::create(&id, Box::new(move || { count_cb.fetch_add(1, Ordering::SeqCst); })).unwrap();
        server.start_async();

        let client = RemoteTriggerClient::create(&id, true).unwrap();
        for _ in 0..5 {
            let status = client.trigger(crate::clock::now().plus(Duration::from_secs(1)));
            assert!(status.is_ok());
        }
        assert_eq!(count.load(Ordering::SeqCst), 5);
        server.stop();
    }

    #[test]
    fn trigger_without_connection_is_invalid_argument() {
        let client = RemoteTriggerClient::create("/evo_test_remote_trigger_unconnected", false).unwrap();
        assert!(!client.is_connected());
        let status = client.trigger(Time::INFINITE);
        assert!(status.is_invalid_argument());
    }

    #[test]
    fn double_trigger_from_same_client_is_already_exists() {
        let id = unique_id("double");
        let mut server = RemoteTriggerServer::create(&id, Box::new(|| {})).unwrap();
        server.start_async();
        let client = RemoteTriggerClient::create(&id, true).unwrap();

        // Leave one request outstanding (never waited on), then a second
        // trigger from the same client must observe AlreadyExists.
        let _pending = client.trigger_async().unwrap();
        let status = client.trigger(crate::clock::now().plus(Duration::from_millis(100)));
        assert!(matches!(status.code(), crate::error::ErrorKind::AlreadyExists));
        server.stop();
    }

    #[test]
    fn async_request_wait_until_delivers_response() {
        let id = unique_id("async_req");
        let mut server = RemoteTriggerServer::create(&id, Box::new(|| {})).unwrap();
        server.start_async();
        let client = RemoteTriggerClient::create(&id, true).unwrap();

        let mut request = client.trigger_async().unwrap();
        assert!(request.valid());
        let status = request.wait_until(crate::clock::now().plus(Duration::from_secs(1)));
        assert!(status.is_ok());
        assert!(!request.valid());
        server.stop();
    }
}
