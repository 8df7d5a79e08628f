//! Shared-memory transport (§4.7, §5): two single-producer/single-consumer
//! rings identified by a channel name, served by a dedicated OS thread per
//! ring (polling + condition wait) because futex-style coordination doesn't
//! mix with the async reactor. A server creates a channel; a client opens
//! an existing one.
//!
//! The ring here is an in-process queue guarded by [`AdaptiveSpinMutex`] —
//! the same structure a POSIX-shm-backed ring would use once mapped memory
//! replaces the `VecDeque`; that mapping is a platform concern left to the
//! embedding process, not fabricated here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use ahash::HashMap;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::session::Session;
use crate::spin::AdaptiveSpinMutex;
use crate::statistics::Statistics;
use nprpc_codec::endpoint::{Endpoint, Transport};
use nprpc_service::{Poa, context::ShmChannel as ShmChannelHandle};

const POLL_TIMEOUT: Duration = Duration::from_millis(50);

struct Ring {
    queue: AdaptiveSpinMutex<VecDeque<Bytes>>,
    signal: (Mutex<bool>, Condvar),
}

impl Ring {
    fn new() -> Self {
        Self {
            queue: AdaptiveSpinMutex::new(VecDeque::new()),
            signal: (Mutex::new(false), Condvar::new()),
        }
    }

    fn send(&self, payload: Bytes) {
        self.queue.lock().push_back(payload);
        let (lock, condvar) = &self.signal;
        *lock.lock().unwrap() = true;
        condvar.notify_one();
    }

    fn try_receive(&self) -> Option<Bytes> {
        self.queue.lock().pop_front()
    }

    fn has_data(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    /// Blocks up to `POLL_TIMEOUT` for new data, then returns regardless so
    /// the caller can re-check a close flag.
    fn wait(&self) {
        let (lock, condvar) = &self.signal;
        let guard = lock.lock().unwrap();
        if !*guard {
            let (mut guard, _) = condvar.wait_timeout(guard, POLL_TIMEOUT).unwrap();
            *guard = false;
        } else {
            drop(guard);
            *lock.lock().unwrap() = false;
        }
    }
}

/// A named pair of rings: `to_server` carries client→server frames,
/// `to_client` the reverse.
pub struct ShmChannel {
    name: String,
    to_server: Ring,
    to_client: Ring,
    open: AtomicBool,
}

impl ShmChannel {
    fn new(name: String) -> Arc<Self> {
        Arc::new(Self {
            name,
            to_server: Ring::new(),
            to_client: Ring::new(),
            open: AtomicBool::new(true),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        let (lock, condvar) = &self.to_server.signal;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
        let (lock, condvar) = &self.to_client.signal;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
    }

    pub fn has_data_for_server(&self) -> bool {
        self.to_server.has_data()
    }

    pub fn has_data_for_client(&self) -> bool {
        self.to_client.has_data()
    }

    pub fn try_receive_for_server(&self) -> Option<Bytes> {
        self.to_server.try_receive()
    }

    pub fn try_receive_for_client(&self) -> Option<Bytes> {
        self.to_client.try_receive()
    }

    pub fn send_to_server(&self, payload: Bytes) {
        self.to_server.send(payload);
    }

    pub fn send_to_client(&self, payload: Bytes) {
        self.to_client.send(payload);
    }
}

impl ShmChannelHandle for ShmChannel {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Process-wide registry of named channels, standing in for the POSIX shm
/// segment directory a production deployment would use.
#[derive(Default)]
pub struct ShmRegistry {
    channels: RwLock<HashMap<String, Arc<ShmChannel>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmError {
    AlreadyExists,
    NotFound,
}

impl ShmRegistry {
    pub fn create(&self, name: impl Into<String>) -> Result<Arc<ShmChannel>, ShmError> {
        let name = name.into();
        let mut channels = self.channels.write();
        if channels.contains_key(&name) {
            return Err(ShmError::AlreadyExists);
        }

        let channel = ShmChannel::new(name.clone());
        channels.insert(name, channel.clone());
        Ok(channel)
    }

    pub fn open(&self, name: &str) -> Result<Arc<ShmChannel>, ShmError> {
        self.channels.read().get(name).cloned().ok_or(ShmError::NotFound)
    }

    pub fn remove(&self, name: &str) {
        self.channels.write().remove(name);
    }
}

/// Bridges a server-side channel to a [`Session`]: a dedicated thread polls
/// `to_server` and hands frames to the session via `runtime`, another
/// drains the session's outbox and pushes onto `to_client`.
pub fn spawn_server_session(
    channel: Arc<ShmChannel>,
    poas: Arc<Vec<Arc<Poa>>>,
    statistics: Statistics,
    runtime: tokio::runtime::Handle,
) -> Arc<Session> {
    let remote_endpoint = Endpoint::new(Transport::SharedMemory, channel.name.clone(), 0);
    let reporter = statistics.register(format!("shm:{}", channel.name));
    let (session, mut outbox) = Session::new(remote_endpoint, poas, reporter);

    {
        let channel = channel.clone();
        let rt = runtime.clone();
        std::thread::spawn(move || {
            while let Some(frame) = rt.block_on(outbox.recv()) {
                channel.send_to_client(frame);
            }
        });
    }

    {
        let channel = channel.clone();
        let session = session.clone();
        std::thread::spawn(move || {
            while channel.is_open() {
                match channel.try_receive_for_server() {
                    Some(frame) => {
                        let session = session.clone();
                        runtime.spawn(async move {
                            if let Err(err) = session.handle_frame(frame).await {
                                log::warn!("failed to handle shm frame: {err}");
                            }
                        });
                    }
                    None => channel.to_server.wait(),
                }
            }
        });
    }

    session
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_opens_what_the_server_created() {
        let registry = ShmRegistry::default();
        registry.create("calc").unwrap();

        let channel = registry.open("calc").unwrap();
        channel.send_to_server(Bytes::from_static(b"hello"));

        assert!(channel.has_data_for_server());
        assert_eq!(channel.try_receive_for_server().unwrap(), Bytes::from_static(b"hello"));
        assert!(!channel.has_data_for_server());
    }

    #[test]
    fn opening_an_unknown_channel_fails() {
        let registry = ShmRegistry::default();
        assert_eq!(registry.open("missing"), Err(ShmError::NotFound));
    }

    #[test]
    fn creating_a_duplicate_name_fails() {
        let registry = ShmRegistry::default();
        registry.create("calc").unwrap();
        assert_eq!(registry.create("calc").err(), Some(ShmError::AlreadyExists));
    }

    #[test]
    fn close_wakes_a_blocked_waiter() {
        let channel = ShmChannel::new("x".to_string());
        let channel2 = channel.clone();

        let handle = std::thread::spawn(move || {
            channel2.to_server.wait();
            channel2.is_open()
        });

        std::thread::sleep(Duration::from_millis(10));
        channel.close();

        assert!(!handle.join().unwrap());
    }
}
