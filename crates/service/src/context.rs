//! Ambient per-call data (§4.10 / C10): set by the session before invoking
//! a servant, read by generated servant code during a single dispatch.

use crate::reference_list::ReferenceList;

use nprpc_codec::endpoint::Endpoint;

use bytes::BytesMut;

/// Server-side shm channel handle exposed to a servant so it can write its
/// reply directly into the ring buffer backing the call, instead of a copy
/// through an intermediate tx buffer.
pub trait ShmChannel: Send + Sync {
    fn name(&self) -> &str;
}

/// Borrowed for the duration of exactly one `Poa::dispatch` call; nothing
/// here outlives that call unless the servant copies it out explicitly.
pub struct Context<'a> {
    pub remote_endpoint: Endpoint,
    pub ref_list: &'a ReferenceList,
    pub shm_channel: Option<&'a dyn ShmChannel>,
    pub rx_buffer: &'a [u8],
    pub tx_buffer: &'a mut BytesMut,
    pub cookies: Option<&'a str>,
}

impl<'a> Context<'a> {
    pub fn new(
        remote_endpoint: Endpoint,
        ref_list: &'a ReferenceList,
        rx_buffer: &'a [u8],
        tx_buffer: &'a mut BytesMut,
    ) -> Self {
        Self {
            remote_endpoint,
            ref_list,
            shm_channel: None,
            rx_buffer,
            tx_buffer,
            cookies: None,
        }
    }

    pub fn with_shm_channel(mut self, channel: &'a dyn ShmChannel) -> Self {
        self.shm_channel = Some(channel);
        self
    }

    pub fn with_cookies(mut self, cookies: &'a str) -> Self {
        self.cookies = Some(cookies);
        self
    }
}
