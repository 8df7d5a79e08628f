//! Session state machine (§4.5 / C5): transport-agnostic request/reply
//! matching, the `ReferenceList` a session owns, and `BlockResponse`
//! reentry. A transport only needs to hand inbound frames to
//! [`Session::handle_frame`] and drain outbound frames from the channel
//! returned by [`Session::new`] — everything else (timeouts, pending-call
//! bookkeeping, refcount cleanup on close) lives here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ahash::HashMap;
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

use nprpc_codec::{
    endpoint::Endpoint,
    header::{CallHeader, ExceptionKind, Header, MessageId, MessageType, ObjectIdLocal},
};
use nprpc_service::{Context, Poa, ReferenceList};

use crate::error::Error;
use crate::statistics::{Report, StatisticsReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// A single decoded inbound message handed back to whichever outbound call
/// is waiting on its `request_id`.
struct Frame {
    msg_id: MessageId,
    body: Bytes,
}

/// Default per-call deadline (§4.5): 30 seconds.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Session {
    state: RwLock<SessionState>,
    outbox: mpsc::UnboundedSender<Bytes>,
    next_request_id: AtomicU32,
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Frame, ExceptionKind>>>>,
    ref_list: ReferenceList,
    remote_endpoint: Endpoint,
    poas: Arc<Vec<Arc<Poa>>>,
    statistics: StatisticsReporter,
    call_timeout: Duration,
    cookies: Option<String>,
}

impl Session {
    /// Returns the session plus the receiver a transport's dedicated writer
    /// task should drain and push onto the wire.
    pub fn new(
        remote_endpoint: Endpoint,
        poas: Arc<Vec<Arc<Poa>>>,
        statistics: StatisticsReporter,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (outbox, inbox) = mpsc::unbounded_channel();

        let session = Arc::new(Self {
            state: RwLock::new(SessionState::Active),
            outbox,
            next_request_id: AtomicU32::new(0),
            pending: Mutex::new(HashMap::default()),
            ref_list: ReferenceList::new(),
            remote_endpoint,
            poas,
            statistics,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            cookies: None,
        });

        (session, inbox)
    }

    pub fn with_cookies(mut self: Arc<Self>, cookies: String) -> Arc<Self> {
        Arc::get_mut(&mut self)
            .expect("with_cookies called before the session was shared")
            .cookies = Some(cookies);
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn ref_list(&self) -> &ReferenceList {
        &self.ref_list
    }

    /// Handles one fully-framed inbound message (Header already stripped
    /// from `body` by the caller is NOT expected — `frame` is the raw bytes
    /// starting at the Header's `msg_id` field, i.e. everything the
    /// transport read after the length prefix).
    pub async fn handle_frame(self: &Arc<Self>, mut frame: Bytes) -> Result<(), Error> {
        let header = decode_header(&mut frame)?;
        self.statistics.report(&[
            Report::ReceivedBytes(header.total_len()),
            Report::ReceivedMessages(1),
        ]);

        match header.msg_id {
            MessageId::FunctionCall => self.dispatch_call(header, frame).await,
            MessageId::BlockResponse => {
                // The peer is telling us it is about to block on a nested
                // call; our read side already processes each frame as an
                // independent task (see transport read loops), so inbound
                // FunctionCalls already interleave without help. Nothing to
                // do beyond accepting the notification.
                log::trace!("peer {} entered a blocking nested call", self.remote_endpoint);
                Ok(())
            }
            MessageId::AddReference => {
                let oid = ObjectIdLocal::decode(&frame)?;
                if let Some(poa) = self.poas.get(oid.poa_idx as usize) {
                    if poa.add_reference(oid.object_id) {
                        self.ref_list.add(oid.poa_idx, oid.object_id);
                    }
                }
                Ok(())
            }
            MessageId::ReleaseObject => {
                let oid = ObjectIdLocal::decode(&frame)?;
                self.ref_list.remove(oid.poa_idx, oid.object_id);
                if let Some(poa) = self.poas.get(oid.poa_idx as usize) {
                    poa.release_object(oid.object_id);
                }
                Ok(())
            }
            MessageId::Success | MessageId::Exception => {
                self.resolve_pending(header.request_id, Ok(Frame { msg_id: header.msg_id, body: frame }));
                Ok(())
            }
            _ if header.msg_id.is_bodyless_error() => {
                let kind = bodyless_error_to_exception(header.msg_id);
                self.resolve_pending(header.request_id, Err(kind));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn resolve_pending(&self, request_id: u32, result: Result<Frame, ExceptionKind>) {
        if let Some(sender) = self.pending.lock().remove(&request_id) {
            let _ = sender.send(result);
        }
        // Else: a late reply after timeout, or a peer bug. Discarded per §4.5.
    }

    async fn dispatch_call(self: &Arc<Self>, header: Header, body: Bytes) -> Result<(), Error> {
        let call_header = match CallHeader::decode(&body) {
            Ok(call_header) => call_header,
            Err(_) => {
                return self
                    .write_bodyless_error(header.request_id, MessageId::ErrorBadInput)
                    .await;
            }
        };

        let args = body.slice(nprpc_codec::header::CALL_HEADER_SIZE..);
        let poa = match self.poas.get(call_header.poa_idx as usize) {
            Some(poa) => poa.clone(),
            None => {
                return self
                    .write_bodyless_error(header.request_id, MessageId::ErrorPoaNotExist)
                    .await;
            }
        };

        let mut tx_buffer = BytesMut::new();
        let mut ctx = Context::new(self.remote_endpoint.clone(), &self.ref_list, &args[..], &mut tx_buffer);
        if let Some(cookies) = self.cookies.as_deref() {
            ctx = ctx.with_cookies(cookies);
        }

        let outcome = poa.dispatch(
            call_header.object_id,
            call_header.interface_idx,
            call_header.function_idx,
            self.remote_endpoint.transport,
            &args,
            &mut ctx,
        );

        match outcome {
            Ok(result) => self.write_answer(header.request_id, MessageId::Success, &result).await,
            Err(kind) => match kind.as_error_message_id() {
                Some(msg_id) => self.write_bodyless_error(header.request_id, msg_id).await,
                None => {
                    let mut body = BytesMut::new();
                    kind.encode(&mut body);
                    self.write_answer(header.request_id, MessageId::Exception, &body).await
                }
            },
        }
    }

    async fn write_answer(&self, request_id: u32, msg_id: MessageId, body: &[u8]) -> Result<(), Error> {
        let header = Header::new(msg_id, MessageType::Answer, request_id, body.len());
        let mut buf = BytesMut::with_capacity(nprpc_codec::header::HEADER_SIZE + body.len());
        header.encode(&mut buf);
        buf.extend_from_slice(body);
        self.write(buf.freeze()).await
    }

    async fn write_bodyless_error(&self, request_id: u32, msg_id: MessageId) -> Result<(), Error> {
        self.write_answer(request_id, msg_id, &[]).await
    }

    /// Issues a call and awaits the matching Answer, per §4.9 stub dispatch
    /// step 4.
    pub async fn call(
        self: &Arc<Self>,
        poa_idx: u16,
        object_id: u64,
        interface_idx: u8,
        function_idx: u8,
        args: &[u8],
    ) -> Result<Bytes, Error> {
        if self.state() != SessionState::Active {
            return Err(ExceptionKind::CommFailure {
                what: "session is not active".to_string(),
            }
            .into());
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(request_id, reply_tx);

        let mut call_body = BytesMut::with_capacity(nprpc_codec::header::CALL_HEADER_SIZE + args.len());
        CallHeader {
            poa_idx,
            interface_idx,
            function_idx,
            object_id,
        }
        .encode(&mut call_body);
        call_body.extend_from_slice(args);

        let header = Header::new(MessageId::FunctionCall, MessageType::Request, request_id, call_body.len());
        let mut frame = BytesMut::with_capacity(nprpc_codec::header::HEADER_SIZE + call_body.len());
        header.encode(&mut frame);
        frame.extend_from_slice(&call_body);

        if let Err(err) = self.write(frame.freeze()).await {
            self.pending.lock().remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Ok(Ok(Ok(frame))) => interpret_answer(frame),
            Ok(Ok(Err(kind))) => Err(kind.into()),
            Ok(Err(_)) => Err(ExceptionKind::CommFailure {
                what: "session closed while call was outstanding".to_string(),
            }
            .into()),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(ExceptionKind::Timeout.into())
            }
        }
    }

    /// Sends a fire-and-forget `AddReference`/`ReleaseObject` control
    /// message (§4.4); the caller doesn't wait for a reply because there
    /// isn't one.
    pub async fn send_control(&self, msg_id: MessageId, target: ObjectIdLocal) -> Result<(), Error> {
        let mut body = BytesMut::with_capacity(nprpc_codec::header::OBJECT_ID_LOCAL_SIZE);
        target.encode(&mut body);

        let header = Header::new(msg_id, MessageType::Request, 0, body.len());
        let mut frame = BytesMut::with_capacity(nprpc_codec::header::HEADER_SIZE + body.len());
        header.encode(&mut frame);
        frame.extend_from_slice(&body);

        self.write(frame.freeze()).await
    }

    async fn write(&self, bytes: Bytes) -> Result<(), Error> {
        if self.state() == SessionState::Closed {
            return Err(ExceptionKind::CommFailure {
                what: "write after session close".to_string(),
            }
            .into());
        }

        self.statistics
            .report(&[Report::SentBytes(bytes.len()), Report::SentMessages(1)]);

        self.outbox.send(bytes).map_err(|_| {
            ExceptionKind::CommFailure {
                what: "session writer task is gone".to_string(),
            }
            .into()
        })
    }

    /// Transitions to `Closing` then `Closed` (§4.5): cancels every pending
    /// outbound call with `CommFailure`, then walks the `ReferenceList`
    /// releasing each entry in its owning POA.
    pub fn close(&self, reason: ExceptionKind) {
        {
            let mut state = self.state.write();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closing;
        }

        for (_, sender) in self.pending.lock().drain() {
            let _ = sender.send(Err(reason.clone()));
        }

        for (poa_idx, object_id) in self.ref_list.drain() {
            if let Some(poa) = self.poas.get(poa_idx as usize) {
                poa.release_object(object_id);
            }
        }

        *self.state.write() = SessionState::Closed;
    }
}

fn decode_header(frame: &mut Bytes) -> Result<Header, Error> {
    if frame.len() < nprpc_codec::header::HEADER_SIZE {
        return Err(nprpc_codec::Error::OutOfBounds.into());
    }
    let header = Header::decode(frame)?;
    *frame = frame.slice(nprpc_codec::header::HEADER_SIZE..);
    Ok(header)
}

fn bodyless_error_to_exception(msg_id: MessageId) -> ExceptionKind {
    match msg_id {
        MessageId::ErrorPoaNotExist | MessageId::ErrorCommFailure => ExceptionKind::CommFailure {
            what: "peer reported a protocol-level failure".to_string(),
        },
        MessageId::ErrorObjectNotExist => ExceptionKind::ObjectNotExist,
        MessageId::ErrorUnknownFunctionIdx => ExceptionKind::UnknownFunctionIndex,
        MessageId::ErrorUnknownMessageId => ExceptionKind::UnknownMessageId,
        MessageId::ErrorBadAccess => ExceptionKind::BadAccess { class_id: String::new() },
        MessageId::ErrorBadInput => ExceptionKind::BadInput,
        _ => ExceptionKind::BadInput,
    }
}

fn interpret_answer(frame: Frame) -> Result<Bytes, Error> {
    match frame.msg_id {
        MessageId::Success => Ok(frame.body),
        MessageId::Exception => Err(ExceptionKind::decode(&frame.body)?.into()),
        _ => Err(ExceptionKind::BadInput.into()),
    }
}
