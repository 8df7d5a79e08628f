//! Client stub dispatch (§4.9 / C9): the base type a generated proxy
//! embeds, resolving an `ObjectId`'s candidate URLs to a live session
//! through its owning `Rpc`'s connection cache and forwarding calls.
//!
//! A generated stub for interface `Calculator` at `interface_idx` 0 would
//! look roughly like:
//!
//! ```no_run
//! use nprpc_sdk::Stub;
//!
//! pub struct Calculator(Stub);
//!
//! impl Calculator {
//!     pub async fn add(&self, a: i32, b: i32) -> Result<i32, nprpc_sdk::StubError> {
//!         let mut args = Vec::with_capacity(8);
//!         args.extend_from_slice(&a.to_le_bytes());
//!         args.extend_from_slice(&b.to_le_bytes());
//!         let reply = self.0.invoke(0, 0, &args).await?;
//!         Ok(i32::from_le_bytes(reply[..4].try_into().unwrap()))
//!     }
//! }
//! ```

use std::sync::Arc;

use bytes::Bytes;

use nprpc::Rpc;
use nprpc::codec::header::ExceptionKind;
use nprpc::codec::object_id::ObjectId;

pub use nprpc::Error as StubError;

/// Held by every generated proxy type: identifies the remote object and
/// knows how to reach it through the local `Rpc`'s connection cache.
pub struct Stub {
    rpc: Arc<Rpc>,
    object_id: ObjectId,
}

impl Stub {
    pub fn new(rpc: Arc<Rpc>, object_id: ObjectId) -> Self {
        Self { rpc, object_id }
    }

    /// Parses a stringified `NPRPC:` reference (§6) into a bound stub.
    pub fn from_ior(rpc: Arc<Rpc>, ior: &str) -> Result<Self, StubError> {
        Ok(Self::new(rpc, ObjectId::from_string(ior)?))
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn class_id(&self) -> &str {
        &self.object_id.class_id
    }

    /// Dials each candidate URL in order (§4.9) until one connects, issues
    /// the call on that session, and returns the raw answer payload for the
    /// generated stub to decode. An `ObjectId` with no candidate URLs (a
    /// shared-memory-only reference passed out of band, say) is a
    /// `CommFailure`, not a panic.
    pub async fn invoke(&self, interface_idx: u8, function_idx: u8, args: &[u8]) -> Result<Bytes, StubError> {
        if self.object_id.urls.is_empty() {
            return Err(ExceptionKind::CommFailure {
                what: "object reference carries no candidate endpoints".to_string(),
            }
            .into());
        }

        let mut last_err = None;
        for endpoint in &self.object_id.urls {
            match self.rpc.connect(self.object_id.origin, endpoint).await {
                Ok(session) => {
                    return session
                        .call(
                            self.object_id.poa_idx,
                            self.object_id.object_id,
                            interface_idx,
                            function_idx,
                            args,
                        )
                        .await;
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.expect("urls checked non-empty above"))
    }

    /// Tells the peer the application no longer holds this reference
    /// (`ReleaseObject`, §4.4). Best-effort: a failure to reach the peer
    /// just means the distributed refcount decays via session death
    /// instead.
    pub async fn release(&self) {
        if let Some(endpoint) = self.object_id.urls.first() {
            if let Ok(session) = self.rpc.connect(self.object_id.origin, endpoint).await {
                let target = nprpc::codec::header::ObjectIdLocal {
                    poa_idx: self.object_id.poa_idx,
                    object_id: self.object_id.object_id,
                };
                let _ = session
                    .send_control(nprpc::codec::header::MessageId::ReleaseObject, target)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nprpc::RpcBuilder;
    use nprpc::codec::object_id::ObjectFlags;

    #[tokio::test]
    async fn invoking_a_reference_with_no_urls_is_a_comm_failure() {
        let rpc = RpcBuilder::new().build().unwrap();
        let object_id = ObjectId {
            object_id: 1,
            poa_idx: 0,
            flags: ObjectFlags::ALL_TRANSPORTS,
            origin: rpc.origin(),
            class_id: "Calculator".to_string(),
            urls: Vec::new(),
        };

        let stub = Stub::new(rpc, object_id);
        let result = stub.invoke(0, 0, &[]).await;
        assert!(matches!(result, Err(StubError::Exception(ExceptionKind::CommFailure { .. }))));
    }
}
