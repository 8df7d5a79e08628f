//! Object identifiers (§3, §4.3): both a wire value and a stringified
//! reference clients can paste into logs or config.

use crate::{Error, endpoint::Endpoint, flatbuf};

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use uuid::Uuid;

bitflags! {
    /// Canonical bit layout (resolves the spec's open question between the
    /// host-side `Persistent=1, Tethered=2` numbering and the browser-side
    /// `Policy_Lifespan=0, WebObject=1, Secured=2` numbering): bits 0-1 are
    /// the lifespan/tether flags, bits 4-7 restrict which transport a call
    /// may arrive over.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u16 {
        const PERSISTENT      = 1 << 0;
        const TETHERED        = 1 << 1;
        const ALLOW_TCP       = 1 << 4;
        const ALLOW_WEBSOCKET = 1 << 5;
        const ALLOW_HTTP      = 1 << 6;
        const ALLOW_SHM       = 1 << 7;
    }
}

impl ObjectFlags {
    /// All four activation flags set: the default for a freshly activated
    /// object that hasn't been restricted to specific transports.
    pub const ALL_TRANSPORTS: Self = Self::ALLOW_TCP
        .union(Self::ALLOW_WEBSOCKET)
        .union(Self::ALLOW_HTTP)
        .union(Self::ALLOW_SHM);

    pub fn allows(self, transport: crate::endpoint::Transport) -> bool {
        use crate::endpoint::Transport::*;

        match transport {
            Tcp | TcpTethered => self.contains(Self::ALLOW_TCP),
            WebSocket | SecureWebSocket => self.contains(Self::ALLOW_WEBSOCKET),
            SharedMemory => self.contains(Self::ALLOW_SHM),
            Http => self.contains(Self::ALLOW_HTTP),
        }
    }
}

/// Globally-addressable handle to a servant (§3).
///
/// `object_id` is unique within `(origin, poa_idx)`; `(poa_idx, object_id)`
/// is the key used to look a servant up within a single `Rpc` instance,
/// `(origin, poa_idx, object_id)` is the global key used across processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectId {
    pub object_id: u64,
    pub poa_idx: u16,
    pub flags: ObjectFlags,
    pub origin: Uuid,
    pub class_id: String,
    pub urls: Vec<Endpoint>,
}

const IOR_PREFIX: &str = "NPRPC:";

impl ObjectId {
    pub fn local_key(&self) -> (u16, u64) {
        (self.poa_idx, self.object_id)
    }

    pub fn global_key(&self) -> (Uuid, u16, u64) {
        (self.origin, self.poa_idx, self.object_id)
    }

    /// Flat-encode this ObjectId as a wire value (the body used both
    /// inside `CallHeader`-adjacent fields and inside the stringified
    /// reference).
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64);

        buf.put_u64_le(self.object_id);
        buf.put_u16_le(self.poa_idx);
        buf.put_u16_le(self.flags.bits());
        buf.put_slice(self.origin.as_bytes());

        let class_id_slot = flatbuf::reserve_tail_slot(&mut buf);
        let urls_slot = flatbuf::reserve_tail_slot(&mut buf);

        flatbuf::write_str(&mut buf, class_id_slot, &self.class_id);

        let joined = self
            .urls
            .iter()
            .map(Endpoint::to_url)
            .collect::<Vec<_>>()
            .join(";");
        flatbuf::write_str(&mut buf, urls_slot, &joined);

        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        const FIXED_LEN: usize = 8 + 2 + 2 + 16;
        if bytes.len() < FIXED_LEN + flatbuf::TAIL_REF_SIZE * 2 {
            return Err(Error::OutOfBounds);
        }

        let object_id = u64::from_le_bytes(bytes[0..8].try_into()?);
        let poa_idx = u16::from_le_bytes(bytes[8..10].try_into()?);
        let flags = ObjectFlags::from_bits_truncate(u16::from_le_bytes(bytes[10..12].try_into()?));
        let origin = Uuid::from_slice(&bytes[12..28]).map_err(|_| Error::OutOfBounds)?;

        let class_id_slot = FIXED_LEN;
        let urls_slot = FIXED_LEN + flatbuf::TAIL_REF_SIZE;

        let class_id = flatbuf::read_str(bytes, class_id_slot)?.to_string();
        let urls_joined = flatbuf::read_str(bytes, urls_slot)?;
        let urls = if urls_joined.is_empty() {
            Vec::new()
        } else {
            urls_joined
                .split(';')
                .map(Endpoint::parse)
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            object_id,
            poa_idx,
            flags,
            origin,
            class_id,
            urls,
        })
    }

    /// `NPRPC:<base64(flat-encoded ObjectId)>` (§6).
    ///
    /// # Test
    ///
    /// ```
    /// use nprpc_codec::object_id::{ObjectId, ObjectFlags};
    /// use nprpc_codec::endpoint::{Endpoint, Transport};
    /// use uuid::Uuid;
    ///
    /// let oid = ObjectId {
    ///     object_id: 7,
    ///     poa_idx: 1,
    ///     flags: ObjectFlags::ALLOW_TCP,
    ///     origin: Uuid::nil(),
    ///     class_id: "Echo".to_string(),
    ///     urls: vec![Endpoint::new(Transport::Tcp, "127.0.0.1", 6502)],
    /// };
    ///
    /// let ior = oid.to_string();
    /// assert!(ior.starts_with("NPRPC:"));
    /// assert_eq!(ObjectId::from_string(&ior).unwrap(), oid);
    /// ```
    pub fn to_string(&self) -> String {
        use base64::Engine;

        let encoded = self.encode();
        format!(
            "{IOR_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(&encoded)
        )
    }

    pub fn from_string(ior: &str) -> Result<Self, Error> {
        use base64::Engine;

        let payload = ior.strip_prefix(IOR_PREFIX).ok_or(Error::InvalidHeader)?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| Error::InvalidHeader)?;

        Self::decode(&decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Transport;

    fn sample() -> ObjectId {
        ObjectId {
            object_id: 42,
            poa_idx: 3,
            flags: ObjectFlags::ALLOW_TCP | ObjectFlags::ALLOW_WEBSOCKET | ObjectFlags::PERSISTENT,
            origin: Uuid::from_u128(0x1122_3344_5566_7788_99aa_bbcc_ddee_ff00),
            class_id: "Calc".to_string(),
            urls: vec![
                Endpoint::new(Transport::Tcp, "10.0.0.1", 6502),
                Endpoint::new(Transport::WebSocket, "10.0.0.1", 8080).with_path("/rpc"),
            ],
        }
    }

    #[test]
    fn string_round_trip() {
        let oid = sample();
        assert_eq!(ObjectId::from_string(&oid.to_string()).unwrap(), oid);
    }

    #[test]
    fn flat_round_trip() {
        let oid = sample();
        assert_eq!(ObjectId::decode(&oid.encode()).unwrap(), oid);
    }

    #[test]
    fn activation_flags_reject_disallowed_transport() {
        let flags = ObjectFlags::ALLOW_TCP;
        assert!(flags.allows(Transport::Tcp));
        assert!(!flags.allows(Transport::WebSocket));
        assert!(!flags.allows(Transport::SharedMemory));
        assert!(!flags.allows(Transport::Http));
    }

    #[test]
    fn allow_http_gates_http_only() {
        let flags = ObjectFlags::ALLOW_HTTP;
        assert!(flags.allows(Transport::Http));
        assert!(!flags.allows(Transport::Tcp));
    }

    #[test]
    fn bad_ior_prefix_is_rejected() {
        assert!(ObjectId::from_string("not-an-ior").is_err());
    }
}
