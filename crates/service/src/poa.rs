//! Portable Object Adapter (§4.8 / C7): a servant registry with a
//! policy-driven object-id and lifespan, dispatching inbound calls.

use crate::context::Context;

use nprpc_codec::{endpoint::Transport, header::ExceptionKind, object_id::ObjectFlags};

use ahash::HashMap;
use parking_lot::RwLock;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Host-side implementation of an IDL interface, reached through the
/// tagged `(interface_idx, function_idx)` dispatch table the generated
/// code builds — not a vtable tree.
pub trait Servant: Send + Sync {
    fn class_id(&self) -> &str;

    fn dispatch(
        &self,
        interface_idx: u8,
        function_idx: u8,
        args: &[u8],
        ctx: &mut Context<'_>,
    ) -> Result<Vec<u8>, ExceptionKind>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectIdPolicy {
    System,
    UserSupplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifespan {
    Transient,
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoaError {
    CapacityExhausted,
    Collision,
    WrongPolicy,
}

impl std::fmt::Display for PoaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for PoaError {}

struct Binding {
    servant: Arc<dyn Servant>,
    flags: ObjectFlags,
    external_refcount: AtomicU64,
}

pub struct PoaBuilder {
    max_objects: usize,
    object_id_policy: ObjectIdPolicy,
    lifespan: Lifespan,
}

impl Default for PoaBuilder {
    fn default() -> Self {
        Self {
            max_objects: 1024,
            object_id_policy: ObjectIdPolicy::System,
            lifespan: Lifespan::Transient,
        }
    }
}

impl PoaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_objects(mut self, n: usize) -> Self {
        self.max_objects = n;
        self
    }

    pub fn with_object_id_policy(mut self, policy: ObjectIdPolicy) -> Self {
        self.object_id_policy = policy;
        self
    }

    pub fn with_lifespan(mut self, lifespan: Lifespan) -> Self {
        self.lifespan = lifespan;
        self
    }

    /// Fails if `max_objects` is zero — a POA that can never hold a
    /// servant is always a configuration mistake, not a valid empty POA.
    pub fn build(self, poa_idx: u16) -> Result<Poa, PoaError> {
        if self.max_objects == 0 {
            return Err(PoaError::CapacityExhausted);
        }

        Ok(Poa {
            poa_idx,
            max_objects: self.max_objects,
            object_id_policy: self.object_id_policy,
            lifespan: self.lifespan,
            next_object_id: AtomicU64::new(1),
            objects: RwLock::new(HashMap::default()),
        })
    }
}

pub struct Poa {
    poa_idx: u16,
    max_objects: usize,
    object_id_policy: ObjectIdPolicy,
    lifespan: Lifespan,
    next_object_id: AtomicU64,
    objects: RwLock<HashMap<u64, Binding>>,
}

impl Poa {
    pub fn poa_idx(&self) -> u16 {
        self.poa_idx
    }

    pub fn lifespan(&self) -> Lifespan {
        self.lifespan
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// System policy only: assigns the next monotonic id. §4.8 policy
    /// matrix row `System × {Transient, Persistent}`.
    pub fn activate_object(
        &self,
        servant: Arc<dyn Servant>,
        flags: ObjectFlags,
    ) -> Result<u64, PoaError> {
        if self.object_id_policy != ObjectIdPolicy::System {
            return Err(PoaError::WrongPolicy);
        }

        let mut objects = self.objects.write();
        if objects.len() >= self.max_objects {
            return Err(PoaError::CapacityExhausted);
        }

        let object_id = self.next_object_id.fetch_add(1, Ordering::Relaxed);
        objects.insert(
            object_id,
            Binding {
                servant,
                flags,
                external_refcount: AtomicU64::new(0),
            },
        );

        Ok(object_id)
    }

    /// UserSupplied policy only: caller picks the id, fails on collision.
    /// §4.8 policy matrix row `UserSupplied × {Transient, Persistent}`.
    pub fn activate_object_with_id(
        &self,
        object_id: u64,
        servant: Arc<dyn Servant>,
        flags: ObjectFlags,
    ) -> Result<(), PoaError> {
        if self.object_id_policy != ObjectIdPolicy::UserSupplied {
            return Err(PoaError::WrongPolicy);
        }

        let mut objects = self.objects.write();
        if objects.len() >= self.max_objects {
            return Err(PoaError::CapacityExhausted);
        }

        if objects.contains_key(&object_id) {
            return Err(PoaError::Collision);
        }

        objects.insert(
            object_id,
            Binding {
                servant,
                flags,
                external_refcount: AtomicU64::new(0),
            },
        );

        Ok(())
    }

    /// Removes the binding. In-flight dispatches already past the lookup
    /// complete normally; later calls see `ObjectNotExist`.
    pub fn deactivate(&self, object_id: u64) {
        self.objects.write().remove(&object_id);
    }

    /// Validates activation flags against the inbound transport, looks up
    /// the servant, and invokes its dispatch. A servant panic is caught at
    /// this boundary and converted to `CommFailure` (§7).
    pub fn dispatch(
        &self,
        object_id: u64,
        interface_idx: u8,
        function_idx: u8,
        transport: Transport,
        args: &[u8],
        ctx: &mut Context<'_>,
    ) -> Result<Vec<u8>, ExceptionKind> {
        let servant = {
            let objects = self.objects.read();
            let binding = objects
                .get(&object_id)
                .ok_or(ExceptionKind::ObjectNotExist)?;

            if !binding.flags.allows(transport) {
                return Err(ExceptionKind::BadAccess {
                    class_id: binding.servant.class_id().to_string(),
                });
            }

            binding.servant.clone()
        };

        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            servant.dispatch(interface_idx, function_idx, args, ctx)
        }))
        .unwrap_or_else(|_| {
            Err(ExceptionKind::CommFailure {
                what: "servant panicked during dispatch".to_string(),
            })
        })
    }

    /// Inserts an external reference (`AddReference`). Returns `false` if
    /// the object doesn't exist (peer bug — caller should respond with
    /// `Error_ObjectNotExist`).
    pub fn add_reference(&self, object_id: u64) -> bool {
        let objects = self.objects.read();
        match objects.get(&object_id) {
            Some(binding) => {
                binding.external_refcount.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Removes an external reference (`ReleaseObject`). If it reaches zero
    /// and the POA is Transient, the servant is deactivated (§4.5).
    pub fn release_object(&self, object_id: u64) {
        let should_deactivate = {
            let objects = self.objects.read();
            match objects.get(&object_id) {
                Some(binding) => {
                    let previous = binding.external_refcount.fetch_sub(1, Ordering::AcqRel);
                    previous <= 1 && self.lifespan == Lifespan::Transient
                }
                None => false,
            }
        };

        if should_deactivate {
            self.deactivate(object_id);
        }
    }

    pub fn external_refcount(&self, object_id: u64) -> Option<u64> {
        self.objects
            .read()
            .get(&object_id)
            .map(|binding| binding.external_refcount.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Servant for Echo {
        fn class_id(&self) -> &str {
            "Echo"
        }

        fn dispatch(
            &self,
            _interface_idx: u8,
            _function_idx: u8,
            _args: &[u8],
            _ctx: &mut Context<'_>,
        ) -> Result<Vec<u8>, ExceptionKind> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn system_policy_assigns_monotonic_ids() {
        let poa = PoaBuilder::new().build(0).unwrap();
        let first = poa.activate_object(Arc::new(Echo), ObjectFlags::ALL_TRANSPORTS).unwrap();
        let second = poa.activate_object(Arc::new(Echo), ObjectFlags::ALL_TRANSPORTS).unwrap();
        assert!(second > first);
    }

    #[test]
    fn capacity_exhaustion_is_rejected() {
        let poa = PoaBuilder::new().with_max_objects(1).build(0).unwrap();
        poa.activate_object(Arc::new(Echo), ObjectFlags::ALL_TRANSPORTS).unwrap();
        assert_eq!(
            poa.activate_object(Arc::new(Echo), ObjectFlags::ALL_TRANSPORTS),
            Err(PoaError::CapacityExhausted)
        );
    }

    #[test]
    fn user_supplied_id_collision_is_rejected() {
        let poa = PoaBuilder::new()
            .with_object_id_policy(ObjectIdPolicy::UserSupplied)
            .build(0)
            .unwrap();

        poa.activate_object_with_id(7, Arc::new(Echo), ObjectFlags::ALL_TRANSPORTS)
            .unwrap();

        assert_eq!(
            poa.activate_object_with_id(7, Arc::new(Echo), ObjectFlags::ALL_TRANSPORTS),
            Err(PoaError::Collision)
        );
    }

    #[test]
    fn dispatch_over_disallowed_transport_is_bad_access() {
        let poa = PoaBuilder::new().build(0).unwrap();
        let object_id = poa
            .activate_object(Arc::new(Echo), ObjectFlags::ALLOW_TCP)
            .unwrap();

        let mut tx = bytes::BytesMut::new();
        let ref_list = crate::reference_list::ReferenceList::new();
        let mut ctx = Context::new(
            nprpc_codec::endpoint::Endpoint::new(Transport::WebSocket, "127.0.0.1", 8080),
            &ref_list,
            &[],
            &mut tx,
        );

        let result = poa.dispatch(object_id, 0, 0, Transport::WebSocket, &[], &mut ctx);
        assert!(matches!(result, Err(ExceptionKind::BadAccess { .. })));
    }

    #[test]
    fn transient_servant_is_deactivated_once_refcount_drops_to_zero() {
        let poa = PoaBuilder::new()
            .with_lifespan(Lifespan::Transient)
            .build(0)
            .unwrap();

        let object_id = poa.activate_object(Arc::new(Echo), ObjectFlags::ALL_TRANSPORTS).unwrap();
        poa.add_reference(object_id);
        poa.add_reference(object_id);
        assert_eq!(poa.len(), 1);

        poa.release_object(object_id);
        assert_eq!(poa.len(), 1);

        poa.release_object(object_id);
        assert_eq!(poa.len(), 0);
    }

    #[test]
    fn object_not_exist_is_reported_for_unknown_id() {
        let poa = PoaBuilder::new().build(0).unwrap();
        let mut tx = bytes::BytesMut::new();
        let ref_list = crate::reference_list::ReferenceList::new();
        let mut ctx = Context::new(
            nprpc_codec::endpoint::Endpoint::new(Transport::Tcp, "127.0.0.1", 6502),
            &ref_list,
            &[],
            &mut tx,
        );

        let result = poa.dispatch(999, 0, 0, Transport::Tcp, &[], &mut ctx);
        assert_eq!(result, Err(ExceptionKind::ObjectNotExist));
    }
}
