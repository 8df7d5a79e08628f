use std::sync::Arc;

use anyhow::Result;
use bytes::BytesMut;
use nprpc_codec::{endpoint::Endpoint, endpoint::Transport, header::ExceptionKind, object_id::ObjectFlags};
use nprpc_service::{Context, Lifespan, ObjectIdPolicy, PoaBuilder, ReferenceList, Servant};

struct Calc;

impl Servant for Calc {
    fn class_id(&self) -> &str {
        "Calc"
    }

    fn dispatch(
        &self,
        _interface_idx: u8,
        function_idx: u8,
        args: &[u8],
        _ctx: &mut Context<'_>,
    ) -> Result<Vec<u8>, ExceptionKind> {
        match function_idx {
            0 => {
                let a = u32::from_le_bytes(args[0..4].try_into().unwrap());
                let b = u32::from_le_bytes(args[4..8].try_into().unwrap());
                Ok((a + b).to_le_bytes().to_vec())
            }
            _ => Err(ExceptionKind::UnknownFunctionIndex),
        }
    }
}

#[test]
fn dispatch_routes_to_the_activated_servant() -> Result<()> {
    let poa = PoaBuilder::new()
        .with_object_id_policy(ObjectIdPolicy::System)
        .with_lifespan(Lifespan::Transient)
        .build(0)?;

    let object_id = poa
        .activate_object(Arc::new(Calc), ObjectFlags::ALL_TRANSPORTS)
        .unwrap();

    let mut args = Vec::new();
    args.extend_from_slice(&40u32.to_le_bytes());
    args.extend_from_slice(&2u32.to_le_bytes());

    let mut tx = BytesMut::new();
    let ref_list = ReferenceList::new();
    let mut ctx = Context::new(
        Endpoint::new(Transport::Tcp, "127.0.0.1", 6502),
        &ref_list,
        &[],
        &mut tx,
    );

    let reply = poa
        .dispatch(object_id, 0, 0, Transport::Tcp, &args, &mut ctx)
        .unwrap();

    assert_eq!(u32::from_le_bytes(reply.try_into().unwrap()), 42);
    Ok(())
}

#[test]
fn reference_list_tracks_what_a_session_releases_on_close() -> Result<()> {
    let poa = PoaBuilder::new().build(0)?;
    let object_id = poa
        .activate_object(Arc::new(Calc), ObjectFlags::ALL_TRANSPORTS)
        .unwrap();

    let ref_list = ReferenceList::new();
    ref_list.add(poa.poa_idx(), object_id);
    poa.add_reference(object_id);

    assert_eq!(poa.external_refcount(object_id), Some(1));

    for (poa_idx, oid) in ref_list.drain() {
        assert_eq!(poa_idx, poa.poa_idx());
        poa.release_object(oid);
    }

    assert_eq!(poa.len(), 0);
    Ok(())
}
