//! Object model for the nprpc runtime: the Portable Object Adapter that
//! owns servants (§4.8), the per-session reference list that drives
//! distributed refcounting (§3), and the ambient per-call `Context` a
//! session hands to a dispatched servant (§4.10).

pub mod context;
pub mod poa;
pub mod reference_list;

pub use context::Context;
pub use poa::{Lifespan, ObjectIdPolicy, Poa, PoaBuilder, PoaError, Servant};
pub use reference_list::ReferenceList;
