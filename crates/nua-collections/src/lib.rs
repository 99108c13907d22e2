//! nua-collections - Dense sequence and robin-hood hash containers.
//!
//! These are the two container shapes the rest of the nua toolchain is
//! built on: a doubling dense array (table sequences, literal pools,
//! instruction vectors) and an open-addressing robin-hood hash map
//! (table hash parts, compiler scopes, the GC's intern table probe
//! structure).

mod robin_hood;
mod seq_vec;

pub use robin_hood::RobinHoodMap;
pub use seq_vec::SeqVec;
