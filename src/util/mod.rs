//! Internal utilities.
//!
//! Everything here must behave identically across processes so that a
//! recorded run replays bit-for-bit.

pub mod det_hash;
pub mod det_rng;

pub use det_hash::{stable_hash, DetBuildHasher, DetHashMap, DetHasher};
pub use det_rng::DetRng;
