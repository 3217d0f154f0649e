// Use cases layer: session mirroring and error normalization.

pub mod normalize;
pub mod session_mirror;

#[cfg(test)]
pub(crate) mod test_support;

pub use normalize::{normalize, normalize_error};
pub use session_mirror::{MirrorExit, MirrorSettings, MirrorState, MirrorTask, SessionMirror};
