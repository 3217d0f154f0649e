pub mod domain;
pub mod frameworks;
pub mod interface_adapters;
pub mod use_cases;

pub use domain::{AuthEvent, LocalError, Session};
pub use frameworks::runtime::{build_client, run, run_with_config};
pub use interface_adapters::clients::BackendClient;
pub use use_cases::{MirrorState, SessionMirror, normalize, normalize_error};
