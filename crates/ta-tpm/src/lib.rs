//! TPM façade and event-log filter: NV-RAM, EK/AK lifecycle,
//! credential activation, quoting, PCR reads, and UEFI/IMA event-log
//! filtering, over either a physical device or an in-process simulator.

pub mod credential;
pub mod error;
pub mod eventlog;
pub mod facade;
pub mod software;

pub use error::{Result, TpmError};
pub use eventlog::filter_event_log;
pub use facade::{TpmDevice, TpmKind};
pub use software::SoftwareTpm;
