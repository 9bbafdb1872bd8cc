//! Software execution of compute-kernel bundles.
//!
//! A bundle is decoded from its chunked binary form ([`bundle`]), inputs and
//! UAVs are bound through its resource pool ([`resource`]), and the register
//! VM ([`vm`]) replays the kernel once per logical thread of a dispatch grid.

pub mod asm;
pub mod bundle;
pub mod error;
pub mod resource;
pub mod util;
pub mod vm;

pub use bundle::{Bundle, BundleImage, decode_bundle, encode_bundle};
pub use error::{BundleError, ExecError, ExecFault};
pub use resource::{MemoryView, ResourceView, Uav};
pub use vm::{DispatchStats, ExecMode, Extent3, SystemValues, VmOptions};
