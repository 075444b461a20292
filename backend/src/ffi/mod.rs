//! FFI boundary (PyO3)
//!
//! Exposes the device-facing API to the embedding application as a Python
//! extension class. The boundary is minimal: dictionaries in, dictionaries
//! out, all domain logic stays on the Rust side.

pub mod device;
pub mod types;

pub use device::PyFieldDevice;
