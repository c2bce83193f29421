//! Host capability implementations.

#[cfg(feature = "native-mic")]
pub mod native;
pub mod sim;
