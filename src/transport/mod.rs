/// Filesystem helpers shared by the store, reader, and converter.
pub mod fs;
/// HTTP archive fetching.
#[cfg(feature = "download")]
pub mod http;
