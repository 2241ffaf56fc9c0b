//! Remote object stores holding docflow artifacts.
//!
//! Update packages and the encrypted remote configuration live in a remote
//! folder. Each artifact carries string properties (`version`, `checksum`,
//! `signature`) alongside its bytes.

pub mod drive;
pub mod error;
pub mod memory;
pub mod store;

pub use drive::{DriveConfig, DriveStore};
pub use error::{RemoteError, RemoteResult};
pub use memory::MemoryStore;
pub use store::{RemoteFile, RemoteStore};
