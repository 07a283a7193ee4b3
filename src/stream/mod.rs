//! Async stream adapters over a polled session

mod poller;

pub use poller::{PackagePoller, PackageStreamExt, UntilTerminal};
