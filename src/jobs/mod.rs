pub mod dispatcher;
pub mod item;
pub mod registry;
pub mod session;
pub mod worker;

pub use dispatcher::{DispatchError, Dispatcher, RetryDispatch, StartOutcome};
pub use item::{DownloadItem, ItemState};
pub use registry::{ClaimedItem, JobRegistry, JobSnapshot, RegistryError};
pub use session::SessionIndex;
