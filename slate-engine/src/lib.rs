pub mod command;
pub mod dispatch;
pub mod handlers;
pub mod history;
pub mod queue;
pub mod status;
pub mod store;

pub use dispatch::{DispatchReport, dispatch_pending};
pub use handlers::{EventHandler, HandlerRegistry, SyncActions};
pub use queue::EventQueue;
pub use status::status_message;
pub use store::{DocumentStore, StoreChange};
