mod event;
mod store;

pub use event::StoreEvent;
pub use store::FileStore;
