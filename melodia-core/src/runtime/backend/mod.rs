pub mod admission;
pub mod protocol;

pub use admission::{AdmissionController, SlotPermit, Ticket};
pub use protocol::{CallbackNotifier, ObjectUploader, ProviderClient, TaskPersistence};
