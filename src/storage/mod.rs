pub mod availability;
pub mod memory;

pub use availability::{AvailabilityFields, AvailabilityStorage, AvailabilityStore, RoomFields};
pub use memory::MemoryStore;
