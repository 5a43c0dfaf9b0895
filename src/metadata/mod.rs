pub mod memory;
pub mod record;
pub mod store;
