pub mod snapshot;
pub mod status;
pub mod sync;
pub mod validate;
