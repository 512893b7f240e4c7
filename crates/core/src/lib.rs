//! Domain types shared by the voxbench worker.
//!
//! Everything here is plain data and pure helpers: the queue wire
//! shapes, the job carried in a message body, the request sent to the
//! generation backend and the record posted to the reporting service.

pub mod error;
pub mod types;
pub mod urls;
