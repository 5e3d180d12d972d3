//! Process lifecycle for the backup service.

pub mod shutdown;
