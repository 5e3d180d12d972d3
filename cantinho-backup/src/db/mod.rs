//! Database connection details for the external PostgreSQL tools.

pub mod descriptor;

pub use descriptor::ConnectionDescriptor;
