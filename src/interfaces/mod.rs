//! Host-facing interfaces (CSV command stream and reports).

pub mod csv;
