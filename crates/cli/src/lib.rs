//! Library side of the `vault-nav` binary: tag tree views and rendering.
pub mod render;
