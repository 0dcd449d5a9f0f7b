//! Concrete notification transports
//!
//! - [`email`]: SMTP relay delivery (Gmail by default)
//! - [`webhook`]: JSON payload via HTTP POST

pub mod email;
pub mod webhook;
