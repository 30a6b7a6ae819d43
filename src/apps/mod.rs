//! Bundled demo applications. Not part of the RTMP core: these are ordinary
//! `ApplicationHooks` implementations mounted by `server::build_registry`,
//! the same way any third-party application would be.

pub mod chat;
pub mod echo;
