//! Engine services. Imports only from `crate::domain` and
//! `crate::application::ports`.

pub mod acquisition;
pub mod deploy;
pub mod detection;
pub mod executor;
pub mod poller;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod test_support;
