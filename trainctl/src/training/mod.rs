//! Training job lifecycle.
//!
//! - [`service`]: start-training orchestration (guard, claim, submit, record)
//! - [`reconciler`]: applies completion callbacks to project state
//! - [`client`]: the remote training service seam and its HTTP implementation
//! - [`request`]: job payload construction
//! - [`instance_class`]: normalisation of user-entered subject descriptions

pub mod client;
pub mod instance_class;
pub mod reconciler;
pub mod request;
pub mod service;
