//! nifi-deploy Client - Remote resource access for the flow tree
//!
//! This crate provides:
//!
//! - **FlowApi**: the typed request/response boundary used by the engine
//! - **NifiClient**: the HTTP implementation against a NiFi 1.x API root
//! - **InMemoryFlowServer**: an in-process server with the same write rules,
//!   used for development and testing
//!
//! All calls are single request/response pairs. Long-running server work
//! (queue drains) is exposed as request handles that callers poll.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod error;
pub mod http;
pub mod memory;

pub use api::FlowApi;
pub use error::{ClientError, Result};
pub use http::NifiClient;
pub use memory::{ApiCall, Blueprint, FailurePoint, FlowBuilder, InMemoryFlowServer, ROOT_GROUP_NAME};
