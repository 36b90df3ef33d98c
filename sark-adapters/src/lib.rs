//! Protocol adapter framework: the uniform discovery/invoke contract SARK
//! presents over MCP, gRPC, and REST resources (§4.1-§4.2).
//!
//! Every adapter implements [`traits::ProtocolAdapter`] and speaks its own
//! wire protocol underneath; the gateway never sees anything but
//! [`sark_core::Resource`], [`sark_core::Capability`], and
//! [`sark_core::InvocationResult`].

#![warn(missing_docs, clippy::pedantic)]

pub mod error;
pub mod grpc;
pub mod http;
pub mod mcp;
pub mod stdio;
pub mod traits;

mod http_client;
