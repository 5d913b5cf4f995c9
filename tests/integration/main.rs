//! Integration tests against a mock HTTP server and a scripted transport.

mod batch;
mod execution;
mod mock_server;
mod pagination;
