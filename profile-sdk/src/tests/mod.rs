//! Unit tests for the Profile SDK
//!
//! This module contains tests for the aggregator, the directory client and
//! the supporting configuration and error types.

pub(crate) mod support;

pub mod graph_mock_tests;
