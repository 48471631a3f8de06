//! Layer-4 SYN/ICMP port scanner core.
//!
//! See `SPEC_FULL.md` for the component breakdown. The hot path is the
//! scanner engine in [`engine`]; everything upstream of it (checksum,
//! probe builders, response classifiers) is pure and allocation-light.

pub mod checksum;
pub mod cli;
pub mod engine;
pub mod error;
pub mod icmp;
pub mod model;
pub mod raw_socket;
pub mod strategy;
pub mod tcp;
pub mod udp;
