//! An EtherNet/IP (ENIP) / Common Industrial Protocol (CIP) stack: wire
//! codecs built on a small composable DFA engine, an EPATH parser, a CIP
//! object/attribute model, a device simulator server, and a pipelining
//! client connector.

pub mod automata;
pub mod cip;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod enip;
pub mod epath;
pub mod error;
pub mod object_model;
pub mod server;
pub mod tree;
