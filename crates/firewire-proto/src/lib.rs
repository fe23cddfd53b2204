//! Protocol model for IEEE-1394 (FireWire) bus diagnostics.
//!
//! This crate has **no dependencies** and **no device access** — it is a pure
//! model of the wire protocol: transaction and response codes, PHY packet
//! layouts, Self-ID fields, and the CSR core register map. Everything here
//! can be computed and tested without a bus.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`tcode`] | Transaction codes and quadlet/block tcode selection |
//! | [`rcode`] | Response codes |
//! | [`phy`] | PHY packet builders, reply match patterns, port status bits |
//! | [`self_id`] | Self-ID chain accumulation and field decode/encode |
//! | [`csr`] | CSR core addresses and the register-name table |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod csr;
pub mod phy;
pub mod rcode;
pub mod self_id;
pub mod tcode;
