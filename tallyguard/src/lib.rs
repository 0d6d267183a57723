#[macro_use]
extern crate serde;

mod ballot;
mod decryption;
mod dlog;
mod ecies_ed25519;
mod election;
mod elgamal;
mod encrypt;
mod error;
mod group;
mod hash;
mod key_ceremony;
mod lifecycle;
mod manifest;
mod polynomial;
mod proof;
mod service;
mod store;
mod tracking;
mod trustee;
mod wire;

pub use ballot::*;
pub use decryption::*;
pub use dlog::*;
pub use ecies_ed25519::*;
pub use election::*;
pub use elgamal::*;
pub use encrypt::*;
pub use error::*;
pub use group::*;
pub use hash::*;
pub use key_ceremony::*;
pub use lifecycle::*;
pub use manifest::*;
pub use polynomial::*;
pub use proof::*;
pub use service::*;
pub use store::*;
pub use tracking::*;
pub use trustee::*;

#[cfg(test)]
mod tests;
