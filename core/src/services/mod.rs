pub mod abi;
pub mod api;
pub mod chain;
pub mod chains;
pub mod proofs;
pub mod registry;
pub mod verifier;
