//! rpmsift: find build requirements a source package does not actually need.
//!
//! The binary drives everything through [`driver`]; the modules are public
//! so integration tests can exercise the search and the comparators
//! directly.

pub mod buildroot;
pub mod compare;
pub mod content;
pub mod driver;
pub mod magic;
pub mod minimize;
pub mod process;
pub mod rpm;
pub mod subsets;
pub mod workdir;
