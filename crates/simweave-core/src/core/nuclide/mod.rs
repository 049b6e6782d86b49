//! Nuclide data used by natural-element expansion: embedded element and
//! isotope tables, and the xsdir index of tables a data library provides.

pub mod elements;
pub mod xsdir;

pub use elements::{NaturalIsotope, atomic_number, natural_isotopes};
pub use xsdir::{NuclideIndex, XsdirEntry, XsdirError};
