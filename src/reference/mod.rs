//! Reference data: the county and sub-county directory.

pub mod county;

pub use county::{County, CountyDirectory};
