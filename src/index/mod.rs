pub mod bwt;
pub mod fm;
pub mod kmers;
pub mod minimizers;
pub mod sa;
pub mod search;
