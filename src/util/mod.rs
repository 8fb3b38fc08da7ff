pub mod dna;
pub mod stats;
