pub mod admittance;
pub mod flows;
