pub(crate) mod dsbus_dv;
pub mod dcnewton;
pub mod island;
pub mod network;
pub mod newtonpf;
pub mod pf;
pub mod solver;
pub(crate) mod sparse;
pub mod system;

pub use dcnewton::dc_newton;
pub use newtonpf::ac_newton;
