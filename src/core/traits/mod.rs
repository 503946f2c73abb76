pub mod audit;
pub mod pgp;
pub mod relay;
pub mod storage;
pub mod surface;
