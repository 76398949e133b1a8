pub mod apply;
pub mod audit;
pub mod outputs;
pub mod plan;
pub mod validate;
