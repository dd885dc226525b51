pub mod company;
pub mod measurement;
pub mod product;
pub mod quote;
