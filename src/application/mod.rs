pub mod anonymizer;
pub mod audit;
pub mod corpus;
pub mod transfer;
