pub mod audit;
pub mod corpus;
pub mod errors;
pub mod geo;
pub mod job;
pub mod ports;
pub mod salt;
pub mod summary;
pub mod value_objects;
