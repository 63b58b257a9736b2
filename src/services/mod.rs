pub mod conditions;
pub mod events;
pub mod facade;
pub mod fetcher;
pub mod parser;
pub mod scheduler;
pub mod sync;
