pub mod act;
pub mod audit;
pub mod browser;
pub mod document;
pub mod focus;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod schema;
pub mod score;
