pub mod functions;
pub mod pods;
pub mod report;
pub mod summary;
