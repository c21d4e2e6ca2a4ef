//! Business logic services

pub mod convert;
pub mod files;
pub mod headers;
pub mod import_processor;
pub mod ingest;
pub mod reference;
pub mod report;
pub mod validator;
