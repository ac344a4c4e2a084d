pub mod atom;
pub mod collection;
pub mod config;
pub mod context;
pub mod datasource;
pub mod entity;
pub mod error;
pub mod executor;
pub mod filter;
pub mod handlers;
pub mod interceptor;
pub mod json;
pub mod materializer;
pub mod metadata;
pub mod model;
pub mod ordering;
pub mod paging;
pub mod projection;
pub mod query;
pub mod service;
pub mod value;
