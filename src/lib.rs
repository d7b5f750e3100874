//! Client-side core of a school management dashboard: normalizes loosely
//! shaped backend records, joins them by reference and derives the numbers
//! each role's dashboard shows.

pub mod client;
pub mod config;
pub mod dashboard;
pub mod join;
pub mod logger;
pub mod metrics;
pub mod models;
pub mod normalize;

pub use client::{FetchCause, FetchError, SchoolClient};
pub use config::{Config, Role};
pub use join::Collections;
pub use models::{Entity, Link, Resource};
pub use normalize::{normalize, normalize_collection, Normalize, Record};
