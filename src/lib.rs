pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod seed;

pub use config::StoreConfig;
pub use db::{CourseQuery, CourseRepository, Store};
pub use error::StoreError;
pub use filter::{Field, Filter, SortOrder};
pub use models::{Category, Course, CourseId, CoursePatch, NewCourse, ValidationMode};
