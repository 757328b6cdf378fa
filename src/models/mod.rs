pub mod course;
pub mod validation;

pub use course::{Category, Course, CourseId, CoursePatch, NewCourse};
pub use validation::{FieldViolation, ValidationError, ValidationMode};
