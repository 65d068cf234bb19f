mod courses;
mod health;
mod local_objects;
mod uploads;

pub use courses::validate_course;
pub use health::health;
pub use local_objects::{receive_signed_put, serve_object};
pub use uploads::{delete_upload, issue_upload_url, DeleteObjectRequest, DeleteObjectResponse};
