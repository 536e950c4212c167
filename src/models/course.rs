// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub course_code: String,
    pub course_name: String,
    pub description: Option<String>,
    pub credit_hours: i32,
    pub created_by: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 20))]
    pub course_code: String,
    #[validate(length(min = 1, max = 200))]
    pub course_name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = 20))]
    pub credit_hours: i32,
}

/// DTO for creating a classroom under a course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassroomRequest {
    pub course_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub class_name: String,
    #[validate(length(min = 1, max = 20))]
    pub semester: String,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    #[validate(range(min = 1, max = 1000))]
    pub max_students: i32,
}

/// DTO for a student enrolling into a classroom.
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub classroom_id: i64,
}

/// Roster row for a classroom, joined from `enrollments` and `users`.
#[derive(Debug, Serialize, FromRow)]
pub struct ClassroomStudent {
    pub student_id: i64,
    pub username: String,
    pub full_name: String,
}
