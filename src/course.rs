//! Course form submitted by the authoring UI, embedding an uploaded thumbnail key.

use serde::{Deserialize, Serialize};

use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseCategory {
    Programming,
    Productivity,
    #[serde(rename = "IT and Computer")]
    ItAndComputer,
    #[serde(rename = "Health and fitness")]
    HealthAndFitness,
    Business,
    Finance,
    Design,
    Marketing,
    Music,
    Photography,
}

/// Raw form input. Enumerated fields stay strings until validated so that an
/// unknown value becomes a field error instead of a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseForm {
    pub title: String,
    pub description: String,
    pub small_description: String,
    pub file_key: String,
    pub duration: i64,
    pub price: i64,
    pub level: String,
    pub category: String,
    pub slug: String,
    pub status: String,
}

/// A validated course, ready to hand to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub title: String,
    pub description: String,
    pub small_description: String,
    pub file_key: String,
    pub duration: u32,
    pub price: u32,
    pub level: CourseLevel,
    pub category: CourseCategory,
    pub slug: String,
    pub status: CourseStatus,
}

impl CourseForm {
    pub fn validate(&self) -> Result<Course, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let title = self.title.trim();
        let title_len = title.chars().count();
        if title_len < 3 {
            errors.push("title", "Title is required");
        } else if title_len > 100 {
            errors.push("title", "Title must be at most 100 characters long.");
        }

        let description = self.description.trim();
        if description.chars().count() < 3 {
            errors.push("description", "Description must be at least 3 characters long.");
        }

        let small_description = self.small_description.trim();
        let small_len = small_description.chars().count();
        if small_len < 1 {
            errors.push("smallDescription", "Small description is required");
        } else if small_len > 200 {
            errors.push(
                "smallDescription",
                "Small description must be at most 200 characters long.",
            );
        }

        let file_key = self.file_key.trim();
        if file_key.is_empty() {
            errors.push("fileKey", "Thumbnail is required");
        }

        if self.duration < 1 {
            errors.push("duration", "Duration is required");
        }
        if self.price < 1 {
            errors.push("price", "Price is required");
        } else if self.price > 500 {
            errors.push("price", "Price must be at most 500");
        }

        let level = parse_enum::<CourseLevel>(&self.level);
        if level.is_none() {
            errors.push("level", "Level must be Beginner, Intermediate or Advanced");
        }
        let category = parse_enum::<CourseCategory>(&self.category);
        if category.is_none() {
            errors.push("category", "Category is required");
        }
        let status = parse_enum::<CourseStatus>(&self.status);
        if status.is_none() {
            errors.push("status", "Status is required");
        }

        let slug = if self.slug.trim().is_empty() {
            slugify(title)
        } else {
            self.slug.trim().to_string()
        };
        if slug.chars().count() < 3 {
            errors.push("slug", "Slug is required at least 3 characters.");
        }

        match (level, category, status) {
            (Some(level), Some(category), Some(status)) if errors.is_empty() => Ok(Course {
                title: title.to_string(),
                description: description.to_string(),
                small_description: small_description.to_string(),
                file_key: file_key.to_string(),
                duration: self.duration.min(u32::MAX as i64) as u32,
                price: self.price as u32,
                level,
                category,
                slug,
                status,
            }),
            _ => Err(errors),
        }
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

/// Lowercase, ASCII-alphanumeric words joined by single hyphens.
pub fn slugify(input: &str) -> String {
    input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
