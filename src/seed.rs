//! Fake course data for development stores.

use fake::Fake;
use fake::faker::company::en::CatchPhrase;
use fake::faker::lorem::en::Words;
use fake::faker::name::en::FirstName;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::db::CourseRepository;
use crate::error::StoreError;
use crate::models::{Category, Course, NewCourse};
use crate::models::validation::{NAME_MAX_LEN, NAME_MIN_LEN};

/// A random course that passes enforced validation.
pub fn fake_course() -> NewCourse {
    let mut rng = rand::thread_rng();

    let mut name: String = CatchPhrase().fake();
    while name.chars().count() < NAME_MIN_LEN {
        name.push_str(" course");
    }
    if name.chars().count() > NAME_MAX_LEN {
        name = name.chars().take(NAME_MAX_LEN).collect();
    }

    let author: String = FirstName().fake();
    let tags: Vec<String> = Words(1..4).fake();
    let is_published = rng.gen_bool(0.5);
    let price = (rng.gen_range(10.0..30.0_f64) * 100.0).round() / 100.0;

    let mut course = NewCourse::new(name, author, is_published)
        .with_tags(tags)
        .with_price(price);
    if let Some(category) = Category::ALL.choose(&mut rng) {
        course = course.with_category(*category);
    }
    course
}

pub async fn seed_courses(repo: &CourseRepository, count: usize) -> Result<Vec<Course>, StoreError> {
    let mut created = Vec::with_capacity(count);
    for _ in 0..count {
        created.push(repo.create(fake_course()).await?);
    }
    info!("seeded {} courses", created.len());
    Ok(created)
}
