use chrono::{TimeZone, Utc};
use course_store::db::{DeleteResult, ReturnDocument, UpdateResult};
use course_store::{
    Category, CourseId, CoursePatch, CourseRepository, Field, Filter, NewCourse, SortOrder, Store,
    StoreError, ValidationMode, seed,
};
use futures::StreamExt;

async fn setup_store(validation: ValidationMode) -> (Store, CourseRepository) {
    let store = Store::in_memory(validation)
        .await
        .expect("Failed to open in-memory store");
    let courses = store.courses();
    (store, courses)
}

fn node_course() -> NewCourse {
    NewCourse::new("Node.js Course", "Mosh", true)
        .with_category(Category::Web)
        .with_tags(["node", "backend"])
        .with_price(15.0)
}

async fn insert_catalog(courses: &CourseRepository) {
    let catalog = vec![
        NewCourse::new("Node.js Course", "William", true)
            .with_tags(["backend"])
            .with_price(10.0),
        NewCourse::new("Express.js Course", "Andrew", true)
            .with_tags(["backend", "node"])
            .with_price(20.0),
        NewCourse::new("React Course", "Steemer", false)
            .with_tags(["frontend"])
            .with_price(15.0),
        NewCourse::new("Flutter by Example", "Mona Catchphrase", true)
            .with_category(Category::Mobile)
            .with_tags(["mobile"])
            .with_price(12.0),
        NewCourse::new("Networking Basics", "Andrea", false)
            .with_category(Category::Network),
    ];
    for course in catalog {
        courses.create(course).await.expect("Failed to create course");
    }
}

async fn names(courses: &CourseRepository, filter: Filter) -> Vec<String> {
    courses
        .find(filter)
        .all()
        .await
        .expect("Failed to run query")
        .into_iter()
        .map(|c| c.name)
        .collect()
}

#[tokio::test]
async fn test_create_and_fetch_round_trip() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;

    let created = courses.create(node_course()).await.expect("Failed to create course");
    assert_eq!(created.name, "Node.js Course");
    assert!(created.date <= Utc::now());

    let fetched = courses
        .find_by_id(&created.id)
        .await
        .expect("Failed to fetch course")
        .expect("Course not found");
    assert_eq!(fetched, created);

    let via_string: CourseId = created.id.to_string().parse().expect("Failed to parse id");
    let found = courses
        .find(Filter::by_id(&via_string))
        .first()
        .await
        .expect("Failed to query course");
    assert_eq!(found, Some(created));
}

#[tokio::test]
async fn test_published_course_without_tags_is_not_persisted() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;

    let err = courses
        .create(NewCourse::new("Angular Course", "Mosh", true))
        .await
        .expect_err("published course without tags must be rejected");
    match err {
        StoreError::Validation(e) => assert!(e.has_field("tags")),
        other => panic!("expected validation error, got {:?}", other),
    }

    let count = courses.find(Filter::All).count().await.expect("Failed to count");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_short_name_is_rejected() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;

    let err = courses
        .create(NewCourse::new("Vue", "Mosh", false))
        .await
        .expect_err("name below minimum length must be rejected");
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_relaxed_mode_accepts_published_without_tags() {
    let (_store, courses) = setup_store(ValidationMode::Relaxed).await;

    let course = courses
        .create(NewCourse::new("Vue", "Mosh", true))
        .await
        .expect("relaxed store should accept the course");
    assert!(course.tags.is_empty());
}

#[tokio::test]
async fn test_skip_and_page_follow_storage_order() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;

    for i in 0..25 {
        courses
            .create(NewCourse::new(format!("Course {:02}", i), "Mosh", false))
            .await
            .expect("Failed to create course");
    }

    let skipped = courses
        .find(Filter::All)
        .skip((2 - 1) * 10)
        .all()
        .await
        .expect("Failed to query");
    assert_eq!(skipped.len(), 15);
    assert_eq!(skipped[0].name, "Course 10");

    let page = courses
        .find(Filter::All)
        .page(2, 10)
        .all()
        .await
        .expect("Failed to query");
    let page_names: Vec<String> = page.into_iter().map(|c| c.name).collect();
    let expected: Vec<String> = (10..20).map(|i| format!("Course {:02}", i)).collect();
    assert_eq!(page_names, expected);

    let page_count = courses
        .find(Filter::All)
        .page(2, 10)
        .count()
        .await
        .expect("Failed to count");
    assert_eq!(page_count, 10);

    let last_page = courses
        .find(Filter::All)
        .page(3, 10)
        .count()
        .await
        .expect("Failed to count");
    assert_eq!(last_page, 5);

    let total = courses.find(Filter::All).count().await.expect("Failed to count");
    assert_eq!(total, 25);

    let unlimited = courses
        .find(Filter::All)
        .skip(20)
        .limit(0)
        .all()
        .await
        .expect("Failed to query");
    assert_eq!(unlimited.len(), 5);

    let unlimited_count = courses
        .find(Filter::All)
        .limit(0)
        .count()
        .await
        .expect("Failed to count");
    assert_eq!(unlimited_count, 25);
}

#[tokio::test]
async fn test_comparison_and_membership_filters() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    assert_eq!(
        names(&courses, Field::Price.between(10, 15)).await,
        vec!["Node.js Course", "React Course", "Flutter by Example"]
    );
    assert_eq!(
        names(&courses, Field::Price.is_in([10, 20])).await,
        vec!["Node.js Course", "Express.js Course"]
    );
    assert_eq!(
        names(&courses, Field::Category.not_in([Category::Mobile, Category::Network])).await,
        vec!["Node.js Course", "Express.js Course", "React Course"]
    );
    assert_eq!(
        names(&courses, Field::Author.ne("William").and(Field::IsPublished.eq(false))).await,
        vec!["React Course", "Networking Basics"]
    );
    assert!(names(&courses, Field::Price.gt(100)).await.is_empty());
}

#[tokio::test]
async fn test_pattern_filters() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    assert_eq!(
        names(&courses, Field::Author.starts_with("A")).await,
        vec!["Express.js Course", "Networking Basics"]
    );
    assert_eq!(
        names(&courses, Field::Author.ends_with("PHRASE").ignore_case()).await,
        vec!["Flutter by Example"]
    );
    assert!(names(&courses, Field::Author.ends_with("PHRASE")).await.is_empty());
    assert_eq!(
        names(&courses, Field::Author.contains("EEM").ignore_case()).await,
        vec!["React Course"]
    );
    assert_eq!(
        names(&courses, Field::Tags.matches("^front")).await,
        vec!["React Course"]
    );
}

#[tokio::test]
async fn test_invalid_regex_is_rejected() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;

    let err = courses
        .find(Field::Author.matches("(unclosed"))
        .all()
        .await
        .expect_err("invalid regex must fail");
    assert!(matches!(err, StoreError::InvalidPattern(_)));
}

#[tokio::test]
async fn test_tags_element_and_exact_array_matching() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    assert_eq!(
        names(&courses, Field::Tags.eq("backend")).await,
        vec!["Node.js Course", "Express.js Course"]
    );
    assert_eq!(
        names(&courses, Field::Tags.eq(vec!["backend"])).await,
        vec!["Node.js Course"]
    );
    assert_eq!(
        names(&courses, Field::Tags.is_in(["mobile", "frontend"])).await,
        vec!["React Course", "Flutter by Example"]
    );
}

#[tokio::test]
async fn test_or_composes_with_base_filter() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    let found: Vec<String> = courses
        .find(Field::IsPublished.eq(true))
        .or(vec![
            Field::Name.contains("by").ignore_case(),
            Field::Price.gte(15),
        ])
        .all()
        .await
        .expect("Failed to query")
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(found, vec!["Express.js Course", "Flutter by Example"]);
}

#[tokio::test]
async fn test_sort_and_projection() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    let sorted = courses
        .find(Field::Tags.eq("backend"))
        .sort(Field::Name, SortOrder::Descending)
        .all()
        .await
        .expect("Failed to query");
    let sorted: Vec<&str> = sorted.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(sorted, vec!["Node.js Course", "Express.js Course"]);

    let docs = courses
        .find(Field::Tags.eq("backend"))
        .sort_str("name")
        .expect("Failed to parse sort")
        .select_str("name author")
        .expect("Failed to parse projection")
        .all()
        .await
        .expect("Failed to query");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["name"], "Express.js Course");
    assert_eq!(docs[0]["author"], "Andrew");
    assert!(docs[0].contains_key("_id"));
    assert!(!docs[0].contains_key("tags"));
    assert!(!docs[0].contains_key("price"));

    let full = courses
        .find(Field::Name.eq("Express.js Course"))
        .first()
        .await
        .expect("Failed to query")
        .expect("Course not found");
    assert_eq!(full.tags, vec!["backend".to_string(), "node".to_string()]);
}

#[tokio::test]
async fn test_date_range_filter() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;

    for (name, year) in [("Old Course", 2018), ("Mid Course", 2019), ("New Course", 2020)] {
        courses
            .create(
                NewCourse::new(name, "Mosh", false)
                    .with_date(Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap()),
            )
            .await
            .expect("Failed to create course");
    }

    let since = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(
        names(&courses, Field::Date.gte(since)).await,
        vec!["Mid Course", "New Course"]
    );
}

#[tokio::test]
async fn test_stream_yields_every_match() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    let cursor = courses
        .find(Field::IsPublished.eq(true))
        .cursor()
        .expect("Failed to compile query");
    let mut stream = cursor.stream();
    let mut streamed = Vec::new();
    while let Some(course) = stream.next().await {
        streamed.push(course.expect("Failed to decode course").name);
    }
    assert_eq!(
        streamed,
        vec!["Node.js Course", "Express.js Course", "Flutter by Example"]
    );
}

#[tokio::test]
async fn test_update_by_fetch_missing_id_is_noop() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    let existing = courses.create(node_course()).await.expect("Failed to create course");

    let result = courses
        .update_by_fetch(&CourseId::new(), CoursePatch::new().with_author("Jason"))
        .await
        .expect("Failed to update");
    assert!(result.is_none());

    let all = courses.find(Filter::All).all().await.expect("Failed to query");
    assert_eq!(all, vec![existing]);
}

#[tokio::test]
async fn test_update_by_fetch_merges_and_revalidates() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    let course = courses.create(node_course()).await.expect("Failed to create course");

    let updated = courses
        .update_by_fetch(&course.id, CoursePatch::new().with_author("Jason").published(false))
        .await
        .expect("Failed to update")
        .expect("Course not found");
    assert_eq!(updated.author, "Jason");
    assert!(!updated.is_published);
    assert_eq!(updated.tags, course.tags);

    let stored = courses
        .find_by_id(&course.id)
        .await
        .expect("Failed to fetch")
        .expect("Course not found");
    assert_eq!(stored, updated);

    // publishing again with no tags violates the cross-field rule
    let err = courses
        .update_by_fetch(
            &course.id,
            CoursePatch::new().with_tags(Vec::<String>::new()).published(true),
        )
        .await
        .expect_err("published course without tags must be rejected");
    assert!(err.is_validation());

    let unchanged = courses
        .find_by_id(&course.id)
        .await
        .expect("Failed to fetch")
        .expect("Course not found");
    assert_eq!(unchanged, updated);
}

#[tokio::test]
async fn test_update_direct_changes_only_the_patched_field() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    let course = courses.create(node_course()).await.expect("Failed to create course");
    let other = courses
        .create(NewCourse::new("Express.js Course", "Andrew", true).with_tags(["backend"]))
        .await
        .expect("Failed to create course");

    let result = courses
        .update_direct(Filter::by_id(&course.id), CoursePatch::new().published(false))
        .await
        .expect("Failed to update");
    assert_eq!(result, UpdateResult { matched: 1, modified: 1 });

    let stored = courses
        .find_by_id(&course.id)
        .await
        .expect("Failed to fetch")
        .expect("Course not found");
    let mut expected = course.clone();
    expected.is_published = false;
    assert_eq!(stored, expected);

    let untouched = courses
        .find_by_id(&other.id)
        .await
        .expect("Failed to fetch")
        .expect("Course not found");
    assert_eq!(untouched, other);
}

#[tokio::test]
async fn test_update_direct_skips_cross_field_check() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    let course = courses.create(node_course()).await.expect("Failed to create course");

    let result = courses
        .update_direct(
            Filter::by_id(&course.id),
            CoursePatch::new().with_tags(Vec::<String>::new()),
        )
        .await
        .expect("tags-only patch carries nothing to reject");
    assert_eq!(result, UpdateResult { matched: 1, modified: 1 });

    let stored = courses
        .find_by_id(&course.id)
        .await
        .expect("Failed to fetch")
        .expect("Course not found");
    assert!(stored.is_published);
    assert!(stored.tags.is_empty());
    assert!(stored.validate(ValidationMode::Enforced).is_err());

    let err = courses
        .update_by_fetch(&course.id, CoursePatch::new().with_price(18.0))
        .await
        .expect_err("whole-record check sees the missing tags");
    assert!(err.is_validation());

    let repaired = courses
        .update_by_fetch(&course.id, CoursePatch::new().with_tags(["node"]).with_price(18.0))
        .await
        .expect("Failed to update")
        .expect("Course not found");
    assert_eq!(repaired.tags, vec!["node".to_string()]);
    assert_eq!(repaired.price, Some(18.0));
}

#[tokio::test]
async fn test_update_direct_reports_matches_without_changes() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    let result = courses
        .update_direct(Field::Author.eq("Nobody"), CoursePatch::new().with_price(99.0))
        .await
        .expect("Failed to update");
    assert_eq!(result, UpdateResult { matched: 0, modified: 0 });

    let result = courses
        .update_direct(Field::IsPublished.eq(true), CoursePatch::new().with_author("Mosh"))
        .await
        .expect("Failed to update");
    assert_eq!(result.matched, 3);
    assert_eq!(result.modified, 3);
    assert_eq!(
        names(&courses, Field::Author.eq("Mosh")).await,
        vec!["Node.js Course", "Express.js Course", "Flutter by Example"]
    );
}

#[tokio::test]
async fn test_update_direct_rejects_invalid_patch_values() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    let course = courses.create(node_course()).await.expect("Failed to create course");

    let err = courses
        .update_direct(Filter::by_id(&course.id), CoursePatch::new().with_name("abc"))
        .await
        .expect_err("short name must be rejected");
    assert!(err.is_validation());

    let stored = courses
        .find_by_id(&course.id)
        .await
        .expect("Failed to fetch")
        .expect("Course not found");
    assert_eq!(stored, course);
}

#[tokio::test]
async fn test_find_one_and_update_returns_requested_state() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    let course = courses.create(node_course()).await.expect("Failed to create course");

    let before = courses
        .find_one_and_update(
            Filter::by_id(&course.id),
            CoursePatch::new().with_author("Jason"),
            ReturnDocument::Before,
        )
        .await
        .expect("Failed to update")
        .expect("Course not found");
    assert_eq!(before.author, "Mosh");

    let after = courses
        .find_one_and_update(
            Filter::by_id(&course.id),
            CoursePatch::new().with_category(Category::Mobile),
            ReturnDocument::After,
        )
        .await
        .expect("Failed to update")
        .expect("Course not found");
    assert_eq!(after.author, "Jason");
    assert_eq!(after.category, Some(Category::Mobile));
    assert_eq!(after.date, course.date);

    let missing = courses
        .find_one_and_update(
            Filter::by_id(&CourseId::new()),
            CoursePatch::new().with_author("Jason"),
            ReturnDocument::After,
        )
        .await
        .expect("Failed to update");
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_remove_then_find_returns_nothing() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    let course = courses.create(node_course()).await.expect("Failed to create course");

    let removed = courses
        .remove(&course.id)
        .await
        .expect("Failed to remove")
        .expect("Course not found");
    assert_eq!(removed, course);

    let found = courses
        .find(Filter::by_id(&course.id))
        .all()
        .await
        .expect("Failed to query");
    assert!(found.is_empty());

    let again = courses.remove(&course.id).await.expect("Failed to remove");
    assert!(again.is_none());
}

#[tokio::test]
async fn test_delete_many() {
    let (_store, courses) = setup_store(ValidationMode::Enforced).await;
    insert_catalog(&courses).await;

    let result = courses
        .delete_many(Field::IsPublished.eq(false))
        .await
        .expect("Failed to delete");
    assert_eq!(result, DeleteResult { deleted: 2 });

    let remaining = courses.find(Filter::All).count().await.expect("Failed to count");
    assert_eq!(remaining, 3);
}

#[tokio::test]
async fn test_seed_courses() {
    let (store, courses) = setup_store(ValidationMode::Enforced).await;

    let seeded = seed::seed_courses(&courses, 20).await.expect("Failed to seed");
    assert_eq!(seeded.len(), 20);
    assert_eq!(courses.find(Filter::All).count().await.expect("Failed to count"), 20);

    store.close().await;
}
