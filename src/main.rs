use course_store::db::ReturnDocument;
use course_store::seed;
use course_store::{CoursePatch, Field, Filter, SortOrder, Store, StoreConfig, StoreError};
use fake::Fake;
use fake::faker::name::en::FirstName;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PAGE_NUMBER: u64 = 2;
const PAGE_SIZE: u64 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_store=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StoreConfig::new_from_env()?;

    let store = match Store::connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return Ok(());
        }
    };
    let courses = store.courses();

    let seeded = match seed::seed_courses(&courses, config.seed_count).await {
        Ok(seeded) => seeded,
        Err(StoreError::Validation(e)) => {
            error!("{}", e);
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    let total = courses
        .find(Filter::All)
        .page(PAGE_NUMBER, PAGE_SIZE)
        .count()
        .await?;
    info!("courses on page {} (size {}): {}", PAGE_NUMBER, PAGE_SIZE, total);

    let backend = courses
        .find(Field::Tags.eq(vec!["backend"]))
        .sort(Field::Name, SortOrder::Ascending)
        .select([Field::Name, Field::Author])
        .all()
        .await?;
    info!("backend courses: {:?}", backend);

    let published = courses
        .find(Field::IsPublished.eq(true))
        .or(vec![
            Field::Name.contains("by").ignore_case(),
            Field::Price.gte(15.0),
        ])
        .all()
        .await?;
    info!("published courses named *by* or priced 15+: {}", published.len());

    if let Some(course) = seeded.first() {
        let author: String = FirstName().fake();
        let fetched = courses
            .update_by_fetch(&course.id, CoursePatch::new().with_author(author).published(true))
            .await?;
        info!("updated by fetch: {:?}", fetched);

        let author: String = FirstName().fake();
        let result = courses
            .update_direct(
                Filter::by_id(&course.id),
                CoursePatch::new().with_author(author).published(false),
            )
            .await?;
        info!("updated directly: {:?}", result);

        let renewed = courses
            .find_one_and_update(
                Filter::by_id(&course.id),
                CoursePatch::new().with_price(20.0),
                ReturnDocument::After,
            )
            .await?;
        info!("updated and returned: {:?}", renewed);

        let removed = courses.remove(&course.id).await?;
        info!("removed: {:?}", removed);
    }

    store.close().await;
    Ok(())
}
