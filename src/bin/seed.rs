use rental_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::{
        products::{ActiveModel as ProductActive, Column as ProductCol, Entity as Products},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    services::auth_service::hash_password,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use uuid::Uuid;

const PASSWORD: &str = "password123";

const CITIES: &[(&str, f64, f64)] = &[
    ("Mumbai", 72.8777, 19.076),
    ("Delhi", 77.1025, 28.7041),
    ("Bangalore", 77.5946, 12.9716),
    ("Hyderabad", 78.4867, 17.385),
    ("Chennai", 80.2707, 13.0827),
    ("Pune", 73.8567, 18.5204),
];

// (name, category, price per day, description)
const TEMPLATES: &[(&str, &str, i64, &str)] = &[
    ("MacBook Pro 16\"", "laptops", 500, "High-performance laptop for professionals"),
    ("Dell XPS 15", "laptops", 400, "Premium Windows laptop with stunning display"),
    ("Canon EOS R5", "cameras", 800, "Professional mirrorless camera"),
    ("Sony A7 III", "cameras", 700, "Full-frame mirrorless camera"),
    ("GoPro Hero 11", "cameras", 200, "Action camera for adventures"),
    ("Sony WH-1000XM5", "audio", 100, "Premium noise-canceling headphones"),
    ("PlayStation 5", "gaming", 300, "Latest generation gaming console"),
    ("iPhone 15 Pro Max", "smartphones", 200, "Latest flagship iPhone"),
    ("Nintendo Switch OLED", "gaming", 200, "Portable gaming console"),
    ("Meta Quest 3", "gaming", 350, "VR headset for immersive gaming"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "Admin User", "admin@example.com", "admin", None).await?;

    let mut owners = Vec::new();
    for i in 1..=3 {
        let phone = format!("+91{}", 9_000_000_000_i64 + i);
        owners.push(
            ensure_user(
                &orm,
                &format!("Owner {i}"),
                &format!("owner{i}@example.com"),
                "owner",
                Some(phone),
            )
            .await?,
        );
    }

    for i in 1..=5 {
        let phone = format!("+91{}", 8_000_000_000_i64 + i);
        ensure_user(
            &orm,
            &format!("Renter {i}"),
            &format!("renter{i}@example.com"),
            "user",
            Some(phone),
        )
        .await?;
    }

    let created = seed_products(&orm, &owners).await?;

    println!("Seed completed. Admin ID: {admin_id}, owners: {}, new products: {created}", owners.len());
    println!("All seeded accounts use the password {PASSWORD:?}");
    Ok(())
}

async fn ensure_user(
    orm: &OrmConn,
    name: &str,
    email: &str,
    role: &str,
    phone: Option<String>,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(PASSWORD)?),
        phone: Set(phone),
        role: Set(role.to_string()),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;
    Ok(user.id)
}

async fn seed_products(orm: &OrmConn, owners: &[Uuid]) -> anyhow::Result<usize> {
    let mut created = 0;
    for (i, owner_id) in owners.iter().enumerate() {
        let existing = Products::find()
            .filter(ProductCol::OwnerId.eq(*owner_id))
            .count(orm)
            .await?;
        if existing > 0 {
            continue;
        }

        for (j, (name, category, price, description)) in TEMPLATES.iter().enumerate() {
            let (city, lng, lat) = CITIES[(i + j) % CITIES.len()];
            // Spread prices a little so sorting by price is meaningful.
            let price_per_day = price + ((i * 7 + j * 13) % 50) as i64 - 25;
            ProductActive {
                id: Set(Uuid::new_v4()),
                owner_id: Set(*owner_id),
                name: Set(format!("{name} #{}", i + 1)),
                description: Set(description.to_string()),
                category: Set(category.to_string()),
                price_per_day: Set(price_per_day.max(1)),
                availability: Set(true),
                average_rating: Set(0.0),
                reviews_count: Set(0),
                address: Set(city.to_string()),
                longitude: Set(Some(lng)),
                latitude: Set(Some(lat)),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(orm)
            .await?;
            created += 1;
        }
    }
    Ok(created)
}
