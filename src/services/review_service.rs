use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    db::OrmConn,
    domain::booking::BookingStatus,
    domain::review::{normalize_comment, rating_summary, validate_rating},
    dto::reviews::{CreateReviewRequest, ReviewList},
    entity::{
        bookings::{Column as BookingCol, Entity as Bookings},
        products::{Column as ProductCol, Entity as Products},
        reviews::{ActiveModel, Column, Entity as Reviews, Model as ReviewModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult, is_unique_violation},
    middleware::auth::AuthUser,
    models::{Review, ReviewWithAuthor},
    response::{ApiResponse, Meta},
    routes::params::ReviewQuery,
    state::AppState,
};

pub async fn add_review(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    validate_rating(payload.rating)?;
    let comment = normalize_comment(payload.comment)?;

    Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let booking = Bookings::find()
        .filter(BookingCol::ProductId.eq(product_id))
        .filter(BookingCol::UserId.eq(user.user_id))
        .filter(BookingCol::Status.eq(BookingStatus::Completed.as_str()))
        .order_by_desc(BookingCol::EndDate)
        .one(&state.orm)
        .await?
        .ok_or_else(|| {
            AppError::Forbidden("You can only review products you have rented".into())
        })?;

    let existing = Reviews::find()
        .filter(Column::ProductId.eq(product_id))
        .filter(Column::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "You have already reviewed this product".into(),
        ));
    }

    let review = ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        user_id: Set(user.user_id),
        booking_id: Set(booking.id),
        rating: Set(payload.rating),
        comment: Set(comment),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::Conflict("You have already reviewed this product".into())
        } else {
            err.into()
        }
    })?;

    if let Err(err) = refresh_rating(&state.orm, product_id).await {
        tracing::warn!(error = %err, %product_id, "rating recalculation failed");
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "review_create",
        "reviews",
        serde_json::json!({ "review_id": review.id, "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review added",
        review_from_entity(review),
        Some(Meta::empty()),
    ))
}

pub async fn list_reviews(
    state: &AppState,
    product_id: Uuid,
    query: ReviewQuery,
) -> AppResult<ApiResponse<ReviewList>> {
    let (page, limit, offset) = query.pagination().normalize();

    Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let finder = Reviews::find()
        .filter(Column::ProductId.eq(product_id))
        .order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Users)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(review, author)| ReviewWithAuthor {
            review: review_from_entity(review),
            user_name: author.map(|u| u.name),
        })
        .collect();

    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Recompute `average_rating` and `reviews_count` from the stored reviews.
async fn refresh_rating(conn: &OrmConn, product_id: Uuid) -> AppResult<()> {
    let ratings: Vec<i32> = Reviews::find()
        .select_only()
        .column(Column::Rating)
        .filter(Column::ProductId.eq(product_id))
        .into_tuple()
        .all(conn)
        .await?;

    let (average, count) = rating_summary(&ratings);
    Products::update_many()
        .col_expr(ProductCol::AverageRating, Expr::value(average))
        .col_expr(ProductCol::ReviewsCount, Expr::value(count))
        .col_expr(ProductCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(ProductCol::Id.eq(product_id))
        .exec(conn)
        .await?;

    tracing::debug!(%product_id, average, count, "product rating refreshed");
    Ok(())
}

fn review_from_entity(model: ReviewModel) -> Review {
    Review {
        id: model.id,
        product_id: model.product_id,
        user_id: model.user_id,
        booking_id: model.booking_id,
        rating: model.rating,
        comment: model.comment,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
