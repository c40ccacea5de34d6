use chrono::Utc;
use log::info;

use crate::{
    db::{NewReview, RatingStats},
    dto::{NewReviewDto, ReviewList},
    errors::AppError,
    models::Review,
    service::auth::UserAuthData,
    AppState,
};

/// Site rating; signed-in reviewers are linked, anonymous ones are not.
pub async fn create(
    state: &AppState,
    reviewer: Option<&UserAuthData>,
    dto: NewReviewDto,
) -> Result<Review, AppError> {
    let (rating, comment) = dto.into_rating()?;
    let review = state
        .store
        .create_review(NewReview {
            user_id: reviewer.map(|r| r.user_id),
            rating,
            comment,
            created_at: Utc::now(),
        })
        .await?;
    info!("rating {} recorded ({} stars)", review.id, review.rating);
    Ok(review)
}

pub async fn list(state: &AppState) -> Result<ReviewList, AppError> {
    let reviews = state.store.list_reviews().await?;
    let stats = state.store.review_stats().await?;
    Ok(ReviewList { reviews, stats })
}

pub async fn stats(state: &AppState) -> Result<RatingStats, AppError> {
    Ok(state.store.review_stats().await?)
}
