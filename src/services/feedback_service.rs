//! Feedback service - likes and reviews

use std::sync::Arc;

use chrono::Utc;

use crate::db::favourites::{self, LikeTarget, LikedByUser};
use crate::db::reviews::{self, AuthoredReviews, CreateReviewInput, ReviewRow, ReviewTarget, UpdateReviewInput};
use crate::db::{places, routes, TripDb};
use crate::error::TripError;

use super::events::{EventBus, TripEvent};

/// Highest review mark
pub const MAX_MARK: f32 = 5.0;

fn check_mark(mark: f32) -> Result<(), TripError> {
    if !(0.0..=MAX_MARK).contains(&mark) {
        return Err(TripError::BadInput(format!(
            "mark must be between 0 and {}, got {}",
            MAX_MARK, mark
        )));
    }
    Ok(())
}

fn label(target: LikeTarget) -> &'static str {
    match target {
        LikeTarget::Place => "place",
        LikeTarget::Route => "route",
    }
}

pub struct FeedbackService {
    db: Arc<TripDb>,
    events: Arc<EventBus>,
}

impl FeedbackService {
    pub fn new(db: Arc<TripDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn like(&self, target: LikeTarget, user_id: i64, entity_id: i64) -> Result<(), TripError> {
        self.db.with_conn(|conn| {
            match target {
                LikeTarget::Place => places::get_place(conn, entity_id).map(|_| ())?,
                LikeTarget::Route => routes::get_route(conn, entity_id).map(|_| ())?,
            }
            favourites::like(conn, target, user_id, entity_id, Utc::now())
        })?;

        self.events.emit(TripEvent::Liked {
            user_id,
            entity: label(target),
            entity_id,
        });
        Ok(())
    }

    pub fn unlike(&self, target: LikeTarget, user_id: i64, entity_id: i64) -> Result<(), TripError> {
        self.db
            .with_conn(|conn| favourites::unlike(conn, target, user_id, entity_id))?;

        self.events.emit(TripEvent::Unliked {
            user_id,
            entity: label(target),
            entity_id,
        });
        Ok(())
    }

    pub fn liked_by_user(&self, user_id: i64) -> Result<LikedByUser, TripError> {
        self.db.with_conn(|conn| favourites::liked_by_user(conn, user_id))
    }

    pub fn create_review(&self, target: ReviewTarget, input: CreateReviewInput) -> Result<i64, TripError> {
        check_mark(input.mark)?;

        let id = self.db.with_conn(|conn| {
            match target {
                ReviewTarget::Place => places::get_place(conn, input.entity_id).map(|_| ())?,
                ReviewTarget::Route => routes::get_route(conn, input.entity_id).map(|_| ())?,
            }
            reviews::create_review(conn, target, &input, Utc::now())
        })?;

        self.events.emit(TripEvent::ReviewCreated {
            id,
            author_id: input.author_id,
        });
        Ok(id)
    }

    pub fn reviews_by_author(&self, author_id: i64) -> Result<AuthoredReviews, TripError> {
        self.db.with_conn(|conn| reviews::get_by_author(conn, author_id))
    }

    pub fn reviews_by_entity(&self, target: ReviewTarget, entity_id: i64) -> Result<Vec<ReviewRow>, TripError> {
        self.db
            .with_conn(|conn| reviews::get_by_entity(conn, target, entity_id))
    }

    pub fn update_review(&self, target: ReviewTarget, input: UpdateReviewInput) -> Result<(), TripError> {
        check_mark(input.mark)?;
        self.db
            .with_conn(|conn| reviews::update_review(conn, target, &input))
    }
}
