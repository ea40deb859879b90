//! Applies client reviews to provider reputation.

use crate::db::repo::is_unique_violation;
use crate::db::Repository;
use crate::domain::{Actor, Decimal, NewReview, Reputation, Review, ServiceStatus, TimeMs};
use crate::engine::apply_rating;
use crate::error::EngineError;
use std::sync::Arc;
use tracing::info;

use super::transitions::{authorize, Caller, Party};

const ACTION: &str = "review provider";

#[derive(Debug, Clone)]
pub struct RatingAggregator {
    repo: Arc<Repository>,
}

impl RatingAggregator {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Record a review and fold it into the provider's reputation.
    ///
    /// The review insert and the reputation update commit together; the
    /// insert takes the write lock, so concurrent reviews for one provider
    /// apply one after the other.
    pub async fn submit(
        &self,
        actor: &Actor,
        service_request_id: i64,
        review: &NewReview,
    ) -> Result<(Review, Reputation), EngineError> {
        let request = self
            .repo
            .get_request(service_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("service request", service_request_id))?;

        authorize(&[Party::Owner], Caller::Actor(actor), &request, ACTION)?;
        if !matches!(
            request.status,
            ServiceStatus::Completed | ServiceStatus::AwaitingConfirmation
        ) {
            return Err(EngineError::InvalidTransition {
                from: request.status,
                action: ACTION,
            });
        }
        if request.provider_id != Some(review.provider_id) {
            return Err(EngineError::Validation(format!(
                "provider {} is not assigned to request {}",
                review.provider_id, service_request_id
            )));
        }
        if review.rating < Decimal::zero() || review.rating > Decimal::from_units(10) {
            return Err(EngineError::Validation(format!(
                "rating must be between 0 and 10, got {}",
                review.rating
            )));
        }

        let mut tx = self.repo.begin().await?;
        let stored = match Repository::insert_review(
            &mut *tx,
            service_request_id,
            actor.id,
            review.provider_id,
            review.rating,
            review.comment.as_deref(),
            TimeMs::now(),
        )
        .await
        {
            Ok(stored) => stored,
            Err(e) if is_unique_violation(&e) => {
                return Err(EngineError::Validation(format!(
                    "request {} has already been reviewed",
                    service_request_id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let provider = Repository::fetch_provider(&mut *tx, review.provider_id)
            .await?
            .ok_or_else(|| EngineError::not_found("provider", review.provider_id))?;
        let updated = apply_rating(
            Reputation::new(provider.rating, provider.total_ratings),
            review.rating,
        );
        Repository::set_reputation(&mut *tx, provider.id, &updated).await?;
        tx.commit().await?;

        info!(
            "Provider {} rated {} on request {}; now {} over {} ratings",
            provider.id, review.rating, service_request_id, updated.rating, updated.total_ratings
        );
        Ok((stored, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_repo;
    use crate::db::StatusUpdate;
    use crate::domain::{CategoryKind, NewServiceRequest};

    struct Fixture {
        client_id: i64,
        provider_id: i64,
        request_id: i64,
    }

    async fn job_in(repo: &Repository, status: ServiceStatus) -> Fixture {
        let client = repo.insert_client("Carla", None).await.unwrap();
        let provider = repo.insert_provider("Ana", "Plumbing").await.unwrap();
        let category = repo
            .insert_category("Plumbing", Decimal::from_units(15000), CategoryKind::Repair)
            .await
            .unwrap();
        let new = NewServiceRequest {
            category_id: category.id,
            title: "t".to_string(),
            description: "d".to_string(),
            sla_priority: Default::default(),
            location: None,
        };
        let req = Repository::insert_request(
            repo.pool(),
            client.id,
            &category,
            &new,
            ServiceStatus::FeePaid,
            None,
            None,
            TimeMs::new(0),
        )
        .await
        .unwrap();
        let update = StatusUpdate::to(status, TimeMs::new(1)).with_provider(provider.id);
        Repository::cas_status(repo.pool(), req.id, &[ServiceStatus::FeePaid], &update)
            .await
            .unwrap();
        Fixture {
            client_id: client.id,
            provider_id: provider.id,
            request_id: req.id,
        }
    }

    fn review(provider_id: i64, rating: &str) -> NewReview {
        NewReview {
            provider_id,
            rating: rating.parse().unwrap(),
            comment: Some("great".to_string()),
        }
    }

    #[tokio::test]
    async fn test_review_updates_reputation_once() {
        let (repo, _temp) = setup_repo().await;
        let f = job_in(&repo, ServiceStatus::Completed).await;
        let aggregator = RatingAggregator::new(repo.clone());

        let (_, rep) = aggregator
            .submit(&Actor::client(f.client_id), f.request_id, &review(f.provider_id, "8"))
            .await
            .unwrap();
        assert_eq!(rep, Reputation::new(Decimal::from_units(8), 1));

        let err = aggregator
            .submit(&Actor::client(f.client_id), f.request_id, &review(f.provider_id, "2"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let provider = repo.get_provider(f.provider_id).await.unwrap().unwrap();
        assert_eq!(provider.total_ratings, 1);
        assert_eq!(provider.rating, Decimal::from_units(8));
    }

    #[tokio::test]
    async fn test_review_rejected_before_execution_ends() {
        let (repo, _temp) = setup_repo().await;
        let f = job_in(&repo, ServiceStatus::InProgress).await;
        let err = RatingAggregator::new(repo.clone())
            .submit(&Actor::client(f.client_id), f.request_id, &review(f.provider_id, "9"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: ServiceStatus::InProgress,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_review_rejected_for_foreign_request_or_provider() {
        let (repo, _temp) = setup_repo().await;
        let f = job_in(&repo, ServiceStatus::AwaitingConfirmation).await;
        let aggregator = RatingAggregator::new(repo.clone());

        let err = aggregator
            .submit(&Actor::client(f.client_id + 100), f.request_id, &review(f.provider_id, "9"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { .. }));

        let err = aggregator
            .submit(&Actor::client(f.client_id), f.request_id, &review(f.provider_id + 1, "9"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = aggregator
            .submit(&Actor::client(f.client_id), f.request_id, &review(f.provider_id, "11"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(repo.get_review(f.request_id).await.unwrap().is_none());
    }
}
