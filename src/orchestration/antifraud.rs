//! Runs the fraud rules when a job enters `awaiting_confirmation` and keeps
//! the admin review queue.

use crate::config::FraudConfig;
use crate::db::Repository;
use crate::domain::{Actor, AntifraudFlag, DomainEvent, Role, TimeMs};
use crate::engine::{
    evaluate_all, DuplicateDocumentRule, ExcessiveCancellationsRule, FraudContext, FraudRule,
    LocationMismatchRule, ShortExecutionRule, ValueAboveNormRule,
};
use crate::error::EngineError;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::events::EventBus;

#[derive(Debug)]
pub struct AntifraudMonitor {
    repo: Arc<Repository>,
    events: EventBus,
    rules: Vec<Box<dyn FraudRule>>,
}

impl AntifraudMonitor {
    pub fn new(repo: Arc<Repository>, events: EventBus, rules: Vec<Box<dyn FraudRule>>) -> Self {
        Self {
            repo,
            events,
            rules,
        }
    }

    /// Monitor with every built-in rule, thresholds from config.
    pub fn from_config(repo: Arc<Repository>, events: EventBus, config: &FraudConfig) -> Self {
        let rules: Vec<Box<dyn FraudRule>> = vec![
            Box::new(ShortExecutionRule {
                min_minutes: config.min_execution_minutes,
            }),
            Box::new(ValueAboveNormRule {
                max_multiple: config.price_multiple,
            }),
            Box::new(ExcessiveCancellationsRule {
                max_cancellations: config.max_cancellations,
            }),
            Box::new(LocationMismatchRule {
                max_distance_km: config.max_distance_km,
            }),
            Box::new(DuplicateDocumentRule),
        ];
        Self::new(repo, events, rules)
    }

    /// Evaluate a job and record any new flags.
    ///
    /// Never fails: flags are advisory, so errors are logged and swallowed.
    pub async fn inspect(&self, service_request_id: i64) -> Vec<AntifraudFlag> {
        match self.try_inspect(service_request_id).await {
            Ok(flags) => flags,
            Err(e) => {
                error!(
                    "Anti-fraud inspection failed for request {}: {}",
                    service_request_id, e
                );
                Vec::new()
            }
        }
    }

    async fn try_inspect(&self, service_request_id: i64) -> Result<Vec<AntifraudFlag>, EngineError> {
        let request = self
            .repo
            .get_request(service_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("service request", service_request_id))?;

        let (execution, category, client_cancellations, clients_sharing_document) = futures::try_join!(
            self.repo.get_execution_log(service_request_id),
            self.repo.get_category(request.category_id),
            self.repo.count_client_cancellations(request.client_id),
            self.repo.count_clients_sharing_document(request.client_id),
        )?;

        let ctx = FraudContext {
            request: &request,
            execution: execution.as_ref(),
            category_base_price: category.map(|c| c.base_price),
            client_cancellations,
            clients_sharing_document,
        };

        let now = TimeMs::now();
        let mut raised = Vec::new();
        for draft in evaluate_all(&self.rules, &ctx) {
            match self.repo.insert_flag(service_request_id, &draft, now).await? {
                Some(flag) => {
                    warn!(
                        "Anti-fraud flag {} raised on request {}: {} ({})",
                        flag.id,
                        service_request_id,
                        flag.reason.as_str(),
                        flag.details
                    );
                    self.events.publish(DomainEvent::AntifraudFlagRaised {
                        service_request_id,
                        flag_id: flag.id,
                        reason: flag.reason,
                    });
                    raised.push(flag);
                }
                None => info!(
                    "Request {} already flagged for {}",
                    service_request_id,
                    draft.reason.as_str()
                ),
            }
        }
        Ok(raised)
    }

    fn require_admin(actor: &Actor, action: &'static str) -> Result<(), EngineError> {
        if actor.role == Role::Admin {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                actor_id: actor.id,
                role: actor.role,
                action,
            })
        }
    }

    pub async fn list_flags(
        &self,
        actor: &Actor,
        pending_only: bool,
    ) -> Result<Vec<AntifraudFlag>, EngineError> {
        Self::require_admin(actor, "list anti-fraud flags")?;
        Ok(self.repo.list_flags(pending_only).await?)
    }

    /// Mark a flag resolved by an admin. Resolving an already resolved flag
    /// returns it unchanged.
    pub async fn resolve(&self, actor: &Actor, flag_id: i64) -> Result<AntifraudFlag, EngineError> {
        Self::require_admin(actor, "resolve anti-fraud flag")?;
        if self.repo.resolve_flag(flag_id, actor.id, TimeMs::now()).await? {
            info!("Flag {} resolved by admin {}", flag_id, actor.id);
        }
        self.repo
            .get_flag(flag_id)
            .await?
            .ok_or_else(|| EngineError::not_found("anti-fraud flag", flag_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_repo;
    use crate::db::StatusUpdate;
    use crate::domain::{
        CategoryKind, Decimal, ExecutionLog, FlagReason, NewServiceRequest, ServiceStatus,
    };

    const HOUR: i64 = 3_600_000;

    async fn finished_job(repo: &Repository, minutes: i64) -> i64 {
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
        let update = StatusUpdate::to(ServiceStatus::AwaitingConfirmation, TimeMs::new(1))
            .with_provider(provider.id)
            .with_final_price(Decimal::from_units(22000));
        assert!(Repository::cas_status(repo.pool(), req.id, &[ServiceStatus::FeePaid], &update)
            .await
            .unwrap());

        let log = ExecutionLog {
            service_request_id: req.id,
            provider_id: provider.id,
            started_at: TimeMs::new(10 * HOUR),
            start_location: None,
            ended_at: None,
            end_location: None,
            duration_minutes: None,
        };
        Repository::open_execution(repo.pool(), &log).await.unwrap();
        Repository::close_execution(
            repo.pool(),
            req.id,
            TimeMs::new(10 * HOUR + minutes * 60_000),
            None,
            minutes,
        )
        .await
        .unwrap();
        req.id
    }

    #[tokio::test]
    async fn test_short_execution_flagged_once() {
        let (repo, _temp) = setup_repo().await;
        let req = finished_job(&repo, 20).await;
        let monitor = AntifraudMonitor::from_config(repo.clone(), EventBus::default(), &FraudConfig::default());

        let flags = monitor.inspect(req).await;
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].reason, FlagReason::ShortExecutionDuration);
        assert!(monitor.inspect(req).await.is_empty());
        assert_eq!(repo.flags_for_request(req).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_long_execution_not_flagged() {
        let (repo, _temp) = setup_repo().await;
        let req = finished_job(&repo, 45).await;
        let monitor = AntifraudMonitor::from_config(repo.clone(), EventBus::default(), &FraudConfig::default());
        assert!(monitor.inspect(req).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_request_does_not_error() {
        let (repo, _temp) = setup_repo().await;
        let monitor = AntifraudMonitor::from_config(repo, EventBus::default(), &FraudConfig::default());
        assert!(monitor.inspect(404).await.is_empty());
    }

    #[tokio::test]
    async fn test_only_admin_resolves() {
        let (repo, _temp) = setup_repo().await;
        let req = finished_job(&repo, 5).await;
        let monitor = AntifraudMonitor::from_config(repo.clone(), EventBus::default(), &FraudConfig::default());
        let flag = monitor.inspect(req).await.remove(0);

        assert!(matches!(
            monitor.resolve(&Actor::client(1), flag.id).await,
            Err(EngineError::Unauthorized { .. })
        ));
        let resolved = monitor.resolve(&Actor::admin(9), flag.id).await.unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by, Some(9));

        let again = monitor.resolve(&Actor::admin(8), flag.id).await.unwrap();
        assert_eq!(again.resolved_by, Some(9));
        assert!(monitor.list_flags(&Actor::admin(9), true).await.unwrap().is_empty());
    }
}
