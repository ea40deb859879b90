//! Service lifecycle controller.
//!
//! Every transition follows the same shape: load the request, check the
//! caller and the current status against the [`Transition`] table, do any
//! upstream call, then open a transaction whose first statement is the status
//! check-and-set. A lost race surfaces as `InvalidTransition` and the dropped
//! transaction rolls back every side effect. Events go out after commit.

use crate::config::PricingConfig;
use crate::db::{Repository, StatusUpdate};
use crate::domain::{
    AcceptanceMetadata, Actor, AiDiagnosis, AntifraudFlag, Category, CategoryKind, Checkpoint, Clock,
    Decimal, DigitalAcceptance, DomainEvent, DomesticDetails, ExecutionLog, GeoPoint,
    NewServiceRequest, Payment, PaymentEscrow, PaymentKind, PaymentMethod, PaymentStatus,
    Provider, ProviderDiagnosis, ProviderFindings, QuoteBreakdown, Reputation, Review, Role,
    ServiceRequest, ServiceStatus, SlaPriority, SystemClock, TimeMs,
};
use crate::engine::{
    price_band, price_domestic, repair_quote, sla_estimate, sla_range, DomesticQuote, PriceBand,
};
use crate::error::EngineError;
use crate::upstream::{CategoryCatalog, DiagnosisPrompt, DiagnosisService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::antifraud::AntifraudMonitor;
use super::events::EventBus;
use super::ledger::LedgerManager;
use super::transitions::{authorize, Caller, Party, Transition};

/// An available provider whose specialty matches the request's category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCandidate {
    #[serde(flatten)]
    pub provider: Provider,
    pub band: PriceBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceReceipt {
    pub request: ServiceRequest,
    pub acceptance: DigitalAcceptance,
    pub payment: Payment,
    pub escrow: PaymentEscrow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub request: ServiceRequest,
    pub execution: ExecutionLog,
    /// Flags newly raised by this completion.
    pub flags: Vec<AntifraudFlag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomesticBooking {
    pub request: ServiceRequest,
    pub details: DomesticDetails,
    pub quote: DomesticQuote,
}

/// A domestic job booked directly with a chosen provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDomesticRequest {
    pub category_id: i64,
    pub provider_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub details: DomesticDetails,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Everything recorded against one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub request: ServiceRequest,
    pub ai_diagnosis: Option<AiDiagnosis>,
    pub provider_diagnosis: Option<ProviderDiagnosis>,
    pub domestic: Option<DomesticBookingDetails>,
    pub acceptance: Option<DigitalAcceptance>,
    pub payments: Vec<Payment>,
    pub escrow: Option<PaymentEscrow>,
    pub execution: Option<ExecutionLog>,
    pub review: Option<Review>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomesticBookingDetails {
    pub details: DomesticDetails,
    pub quote: DomesticQuote,
}

#[derive(Debug)]
pub struct LifecycleController {
    repo: Arc<Repository>,
    diagnosis: Arc<dyn DiagnosisService>,
    catalog: Arc<dyn CategoryCatalog>,
    ledger: Arc<LedgerManager>,
    antifraud: Arc<AntifraudMonitor>,
    events: EventBus,
    pricing: PricingConfig,
    clock: Arc<dyn Clock>,
}

impl LifecycleController {
    pub fn new(
        repo: Arc<Repository>,
        diagnosis: Arc<dyn DiagnosisService>,
        catalog: Arc<dyn CategoryCatalog>,
        ledger: Arc<LedgerManager>,
        antifraud: Arc<AntifraudMonitor>,
        events: EventBus,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            repo,
            diagnosis,
            catalog,
            ledger,
            antifraud,
            events,
            pricing,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the system clock, e.g. with a `ManualClock` in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Arc<LedgerManager> {
        &self.ledger
    }

    pub fn antifraud(&self) -> &Arc<AntifraudMonitor> {
        &self.antifraud
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load(&self, id: i64) -> Result<ServiceRequest, EngineError> {
        self.repo
            .get_request(id)
            .await?
            .ok_or_else(|| EngineError::not_found("service request", id))
    }

    /// The error for a check-and-set that matched no row.
    async fn lost_race(&self, id: i64, transition: Transition) -> EngineError {
        match self.load(id).await {
            Ok(current) => {
                warn!(
                    "Request {}: {} lost to a concurrent change (now {})",
                    id,
                    transition.action(),
                    current.status
                );
                EngineError::InvalidTransition {
                    from: current.status,
                    action: transition.action(),
                }
            }
            Err(e) => e,
        }
    }

    fn committed(&self, request: &ServiceRequest, transition: Transition) {
        info!(
            "Request {}: {} -> {} ({})",
            request.id,
            request.status,
            transition.target(),
            transition.action()
        );
        self.events.publish(DomainEvent::StatusChanged {
            service_request_id: request.id,
            from: request.status,
            to: transition.target(),
        });
    }

    fn require_client(actor: &Actor, action: &'static str) -> Result<(), EngineError> {
        if actor.role == Role::Client {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                actor_id: actor.id,
                role: actor.role,
                action,
            })
        }
    }

    async fn category(&self, id: i64) -> Result<Category, EngineError> {
        self.catalog
            .resolve_category(id)
            .await?
            .ok_or_else(|| EngineError::not_found("category", id))
    }

    /// Provider exists, is available and covers the category.
    async fn eligible_provider(
        &self,
        provider_id: i64,
        category: &Category,
    ) -> Result<Provider, EngineError> {
        let provider = self
            .repo
            .get_provider(provider_id)
            .await?
            .ok_or_else(|| EngineError::not_found("provider", provider_id))?;
        if !provider.available {
            return Err(EngineError::Validation(format!(
                "provider {} is not available",
                provider_id
            )));
        }
        if !self
            .catalog
            .matches_specialty(&provider.specialty, &category.name)
        {
            return Err(EngineError::Validation(format!(
                "provider {} does not serve category {}",
                provider_id, category.name
            )));
        }
        Ok(provider)
    }

    async fn ai_diagnosis_for(&self, request: &ServiceRequest) -> Result<AiDiagnosis, EngineError> {
        self.repo
            .get_ai_diagnosis(request.id)
            .await?
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "request {} is {} but has no diagnosis",
                    request.id, request.status
                ))
            })
    }

    async fn require_cleared_service_payment(
        &self,
        request: &ServiceRequest,
    ) -> Result<(), EngineError> {
        let payment = self
            .repo
            .active_payment(request.id, PaymentKind::Service)
            .await?;
        match payment {
            Some(p) if p.status == PaymentStatus::Completed => Ok(()),
            _ => Err(EngineError::InvalidTransition {
                from: request.status,
                action: "start execution before the service payment clears",
            }),
        }
    }

    /// Commit a gateway confirmation whose transition no longer applies
    /// (the request was cancelled or moved on while the payment was pending).
    /// The payment is `completed` and the request keeps its status.
    async fn record_late_confirmation(
        &self,
        tx: sqlx::Transaction<'static, sqlx::Sqlite>,
        payment: &Payment,
        request_id: i64,
        transition: Transition,
    ) -> Result<bool, EngineError> {
        tx.commit().await?;
        let current = self.load(request_id).await?;
        warn!(
            "Payment {} confirmed for request {} in status {}; recorded without {}",
            payment.payment_ref,
            request_id,
            current.status,
            transition.action()
        );
        Ok(true)
    }

    /// Single-statement transition with no other side effect.
    async fn simple_transition(
        &self,
        actor: &Actor,
        id: i64,
        transition: Transition,
        update: impl FnOnce(StatusUpdate) -> StatusUpdate,
    ) -> Result<ServiceRequest, EngineError> {
        let request = self.load(id).await?;
        transition.check(Caller::Actor(actor), &request)?;

        let update = update(StatusUpdate::to(transition.target(), self.clock.now()));
        if !Repository::cas_status(self.repo.pool(), id, transition.allowed_from(), &update).await? {
            return Err(self.lost_race(id, transition).await);
        }
        self.committed(&request, transition);
        self.load(id).await
    }

    // =========================================================================
    // Repair flow
    // =========================================================================

    /// Create a repair request in `pending` with an SLA-scaled estimate.
    pub async fn create_request(
        &self,
        actor: &Actor,
        new: NewServiceRequest,
    ) -> Result<ServiceRequest, EngineError> {
        Self::require_client(actor, "create service request")?;
        if new.title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty".to_string()));
        }
        let client = self
            .repo
            .get_client(actor.id)
            .await?
            .ok_or_else(|| EngineError::not_found("client", actor.id))?;
        let category = self.category(new.category_id).await?;
        if category.kind != CategoryKind::Repair {
            return Err(EngineError::Validation(format!(
                "category {} is priced automatically; book it as a domestic request",
                category.name
            )));
        }

        let estimate = sla_estimate(category.base_price, new.sla_priority)?;
        let request = Repository::insert_request(
            self.repo.pool(),
            client.id,
            &category,
            &new,
            ServiceStatus::Pending,
            None,
            Some(estimate),
            self.clock.now(),
        )
        .await?;

        info!(
            "Request {} created by client {} in {} (estimate {})",
            request.id, client.id, category.name, estimate
        );
        Ok(request)
    }

    /// Consult the diagnosis service and store its estimate.
    ///
    /// An upstream failure leaves the request in `pending`.
    pub async fn diagnose(
        &self,
        actor: &Actor,
        id: i64,
        mut prompt: DiagnosisPrompt,
    ) -> Result<AiDiagnosis, EngineError> {
        let transition = Transition::Diagnose;
        let request = self.load(id).await?;
        transition.check(Caller::Actor(actor), &request)?;

        if prompt.description.trim().is_empty() {
            prompt.description = request.description.clone();
        }
        debug!("Request {}: consulting diagnosis service", id);
        let outcome = self.diagnosis.diagnose(&prompt).await?.validate()?;

        let now = self.clock.now();
        let diagnosis = AiDiagnosis {
            service_request_id: id,
            classification: outcome.classification,
            urgency_level: outcome.urgency_level,
            estimated_duration: outcome.estimated_duration,
            materials: outcome.materials,
            price_range_min: outcome.price_range_min,
            price_range_max: outcome.price_range_max,
            diagnosis_fee: self.pricing.diagnosis_fee,
            explanation: outcome.explanation,
            created_at: now,
        };

        let mut tx = self.repo.begin().await?;
        let update = StatusUpdate::to(transition.target(), now);
        if !Repository::cas_status(&mut *tx, id, transition.allowed_from(), &update).await? {
            drop(tx);
            return Err(self.lost_race(id, transition).await);
        }
        Repository::insert_ai_diagnosis(&mut tx, &diagnosis).await?;
        tx.commit().await?;

        self.committed(&request, transition);
        Ok(diagnosis)
    }

    /// Create (or return the existing) diagnosis fee payment.
    pub async fn request_diagnosis_fee(
        &self,
        actor: &Actor,
        id: i64,
        method: PaymentMethod,
    ) -> Result<Payment, EngineError> {
        const ACTION: &str = "pay diagnosis fee";
        let request = self.load(id).await?;
        authorize(&[Party::Owner], Caller::Actor(actor), &request, ACTION)?;
        if request.kind != CategoryKind::Repair || request.status != ServiceStatus::AiDiagnosed {
            return Err(EngineError::InvalidTransition {
                from: request.status,
                action: ACTION,
            });
        }
        let diagnosis = self.ai_diagnosis_for(&request).await?;
        self.ledger
            .create_payment(id, PaymentKind::DiagnosisFee, diagnosis.diagnosis_fee, method)
            .await
    }

    /// Available providers for the request's category, each with its price band
    /// over the SLA-scaled diagnosis range.
    pub async fn candidate_providers(
        &self,
        actor: &Actor,
        id: i64,
    ) -> Result<Vec<ProviderCandidate>, EngineError> {
        const ACTION: &str = "list candidate providers";
        let request = self.load(id).await?;
        authorize(&[Party::Owner, Party::Admin], Caller::Actor(actor), &request, ACTION)?;
        let Some(diagnosis) = self.repo.get_ai_diagnosis(id).await? else {
            return Err(EngineError::InvalidTransition {
                from: request.status,
                action: ACTION,
            });
        };
        let category = self.category(request.category_id).await?;
        let (min, max) = sla_range(
            diagnosis.price_range_min,
            diagnosis.price_range_max,
            request.sla_priority,
        )?;

        Ok(self
            .repo
            .list_available_providers()
            .await?
            .into_iter()
            .filter(|p| self.catalog.matches_specialty(&p.specialty, &category.name))
            .map(|provider| {
                let reputation = Reputation::new(provider.rating, provider.total_ratings);
                ProviderCandidate {
                    band: price_band(min, max, &reputation),
                    provider,
                }
            })
            .collect())
    }

    /// `fee_paid -> provider_assigned`; the estimate becomes the midpoint of
    /// the chosen provider's band.
    pub async fn assign_provider(
        &self,
        actor: &Actor,
        id: i64,
        provider_id: i64,
    ) -> Result<ServiceRequest, EngineError> {
        let transition = Transition::AssignProvider;
        let request = self.load(id).await?;
        transition.check(Caller::Actor(actor), &request)?;

        let category = self.category(request.category_id).await?;
        let provider = self.eligible_provider(provider_id, &category).await?;
        let diagnosis = self.ai_diagnosis_for(&request).await?;
        let (min, max) = sla_range(
            diagnosis.price_range_min,
            diagnosis.price_range_max,
            request.sla_priority,
        )?;
        let band = price_band(
            min,
            max,
            &Reputation::new(provider.rating, provider.total_ratings),
        );
        let estimate = band.midpoint().round_money();

        let update = StatusUpdate::to(transition.target(), self.clock.now())
            .with_provider(provider.id)
            .with_estimated_price(estimate);
        if !Repository::cas_status(self.repo.pool(), id, transition.allowed_from(), &update).await? {
            return Err(self.lost_race(id, transition).await);
        }

        self.committed(&request, transition);
        self.events.publish(DomainEvent::ProviderAssigned {
            service_request_id: id,
            provider_id: provider.id,
        });
        self.load(id).await
    }

    /// Provider findings and cost breakdown. At `fee_paid` the submitting
    /// provider claims the job.
    pub async fn submit_provider_diagnosis(
        &self,
        actor: &Actor,
        id: i64,
        findings: ProviderFindings,
    ) -> Result<ProviderDiagnosis, EngineError> {
        let transition = Transition::SubmitProviderDiagnosis;
        let request = self.load(id).await?;
        transition.check(Caller::Actor(actor), &request)?;

        let claiming = request.provider_id.is_none();
        if claiming {
            let category = self.category(request.category_id).await?;
            self.eligible_provider(actor.id, &category).await?;
        }
        if findings.findings.trim().is_empty() {
            return Err(EngineError::Validation("findings must not be empty".to_string()));
        }
        if let Some(bad) = findings
            .materials
            .iter()
            .find(|m| m.quantity <= 0 || m.unit_price.is_negative())
        {
            return Err(EngineError::Validation(format!(
                "material {} needs a positive quantity and a non-negative price",
                bad.name
            )));
        }

        let materials_cost = findings.resolved_materials_cost();
        let quote = repair_quote(findings.labor_cost, materials_cost, self.pricing.repair_fee_percent)?;
        let now = self.clock.now();
        let diagnosis = ProviderDiagnosis {
            service_request_id: id,
            provider_id: actor.id,
            findings: findings.findings,
            labor_cost: findings.labor_cost,
            materials_cost,
            materials: findings.materials,
            created_at: now,
        };

        let mut tx = self.repo.begin().await?;
        let update = StatusUpdate::to(transition.target(), now)
            .with_provider(actor.id)
            .with_estimated_price(quote.total_price);
        if !Repository::cas_status(&mut *tx, id, transition.allowed_from(), &update).await? {
            drop(tx);
            return Err(self.lost_race(id, transition).await);
        }
        Repository::insert_provider_diagnosis(&mut tx, &diagnosis).await?;
        tx.commit().await?;

        self.committed(&request, transition);
        if claiming {
            self.events.publish(DomainEvent::ProviderAssigned {
                service_request_id: id,
                provider_id: actor.id,
            });
        }
        Ok(diagnosis)
    }

    /// `provider_diagnosed -> quote_sent`.
    pub async fn send_quote(&self, actor: &Actor, id: i64) -> Result<ServiceRequest, EngineError> {
        self.simple_transition(actor, id, Transition::SendQuote, |u| u)
            .await
    }

    /// `quote_sent -> accepted`: acceptance, payment and escrow commit together.
    ///
    /// The gateway is asked for a charge reference before the transaction, so
    /// an unavailable gateway commits nothing.
    pub async fn accept_quote(
        &self,
        actor: &Actor,
        id: i64,
        method: PaymentMethod,
        metadata: AcceptanceMetadata,
    ) -> Result<AcceptanceReceipt, EngineError> {
        let transition = Transition::AcceptQuote;
        let request = self.load(id).await?;
        transition.check(Caller::Actor(actor), &request)?;

        let Some(diagnosis) = self.repo.get_provider_diagnosis(id).await? else {
            return Err(EngineError::InvalidTransition {
                from: request.status,
                action: transition.action(),
            });
        };
        let breakdown = repair_quote(
            diagnosis.labor_cost,
            diagnosis.materials_cost,
            self.pricing.repair_fee_percent,
        )?;
        let shares = breakdown.escrow_shares()?;
        let payment_ref = self.ledger.initiate(breakdown.total_price, method).await?;

        let now = self.clock.now();
        let mut tx = self.repo.begin().await?;
        let update = StatusUpdate::to(transition.target(), now).with_final_price(breakdown.total_price);
        if !Repository::cas_status(&mut *tx, id, transition.allowed_from(), &update).await? {
            drop(tx);
            return Err(self.lost_race(id, transition).await);
        }
        let acceptance = Repository::insert_acceptance(
            &mut *tx,
            &acceptance_record(&request, breakdown, metadata, now),
        )
        .await?;
        let payment = Repository::insert_payment(
            &mut *tx,
            id,
            PaymentKind::Service,
            breakdown.total_price,
            method,
            &payment_ref,
            now,
        )
        .await?;
        let escrow = LedgerManager::create_escrow(&mut *tx, &payment, &shares, now).await?;
        tx.commit().await?;

        self.ledger.payment_recorded(&payment).await;
        self.committed(&request, transition);
        self.events.publish(DomainEvent::ServiceAccepted {
            service_request_id: id,
            total_price: breakdown.total_price,
        });

        Ok(AcceptanceReceipt {
            request: self.load(id).await?,
            acceptance,
            payment,
            escrow,
        })
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// `accepted -> in_progress`, opening the execution log. Work starts only
    /// once the service payment has cleared, so every escrow that can later be
    /// released is backed by collected funds.
    pub async fn start_execution(
        &self,
        actor: &Actor,
        id: i64,
        checkpoint: Checkpoint,
    ) -> Result<ExecutionLog, EngineError> {
        let transition = Transition::StartExecution;
        let request = self.load(id).await?;
        transition.check(Caller::Actor(actor), &request)?;
        self.require_cleared_service_payment(&request).await?;

        let now = self.clock.now();
        let log = ExecutionLog {
            service_request_id: id,
            provider_id: actor.id,
            started_at: now,
            start_location: checkpoint.location,
            ended_at: None,
            end_location: None,
            duration_minutes: None,
        };

        let mut tx = self.repo.begin().await?;
        let update = StatusUpdate::to(transition.target(), now);
        if !Repository::cas_status(&mut *tx, id, transition.allowed_from(), &update).await? {
            drop(tx);
            return Err(self.lost_race(id, transition).await);
        }
        Repository::open_execution(&mut *tx, &log).await?;
        tx.commit().await?;

        self.committed(&request, transition);
        Ok(log)
    }

    /// `in_progress -> awaiting_confirmation`, closing the execution log and
    /// running the anti-fraud rules. Flags never fail the transition.
    pub async fn complete_execution(
        &self,
        actor: &Actor,
        id: i64,
        checkpoint: Checkpoint,
    ) -> Result<CompletionReport, EngineError> {
        let transition = Transition::CompleteExecution;
        let request = self.load(id).await?;
        transition.check(Caller::Actor(actor), &request)?;

        let now = self.clock.now();
        let ended_at = now;

        let mut tx = self.repo.begin().await?;
        let update = StatusUpdate::to(transition.target(), now);
        if !Repository::cas_status(&mut *tx, id, transition.allowed_from(), &update).await? {
            drop(tx);
            return Err(self.lost_race(id, transition).await);
        }
        let log = Repository::fetch_execution_log(&mut *tx, id)
            .await?
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!("request {} has no execution log", id))
            })?;
        if ended_at < log.started_at {
            return Err(EngineError::InvariantViolation(format!(
                "execution cannot end at {} before it started at {}",
                ended_at.as_ms(),
                log.started_at.as_ms()
            )));
        }
        let duration_minutes = log.started_at.minutes_until(ended_at);
        if !Repository::close_execution(&mut *tx, id, ended_at, checkpoint.location, duration_minutes)
            .await?
        {
            return Err(EngineError::InvariantViolation(format!(
                "execution log for request {} already closed",
                id
            )));
        }
        tx.commit().await?;

        self.committed(&request, transition);
        let flags = self.antifraud.inspect(id).await;

        Ok(CompletionReport {
            request: self.load(id).await?,
            execution: ExecutionLog {
                ended_at: Some(ended_at),
                end_location: checkpoint.location,
                duration_minutes: Some(duration_minutes),
                ..log
            },
            flags,
        })
    }

    /// `awaiting_confirmation -> completed`, then release the escrow.
    ///
    /// A failed release is logged; it can be retried and never reverts the transition.
    pub async fn confirm_completion(
        &self,
        actor: &Actor,
        id: i64,
    ) -> Result<ServiceRequest, EngineError> {
        let request = self
            .simple_transition(actor, id, Transition::ConfirmCompletion, StatusUpdate::completed)
            .await?;
        if let Err(e) = self.ledger.release_for_request(id).await {
            error!("Escrow release for request {} failed: {}", id, e);
        }
        Ok(request)
    }

    /// Cancel a request that has not been accepted yet.
    pub async fn cancel(&self, actor: &Actor, id: i64) -> Result<ServiceRequest, EngineError> {
        self.simple_transition(actor, id, Transition::Cancel, |u| u)
            .await
    }

    // =========================================================================
    // Domestic fast path
    // =========================================================================

    pub fn quote_domestic(&self, details: &DomesticDetails) -> DomesticQuote {
        price_domestic(details, self.pricing.domestic_fee_percent)
    }

    /// Book a domestic job: priced automatically, stored at `ai_diagnosed`
    /// with the chosen provider attached.
    pub async fn create_domestic_request(
        &self,
        actor: &Actor,
        new: NewDomesticRequest,
    ) -> Result<DomesticBooking, EngineError> {
        Self::require_client(actor, "book domestic service")?;
        let client = self
            .repo
            .get_client(actor.id)
            .await?
            .ok_or_else(|| EngineError::not_found("client", actor.id))?;
        let category = self.category(new.category_id).await?;
        if category.kind != CategoryKind::Domestic {
            return Err(EngineError::Validation(format!(
                "category {} needs a provider quote; create a repair request",
                category.name
            )));
        }
        let provider = self.eligible_provider(new.provider_id, &category).await?;
        let quote = self.quote_domestic(&new.details);

        let input = NewServiceRequest {
            category_id: category.id,
            title: new
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("{} ({})", category.name, new.details)),
            description: new.description,
            sla_priority: SlaPriority::Standard,
            location: new.location,
        };
        let now = self.clock.now();

        let mut tx = self.repo.begin().await?;
        let request = Repository::insert_request(
            &mut *tx,
            client.id,
            &category,
            &input,
            ServiceStatus::AiDiagnosed,
            Some(provider.id),
            Some(quote.final_price),
            now,
        )
        .await?;
        Repository::insert_domestic_details(&mut *tx, request.id, &new.details, &quote).await?;
        let diagnosis = AiDiagnosis {
            service_request_id: request.id,
            classification: category.name.clone(),
            urgency_level: "scheduled".to_string(),
            estimated_duration: None,
            materials: Vec::new(),
            price_range_min: quote.final_price,
            price_range_max: quote.final_price,
            diagnosis_fee: quote.platform_fee,
            explanation: new.details.to_string(),
            created_at: now,
        };
        Repository::insert_ai_diagnosis(&mut tx, &diagnosis).await?;
        tx.commit().await?;

        info!(
            "Domestic request {} booked with provider {} at {}",
            request.id, provider.id, quote.final_price
        );
        self.events.publish(DomainEvent::ProviderAssigned {
            service_request_id: request.id,
            provider_id: provider.id,
        });

        Ok(DomesticBooking {
            request,
            details: new.details,
            quote,
        })
    }

    /// Create (or return the existing) service payment for a domestic booking.
    pub async fn pay_domestic(
        &self,
        actor: &Actor,
        id: i64,
        method: PaymentMethod,
    ) -> Result<Payment, EngineError> {
        const ACTION: &str = "pay domestic service";
        let request = self.load(id).await?;
        authorize(&[Party::Owner], Caller::Actor(actor), &request, ACTION)?;
        if request.kind != CategoryKind::Domestic || request.status != ServiceStatus::AiDiagnosed {
            return Err(EngineError::InvalidTransition {
                from: request.status,
                action: ACTION,
            });
        }
        let (_, quote) = self.repo.get_domestic_details(id).await?.ok_or_else(|| {
            EngineError::InvariantViolation(format!("domestic request {} has no details", id))
        })?;
        self.ledger
            .create_payment(id, PaymentKind::Service, quote.final_price, method)
            .await
    }

    // =========================================================================
    // Payment confirmations
    // =========================================================================

    /// Apply a gateway confirmation. Returns false if the payment was already
    /// confirmed, so replays are harmless.
    pub async fn on_payment_confirmed(&self, payment_ref: &str) -> Result<bool, EngineError> {
        let payment = self
            .repo
            .get_payment_by_ref(payment_ref)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_ref))?;
        match payment.status {
            PaymentStatus::Completed => {
                debug!("Payment {} already confirmed", payment_ref);
                return Ok(false);
            }
            PaymentStatus::Failed => {
                return Err(EngineError::Validation(format!(
                    "payment {} has failed and cannot be confirmed",
                    payment_ref
                )))
            }
            PaymentStatus::Pending => {}
        }

        let request = self.load(payment.service_request_id).await?;
        let applied = match (payment.kind, request.kind) {
            (PaymentKind::DiagnosisFee, _) => self.confirm_diagnosis_fee(&payment, &request).await?,
            (PaymentKind::Service, CategoryKind::Domestic) => {
                self.confirm_domestic_payment(&payment, &request).await?
            }
            (PaymentKind::Service, CategoryKind::Repair) => {
                Repository::mark_payment_completed(self.repo.pool(), payment_ref, self.clock.now())
                    .await?
            }
        };

        if applied {
            info!(
                "Payment {} ({}) confirmed for request {}",
                payment.id,
                payment.kind.as_str(),
                request.id
            );
            self.events.publish(DomainEvent::PaymentConfirmed {
                service_request_id: request.id,
                payment_id: payment.id,
            });
        }
        Ok(applied)
    }

    async fn confirm_diagnosis_fee(
        &self,
        payment: &Payment,
        request: &ServiceRequest,
    ) -> Result<bool, EngineError> {
        let transition = Transition::ConfirmDiagnosisFee;
        authorize(transition.parties(), Caller::Gateway, request, transition.action())?;

        let now = self.clock.now();
        let mut tx = self.repo.begin().await?;
        if !Repository::mark_payment_completed(&mut *tx, &payment.payment_ref, now).await? {
            return Ok(false);
        }
        let update = StatusUpdate::to(transition.target(), now);
        if !Repository::cas_status(&mut *tx, request.id, transition.allowed_from(), &update).await? {
            return self
                .record_late_confirmation(tx, payment, request.id, transition)
                .await;
        }
        tx.commit().await?;

        self.committed(request, transition);
        Ok(true)
    }

    /// Domestic fast path: `ai_diagnosed -> accepted` with acceptance and
    /// escrow. The provider's share is the price net of the platform fee.
    async fn confirm_domestic_payment(
        &self,
        payment: &Payment,
        request: &ServiceRequest,
    ) -> Result<bool, EngineError> {
        let transition = Transition::ConfirmDomesticPayment;
        authorize(transition.parties(), Caller::Gateway, request, transition.action())?;

        let (_, quote) = self
            .repo
            .get_domestic_details(request.id)
            .await?
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "domestic request {} has no details",
                    request.id
                ))
            })?;
        let breakdown = QuoteBreakdown {
            labor_cost: quote.final_price - quote.platform_fee,
            materials_cost: Decimal::zero(),
            platform_fee: quote.platform_fee,
            total_price: quote.final_price,
        };
        let shares = breakdown.escrow_shares()?;

        let now = self.clock.now();
        let mut tx = self.repo.begin().await?;
        if !Repository::mark_payment_completed(&mut *tx, &payment.payment_ref, now).await? {
            return Ok(false);
        }
        let update =
            StatusUpdate::to(transition.target(), now).with_final_price(breakdown.total_price);
        if !Repository::cas_status(&mut *tx, request.id, transition.allowed_from(), &update).await? {
            return self
                .record_late_confirmation(tx, payment, request.id, transition)
                .await;
        }
        Repository::insert_acceptance(
            &mut *tx,
            &acceptance_record(request, breakdown, AcceptanceMetadata::default(), now),
        )
        .await?;
        LedgerManager::create_escrow(&mut *tx, payment, &shares, now).await?;
        tx.commit().await?;

        self.committed(request, transition);
        self.events.publish(DomainEvent::ServiceAccepted {
            service_request_id: request.id,
            total_price: breakdown.total_price,
        });
        Ok(true)
    }

    pub async fn fail_payment(&self, payment_ref: &str) -> Result<Payment, EngineError> {
        self.ledger.fail_payment(payment_ref).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Full aggregate, visible to the owner, the assigned provider and admins.
    pub async fn view(&self, actor: &Actor, id: i64) -> Result<RequestView, EngineError> {
        let request = self.load(id).await?;
        authorize(
            &[Party::Owner, Party::AssignedProvider, Party::Admin],
            Caller::Actor(actor),
            &request,
            "view service request",
        )?;

        let (ai_diagnosis, provider_diagnosis, domestic, acceptance, payments, escrow, execution, review) = futures::try_join!(
            self.repo.get_ai_diagnosis(id),
            self.repo.get_provider_diagnosis(id),
            self.repo.get_domestic_details(id),
            self.repo.get_acceptance(id),
            self.repo.list_payments(id),
            self.repo.get_escrow_for_request(id),
            self.repo.get_execution_log(id),
            self.repo.get_review(id),
        )?;

        Ok(RequestView {
            request,
            ai_diagnosis,
            provider_diagnosis,
            domestic: domestic.map(|(details, quote)| DomesticBookingDetails { details, quote }),
            acceptance,
            payments,
            escrow,
            execution,
            review,
        })
    }
}

fn acceptance_record(
    request: &ServiceRequest,
    breakdown: QuoteBreakdown,
    metadata: AcceptanceMetadata,
    accepted_at: TimeMs,
) -> DigitalAcceptance {
    let fingerprint = DigitalAcceptance::compute_fingerprint(
        request.id,
        request.client_id,
        &breakdown,
        &metadata,
        accepted_at,
    );
    DigitalAcceptance {
        id: 0,
        service_request_id: request.id,
        client_id: request.client_id,
        breakdown,
        metadata,
        fingerprint,
        accepted_at,
    }
}
