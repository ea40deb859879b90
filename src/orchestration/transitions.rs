//! Declarative lifecycle table: for each transition, where it may start,
//! where it lands and who may trigger it.

use crate::domain::{Actor, Role, ServiceRequest, ServiceStatus};
use crate::error::EngineError;

/// Who may trigger a transition, relative to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// The client who created the request.
    Owner,
    /// The provider attached to the request.
    AssignedProvider,
    /// Any provider while none is attached, otherwise only the attached one.
    Provider,
    Admin,
    /// The payment confirmation path.
    Gateway,
}

/// The origin of a call into the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller<'a> {
    Actor(&'a Actor),
    Gateway,
}

impl Party {
    fn admits(&self, caller: Caller<'_>, request: &ServiceRequest) -> bool {
        let actor = match (self, caller) {
            (Party::Gateway, Caller::Gateway) => return true,
            (_, Caller::Gateway) | (Party::Gateway, _) => return false,
            (_, Caller::Actor(actor)) => actor,
        };
        match self {
            Party::Owner => actor.role == Role::Client && request.is_owned_by(actor.id),
            Party::AssignedProvider => {
                actor.role == Role::Provider && request.is_assigned_to(actor.id)
            }
            Party::Provider => {
                actor.role == Role::Provider
                    && request.provider_id.map_or(true, |id| id == actor.id)
            }
            Party::Admin => actor.role == Role::Admin,
            Party::Gateway => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Diagnose,
    ConfirmDiagnosisFee,
    AssignProvider,
    SubmitProviderDiagnosis,
    SendQuote,
    AcceptQuote,
    /// Domestic fast path: payment clears and the job is accepted directly.
    ConfirmDomesticPayment,
    StartExecution,
    CompleteExecution,
    ConfirmCompletion,
    Cancel,
}

impl Transition {
    pub const ALL: [Transition; 11] = [
        Transition::Diagnose,
        Transition::ConfirmDiagnosisFee,
        Transition::AssignProvider,
        Transition::SubmitProviderDiagnosis,
        Transition::SendQuote,
        Transition::AcceptQuote,
        Transition::ConfirmDomesticPayment,
        Transition::StartExecution,
        Transition::CompleteExecution,
        Transition::ConfirmCompletion,
        Transition::Cancel,
    ];

    pub fn action(&self) -> &'static str {
        match self {
            Transition::Diagnose => "request diagnosis",
            Transition::ConfirmDiagnosisFee => "confirm diagnosis fee",
            Transition::AssignProvider => "assign provider",
            Transition::SubmitProviderDiagnosis => "submit provider diagnosis",
            Transition::SendQuote => "send quote",
            Transition::AcceptQuote => "accept quote",
            Transition::ConfirmDomesticPayment => "confirm domestic payment",
            Transition::StartExecution => "start execution",
            Transition::CompleteExecution => "complete execution",
            Transition::ConfirmCompletion => "confirm completion",
            Transition::Cancel => "cancel",
        }
    }

    pub fn allowed_from(&self) -> &'static [ServiceStatus] {
        use ServiceStatus::*;
        match self {
            Transition::Diagnose => &[Pending],
            Transition::ConfirmDiagnosisFee => &[AiDiagnosed],
            Transition::AssignProvider => &[FeePaid],
            Transition::SubmitProviderDiagnosis => &[FeePaid, ProviderAssigned],
            Transition::SendQuote => &[ProviderDiagnosed],
            Transition::AcceptQuote => &[QuoteSent],
            Transition::ConfirmDomesticPayment => &[AiDiagnosed],
            Transition::StartExecution => &[Accepted],
            Transition::CompleteExecution => &[InProgress],
            Transition::ConfirmCompletion => &[AwaitingConfirmation],
            Transition::Cancel => &[Pending, AiDiagnosed, FeePaid],
        }
    }

    pub fn target(&self) -> ServiceStatus {
        use ServiceStatus::*;
        match self {
            Transition::Diagnose => AiDiagnosed,
            Transition::ConfirmDiagnosisFee => FeePaid,
            Transition::AssignProvider => ProviderAssigned,
            Transition::SubmitProviderDiagnosis => ProviderDiagnosed,
            Transition::SendQuote => QuoteSent,
            Transition::AcceptQuote | Transition::ConfirmDomesticPayment => Accepted,
            Transition::StartExecution => InProgress,
            Transition::CompleteExecution => AwaitingConfirmation,
            Transition::ConfirmCompletion => Completed,
            Transition::Cancel => Cancelled,
        }
    }

    pub fn parties(&self) -> &'static [Party] {
        match self {
            Transition::Diagnose
            | Transition::AssignProvider
            | Transition::AcceptQuote
            | Transition::ConfirmCompletion => &[Party::Owner],
            Transition::SubmitProviderDiagnosis => &[Party::Provider],
            Transition::SendQuote
            | Transition::StartExecution
            | Transition::CompleteExecution => &[Party::AssignedProvider],
            Transition::ConfirmDiagnosisFee | Transition::ConfirmDomesticPayment => {
                &[Party::Gateway]
            }
            Transition::Cancel => &[Party::Owner, Party::Admin],
        }
    }

    /// Role check first, then status check. Neither writes anything.
    pub fn check(&self, caller: Caller<'_>, request: &ServiceRequest) -> Result<(), EngineError> {
        authorize(self.parties(), caller, request, self.action())?;
        self.check_status(request.status)
    }

    pub fn check_status(&self, current: ServiceStatus) -> Result<(), EngineError> {
        if self.allowed_from().contains(&current) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: current,
                action: self.action(),
            })
        }
    }
}

/// Fail with `Unauthorized` unless one of `parties` admits the caller.
pub fn authorize(
    parties: &[Party],
    caller: Caller<'_>,
    request: &ServiceRequest,
    action: &'static str,
) -> Result<(), EngineError> {
    if parties.iter().any(|p| p.admits(caller, request)) {
        return Ok(());
    }
    let (actor_id, role) = match caller {
        Caller::Actor(actor) => (actor.id, actor.role),
        // System identity.
        Caller::Gateway => (0, Role::Admin),
    };
    Err(EngineError::Unauthorized {
        actor_id,
        role,
        action,
    })
}
