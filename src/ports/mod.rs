//! Boundaries between the saga engine and the outside world.

pub mod cache;
pub mod events;
pub mod gateways;
pub mod repository;
pub mod translate;

pub use cache::CacheStore;
pub use events::EventEmitter;
pub use gateways::{
    ComplianceGateway, EmailMessage, FraudDetectionRequest, InfractionRequest, IssueKind,
    IssueRequest, IssueTrackerGateway, IssueUpdate, OperationRequest, OperationService,
    PixPaymentGateway, SmsGateway, SmsMessage, SmtpGateway, TransferKind, TransferOrder,
    TransferReceipt, TransferStatus, UserService, WarningTransactionRequest,
};
pub use repository::{DevolutionRepositoryExt, EntityRepository, ThresholdComparison};
pub use translate::Translator;
