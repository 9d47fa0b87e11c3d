//! RentGuard Services Layer
//!
//! The verification pipeline: document fetching, prompt building, model
//! calls, reply parsing and scoring for insurance documents, and the KYC
//! webhook flow with its outbox of side effects. The API crate only wires
//! these services to HTTP.

pub mod fetcher;
pub mod kyc;
pub mod model;
pub mod outbox;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod scoring;
pub mod url_guard;

pub use fetcher::{DocumentFetcher, DocumentSource, InlineImage, PreparedDocument};
pub use kyc::{KycWebhookService, MediaRetriever, MediaSource, WebhookOutcome};
pub use model::{with_credential_fallback, CompletionModel, ModelClient};
pub use outbox::{OutboxDispatcher, OutboxRetryService, OutboxRetryServiceConfig};
pub use parser::{ParseResult, StatusGuess};
pub use pipeline::{DocumentScanner, InsuranceVerifier, ScanWriter, VerificationRequest};
pub use prompts::Prompt;
pub use rentguard_storage::{create_storage, LocalStorage, Storage, StorageError, StorageResult};
