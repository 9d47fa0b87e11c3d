pub mod health;
pub mod kyc_webhook;
pub mod scan_document;
pub mod verify_insurance;
