//! KYC gate
//!
//! Document review happens in an external service. Dispatch only asks whether every
//! required document of a worker is approved, and never changes a status itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ruta_common::{Result, WorkerId};

/// Identity document a worker submits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    DriversLicense,
    GovernmentId,
    VehicleRegistration,
    ProfilePhoto,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::DriversLicense => "drivers_license",
            DocumentType::GovernmentId => "government_id",
            DocumentType::VehicleRegistration => "vehicle_registration",
            DocumentType::ProfilePhoto => "profile_photo",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "drivers_license" => Ok(DocumentType::DriversLicense),
            "government_id" => Ok(DocumentType::GovernmentId),
            "vehicle_registration" => Ok(DocumentType::VehicleRegistration),
            "profile_photo" => Ok(DocumentType::ProfilePhoto),
            other => Err(format!("unknown document type: {}", other)),
        }
    }
}

/// Review outcome of a submitted document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

/// Eligibility query the dispatch core depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KycGate: Send + Sync {
    /// True iff every document in `required` is approved for the worker
    async fn is_eligible(&self, worker_id: &WorkerId, required: &[DocumentType]) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    status: DocumentStatus,
    reviewed_at: DateTime<Utc>,
}

/// In-memory stand-in for the external document review service
#[derive(Default)]
pub struct InMemoryKycRegistry {
    documents: DashMap<WorkerId, HashMap<DocumentType, DocumentRecord>>,
}

impl InMemoryKycRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a review outcome, as the external reviewer would
    pub fn set_status(&self, worker_id: WorkerId, document: DocumentType, status: DocumentStatus) {
        self.documents.entry(worker_id).or_default().insert(
            document,
            DocumentRecord {
                status,
                reviewed_at: Utc::now(),
            },
        );
    }

    /// Approve every listed document
    pub fn approve_all(&self, worker_id: WorkerId, documents: &[DocumentType]) {
        for document in documents {
            self.set_status(worker_id, *document, DocumentStatus::Approved);
        }
    }

    pub fn status(&self, worker_id: &WorkerId, document: DocumentType) -> Option<DocumentStatus> {
        self.documents
            .get(worker_id)
            .and_then(|docs| docs.get(&document).map(|r| r.status))
    }

    /// When a document was last reviewed
    pub fn reviewed_at(&self, worker_id: &WorkerId, document: DocumentType) -> Option<DateTime<Utc>> {
        self.documents
            .get(worker_id)
            .and_then(|docs| docs.get(&document).map(|r| r.reviewed_at))
    }
}

#[async_trait]
impl KycGate for InMemoryKycRegistry {
    async fn is_eligible(&self, worker_id: &WorkerId, required: &[DocumentType]) -> Result<bool> {
        let Some(docs) = self.documents.get(worker_id) else {
            return Ok(required.is_empty());
        };
        Ok(required.iter().all(|doc| {
            docs.get(doc)
                .map(|r| r.status == DocumentStatus::Approved)
                .unwrap_or(false)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIDE_DOCS: [DocumentType; 3] = [
        DocumentType::DriversLicense,
        DocumentType::GovernmentId,
        DocumentType::VehicleRegistration,
    ];

    #[tokio::test]
    async fn test_unknown_worker_not_eligible() {
        let registry = InMemoryKycRegistry::new();
        assert!(!registry.is_eligible(&WorkerId::new(), &RIDE_DOCS).await.unwrap());
        assert!(registry.is_eligible(&WorkerId::new(), &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_all_required_must_be_approved() {
        let registry = InMemoryKycRegistry::new();
        let worker = WorkerId::new();

        registry.set_status(worker, DocumentType::DriversLicense, DocumentStatus::Approved);
        registry.set_status(worker, DocumentType::GovernmentId, DocumentStatus::Approved);
        registry.set_status(worker, DocumentType::VehicleRegistration, DocumentStatus::Pending);
        assert!(!registry.is_eligible(&worker, &RIDE_DOCS).await.unwrap());

        registry.set_status(worker, DocumentType::VehicleRegistration, DocumentStatus::Approved);
        assert!(registry.is_eligible(&worker, &RIDE_DOCS).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejection_revokes_eligibility() {
        let registry = InMemoryKycRegistry::new();
        let worker = WorkerId::new();
        registry.approve_all(worker, &RIDE_DOCS);

        registry.set_status(worker, DocumentType::DriversLicense, DocumentStatus::Rejected);
        assert!(!registry.is_eligible(&worker, &RIDE_DOCS).await.unwrap());
        assert_eq!(
            registry.status(&worker, DocumentType::DriversLicense),
            Some(DocumentStatus::Rejected)
        );
        assert!(registry.reviewed_at(&worker, DocumentType::DriversLicense).is_some());
    }

    #[test]
    fn test_document_type_parse() {
        assert_eq!(
            "vehicle_registration".parse::<DocumentType>(),
            Ok(DocumentType::VehicleRegistration)
        );
        assert!("passport_selfie".parse::<DocumentType>().is_err());
    }
}
