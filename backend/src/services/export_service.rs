//! ISA folder-structure export.
//!
//! Renders one investigation as a nested folder tree that a client can
//! materialise on disk for data organisation:
//!
//! ```text
//! i_CXRP1/
//!   _readme
//!   investigation.json
//!   s_CXRP1-CXRS2/
//!     _readme
//!     study.json
//!     a_CXRP1-CXRS2-CXRA3/
//!       _readme
//!       assay.json
//!       raw-data/_readme
//!       processed/_readme
//! ```
//!
//! Only studies and assays the caller can read are included.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::assay::Assay;
use crate::models::investigation::Investigation;
use crate::models::role::ResourceKind;
use crate::models::study::{Study, StudyFilter};
use crate::services::assay_service::AssayService;
use crate::services::investigation_service::InvestigationService;
use crate::services::rbac::Principal;
use crate::services::study_service::{StudyService, StudyView};
use crate::storage::CatalogueStore;

const DO_NOT_MODIFY: &str = "**DO NOT MODIFY THIS FILE MANUALLY**";

/// A file (its text content) or a folder of named entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IsaNode {
    File(String),
    Folder(BTreeMap<String, IsaNode>),
}

impl IsaNode {
    fn folder() -> Self {
        IsaNode::Folder(BTreeMap::new())
    }

    fn insert(&mut self, name: impl Into<String>, node: IsaNode) {
        if let IsaNode::Folder(entries) = self {
            entries.insert(name.into(), node);
        }
    }

    /// Entry of a folder; `None` for files.
    pub fn get(&self, name: &str) -> Option<&IsaNode> {
        match self {
            IsaNode::Folder(entries) => entries.get(name),
            IsaNode::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&str> {
        match self {
            IsaNode::File(content) => Some(content),
            IsaNode::Folder(_) => None,
        }
    }
}

/// Turn user input into an investigation accession code.
///
/// Accepts the code in any case, the common `CRXP` transposition and a bare
/// numeric id. Trailing slashes are ignored.
pub fn investigation_code(raw: &str) -> Option<String> {
    let code = raw.trim().trim_end_matches('/').to_ascii_uppercase();
    let code = if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) {
        ResourceKind::Investigation.accession_code(code.parse().ok()?)
    } else if let Some(rest) = code.strip_prefix("CRXP") {
        format!("{}{}", ResourceKind::Investigation.prefix(), rest)
    } else {
        code
    };
    match ResourceKind::parse_accession(&code)? {
        (ResourceKind::Investigation, _) => Some(code),
        _ => None,
    }
}

fn readme(heading: &str, body: &str) -> IsaNode {
    IsaNode::File(format!("# {}\n\n{}\n\n{}", heading, body, DO_NOT_MODIFY))
}

fn iso_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

fn json_file(value: serde_json::Value) -> Result<IsaNode> {
    serde_json::to_string_pretty(&value)
        .map(IsaNode::File)
        .map_err(|e| AppError::Internal(format!("Failed to render export file: {}", e)))
}

fn study_dir(investigation: &Investigation, study: &Study) -> String {
    format!("s_{}-{}", investigation.accession_code, study.accession_code)
}

fn assay_dir(investigation: &Investigation, study: &Study, assay: &Assay) -> String {
    format!(
        "a_{}-{}-{}",
        investigation.accession_code, study.accession_code, assay.accession_code
    )
}

pub struct ExportService {
    store: Arc<dyn CatalogueStore>,
}

impl ExportService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    /// Folder tree for a readable investigation, keyed by its top-level
    /// directory name.
    pub async fn isa_tree(&self, principal: &Principal, raw_code: &str) -> Result<IsaNode> {
        if raw_code.trim().trim_end_matches('/').is_empty() {
            return Err(AppError::Validation(
                "Investigation ID or accession code required".into(),
            ));
        }
        let code = investigation_code(raw_code).ok_or_else(|| {
            AppError::NotFound(format!(
                "Investigation not found with ID or accession code: {}",
                raw_code
            ))
        })?;

        let investigation = InvestigationService::new(self.store.clone())
            .get(principal, &code)
            .await?
            .investigation;
        let studies = StudyService::new(self.store.clone())
            .list(principal, &StudyFilter::for_investigation(investigation.id))
            .await?;

        let mut root = IsaNode::folder();
        root.insert(
            "_readme",
            readme(
                &format!("Investigation: {}", investigation.accession_code),
                &investigation.title,
            ),
        );
        root.insert("investigation.json", investigation_json(&investigation, &studies)?);

        let assays = AssayService::new(self.store.clone());
        for view in &studies {
            let study_assays = assays.list_in_study(principal, &view.study).await?;
            let mut folder = study_folder(&view.study)?;
            for assay_view in &study_assays {
                folder.insert(
                    assay_dir(&investigation, &view.study, &assay_view.assay),
                    assay_folder(&assay_view.assay)?,
                );
            }
            root.insert(study_dir(&investigation, &view.study), folder);
        }

        tracing::info!(
            accession_code = %investigation.accession_code,
            studies = studies.len(),
            "ISA structure exported"
        );
        let mut tree = IsaNode::folder();
        tree.insert(format!("i_{}", investigation.accession_code), root);
        Ok(tree)
    }
}

fn investigation_json(investigation: &Investigation, studies: &[StudyView]) -> Result<IsaNode> {
    let study_list: Vec<_> = studies
        .iter()
        .map(|view| {
            let mut id = study_dir(investigation, &view.study);
            if let Some(slug) = view.study.slug.as_deref().filter(|s| !s.is_empty()) {
                id.push_str("__");
                id.push_str(slug);
            }
            json!({ "study_id": id, "study_title": view.study.title })
        })
        .collect();

    json_file(json!({
        "investigation_id": investigation.accession_code,
        "investigation_title": investigation.title,
        "investigation_description": investigation.description,
        "investigation_submission_date": iso_date(investigation.submission_date),
        "investigation_public_release_date": iso_date(investigation.public_release_date),
        "investigation_security_level": investigation.security_level,
        "studies": study_list,
    }))
}

fn study_folder(study: &Study) -> Result<IsaNode> {
    let mut folder = IsaNode::folder();
    folder.insert(
        "_readme",
        readme(&format!("Study: {}", study.accession_code), &study.title),
    );
    folder.insert(
        "study.json",
        json_file(json!({
            "study_id": study.accession_code,
            "study_title": study.title,
            "study_security_level": study.security_level,
            "study_description": study.description.clone().unwrap_or_default(),
            "study_submission_date": iso_date(study.submission_date),
            "study_public_release_date": iso_date(study.public_release_date),
        }))?,
    );
    Ok(folder)
}

fn assay_folder(assay: &Assay) -> Result<IsaNode> {
    let mut folder = IsaNode::folder();
    folder.insert(
        "_readme",
        readme(&format!("Assay: {}", assay.accession_code), &assay.title),
    );
    folder.insert(
        "assay.json",
        json_file(json!({
            "assay_id": assay.accession_code,
            "assay_title": assay.title,
            "assay_measurement_type": assay.measurement_type,
            "assay_technology_platform": assay.technology_platform,
            "assay_description": assay.description,
        }))?,
    );

    let mut raw = IsaNode::folder();
    raw.insert("_readme", readme("Raw Data", "Place raw data files here."));
    folder.insert("raw-data", raw);

    let mut processed = IsaNode::folder();
    processed.insert(
        "_readme",
        readme("Processed Data", "Place processed data files here."),
    );
    folder.insert("processed", processed);
    Ok(folder)
}
