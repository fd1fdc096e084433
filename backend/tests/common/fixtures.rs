//! Test fixtures for the catalogue API tests
//!
//! Provides one account per catalogue role and one investigation (with a
//! study and an assay) per security level, wired up the way the
//! `seed-testdata` command does it.

#![allow(dead_code)]

use std::collections::HashMap;

use isa_catalogue_backend::models::assay::AssayInput;
use isa_catalogue_backend::models::choices::{MeasurementType, TechnologyPlatform};
use isa_catalogue_backend::models::investigation::InvestigationInput;
use isa_catalogue_backend::models::role::{AssignedRole, ResourceKind};
use isa_catalogue_backend::models::security_level::SecurityLevel;
use isa_catalogue_backend::models::study::StudyInput;

use super::TestApp;

/// Roles in the order used by the permission matrix tests.
pub const ROLES: [&str; 6] = ["guest", "internal", "authorized", "contributor", "owner", "admin"];

/// Records created for one security level.
#[derive(Debug, Clone)]
pub struct LevelRecords {
    pub investigation: String,
    pub study: String,
    pub assay: String,
}

/// Accounts (with API tokens) and records for the full matrix.
pub struct Catalogue {
    pub tokens: HashMap<&'static str, String>,
    pub records: HashMap<SecurityLevel, LevelRecords>,
}

impl Catalogue {
    pub fn token(&self, role: &str) -> &str {
        &self.tokens[role]
    }

    pub fn level(&self, level: SecurityLevel) -> &LevelRecords {
        &self.records[&level]
    }
}

/// Build the matrix scenario:
///
/// - `guest`: plain user without roles
/// - `internal`: staff user without roles
/// - `authorized`, `contributor`: assigned that role on every investigation
///   and study
/// - `owner`: creator of every record
/// - `admin`: superuser
pub async fn catalogue(app: &TestApp) -> Catalogue {
    let mut tokens = HashMap::new();
    let mut users = HashMap::new();
    for role in ROLES {
        let user = app
            .create_user(role, role == "internal", role == "admin")
            .await;
        tokens.insert(role, app.token_for(&user).await);
        users.insert(role, user);
    }

    let owner = users["owner"].id;
    let store = &app.store;
    let mut records = HashMap::new();
    for level in SecurityLevel::ALL {
        let investigation = store
            .create_investigation(
                &InvestigationInput {
                    title: format!("{} investigation", level.label()),
                    security_level: level,
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();
        let study = store
            .create_study(
                &StudyInput {
                    investigation_id: investigation.id,
                    title: format!("{} study", level.label()),
                    security_level: level,
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();
        let assay = store
            .create_assay(
                &AssayInput {
                    study_id: study.id,
                    title: format!("{} assay", level.label()),
                    description: String::new(),
                    measurement_type: MeasurementType::Genomics,
                    technology_platform: TechnologyPlatform::Seq,
                },
                owner,
            )
            .await
            .unwrap();

        for (username, role) in [
            ("authorized", AssignedRole::Authorized),
            ("contributor", AssignedRole::Contributor),
        ] {
            let user_id = users[username].id;
            store
                .set_role(user_id, ResourceKind::Investigation, investigation.id, role)
                .await
                .unwrap();
            store
                .set_role(user_id, ResourceKind::Study, study.id, role)
                .await
                .unwrap();
        }

        records.insert(
            level,
            LevelRecords {
                investigation: investigation.accession_code,
                study: study.accession_code,
                assay: assay.accession_code,
            },
        );
    }

    Catalogue { tokens, records }
}
