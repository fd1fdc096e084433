//! Institution administration and investigation participation.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::institution::{
    Institution, InstitutionInput, InstitutionLink, InvestigationInstitution,
};
use crate::models::investigation::Investigation;
use crate::models::role::ResourceKind;
use crate::services::not_found;
use crate::storage::CatalogueStore;

fn institution_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Institution {} not found", id))
}

pub struct InstitutionService {
    store: Arc<dyn CatalogueStore>,
}

impl InstitutionService {
    pub fn new(store: Arc<dyn CatalogueStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, search: Option<&str>) -> Result<Vec<Institution>> {
        self.store.list_institutions(search).await
    }

    pub async fn get(&self, id: i64) -> Result<Institution> {
        self.store
            .get_institution(id)
            .await?
            .ok_or_else(|| institution_not_found(id))
    }

    pub async fn create(&self, mut input: InstitutionInput) -> Result<Institution> {
        input.validate()?;
        let institution = self.store.create_institution(&input).await?;
        tracing::info!(id = institution.id, name = %institution.name, "Institution created");
        Ok(institution)
    }

    pub async fn update<F>(&self, id: i64, build: F) -> Result<Institution>
    where
        F: FnOnce(&Institution) -> Result<InstitutionInput> + Send,
    {
        let current = self.get(id).await?;
        let mut input = build(&current)?;
        input.validate()?;
        self.store.update_institution(id, &input).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.store.delete_institution(id).await?;
        tracing::info!(id, "Institution deleted");
        Ok(())
    }

    async fn investigation(&self, accession_code: &str) -> Result<Investigation> {
        self.store
            .find_investigation(accession_code)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Investigation, accession_code))
    }

    /// Institutions taking part in the investigation.
    pub async fn participants(
        &self,
        accession_code: &str,
    ) -> Result<Vec<InvestigationInstitution>> {
        let investigation = self.investigation(accession_code).await?;
        self.store
            .list_investigation_institutions(investigation.id)
            .await
    }

    /// Record that an institution joined the investigation.
    pub async fn join(
        &self,
        accession_code: &str,
        mut link: InstitutionLink,
    ) -> Result<InvestigationInstitution> {
        let investigation = self.investigation(accession_code).await?;
        link.validate()?;
        let joined = self.store.link_institution(investigation.id, &link).await?;
        tracing::info!(
            investigation = %investigation.accession_code,
            institution = joined.institution_id,
            "Institution joined investigation"
        );
        Ok(joined)
    }

    pub async fn leave(&self, accession_code: &str, institution_id: i64) -> Result<()> {
        let investigation = self.investigation(accession_code).await?;
        if !self
            .store
            .unlink_institution(investigation.id, institution_id)
            .await?
        {
            return Err(AppError::NotFound(
                "Institution does not take part in this investigation".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::investigation::InvestigationInput;
    use crate::models::user::NewUser;
    use crate::storage::MemoryStore;

    async fn setup() -> (Arc<dyn CatalogueStore>, InstitutionService) {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let owner = store
            .create_user(NewUser {
                username: "owner".into(),
                email: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: "x".into(),
                is_staff: false,
                is_superuser: false,
            })
            .await
            .unwrap();
        store
            .create_investigation(
                &InvestigationInput {
                    title: "Soil".into(),
                    ..Default::default()
                },
                owner.id,
            )
            .await
            .unwrap();
        (store.clone(), InstitutionService::new(store))
    }

    fn institution(name: &str) -> InstitutionInput {
        InstitutionInput {
            name: name.into(),
            address_country: "nl".into(),
            ..Default::default()
        }
    }

    fn link(institution_id: i64, amount: Option<&str>, day: u32) -> InstitutionLink {
        InstitutionLink {
            institution_id,
            contribution_amount: amount.map(String::from),
            join_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_validates_and_normalises() {
        let (_, service) = setup().await;
        let created = service.create(institution("Wageningen")).await.unwrap();
        assert_eq!(created.address_country, "NL");

        let err = service.create(institution("")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_participants_in_join_order() {
        let (_, service) = setup().await;
        let first = service.create(institution("Utrecht")).await.unwrap();
        let second = service.create(institution("Amsterdam")).await.unwrap();

        service.join("CXRP1", link(first.id, Some("10.5"), 3)).await.unwrap();
        service.join("CXRP1", link(second.id, None, 9)).await.unwrap();

        let participants = service.participants("CXRP1").await.unwrap();
        let names: Vec<_> = participants.iter().map(|p| p.institution_name.as_str()).collect();
        assert_eq!(names, vec!["Utrecht", "Amsterdam"]);
        assert_eq!(participants[0].contribution_amount.as_deref(), Some("10.50"));

        let err = service
            .join("CXRP1", link(first.id, None, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_join_rejects_bad_amount_and_unknown_records() {
        let (_, service) = setup().await;
        let inst = service.create(institution("Delft")).await.unwrap();

        let err = service
            .join("CXRP1", link(inst.id, Some("1.234"), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service.join("CXRP9", link(inst.id, None, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = service.join("CXRP1", link(99, None, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_leave_and_delete_investigation() {
        let (store, service) = setup().await;
        let inst = service.create(institution("Leiden")).await.unwrap();
        service.join("CXRP1", link(inst.id, None, 1)).await.unwrap();

        service.leave("CXRP1", inst.id).await.unwrap();
        let err = service.leave("CXRP1", inst.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        service.join("CXRP1", link(inst.id, None, 1)).await.unwrap();
        store.delete_investigation(1).await.unwrap();
        assert!(store.list_investigation_institutions(1).await.unwrap().is_empty());
        assert!(service.get(inst.id).await.is_ok());
    }
}
