use crate::core::store::TemplateStore;
use crate::domain::model::{PairRecord, Role};
use crate::utils::error::{PairgenError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// App id to pair table. Built once per run, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PairingRegistry {
    pairs: BTreeMap<u32, PairRecord>,
}

impl PairingRegistry {
    pub fn build(store: &TemplateStore) -> Result<Self> {
        let mut pairs: BTreeMap<u32, PairRecord> = BTreeMap::new();

        for doc in store.iter() {
            let record = pairs
                .entry(doc.app_number)
                .or_insert_with(|| PairRecord::new(doc.app_id.clone(), doc.app_number));

            let slot = match doc.role {
                Role::Backend => &mut record.backend,
                Role::Frontend => &mut record.frontend,
            };
            if let Some(existing) = slot {
                return Err(PairgenError::DuplicateTemplate {
                    app_id: doc.app_id.clone(),
                    role: doc.role,
                    first: PathBuf::from(&existing.file_name),
                    second: PathBuf::from(&doc.file_name),
                });
            }
            *slot = Some(doc.clone());
        }

        let singletons = pairs.values().filter(|r| !r.is_complete()).count();
        tracing::info!(
            "🔗 Paired {} application(s), {} with a single side",
            pairs.len(),
            singletons
        );
        Ok(Self { pairs })
    }

    pub fn get(&self, app_id: &str) -> Option<&PairRecord> {
        self.pairs.values().find(|r| r.app_id == app_id)
    }

    /// Records ordered by app number.
    pub fn iter(&self) -> impl Iterator<Item = &PairRecord> {
        self.pairs.values()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::parse_document;

    fn store(files: &[&str]) -> TemplateStore {
        TemplateStore::from_documents(
            files
                .iter()
                .filter_map(|name| parse_document(name, format!("body of {}", name))),
        )
    }

    #[test]
    fn test_pairs_by_app_number() {
        let registry = PairingRegistry::build(&store(&[
            "app_10_backend_shop.md",
            "app_2_backend_notes.md",
            "app_2_frontend_notes_ui.md",
            "app_3_frontend_landing.md",
        ]))
        .unwrap();

        let ids: Vec<&str> = registry.iter().map(|r| r.app_id.as_str()).collect();
        assert_eq!(ids, vec!["app_2", "app_3", "app_10"]);

        let notes = registry.get("app_2").unwrap();
        assert!(notes.is_complete());
        assert_eq!(notes.frontend.as_ref().unwrap().name, "notes_ui");

        let shop = registry.get("app_10").unwrap();
        assert!(shop.frontend.is_none());
        let landing = registry.get("app_3").unwrap();
        assert!(landing.backend.is_none());
    }

    #[test]
    fn test_duplicate_role_is_rejected() {
        let err = PairingRegistry::build(&store(&[
            "app_1_backend_notes.md",
            "app_01_backend_notes_v2.md",
        ]))
        .unwrap_err();
        match err {
            PairgenError::DuplicateTemplate { app_id, role, first, second } => {
                assert_eq!(app_id, "app_1");
                assert_eq!(role, Role::Backend);
                assert_eq!(first, PathBuf::from("app_1_backend_notes.md"));
                assert_eq!(second, PathBuf::from("app_01_backend_notes_v2.md"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
