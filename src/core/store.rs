use crate::core::resolver;
use crate::domain::model::{Role, TemplateDocument};
use crate::domain::ports::Storage;
use crate::utils::error::{PairgenError, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^app_(\d+)_(backend|frontend)_(.+)\.md$").unwrap());

static APP_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^app_(\d+)$").unwrap());

/// Splits `app_<n>_<role>_<name>.md` into its parts.
pub fn parse_file_name(file_name: &str) -> Option<(u32, Role, String)> {
    let caps = FILE_NAME_RE.captures(file_name)?;
    let number = caps[1].parse().ok()?;
    let role = Role::parse(&caps[2])?;
    Some((number, role, caps[3].to_string()))
}

pub fn app_id(number: u32) -> String {
    format!("app_{}", number)
}

/// Number of an `app_<n>` key; `app_07` and `app_7` name the same app.
pub fn parse_app_id(key: &str) -> Option<u32> {
    APP_ID_RE.captures(key)?[1].parse().ok()
}

/// Builds a document from a file name and its text, or `None` when the name
/// does not follow the template naming scheme.
pub fn parse_document(file_name: &str, body: String) -> Option<TemplateDocument> {
    let (number, role, name) = parse_file_name(file_name)?;
    let placeholders = resolver::resolve(&body);
    Some(TemplateDocument {
        app_id: app_id(number),
        app_number: number,
        role,
        name,
        file_name: file_name.to_string(),
        body,
        placeholders,
    })
}

/// Read-only collection of every template found in the input directory.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    documents: Vec<Arc<TemplateDocument>>,
}

impl TemplateStore {
    pub fn from_documents(documents: impl IntoIterator<Item = TemplateDocument>) -> Self {
        Self {
            documents: documents.into_iter().map(Arc::new).collect(),
        }
    }

    pub async fn load(storage: &dyn Storage) -> Result<Self> {
        let mut documents = Vec::new();

        for file_name in storage.list_files().await? {
            if parse_file_name(&file_name).is_none() {
                tracing::debug!("Skipping '{}': not an app_<n>_<role>_<name>.md template", file_name);
                continue;
            }

            let bytes = storage.read_file(&file_name).await?;
            let body = String::from_utf8(bytes).map_err(|e| {
                PairgenError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{} is not valid UTF-8: {}", file_name, e),
                ))
            })?;

            if let Some(doc) = parse_document(&file_name, body) {
                tracing::debug!(
                    "📄 Loaded {} ({} {}, placeholders: {:?})",
                    doc.file_name,
                    doc.app_id,
                    doc.role,
                    doc.placeholders
                );
                documents.push(Arc::new(doc));
            }
        }

        tracing::info!("📚 Loaded {} template(s)", documents.len());
        Ok(Self { documents })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TemplateDocument>> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct MemoryStorage {
        files: BTreeMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files.get(path).cloned().ok_or_else(|| {
                PairgenError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, _path: &str, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn list_files(&self) -> Result<Vec<String>> {
            Ok(self.files.keys().cloned().collect())
        }
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("app_12_backend_todo_list.md"),
            Some((12, Role::Backend, "todo_list".to_string()))
        );
        assert_eq!(
            parse_file_name("APP_3_Frontend_blog.md"),
            Some((3, Role::Frontend, "blog".to_string()))
        );
        assert_eq!(parse_file_name("app_3_mobile_blog.md"), None);
        assert_eq!(parse_file_name("app_3_backend_blog.txt"), None);
        assert_eq!(parse_file_name("README.md"), None);
    }

    #[test]
    fn test_parse_app_id() {
        assert_eq!(parse_app_id("app_7"), Some(7));
        assert_eq!(parse_app_id("app_07"), Some(7));
        assert_eq!(parse_app_id("app_x"), None);
        assert_eq!(parse_app_id("shop"), None);
    }

    #[tokio::test]
    async fn test_load_skips_foreign_files() {
        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), b"# readme".to_vec());
        files.insert("app_1_backend_notes.md".to_string(), b"port YYYY".to_vec());
        files.insert("app_1_frontend_notes.md".to_string(), b"port XXXX".to_vec());
        let storage = MemoryStorage { files };

        let store = TemplateStore::load(&storage).await.unwrap();
        assert_eq!(store.len(), 2);
        let first = store.iter().next().unwrap();
        assert_eq!(first.app_id, "app_1");
        assert_eq!(first.role, Role::Backend);
        assert_eq!(first.placeholders, vec!["YYYY"]);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_utf8() {
        let mut files = BTreeMap::new();
        files.insert("app_1_backend_notes.md".to_string(), vec![0xff, 0xfe, 0x00]);
        let storage = MemoryStorage { files };
        let err = TemplateStore::load(&storage).await.unwrap_err();
        assert!(matches!(err, PairgenError::IoError(_)));
    }
}
