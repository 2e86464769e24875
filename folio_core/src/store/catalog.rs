//! Projects and site settings for the storage-only deployment.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::medium::{with_exclusive, StorageMedium};
use super::message::MessageId;
use super::notify::{ChangeKind, ChangeNotifier, StoreChange};
use super::{StoreError, StoreResult, LEGACY_SETTINGS_SLOT, PROJECTS_SLOT, SETTINGS_SLOT};
use crate::validation::{validate_contact_email, validate_hex_color, ValidationFailure};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalProject {
    pub id: MessageId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, with = "super::message::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields this version does not know about, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A stored project entry. Entries that do not parse as a project keep their
/// place in the slot and are written back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ProjectEntry {
    Known(LocalProject),
    Raw(Value),
}

impl ProjectEntry {
    fn known(&self) -> Option<&LocalProject> {
        match self {
            ProjectEntry::Known(project) => Some(project),
            ProjectEntry::Raw(_) => None,
        }
    }

    fn has_id(&self, id: &str) -> bool {
        self.known().map_or(false, |p| p.id.to_string() == id)
    }
}

/// Fields to set on a project; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tech_stack: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub live_url: Option<String>,
    pub github_url: Option<String>,
    pub year: Option<i32>,
    pub featured: Option<bool>,
}

impl ProjectPatch {
    fn apply(self, project: &mut LocalProject) {
        if let Some(title) = self.title {
            project.title = title;
        }
        if let Some(description) = self.description {
            project.description = description;
        }
        if let Some(category) = self.category {
            project.category = category;
        }
        if let Some(tech_stack) = self.tech_stack {
            project.tech_stack = tech_stack;
        }
        if self.image_url.is_some() {
            project.image_url = self.image_url;
        }
        if self.live_url.is_some() {
            project.live_url = self.live_url;
        }
        if self.github_url.is_some() {
            project.github_url = self.github_url;
        }
        if self.year.is_some() {
            project.year = self.year;
        }
        if let Some(featured) = self.featured {
            project.featured = featured;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialLinks {
    pub github: String,
    pub linkedin: String,
    pub twitter: String,
    pub codepen: String,
}

impl Default for SocialLinks {
    fn default() -> Self {
        Self {
            github: "#".to_string(),
            linkedin: "#".to_string(),
            twitter: "#".to_string(),
            codepen: "#".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeColors {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
}

impl Default for ThemeColors {
    fn default() -> Self {
        Self {
            primary: "#6C63FF".to_string(),
            secondary: "#FF6584".to_string(),
            accent: "#36D1DC".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteSettings {
    pub site_title: String,
    pub contact_email: String,
    pub phone: String,
    pub address: String,
    pub social_links: SocialLinks,
    pub theme: ThemeColors,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_title: "My Portfolio".to_string(),
            contact_email: String::new(),
            phone: String::new(),
            address: String::new(),
            social_links: SocialLinks::default(),
            theme: ThemeColors::default(),
        }
    }
}

impl SiteSettings {
    fn check(&self) -> Result<(), ValidationFailure> {
        let field = |field: &str, err: validator::ValidationError| ValidationFailure::Field {
            field: field.to_string(),
            message: err
                .message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "invalid value".to_string()),
        };

        validate_contact_email(&self.contact_email).map_err(|e| field("contactEmail", e))?;
        for (name, color) in [
            ("theme.primary", &self.theme.primary),
            ("theme.secondary", &self.theme.secondary),
            ("theme.accent", &self.theme.accent),
        ] {
            validate_hex_color(color).map_err(|e| field(name, e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBundle {
    #[serde(default)]
    pub projects: Vec<LocalProject>,
    #[serde(default)]
    pub settings: SiteSettings,
    #[serde(default, skip_deserializing)]
    pub export_date: Option<String>,
}

struct Inner {
    medium: Arc<dyn StorageMedium>,
    notifier: ChangeNotifier,
    version: Mutex<u64>,
}

#[derive(Clone)]
pub struct LocalCatalog {
    inner: Arc<Inner>,
}

impl LocalCatalog {
    pub fn new(medium: Arc<dyn StorageMedium>, notifier: ChangeNotifier) -> Self {
        Self {
            inner: Arc::new(Inner {
                medium,
                notifier,
                version: Mutex::new(0),
            }),
        }
    }

    fn read_slot<T: for<'de> Deserialize<'de>>(&self, slot: &str) -> StoreResult<Option<T>> {
        let Some(raw) = self.inner.medium.read(slot)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("ignoring unreadable slot '{}': {}", slot, e);
                Ok(None)
            }
        }
    }

    /// Project entries for a read-modify-write. A slot that exists but is
    /// not a list is an error rather than an empty catalog.
    fn project_entries(&self) -> StoreResult<Vec<ProjectEntry>> {
        let Some(raw) = self.inner.medium.read(PROJECTS_SLOT)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|e| {
            StoreError::InvalidPayload(format!(
                "project slot is unreadable, refusing to overwrite it: {}",
                e
            ))
        })
    }

    fn write_slot<T: Serialize>(&self, slot: &str, value: &T, kind: ChangeKind) -> StoreResult<()> {
        let body = serde_json::to_string(value)?;
        self.inner.medium.write(slot, &body)?;
        let version = {
            let mut version = self.inner.version.lock();
            *version += 1;
            *version
        };
        self.inner
            .notifier
            .publish(StoreChange::new(slot, version, kind));
        Ok(())
    }

    fn exclusive<T>(&self, section: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        with_exclusive(self.inner.medium.as_ref(), section)
    }

    pub fn projects(&self) -> StoreResult<Vec<LocalProject>> {
        let entries: Vec<ProjectEntry> = self.read_slot(PROJECTS_SLOT)?.unwrap_or_default();
        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                ProjectEntry::Known(project) => Some(project),
                ProjectEntry::Raw(_) => None,
            })
            .collect())
    }

    pub fn add_project(&self, patch: ProjectPatch) -> StoreResult<LocalProject> {
        let title = patch.title.clone().unwrap_or_default();
        if title.trim().is_empty() {
            return Err(StoreError::Validation(ValidationFailure::Field {
                field: "title".to_string(),
                message: "Title is required".to_string(),
            }));
        }

        let mut project = LocalProject {
            id: MessageId::generate(),
            title,
            description: String::new(),
            category: String::new(),
            tech_stack: Vec::new(),
            image_url: None,
            live_url: None,
            github_url: None,
            year: None,
            featured: false,
            created_at: Some(Utc::now()),
            extra: Map::new(),
        };
        patch.apply(&mut project);

        self.exclusive(|| {
            let mut entries = self.project_entries()?;
            entries.push(ProjectEntry::Known(project.clone()));
            self.write_slot(PROJECTS_SLOT, &entries, ChangeKind::ProjectsChanged)
        })?;
        Ok(project)
    }

    /// Merge `patch` into the project with `id`. `false` when there is none.
    pub fn update_project(&self, id: &str, patch: ProjectPatch) -> StoreResult<bool> {
        self.exclusive(|| {
            let mut entries = self.project_entries()?;
            let Some(ProjectEntry::Known(project)) = entries.iter_mut().find(|e| e.has_id(id))
            else {
                return Ok(false);
            };
            patch.apply(project);
            self.write_slot(PROJECTS_SLOT, &entries, ChangeKind::ProjectsChanged)?;
            Ok(true)
        })
    }

    pub fn delete_project(&self, id: &str) -> StoreResult<bool> {
        self.exclusive(|| {
            let mut entries = self.project_entries()?;
            let before = entries.len();
            entries.retain(|e| !e.has_id(id));
            if entries.len() == before {
                return Ok(false);
            }
            self.write_slot(PROJECTS_SLOT, &entries, ChangeKind::ProjectsChanged)?;
            Ok(true)
        })
    }

    /// Current settings. Installs that only have the older settings slot
    /// read from it until settings are saved again.
    pub fn settings(&self) -> StoreResult<SiteSettings> {
        if let Some(settings) = self.read_slot(SETTINGS_SLOT)? {
            return Ok(settings);
        }
        Ok(self.read_slot(LEGACY_SETTINGS_SLOT)?.unwrap_or_default())
    }

    pub fn update_settings(&self, settings: &SiteSettings) -> StoreResult<()> {
        settings.check()?;
        self.exclusive(|| self.write_slot(SETTINGS_SLOT, settings, ChangeKind::SettingsChanged))
    }

    pub fn export_bundle(&self) -> StoreResult<String> {
        let bundle = CatalogBundle {
            projects: self.projects()?,
            settings: self.settings()?,
            export_date: Some(super::message::format_timestamp(Utc::now())),
        };
        Ok(serde_json::to_string_pretty(&bundle)?)
    }

    /// Replace projects and settings from an exported bundle. Nothing is
    /// written when the payload does not parse or validate.
    pub fn import_bundle(&self, payload: &str) -> StoreResult<()> {
        let bundle: CatalogBundle = serde_json::from_str(payload)
            .map_err(|e| StoreError::InvalidPayload(format!("Invalid file format: {}", e)))?;
        bundle.settings.check()?;

        self.exclusive(|| {
            self.write_slot(PROJECTS_SLOT, &bundle.projects, ChangeKind::ProjectsChanged)?;
            self.write_slot(SETTINGS_SLOT, &bundle.settings, ChangeKind::SettingsChanged)
        })?;
        info!("imported catalog with {} projects", bundle.projects.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::medium::MemoryMedium;

    fn catalog() -> LocalCatalog {
        LocalCatalog::new(Arc::new(MemoryMedium::new("local")), ChangeNotifier::new())
    }

    fn titled(title: &str) -> ProjectPatch {
        ProjectPatch {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_project_lifecycle() {
        let catalog = catalog();
        let project = catalog.add_project(titled("Folio")).unwrap();
        assert!(project.created_at.is_some());

        let id = project.id.to_string();
        let patch = ProjectPatch {
            featured: Some(true),
            tech_stack: Some(vec!["Rust".to_string()]),
            ..Default::default()
        };
        assert!(catalog.update_project(&id, patch).unwrap());
        assert!(!catalog.update_project("missing", ProjectPatch::default()).unwrap());

        let stored = &catalog.projects().unwrap()[0];
        assert_eq!(stored.title, "Folio");
        assert!(stored.featured);

        assert!(catalog.delete_project(&id).unwrap());
        assert!(catalog.projects().unwrap().is_empty());
    }

    #[test]
    fn test_untitled_project_rejected() {
        let catalog = catalog();
        assert!(matches!(
            catalog.add_project(ProjectPatch::default()),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_settings_defaults_and_validation() {
        let catalog = catalog();
        let settings = catalog.settings().unwrap();
        assert_eq!(settings.theme.primary, "#6C63FF");

        let mut bad = settings.clone();
        bad.theme.accent = "teal".to_string();
        assert!(catalog.update_settings(&bad).is_err());
        assert_eq!(catalog.settings().unwrap(), settings);
    }

    #[test]
    fn test_bundle_round_trip_keeps_unknown_fields() {
        let source = catalog();
        source.add_project(titled("Folio")).unwrap();
        let mut settings = SiteSettings::default();
        settings.site_title = "Ann's work".to_string();
        source.update_settings(&settings).unwrap();
        let exported = source.export_bundle().unwrap();

        let target = catalog();
        target
            .import_bundle(
                r#"{"projects":[{"id":1,"title":"Old","stars":5}],"settings":{"siteTitle":"Old"}}"#,
            )
            .unwrap();
        assert_eq!(target.projects().unwrap()[0].extra["stars"], 5);

        target.import_bundle(&exported).unwrap();
        assert_eq!(target.projects().unwrap()[0].title, "Folio");
        assert_eq!(target.settings().unwrap().site_title, "Ann's work");

        assert!(target.import_bundle("not json").is_err());
        assert_eq!(target.projects().unwrap()[0].title, "Folio");
    }

    #[test]
    fn test_unparseable_projects_survive_edits() {
        let medium = MemoryMedium::new("local");
        medium
            .write(
                PROJECTS_SLOT,
                r#"[{"id":1,"title":"Kept"},{"id":2},{"title":"no id"},{"id":3,"year":"soon"}]"#,
            )
            .unwrap();
        let catalog = LocalCatalog::new(Arc::new(medium.clone()), ChangeNotifier::new());

        let titles: Vec<String> = catalog.projects().unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["Kept", ""]);

        catalog.add_project(titled("Folio")).unwrap();
        assert!(catalog.update_project("1", titled("Renamed")).unwrap());
        assert!(catalog.delete_project("2").unwrap());

        let raw: Value = serde_json::from_str(&medium.read(PROJECTS_SLOT).unwrap().unwrap()).unwrap();
        let items = raw.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0]["title"], "Renamed");
        assert_eq!(items[1], serde_json::json!({"title":"no id"}));
        assert_eq!(items[2], serde_json::json!({"id":3,"year":"soon"}));
        assert_eq!(items[3]["title"], "Folio");
    }

    #[test]
    fn test_unreadable_project_slot_is_not_overwritten() {
        let medium = MemoryMedium::new("local");
        medium.write(PROJECTS_SLOT, "{ truncated").unwrap();
        let catalog = LocalCatalog::new(Arc::new(medium.clone()), ChangeNotifier::new());

        assert!(catalog.projects().unwrap().is_empty());
        assert!(matches!(
            catalog.add_project(titled("Folio")),
            Err(StoreError::InvalidPayload(_))
        ));
        assert!(matches!(
            catalog.delete_project("1"),
            Err(StoreError::InvalidPayload(_))
        ));
        assert_eq!(medium.read(PROJECTS_SLOT).unwrap().as_deref(), Some("{ truncated"));
    }

    #[test]
    fn test_legacy_settings_slot_is_read() {
        let medium = MemoryMedium::new("local");
        medium
            .write(
                LEGACY_SETTINGS_SLOT,
                r#"{"siteTitle":"Old site","contactEmail":"me@old.dev","socialLinks":{"github":"https://github.com/old"}}"#,
            )
            .unwrap();
        let catalog = LocalCatalog::new(Arc::new(medium.clone()), ChangeNotifier::new());

        let settings = catalog.settings().unwrap();
        assert_eq!(settings.site_title, "Old site");
        assert_eq!(settings.contact_email, "me@old.dev");
        assert_eq!(settings.social_links.github, "https://github.com/old");
        assert_eq!(settings.social_links.twitter, "#");

        let mut updated = settings.clone();
        updated.site_title = "New site".to_string();
        catalog.update_settings(&updated).unwrap();
        assert_eq!(catalog.settings().unwrap().site_title, "New site");
    }
}
