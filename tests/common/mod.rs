//! In-memory stand-ins for the Kubernetes API and the Argo CD API
#![allow(dead_code)]

use argocd_appsource::operator::{
    AppProject, AppProjectSpec, AppSource, AppSourceSpec, Application, ApplicationService,
    ApplicationSettings, CompiledProjectTemplate, DeleteOptions, EngineSettings, ObjectKey,
    OperatorError, ProjectService, ProjectTemplate, ReconciliationEngine, ResourceStore, Result,
    TemplateRegistry,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const CLUSTER_HOST: &str = "https://kubernetes.default.svc";
pub const ARGOCD_NAMESPACE: &str = "argocd";

/// Ordered log of remote calls shared by the fake services
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

// ==================== AppSource store ====================

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<ObjectKey, AppSource>>,
    next_version: AtomicU32,
    pub status_writes: AtomicU32,
    pub metadata_writes: AtomicU32,
}

impl FakeStore {
    pub fn insert(&self, mut appsource: AppSource) {
        appsource.metadata.resource_version = Some(self.bump());
        self.objects
            .lock()
            .unwrap()
            .insert(ObjectKey::of(&appsource), appsource);
    }

    pub fn load(&self, key: &ObjectKey) -> Option<AppSource> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn writes(&self) -> u32 {
        self.status_writes.load(Ordering::SeqCst) + self.metadata_writes.load(Ordering::SeqCst)
    }

    fn bump(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn write<F>(&self, appsource: &AppSource, apply: F) -> Result<AppSource>
    where
        F: FnOnce(&mut AppSource),
    {
        let key = ObjectKey::of(appsource);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| OperatorError::NotFound(key.to_string()))?;
        if stored.resource_version() != appsource.resource_version() {
            return Err(OperatorError::Conflict(key.to_string()));
        }
        apply(stored);
        stored.metadata.resource_version = Some(self.bump());
        let result = stored.clone();

        // the API server drops a deleting object once its finalizers are gone
        if result.metadata.deletion_timestamp.is_some() && result.finalizers().is_empty() {
            objects.remove(&key);
        }
        Ok(result)
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<AppSource>> {
        Ok(self.load(key))
    }

    async fn update(&self, appsource: &AppSource) -> Result<AppSource> {
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        let finalizers = appsource.metadata.finalizers.clone();
        self.write(appsource, |stored| stored.metadata.finalizers = finalizers)
    }

    async fn update_status(&self, appsource: &AppSource) -> Result<AppSource> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let status = appsource.status.clone();
        self.write(appsource, |stored| stored.status = status)
    }
}

// ==================== Argo CD projects ====================

#[derive(Default)]
pub struct FakeProjects {
    pub log: CallLog,
    projects: Mutex<BTreeMap<String, AppProject>>,
    next_version: AtomicU32,
    /// Number of upcoming updates rejected with a conflict
    pub conflicts: AtomicU32,
    pub fail_create: Mutex<bool>,
}

impl FakeProjects {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn insert(&self, project: AppProject) {
        let mut project = project;
        project.metadata.resource_version = Some(self.bump());
        self.projects
            .lock()
            .unwrap()
            .insert(project.name().to_string(), project);
    }

    pub fn project(&self, name: &str) -> Option<AppProject> {
        self.projects.lock().unwrap().get(name).cloned()
    }

    fn bump(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl ProjectService for FakeProjects {
    async fn get(&self, name: &str) -> Result<Option<AppProject>> {
        self.log.record(format!("Project.Get({})", name));
        Ok(self.project(name))
    }

    async fn create(&self, project: &AppProject, upsert: bool) -> Result<AppProject> {
        self.log.record(format!("Project.Create({})", project.name()));
        if *self.fail_create.lock().unwrap() {
            return Err(OperatorError::Remote {
                status: 403,
                message: "permission denied".into(),
            });
        }
        if !upsert && self.project(project.name()).is_some() {
            return Err(OperatorError::Conflict(project.name().to_string()));
        }
        self.insert(project.clone());
        self.project(project.name())
            .ok_or_else(|| OperatorError::NotFound(project.name().to_string()))
    }

    async fn update(&self, project: &AppProject) -> Result<AppProject> {
        self.log.record(format!("Project.Update({})", project.name()));
        let stored = self
            .project(project.name())
            .ok_or_else(|| OperatorError::NotFound(project.name().to_string()))?;

        let conflict = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict || stored.metadata.resource_version != project.metadata.resource_version {
            return Err(OperatorError::Conflict(project.name().to_string()));
        }

        self.insert(project.clone());
        self.project(project.name())
            .ok_or_else(|| OperatorError::NotFound(project.name().to_string()))
    }
}

// ==================== Argo CD applications ====================

#[derive(Default)]
pub struct FakeApplications {
    pub log: CallLog,
    applications: Mutex<BTreeMap<String, Application>>,
    /// Number of upcoming deletes that fail
    pub delete_failures: AtomicU32,
    pub fail_create: Mutex<bool>,
    pub deletes: Mutex<Vec<(String, DeleteOptions)>>,
}

impl FakeApplications {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn insert(&self, application: Application) {
        self.applications
            .lock()
            .unwrap()
            .insert(application.name().to_string(), application);
    }

    pub fn application(&self, name: &str) -> Option<Application> {
        self.applications.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ApplicationService for FakeApplications {
    async fn get(&self, name: &str) -> Result<Option<Application>> {
        self.log.record(format!("Application.Get({})", name));
        Ok(self.application(name))
    }

    async fn create(&self, application: &Application) -> Result<Application> {
        self.log
            .record(format!("Application.Create({})", application.name()));
        if *self.fail_create.lock().unwrap() {
            return Err(OperatorError::Remote {
                status: 400,
                message: "application spec is invalid".into(),
            });
        }
        self.insert(application.clone());
        Ok(application.clone())
    }

    async fn delete(&self, name: &str, options: &DeleteOptions) -> Result<()> {
        self.log.record(format!("Application.Delete({})", name));
        self.deletes
            .lock()
            .unwrap()
            .push((name.to_string(), *options));

        let failed = self
            .delete_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(OperatorError::Remote {
                status: 503,
                message: "argocd-server unavailable".into(),
            });
        }
        self.applications.lock().unwrap().remove(name);
        Ok(())
    }
}

// ==================== Fixtures ====================

pub fn appsource(namespace: &str, name: &str) -> AppSource {
    let mut appsource = AppSource::new(
        name,
        AppSourceSpec {
            repo_url: "https://git.example/repo".into(),
            path: "k8s/".into(),
        },
    );
    appsource.metadata.namespace = Some(namespace.to_string());
    appsource
}

pub fn deleting(mut appsource: AppSource, finalizers: &[&str]) -> AppSource {
    appsource.metadata.finalizers = Some(finalizers.iter().map(|f| f.to_string()).collect());
    appsource.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    appsource
}

pub fn team_templates() -> TemplateRegistry {
    TemplateRegistry::new(vec![CompiledProjectTemplate::compile(
        "teams",
        ProjectTemplate {
            name_pattern: r"^(?P<project>team-[a-z]+)$".into(),
            spec: Some(AppProjectSpec {
                description: Some("team project".into()),
                source_repos: vec!["*".into()],
                ..Default::default()
            }),
        },
    )
    .unwrap()])
}

pub fn project_named(name: &str) -> AppProject {
    AppProject::new(name, AppProjectSpec::default())
}

pub struct Harness {
    pub log: CallLog,
    pub store: Arc<FakeStore>,
    pub projects: Arc<FakeProjects>,
    pub applications: Arc<FakeApplications>,
    pub engine: ReconciliationEngine,
}

impl Harness {
    pub fn new(templates: TemplateRegistry) -> Self {
        Self::with_settings(templates, |_| {})
    }

    pub fn with_settings<F>(templates: TemplateRegistry, tweak: F) -> Self
    where
        F: FnOnce(&mut EngineSettings),
    {
        let log = CallLog::default();
        let store = Arc::new(FakeStore::default());
        let projects = Arc::new(FakeProjects::new(log.clone()));
        let applications = Arc::new(FakeApplications::new(log.clone()));

        let mut settings = EngineSettings::new(ApplicationSettings {
            cluster_host: CLUSTER_HOST.into(),
            argocd_namespace: ARGOCD_NAMESPACE.into(),
            manage_source_repos: false,
        });
        tweak(&mut settings);

        let engine = ReconciliationEngine::new(
            store.clone(),
            projects.clone(),
            applications.clone(),
            templates,
            settings,
        );

        Self {
            log,
            store,
            projects,
            applications,
            engine,
        }
    }
}
